//! GPU context acquisition and shared device helpers.
//!
//! The context is created headlessly and passed explicitly to every resource
//! and pipeline operation; nothing in this crate touches a hidden global.

use log::info;

use crate::error::{RenderError, RenderResult};

/// Side length of the square tile one compute workgroup covers, in texels.
/// Dispatch grids everywhere are derived from texture size and this constant.
pub const TILE_SIZE: u32 = 32;

/// Explicit GPU context: one adapter, one device, one submission queue.
pub struct GpuContext {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub adapter: wgpu::Adapter,
}

impl GpuContext {
    /// Acquire a headless high-performance device.
    ///
    /// The default wgpu limits cap compute workgroups at 256 invocations;
    /// the precompute kernels run 32x32 tiles, so the compute limits are
    /// raised to whatever the adapter actually supports before requesting
    /// the device.
    pub fn new() -> RenderResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| RenderError::resource("No suitable GPU adapter"))?;

        // The BRDF LUT is written as an rg16float storage texture, which is
        // outside the core WebGPU storage-format set; native adapters expose
        // it through the adapter-specific format features.
        let mut features = wgpu::Features::empty();
        if adapter
            .features()
            .contains(wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES)
        {
            features |= wgpu::Features::TEXTURE_ADAPTER_SPECIFIC_FORMAT_FEATURES;
        }

        let adapter_limits = adapter.limits();
        let mut limits = wgpu::Limits::default();
        limits.max_compute_invocations_per_workgroup = adapter_limits
            .max_compute_invocations_per_workgroup
            .max(limits.max_compute_invocations_per_workgroup);
        limits.max_compute_workgroup_size_x = adapter_limits
            .max_compute_workgroup_size_x
            .max(limits.max_compute_workgroup_size_x);
        limits.max_compute_workgroup_size_y = adapter_limits
            .max_compute_workgroup_size_y
            .max(limits.max_compute_workgroup_size_y);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                required_features: features,
                required_limits: limits,
                label: Some("envprobe-device"),
            },
            None,
        ))
        .map_err(|e| RenderError::resource(format!("request_device failed: {e}")))?;

        info!("wgpu renderer [{}]", adapter.get_info().name);

        Ok(Self {
            device,
            queue,
            adapter,
        })
    }

    /// Block until every submitted command has finished executing.
    ///
    /// This is the full-pipeline barrier the precompute pipeline issues
    /// before its derived textures are first sampled.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

/// Align to WebGPU's required bytes-per-row for texture copies.
#[inline]
pub fn align_copy_bpr(unpadded: u32) -> u32 {
    let a = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    ((unpadded + a - 1) / a) * a
}

/// Number of workgroups along one axis for a texture of the given size.
///
/// The clamp matters once `size < TILE_SIZE` (the smallest mip levels, small
/// irradiance maps): a single partially-filled workgroup still has to run.
#[inline]
pub fn dispatch_groups(size: u32) -> u32 {
    (size / TILE_SIZE).max(1)
}
