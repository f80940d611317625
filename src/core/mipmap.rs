//! GPU mip-chain generation.
//!
//! Each level is produced from the one above it by a box-filter downsample
//! compute pass; cube targets process all six layers per dispatch. This
//! feeds the prefilter stage, which samples progressively blurred levels to
//! keep high-roughness filtering noise down.

use crate::core::texture::{PixelFormat, Texture};
use crate::error::{RenderError, RenderResult};
use crate::gpu::{dispatch_groups, GpuContext};
use crate::shader::Program;

/// Compute pass that fills a texture's mip pyramid from its base level.
pub struct MipmapGenerator {
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
}

impl MipmapGenerator {
    pub fn new(ctx: &GpuContext, program: &Program) -> RenderResult<Self> {
        let layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("mipmap.layout"),
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: false },
                            view_dimension: wgpu::TextureViewDimension::D2Array,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::COMPUTE,
                        ty: wgpu::BindingType::StorageTexture {
                            access: wgpu::StorageTextureAccess::WriteOnly,
                            format: wgpu::TextureFormat::Rgba16Float,
                            view_dimension: wgpu::TextureViewDimension::D2Array,
                        },
                        count: None,
                    },
                ],
            });

        let pipeline = ctx
            .device
            .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("mipmap.pipeline"),
                layout: Some(&ctx.device.create_pipeline_layout(
                    &wgpu::PipelineLayoutDescriptor {
                        label: Some("mipmap.pipeline.layout"),
                        bind_group_layouts: &[&layout],
                        push_constant_ranges: &[],
                    },
                )),
                module: program.compute_module()?,
                entry_point: "main",
            });

        Ok(Self { pipeline, layout })
    }

    /// Fill levels 1.. of `texture` by repeated 2x2 box downsampling.
    pub fn generate(&self, ctx: &GpuContext, texture: &Texture) -> RenderResult<()> {
        if texture.format() != PixelFormat::Rgba16Float {
            return Err(RenderError::precondition(
                "mip generation expects an Rgba16Float target",
            ));
        }
        if texture.levels() < 2 {
            return Ok(());
        }

        let layers = match texture.target() {
            crate::core::texture::TextureTarget::Cube => 6,
            crate::core::texture::TextureTarget::D2 => 1,
        };

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mipmap.encoder"),
            });

        for level in 1..texture.levels() {
            let src_view = texture.sampled_level_view(level - 1)?;
            let dst_view = texture.storage_view(level)?;

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("mipmap.bind_group"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(&src_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&dst_view),
                    },
                ],
            });

            let size = (texture.width() >> level).max(1);
            let groups = dispatch_groups(size);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("mipmap.pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                pass.dispatch_workgroups(groups, groups, layers);
            }
        }

        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }
}
