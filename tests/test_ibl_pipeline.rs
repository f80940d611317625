// tests/test_ibl_pipeline.rs
// End-to-end precompute run on a synthetic environment: artifact shapes,
// BRDF LUT sanity via readback, and artifact teardown.
// RELEVANT FILES: src/core/ibl.rs, src/core/mipmap.rs, shaders/wgsl/spbrdf.comp

use envprobe::{
    GpuContext, HdrImage, IblConfig, IblPipeline, PixelFormat, ShaderCompiler, TextureTarget,
};
use half::f16;

fn try_create_context() -> Option<GpuContext> {
    GpuContext::new().ok()
}

/// A small 2:1 sky-to-ground gradient standing in for a photographed
/// environment.
fn synthetic_environment(width: u32, height: u32) -> HdrImage {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        let v = y as f32 / (height - 1) as f32;
        for x in 0..width {
            let u = x as f32 / (width - 1) as f32;
            data.push(0.1 + 0.9 * u);
            data.push(0.1 + 0.5 * (1.0 - v));
            data.push(0.3 + 0.7 * v);
        }
    }
    HdrImage {
        width,
        height,
        data,
    }
}

/// Read one Rg16Float texel of the BRDF LUT.
fn read_lut_texel(ctx: &GpuContext, lut: &envprobe::Texture, x: u32, y: u32) -> (f32, f32) {
    let bytes_per_row = envprobe::gpu::align_copy_bpr(lut.width() * 4);
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test.lut.readback"),
        size: (bytes_per_row * lut.height()) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test.lut.encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: lut.raw().unwrap(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(lut.height()),
            },
        },
        wgpu::Extent3d {
            width: lut.width(),
            height: lut.height(),
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(Some(encoder.finish()));

    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        tx.send(result).unwrap();
    });
    ctx.wait_idle();
    rx.recv().unwrap().unwrap();

    let data = slice.get_mapped_range();
    let offset = (y * bytes_per_row + x * 4) as usize;
    let scale = f16::from_le_bytes([data[offset], data[offset + 1]]).to_f32();
    let bias = f16::from_le_bytes([data[offset + 2], data[offset + 3]]).to_f32();
    drop(data);
    buffer.unmap();
    (scale, bias)
}

#[test]
fn precompute_produces_the_three_artifacts() {
    let _ = env_logger::builder().is_test(true).try_init();
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping IBL pipeline test due to missing GPU adapter");
        return;
    };

    let config = IblConfig {
        env_map_size: 64,
        irradiance_size: 16,
        brdf_lut_size: 64,
    };
    let pipeline = IblPipeline::new(&ctx, &ShaderCompiler::bundled(), config).unwrap();
    let environment = synthetic_environment(128, 64);
    let mut artifacts = pipeline.run(&ctx, &environment).unwrap();

    // Specular probe: full mip pyramid over a 64x64 cube
    assert_eq!(artifacts.env_filtered.target(), TextureTarget::Cube);
    assert_eq!(artifacts.env_filtered.width(), 64);
    assert_eq!(artifacts.env_filtered.levels(), 7);
    assert_eq!(artifacts.env_filtered.format(), PixelFormat::Rgba16Float);

    // Diffuse probe: single level
    assert_eq!(artifacts.irradiance.target(), TextureTarget::Cube);
    assert_eq!(artifacts.irradiance.width(), 16);
    assert_eq!(artifacts.irradiance.levels(), 1);

    // Integration table: single-level two-channel 2D
    assert_eq!(artifacts.brdf_lut.target(), TextureTarget::D2);
    assert_eq!(artifacts.brdf_lut.width(), 64);
    assert_eq!(artifacts.brdf_lut.levels(), 1);
    assert_eq!(artifacts.brdf_lut.format(), PixelFormat::Rg16Float);

    // At grazing-free view and low roughness the scale term approaches one
    let (scale, bias) = read_lut_texel(&ctx, &artifacts.brdf_lut, 63, 0);
    assert!(scale > 0.5, "scale = {scale}");
    assert!(scale <= 1.2, "scale = {scale}");
    assert!(bias >= 0.0 && bias <= 0.2, "bias = {bias}");

    // Somewhere rough and oblique both terms stay inside the unit range
    let (scale_mid, bias_mid) = read_lut_texel(&ctx, &artifacts.brdf_lut, 32, 32);
    assert!(scale_mid > 0.0 && scale_mid <= 1.2);
    assert!(bias_mid >= 0.0 && bias_mid <= 1.0);

    artifacts.destroy();
    assert!(artifacts.is_destroyed());
    // Repeat teardown is a no-op
    artifacts.destroy();
    assert!(artifacts.is_destroyed());
}

#[test]
fn config_validation_happens_before_any_gpu_work() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping IBL config test due to missing GPU adapter");
        return;
    };

    let bad = IblConfig {
        env_map_size: 100,
        irradiance_size: 16,
        brdf_lut_size: 64,
    };
    assert!(IblPipeline::new(&ctx, &ShaderCompiler::bundled(), bad).is_err());
}
