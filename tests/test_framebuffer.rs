// tests/test_framebuffer.rs
// Framebuffer completeness, the self-resolve no-op, multisample resolve into
// a zero-sample sibling, and teardown symmetry.
// RELEVANT FILES: src/core/framebuffer.rs, src/gpu.rs

use envprobe::core::DepthStencilFormat;
use envprobe::{Framebuffer, FramebufferDesc, GpuContext, PixelFormat};

fn try_create_context() -> Option<GpuContext> {
    GpuContext::new().ok()
}

fn color_desc(samples: u32) -> FramebufferDesc {
    FramebufferDesc {
        width: 64,
        height: 64,
        samples,
        color_format: Some(PixelFormat::Rgba8Unorm),
        depth_stencil_format: None,
    }
}

/// Clear the framebuffer's color attachment to the given color.
fn clear(ctx: &GpuContext, fb: &Framebuffer, color: wgpu::Color) {
    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test.clear"),
        });
    {
        let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("test.clear.pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: fb.color_view().unwrap(),
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }
    ctx.queue.submit(Some(encoder.finish()));
}

/// Read back the top-left texel of a zero-sample framebuffer as RGBA8.
fn read_corner_texel(ctx: &GpuContext, fb: &Framebuffer) -> [u8; 4] {
    let bytes_per_row = envprobe::gpu::align_copy_bpr(fb.width() * 4);
    let buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("test.readback"),
        size: (bytes_per_row * fb.height()) as u64,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("test.readback.encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::ImageCopyTexture {
            texture: fb.color_texture().unwrap(),
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        wgpu::ImageCopyBuffer {
            buffer: &buffer,
            layout: wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(fb.height()),
            },
        },
        wgpu::Extent3d {
            width: fb.width(),
            height: fb.height(),
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
    let texel = [data[0], data[1], data[2], data[3]];
    drop(data);
    buffer.unmap();
    texel
}

#[test]
fn no_attachments_reports_incompleteness() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping framebuffer completeness test due to missing GPU adapter");
        return;
    };

    let desc = FramebufferDesc {
        width: 64,
        height: 64,
        samples: 0,
        color_format: None,
        depth_stencil_format: None,
    };
    let err = Framebuffer::new(&ctx, &desc).unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("completeness"), "{msg}");
    assert!(msg.contains('1'), "message should carry the status code: {msg}");
}

#[test]
fn self_resolve_is_a_no_op() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping self-resolve test due to missing GPU adapter");
        return;
    };

    let fb = Framebuffer::new(&ctx, &color_desc(0)).unwrap();
    let sentinel = wgpu::Color {
        r: 1.0,
        g: 0.0,
        b: 0.0,
        a: 1.0,
    };
    clear(&ctx, &fb, sentinel);

    Framebuffer::resolve(&ctx, &fb, &fb).unwrap();

    // The sentinel must survive untouched: no blit was issued
    assert_eq!(read_corner_texel(&ctx, &fb), [255, 0, 0, 255]);
}

#[test]
fn multisample_resolves_into_sibling() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping multisample resolve test due to missing GPU adapter");
        return;
    };

    let msaa = Framebuffer::new(&ctx, &color_desc(4)).unwrap();
    let resolve = Framebuffer::new(&ctx, &color_desc(0)).unwrap();
    assert_eq!(msaa.samples(), 4);

    // A multisampled color target is never directly bindable
    assert!(msaa.color_texture().is_err());

    clear(
        &ctx,
        &msaa,
        wgpu::Color {
            r: 0.0,
            g: 1.0,
            b: 0.0,
            a: 1.0,
        },
    );
    Framebuffer::resolve(&ctx, &msaa, &resolve).unwrap();

    assert_eq!(read_corner_texel(&ctx, &resolve), [0, 255, 0, 255]);
}

#[test]
fn resolve_dimension_mismatch_is_fatal() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping dimension mismatch test due to missing GPU adapter");
        return;
    };

    let src = Framebuffer::new(&ctx, &color_desc(0)).unwrap();
    let dst = Framebuffer::new(
        &ctx,
        &FramebufferDesc {
            width: 32,
            height: 32,
            samples: 0,
            color_format: Some(PixelFormat::Rgba8Unorm),
            depth_stencil_format: None,
        },
    )
    .unwrap();
    assert!(Framebuffer::resolve(&ctx, &src, &dst).is_err());
}

#[test]
fn destroy_tracks_creation_flavor_and_is_idempotent() {
    let Some(ctx) = try_create_context() else {
        eprintln!("Skipping framebuffer destroy test due to missing GPU adapter");
        return;
    };

    let mut with_depth = Framebuffer::new(
        &ctx,
        &FramebufferDesc {
            width: 64,
            height: 64,
            samples: 4,
            color_format: Some(PixelFormat::Rgba16Float),
            depth_stencil_format: Some(DepthStencilFormat::Depth24PlusStencil8),
        },
    )
    .unwrap();
    assert!(with_depth.has_color());
    assert!(with_depth.has_depth_stencil());

    with_depth.destroy();
    assert!(with_depth.is_destroyed());
    assert!(with_depth.color_view().is_err());

    with_depth.destroy();
    assert!(with_depth.is_destroyed());

    // A destroyed source has no attachments left to resolve
    let dst = Framebuffer::new(&ctx, &color_desc(0)).unwrap();
    assert!(Framebuffer::resolve(&ctx, &with_depth, &dst).is_err());
}
