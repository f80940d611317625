//! Off-screen framebuffer resources with explicit resolve and teardown.
//!
//! A framebuffer with `samples == 0` renders into a bindable color texture
//! and acts as its own resolve target. A multisampled framebuffer renders
//! into a non-bindable attachment (the renderbuffer analog) and must be
//! resolved into a same-sized zero-sample sibling before its contents can be
//! sampled. Which flavor was created is recorded in the attachment itself
//! and drives the teardown path.

use crate::core::texture::PixelFormat;
use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;

/// Depth-stencil formats the renderer allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DepthStencilFormat {
    Depth24PlusStencil8,
}

impl DepthStencilFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::Depth24PlusStencil8 => wgpu::TextureFormat::Depth24PlusStencil8,
        }
    }
}

/// Creation parameters for a framebuffer. `None` formats omit the attachment.
#[derive(Debug, Clone, Copy)]
pub struct FramebufferDesc {
    pub width: u32,
    pub height: u32,
    pub samples: u32,
    pub color_format: Option<PixelFormat>,
    pub depth_stencil_format: Option<DepthStencilFormat>,
}

/// Completeness verdict for a framebuffer description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum FramebufferStatus {
    Complete = 0,
    MissingAttachment = 1,
    ZeroDimension = 2,
    UnsupportedSampleCount = 3,
}

impl FramebufferDesc {
    /// Verify the description is renderable.
    pub fn completeness(&self) -> FramebufferStatus {
        if self.color_format.is_none() && self.depth_stencil_format.is_none() {
            return FramebufferStatus::MissingAttachment;
        }
        if self.width == 0 || self.height == 0 {
            return FramebufferStatus::ZeroDimension;
        }
        match self.samples {
            0 | 2 | 4 | 8 | 16 => FramebufferStatus::Complete,
            _ => FramebufferStatus::UnsupportedSampleCount,
        }
    }
}

/// The color target, remembering which flavor was allocated.
#[derive(Debug)]
enum ColorTarget {
    /// Bindable single-sample texture (`samples == 0`)
    Texture {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
    /// Multisampled render-only attachment (`samples > 0`)
    Renderbuffer {
        texture: wgpu::Texture,
        view: wgpu::TextureView,
    },
}

/// An owned off-screen render target.
#[derive(Debug)]
pub struct Framebuffer {
    width: u32,
    height: u32,
    samples: u32,
    color: Option<ColorTarget>,
    depth_stencil: Option<(wgpu::Texture, wgpu::TextureView)>,
    destroyed: bool,
}

impl Framebuffer {
    /// Allocate the requested attachments and verify completeness.
    ///
    /// An incomplete description is a fatal construction error naming the
    /// numeric status code.
    pub fn new(ctx: &GpuContext, desc: &FramebufferDesc) -> RenderResult<Self> {
        let status = desc.completeness();
        if status != FramebufferStatus::Complete {
            return Err(RenderError::resource(format!(
                "Framebuffer completeness check failed: {} ({status:?})",
                status as u32
            )));
        }

        let extent = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };

        let color = match desc.color_format {
            Some(format) if desc.samples > 0 => {
                let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("framebuffer.color.msaa"),
                    size: extent,
                    mip_level_count: 1,
                    sample_count: desc.samples,
                    dimension: wgpu::TextureDimension::D2,
                    format: format.to_wgpu(),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Some(ColorTarget::Renderbuffer { texture, view })
            }
            Some(format) => {
                let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("framebuffer.color"),
                    size: extent,
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: format.to_wgpu(),
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                        | wgpu::TextureUsages::TEXTURE_BINDING
                        | wgpu::TextureUsages::COPY_SRC
                        | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                });
                let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
                Some(ColorTarget::Texture { texture, view })
            }
            None => None,
        };

        let depth_stencil = desc.depth_stencil_format.map(|format| {
            let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("framebuffer.depth_stencil"),
                size: extent,
                mip_level_count: 1,
                sample_count: desc.samples.max(1),
                dimension: wgpu::TextureDimension::D2,
                format: format.to_wgpu(),
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        Ok(Self {
            width: desc.width,
            height: desc.height,
            samples: desc.samples,
            color,
            depth_stencil,
            destroyed: false,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn samples(&self) -> u32 {
        self.samples
    }

    pub fn has_color(&self) -> bool {
        self.color.is_some()
    }

    pub fn has_depth_stencil(&self) -> bool {
        self.depth_stencil.is_some()
    }

    pub fn color_view(&self) -> RenderResult<&wgpu::TextureView> {
        match &self.color {
            Some(ColorTarget::Texture { view, .. })
            | Some(ColorTarget::Renderbuffer { view, .. }) => Ok(view),
            None => Err(RenderError::precondition(
                "framebuffer has no color attachment",
            )),
        }
    }

    /// The bindable color texture of a zero-sample framebuffer.
    pub fn color_texture(&self) -> RenderResult<&wgpu::Texture> {
        match &self.color {
            Some(ColorTarget::Texture { texture, .. }) => Ok(texture),
            Some(ColorTarget::Renderbuffer { .. }) => Err(RenderError::precondition(
                "multisampled color target is not bindable; resolve it first",
            )),
            None => Err(RenderError::precondition(
                "framebuffer has no color attachment",
            )),
        }
    }

    pub fn depth_stencil_view(&self) -> RenderResult<&wgpu::TextureView> {
        self.depth_stencil
            .as_ref()
            .map(|(_, view)| view)
            .ok_or_else(|| {
                RenderError::precondition("framebuffer has no depth-stencil attachment")
            })
    }

    /// Resolve `src` into `dst`.
    ///
    /// A no-op when both are the same object. A multisampled source resolves
    /// through the hardware resolve attachment and its own contents are
    /// discarded afterward; a single-sample source is copied. Fatal if `src`
    /// has no attachments at all.
    pub fn resolve(ctx: &GpuContext, src: &Framebuffer, dst: &Framebuffer) -> RenderResult<()> {
        if std::ptr::eq(src, dst) {
            return Ok(());
        }
        if src.color.is_none() && src.depth_stencil.is_none() {
            return Err(RenderError::precondition(
                "resolve source has no attachments",
            ));
        }
        if src.width != dst.width || src.height != dst.height {
            return Err(RenderError::precondition(format!(
                "resolve dimensions differ: {}x{} vs {}x{}",
                src.width, src.height, dst.width, dst.height
            )));
        }

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("framebuffer.resolve"),
            });

        match (&src.color, &dst.color) {
            (Some(ColorTarget::Renderbuffer { view, .. }), Some(_)) => {
                // Hardware resolve; Discard hints the driver the multisampled
                // contents are dead after the pass.
                let pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("framebuffer.resolve.pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view,
                        resolve_target: Some(dst.color_view()?),
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Load,
                            store: wgpu::StoreOp::Discard,
                        },
                    })],
                    depth_stencil_attachment: None,
                    timestamp_writes: None,
                    occlusion_query_set: None,
                });
                drop(pass);
            }
            (Some(ColorTarget::Texture { texture, .. }), Some(_)) => {
                encoder.copy_texture_to_texture(
                    wgpu::ImageCopyTexture {
                        texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::ImageCopyTexture {
                        texture: dst.color_texture()?,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: src.width,
                        height: src.height,
                        depth_or_array_layers: 1,
                    },
                );
            }
            (Some(_), None) => {
                return Err(RenderError::precondition(
                    "resolve destination has no color attachment",
                ));
            }
            (None, _) => {
                // Depth-stencil only: nothing to carry over, the blit is
                // color-bit only.
            }
        }

        ctx.queue.submit(Some(encoder.finish()));
        Ok(())
    }

    /// Delete the framebuffer's attachments along the path recorded at
    /// creation time. Safe to call twice.
    pub fn destroy(&mut self) {
        match self.color.take() {
            Some(ColorTarget::Texture { texture, .. }) => texture.destroy(),
            Some(ColorTarget::Renderbuffer { texture, .. }) => texture.destroy(),
            None => {}
        }
        if let Some((texture, _)) = self.depth_stencil.take() {
            texture.destroy();
        }
        self.destroyed = true;
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness_requires_attachment() {
        let desc = FramebufferDesc {
            width: 64,
            height: 64,
            samples: 0,
            color_format: None,
            depth_stencil_format: None,
        };
        assert_eq!(desc.completeness(), FramebufferStatus::MissingAttachment);
        assert_eq!(FramebufferStatus::MissingAttachment as u32, 1);
    }

    #[test]
    fn test_completeness_rejects_zero_dimension() {
        let desc = FramebufferDesc {
            width: 0,
            height: 64,
            samples: 0,
            color_format: Some(PixelFormat::Rgba16Float),
            depth_stencil_format: None,
        };
        assert_eq!(desc.completeness(), FramebufferStatus::ZeroDimension);
    }

    #[test]
    fn test_completeness_rejects_odd_sample_counts() {
        let mut desc = FramebufferDesc {
            width: 64,
            height: 64,
            samples: 3,
            color_format: Some(PixelFormat::Rgba16Float),
            depth_stencil_format: None,
        };
        assert_eq!(
            desc.completeness(),
            FramebufferStatus::UnsupportedSampleCount
        );
        desc.samples = 4;
        assert_eq!(desc.completeness(), FramebufferStatus::Complete);
        desc.samples = 0;
        assert_eq!(desc.completeness(), FramebufferStatus::Complete);
    }
}
