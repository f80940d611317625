//! GPU resource model and the IBL precompute pipeline.

pub mod buffer;
pub mod framebuffer;
pub mod ibl;
pub mod mipmap;
pub mod texture;

pub use buffer::{MeshBuffer, UniformBuffer};
pub use framebuffer::{DepthStencilFormat, Framebuffer, FramebufferDesc, FramebufferStatus};
pub use ibl::{prefilter_roughness, IblArtifacts, IblConfig, IblPipeline};
pub use mipmap::MipmapGenerator;
pub use texture::{mip_level_count, PixelFormat, Texture, TextureDesc, TextureTarget};
