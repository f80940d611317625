//! Image-based-lighting precomputation over wgpu compute.
//!
//! One equirectangular HDR photograph goes in; three GPU textures come out:
//! a prefiltered specular cubemap whose mip levels encode roughness, a
//! diffuse irradiance cubemap, and the split-sum BRDF integration table.
//! The precompute runs once at load time on a single queue and is
//! synchronous from the caller's point of view.
//!
//! ```no_run
//! use envprobe::{GpuContext, IblConfig, IblPipeline, ShaderCompiler};
//!
//! # fn main() -> envprobe::RenderResult<()> {
//! let ctx = GpuContext::new()?;
//! let compiler = ShaderCompiler::bundled();
//! let pipeline = IblPipeline::new(&ctx, &compiler, IblConfig::default())?;
//! let environment = envprobe::formats::load_hdr("environment.hdr")?;
//! let mut artifacts = pipeline.run(&ctx, &environment)?;
//! // ... hand artifacts to the frame renderer ...
//! artifacts.destroy();
//! # Ok(())
//! # }
//! ```

pub mod core;
pub mod error;
pub mod formats;
pub mod gpu;
pub mod mesh;
pub mod shader;

pub use crate::core::{
    Framebuffer, FramebufferDesc, FramebufferStatus, IblArtifacts, IblConfig, IblPipeline,
    MeshBuffer, PixelFormat, Texture, TextureDesc, TextureTarget, UniformBuffer,
};
pub use crate::error::{RenderError, RenderResult};
pub use crate::formats::HdrImage;
pub use crate::gpu::{GpuContext, TILE_SIZE};
pub use crate::mesh::{load_mesh, Mesh};
pub use crate::shader::{Program, ShaderCompiler, ShaderStage};
