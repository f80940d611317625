//! Owning texture handles for 2D and cubemap GPU storage.
//!
//! A [`Texture`] is created once, optionally uploaded and mip-generated, and
//! destroyed exactly once; destroying an already-destroyed handle is a no-op.
//! Cube targets implicitly allocate their six array layers.

use half::f16;

use crate::error::{RenderError, RenderResult};
use crate::gpu::{align_copy_bpr, GpuContext};

pub const CUBE_FACE_COUNT: u32 = 6;

/// Target kind of a texture allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureTarget {
    D2,
    Cube,
}

/// The small set of internal pixel formats the renderer allocates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    R8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Rgba16Float,
    Rg16Float,
}

impl PixelFormat {
    pub fn to_wgpu(self) -> wgpu::TextureFormat {
        match self {
            Self::R8Unorm => wgpu::TextureFormat::R8Unorm,
            Self::Rgba8Unorm => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba8UnormSrgb => wgpu::TextureFormat::Rgba8UnormSrgb,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
            Self::Rg16Float => wgpu::TextureFormat::Rg16Float,
        }
    }

    pub fn bytes_per_texel(self) -> u32 {
        match self {
            Self::R8Unorm => 1,
            Self::Rgba8Unorm | Self::Rgba8UnormSrgb | Self::Rg16Float => 4,
            Self::Rgba16Float => 8,
        }
    }

    /// Whether compute kernels may write this format as a storage texture.
    pub fn supports_storage(self) -> bool {
        matches!(self, Self::Rgba8Unorm | Self::Rgba16Float | Self::Rg16Float)
    }
}

/// Full mip pyramid depth for the given base dimensions.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let max_dim = width.max(height).max(1);
    u32::BITS - max_dim.leading_zeros()
}

/// Creation parameters for a texture allocation.
///
/// A `levels` of 0 requests the full mip pyramid.
#[derive(Debug, Clone, Copy)]
pub struct TextureDesc {
    pub target: TextureTarget,
    pub width: u32,
    pub height: u32,
    pub levels: u32,
    pub format: PixelFormat,
}

impl TextureDesc {
    pub fn new_2d(width: u32, height: u32, levels: u32, format: PixelFormat) -> Self {
        Self {
            target: TextureTarget::D2,
            width,
            height,
            levels,
            format,
        }
    }

    pub fn new_cube(size: u32, levels: u32, format: PixelFormat) -> Self {
        Self {
            target: TextureTarget::Cube,
            width: size,
            height: size,
            levels,
            format,
        }
    }

    /// The level count this description allocates (auto levels resolved).
    pub fn resolved_levels(&self) -> u32 {
        if self.levels == 0 {
            mip_level_count(self.width, self.height)
        } else {
            self.levels
        }
    }

    pub fn layer_count(&self) -> u32 {
        match self.target {
            TextureTarget::D2 => 1,
            TextureTarget::Cube => CUBE_FACE_COUNT,
        }
    }

    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RenderError::resource(format!(
                "texture dimensions must be nonzero, got {}x{}",
                self.width, self.height
            )));
        }
        if self.target == TextureTarget::Cube && self.width != self.height {
            return Err(RenderError::resource(format!(
                "cube faces must be square, got {}x{}",
                self.width, self.height
            )));
        }
        Ok(())
    }

    /// Total GPU memory this allocation occupies across all levels and layers.
    pub fn size_bytes(&self) -> u64 {
        let bpt = self.format.bytes_per_texel() as u64;
        let layers = self.layer_count() as u64;
        (0..self.resolved_levels())
            .map(|l| {
                let w = (self.width >> l).max(1) as u64;
                let h = (self.height >> l).max(1) as u64;
                w * h * bpt * layers
            })
            .sum()
    }
}

/// An owned GPU texture. The handle reads as destroyed once [`Texture::destroy`]
/// has run; all other accessors then fail with a precondition error.
pub struct Texture {
    inner: Option<wgpu::Texture>,
    target: TextureTarget,
    width: u32,
    height: u32,
    levels: u32,
    format: PixelFormat,
}

impl Texture {
    /// Allocate GPU storage for the given description.
    pub fn new(ctx: &GpuContext, desc: &TextureDesc) -> RenderResult<Self> {
        desc.validate()?;
        let levels = desc.resolved_levels();

        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST;
        if desc.format.supports_storage() {
            usage |= wgpu::TextureUsages::STORAGE_BINDING;
        }

        let texture = ctx.device.create_texture(&wgpu::TextureDescriptor {
            label: None,
            size: wgpu::Extent3d {
                width: desc.width,
                height: desc.height,
                depth_or_array_layers: desc.layer_count(),
            },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: desc.format.to_wgpu(),
            usage,
            view_formats: &[],
        });

        Ok(Self {
            inner: Some(texture),
            target: desc.target,
            width: desc.width,
            height: desc.height,
            levels,
            format: desc.format,
        })
    }

    pub fn target(&self) -> TextureTarget {
        self.target
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn levels(&self) -> u32 {
        self.levels
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn raw(&self) -> RenderResult<&wgpu::Texture> {
        self.inner
            .as_ref()
            .ok_or_else(|| RenderError::precondition("texture handle already destroyed"))
    }

    /// Upload tightly packed level-0 texels of the texture's own format.
    ///
    /// Rows are padded to the copy alignment on the way in.
    pub fn upload_2d(&self, ctx: &GpuContext, texels: &[u8]) -> RenderResult<()> {
        if self.target != TextureTarget::D2 {
            return Err(RenderError::precondition(
                "upload_2d only writes 2D targets",
            ));
        }
        let bpt = self.format.bytes_per_texel() as usize;
        let expected = bpt * (self.width as usize) * (self.height as usize);
        if texels.len() != expected {
            return Err(RenderError::resource(format!(
                "texel data length {} does not match {}x{} ({expected} bytes)",
                texels.len(),
                self.width,
                self.height
            )));
        }

        let (padded, bytes_per_row) = pad_rows(texels, self.width, self.height, bpt);
        ctx.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: self.raw()?,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &padded,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    /// Default sampled view over every level and layer (cube targets get a
    /// cube view).
    pub fn view(&self) -> RenderResult<wgpu::TextureView> {
        let dimension = match self.target {
            TextureTarget::D2 => wgpu::TextureViewDimension::D2,
            TextureTarget::Cube => wgpu::TextureViewDimension::Cube,
        };
        Ok(self.raw()?.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            format: Some(self.format.to_wgpu()),
            dimension: Some(dimension),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: Some(self.levels),
            base_array_layer: 0,
            array_layer_count: Some(self.layer_count()),
        }))
    }

    /// Layered view of a single level for storage writes from compute.
    pub fn storage_view(&self, level: u32) -> RenderResult<wgpu::TextureView> {
        self.level_view(level, "storage")
    }

    /// Layered view of a single level for sampled reads (mip generation).
    pub fn sampled_level_view(&self, level: u32) -> RenderResult<wgpu::TextureView> {
        self.level_view(level, "sampled")
    }

    fn level_view(&self, level: u32, what: &str) -> RenderResult<wgpu::TextureView> {
        if level >= self.levels {
            return Err(RenderError::precondition(format!(
                "{what} view requests level {level} of a {}-level texture",
                self.levels
            )));
        }
        Ok(self.raw()?.create_view(&wgpu::TextureViewDescriptor {
            label: None,
            format: Some(self.format.to_wgpu()),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(self.layer_count()),
        }))
    }

    fn layer_count(&self) -> u32 {
        match self.target {
            TextureTarget::D2 => 1,
            TextureTarget::Cube => CUBE_FACE_COUNT,
        }
    }

    /// Release the GPU allocation and zero the handle. Safe to call twice.
    pub fn destroy(&mut self) {
        if let Some(texture) = self.inner.take() {
            texture.destroy();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.is_none()
    }
}

/// Pack linear RGBA f32 texels into Rgba16Float bytes.
pub fn pack_rgba16f(rgba: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgba.len() * 2);
    for &value in rgba {
        out.extend_from_slice(&f16::from_f32(value).to_le_bytes());
    }
    out
}

/// Pad tightly packed rows out to the required copy alignment.
pub(crate) fn pad_rows(data: &[u8], width: u32, height: u32, bpt: usize) -> (Vec<u8>, u32) {
    let tight = bpt * width as usize;
    let padded_bpr = align_copy_bpr(tight as u32) as usize;
    if padded_bpr == tight {
        return (data.to_vec(), tight as u32);
    }

    let mut padded = vec![0u8; padded_bpr * height as usize];
    for row in 0..height as usize {
        let src = row * tight;
        let dst = row * padded_bpr;
        padded[dst..dst + tight].copy_from_slice(&data[src..src + tight]);
    }
    (padded, padded_bpr as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 2), 2);
        assert_eq!(mip_level_count(32, 32), 6);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(2048, 1024), 12);
        assert_eq!(mip_level_count(1024, 2048), 12);
    }

    #[test]
    fn test_auto_levels_resolution() {
        let desc = TextureDesc::new_cube(1024, 0, PixelFormat::Rgba16Float);
        assert_eq!(desc.resolved_levels(), 11);
        let single = TextureDesc::new_cube(32, 1, PixelFormat::Rgba16Float);
        assert_eq!(single.resolved_levels(), 1);
    }

    #[test]
    fn test_cube_must_be_square() {
        let desc = TextureDesc {
            target: TextureTarget::Cube,
            width: 64,
            height: 32,
            levels: 1,
            format: PixelFormat::Rgba16Float,
        };
        assert!(desc.validate().is_err());
        assert!(TextureDesc::new_2d(64, 32, 1, PixelFormat::Rg16Float)
            .validate()
            .is_ok());
        assert!(TextureDesc::new_2d(0, 32, 1, PixelFormat::Rg16Float)
            .validate()
            .is_err());
    }

    #[test]
    fn test_artifact_memory_footprint() {
        // The three derived outputs of a 1024/32/256 precompute run
        let filtered = TextureDesc::new_cube(1024, 0, PixelFormat::Rgba16Float);
        let irradiance = TextureDesc::new_cube(32, 1, PixelFormat::Rgba16Float);
        let lut = TextureDesc::new_2d(256, 256, 1, PixelFormat::Rg16Float);

        let base = 1024u64 * 1024 * 6 * 4 * 2;
        let filtered_bytes = filtered.size_bytes();
        assert!(filtered_bytes > base);
        // Mip chain adds at most a third on top of the base level
        assert!(filtered_bytes <= base * 4 / 3 + 1024);

        assert_eq!(irradiance.size_bytes(), 32 * 32 * 6 * 4 * 2);
        assert_eq!(lut.size_bytes(), 256 * 256 * 2 * 2);
    }

    #[test]
    fn test_pack_rgba16f() {
        let packed = pack_rgba16f(&[1.0, 0.5, 0.0, 1.0]);
        assert_eq!(packed.len(), 8);
        let one = f16::from_le_bytes([packed[0], packed[1]]);
        assert_eq!(one.to_f32(), 1.0);
    }

    #[test]
    fn test_pad_rows() {
        // 3 texels of 4 bytes: 12-byte rows padded to 256
        let data = vec![0xAB; 12 * 2];
        let (padded, bpr) = pad_rows(&data, 3, 2, 4);
        assert_eq!(bpr, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        assert_eq!(padded.len(), bpr as usize * 2);
        assert_eq!(&padded[0..12], &data[0..12]);
        assert_eq!(padded[12], 0);
    }
}
