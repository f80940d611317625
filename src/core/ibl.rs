//! Image-based lighting precompute pipeline.
//!
//! Four strictly ordered compute stages turn one equirectangular HDR image
//! into the three textures the shading pass samples: a prefiltered specular
//! cubemap whose mip levels encode increasing roughness, a diffuse
//! irradiance cubemap, and the split-sum BRDF integration table. All work
//! runs on a single queue; the pipeline waits for full completion before
//! returning, so callers may sample the artifacts immediately.

use bytemuck::{Pod, Zeroable};
use log::info;

use crate::core::mipmap::MipmapGenerator;
use crate::core::texture::{pack_rgba16f, PixelFormat, Texture, TextureDesc};
use crate::error::{RenderError, RenderResult};
use crate::formats::HdrImage;
use crate::gpu::{dispatch_groups, GpuContext};
use crate::shader::ShaderCompiler;

/// Sizes of the three derived textures.
///
/// `env_map_size` is the specular cubemap face size N, `irradiance_size` the
/// diffuse cubemap face size M, `brdf_lut_size` the integration table side K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IblConfig {
    pub env_map_size: u32,
    pub irradiance_size: u32,
    pub brdf_lut_size: u32,
}

impl Default for IblConfig {
    fn default() -> Self {
        Self {
            env_map_size: 1024,
            irradiance_size: 32,
            brdf_lut_size: 256,
        }
    }
}

fn is_power_of_two(value: u32) -> bool {
    value != 0 && value & (value - 1) == 0
}

impl IblConfig {
    pub fn validate(&self) -> RenderResult<()> {
        for (name, value) in [
            ("env_map_size", self.env_map_size),
            ("irradiance_size", self.irradiance_size),
            ("brdf_lut_size", self.brdf_lut_size),
        ] {
            if !is_power_of_two(value) {
                return Err(RenderError::precondition(format!(
                    "{name} must be a nonzero power of two, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Description of the specular probe (and its unfiltered intermediate).
    pub fn env_map_desc(&self) -> TextureDesc {
        TextureDesc::new_cube(self.env_map_size, 0, PixelFormat::Rgba16Float)
    }

    pub fn irradiance_desc(&self) -> TextureDesc {
        TextureDesc::new_cube(self.irradiance_size, 1, PixelFormat::Rgba16Float)
    }

    pub fn brdf_lut_desc(&self) -> TextureDesc {
        TextureDesc::new_2d(self.brdf_lut_size, self.brdf_lut_size, 1, PixelFormat::Rg16Float)
    }
}

/// Roughness encoded by prefiltered mip level `level` of a `levels`-deep
/// cubemap. The denominator is floored at 1 so a single-level cubemap (which
/// runs zero prefilter dispatches) cannot divide by zero.
pub fn prefilter_roughness(level: u32, levels: u32) -> f32 {
    level as f32 / levels.saturating_sub(1).max(1) as f32
}

/// The sole per-dispatch parameter of the prefilter kernel.
#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable)]
struct PrefilterParams {
    roughness: f32,
    _pad: [f32; 3],
}

/// The three derived textures plus the samplers the shading pass binds.
///
/// Owned by the caller; [`IblArtifacts::destroy`] releases the textures
/// exactly once and is a no-op on repeat.
pub struct IblArtifacts {
    pub env_filtered: Texture,
    pub irradiance: Texture,
    pub brdf_lut: Texture,
    pub env_sampler: wgpu::Sampler,
    pub brdf_sampler: wgpu::Sampler,
}

impl IblArtifacts {
    pub fn destroy(&mut self) {
        self.env_filtered.destroy();
        self.irradiance.destroy();
        self.brdf_lut.destroy();
    }

    pub fn is_destroyed(&self) -> bool {
        self.env_filtered.is_destroyed()
            && self.irradiance.is_destroyed()
            && self.brdf_lut.is_destroyed()
    }
}

/// The four-stage precompute orchestrator.
///
/// Construction links every stage program and builds its compute pipeline;
/// any compile or validation failure is fatal and yields no pipeline.
pub struct IblPipeline {
    config: IblConfig,

    equirect_layout: wgpu::BindGroupLayout,
    prefilter_layout: wgpu::BindGroupLayout,
    convolve_layout: wgpu::BindGroupLayout,
    brdf_layout: wgpu::BindGroupLayout,

    equirect_pipeline: wgpu::ComputePipeline,
    prefilter_pipeline: wgpu::ComputePipeline,
    irradiance_pipeline: wgpu::ComputePipeline,
    brdf_pipeline: wgpu::ComputePipeline,

    mipmap: MipmapGenerator,

    equirect_sampler: wgpu::Sampler,
    env_sampler: wgpu::Sampler,
}

impl IblPipeline {
    pub fn new(
        ctx: &GpuContext,
        compiler: &ShaderCompiler,
        config: IblConfig,
    ) -> RenderResult<Self> {
        config.validate()?;

        let equirect_program = compiler.link(ctx, &["equirect2cube.comp"])?;
        let downsample_program = compiler.link(ctx, &["downsample.comp"])?;
        let prefilter_program = compiler.link(ctx, &["spmap.comp"])?;
        let irradiance_program = compiler.link(ctx, &["irmap.comp"])?;
        let brdf_program = compiler.link(ctx, &["spbrdf.comp"])?;

        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let sampled_entry = |binding, dimension| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: dimension,
                multisampled: false,
            },
            count: None,
        };
        let sampler_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        };
        let storage_entry = |binding, format, dimension| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format,
                view_dimension: dimension,
            },
            count: None,
        };

        let equirect_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ibl.equirect.layout"),
                    entries: &[
                        sampled_entry(0, wgpu::TextureViewDimension::D2),
                        sampler_entry(1),
                        storage_entry(
                            2,
                            wgpu::TextureFormat::Rgba16Float,
                            wgpu::TextureViewDimension::D2Array,
                        ),
                    ],
                });

        let prefilter_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ibl.prefilter.layout"),
                    entries: &[
                        uniform_entry(0),
                        sampled_entry(1, wgpu::TextureViewDimension::Cube),
                        sampler_entry(2),
                        storage_entry(
                            3,
                            wgpu::TextureFormat::Rgba16Float,
                            wgpu::TextureViewDimension::D2Array,
                        ),
                    ],
                });

        let convolve_layout =
            ctx.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some("ibl.convolve.layout"),
                    entries: &[
                        sampled_entry(0, wgpu::TextureViewDimension::Cube),
                        sampler_entry(1),
                        storage_entry(
                            2,
                            wgpu::TextureFormat::Rgba16Float,
                            wgpu::TextureViewDimension::D2Array,
                        ),
                    ],
                });

        let brdf_layout = ctx
            .device
            .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("ibl.brdf.layout"),
                entries: &[storage_entry(
                    0,
                    wgpu::TextureFormat::Rg16Float,
                    wgpu::TextureViewDimension::D2,
                )],
            });

        let compute_pipeline = |label: &str,
                                layout: &wgpu::BindGroupLayout,
                                program: &crate::shader::Program|
         -> RenderResult<wgpu::ComputePipeline> {
            Ok(ctx
                .device
                .create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                    label: Some(label),
                    layout: Some(&ctx.device.create_pipeline_layout(
                        &wgpu::PipelineLayoutDescriptor {
                            label: Some(label),
                            bind_group_layouts: &[layout],
                            push_constant_ranges: &[],
                        },
                    )),
                    module: program.compute_module()?,
                    entry_point: "main",
                }))
        };

        let equirect_pipeline =
            compute_pipeline("ibl.equirect.pipeline", &equirect_layout, &equirect_program)?;
        let prefilter_pipeline = compute_pipeline(
            "ibl.prefilter.pipeline",
            &prefilter_layout,
            &prefilter_program,
        )?;
        let irradiance_pipeline = compute_pipeline(
            "ibl.irradiance.pipeline",
            &convolve_layout,
            &irradiance_program,
        )?;
        let brdf_pipeline = compute_pipeline("ibl.brdf.pipeline", &brdf_layout, &brdf_program)?;

        let mipmap = MipmapGenerator::new(ctx, &downsample_program)?;

        // Longitude wraps, latitude clamps
        let equirect_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibl.equirect.sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let env_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibl.env.sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 16.0,
            ..Default::default()
        });

        Ok(Self {
            config,
            equirect_layout,
            prefilter_layout,
            convolve_layout,
            brdf_layout,
            equirect_pipeline,
            prefilter_pipeline,
            irradiance_pipeline,
            brdf_pipeline,
            mipmap,
            equirect_sampler,
            env_sampler,
        })
    }

    pub fn config(&self) -> &IblConfig {
        &self.config
    }

    /// Run all four stages and return the derived textures.
    ///
    /// The equirectangular input and the unfiltered cubemap intermediate are
    /// destroyed as soon as the stages consuming them have been submitted.
    pub fn run(&self, ctx: &GpuContext, environment: &HdrImage) -> RenderResult<IblArtifacts> {
        let mut env_unfiltered = self.convert_equirect_to_cube(ctx, environment)?;
        let env_filtered = self.prefilter_specular(ctx, &mut env_unfiltered)?;
        let irradiance = self.convolve_irradiance(ctx, &env_filtered)?;
        let brdf_lut = self.integrate_brdf(ctx)?;

        // Derived textures must not be sampled before every stage's writes
        // are visible; the compute-to-sampling hazard is not otherwise
        // ordered for the caller.
        ctx.wait_idle();

        let env_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibl.artifacts.env_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            lod_min_clamp: 0.0,
            lod_max_clamp: 16.0,
            ..Default::default()
        });
        let brdf_sampler = ctx.device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("ibl.artifacts.brdf_sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        info!(
            "IBL precompute complete: {}x{} specular ({} levels), {}x{} irradiance, {}x{} BRDF LUT",
            env_filtered.width(),
            env_filtered.height(),
            env_filtered.levels(),
            irradiance.width(),
            irradiance.height(),
            brdf_lut.width(),
            brdf_lut.height(),
        );

        Ok(IblArtifacts {
            env_filtered,
            irradiance,
            brdf_lut,
            env_sampler,
            brdf_sampler,
        })
    }

    /// Stage 1: project the equirectangular image onto six cube faces and
    /// build the unfiltered environment's mip chain.
    fn convert_equirect_to_cube(
        &self,
        ctx: &GpuContext,
        environment: &HdrImage,
    ) -> RenderResult<Texture> {
        let size = self.config.env_map_size;
        info!(
            "IBL stage 1: converting {}x{} equirectangular environment to {size}x{size} cubemap",
            environment.width, environment.height
        );

        let mut equirect = Texture::new(
            ctx,
            &TextureDesc::new_2d(
                environment.width,
                environment.height,
                1,
                PixelFormat::Rgba16Float,
            ),
        )?;
        equirect.upload_2d(ctx, &pack_rgba16f(&environment.to_rgba()))?;

        let env_unfiltered = Texture::new(ctx, &self.config.env_map_desc())?;

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ibl.equirect.bind_group"),
            layout: &self.equirect_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&equirect.view()?),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.equirect_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&env_unfiltered.storage_view(0)?),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ibl.equirect.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ibl.equirect.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.equirect_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = dispatch_groups(size);
            pass.dispatch_workgroups(groups, groups, 6);
        }
        ctx.queue.submit(Some(encoder.finish()));

        // The blurred tail of this chain feeds the high-roughness prefilter
        self.mipmap.generate(ctx, &env_unfiltered)?;

        // The equirectangular source is dead once the conversion is queued
        equirect.destroy();

        Ok(env_unfiltered)
    }

    /// Stage 2: prefilter the specular probe, one GGX convolution per mip
    /// level, consuming the unfiltered intermediate.
    fn prefilter_specular(
        &self,
        ctx: &GpuContext,
        env_unfiltered: &mut Texture,
    ) -> RenderResult<Texture> {
        let env_filtered = Texture::new(ctx, &self.config.env_map_desc())?;
        let levels = env_filtered.levels();
        let size = self.config.env_map_size;
        info!("IBL stage 2: prefiltering specular probe across {levels} mip levels");

        let env_view = env_unfiltered.view()?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ibl.prefilter.encoder"),
            });

        // Level 0 is a mirror reflection: copied verbatim, never filtered
        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: env_unfiltered.raw()?,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: env_filtered.raw()?,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 6,
            },
        );

        for level in 1..levels {
            let roughness = prefilter_roughness(level, levels);
            let params = PrefilterParams {
                roughness,
                _pad: [0.0; 3],
            };
            // One init-at-creation buffer per level: every dispatch in this
            // encoder must see its own roughness, not the last one written.
            let params_buffer = {
                use wgpu::util::DeviceExt;
                ctx.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("ibl.prefilter.params"),
                        contents: bytemuck::bytes_of(&params),
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
            };

            let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("ibl.prefilter.bind_group"),
                layout: &self.prefilter_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(&env_view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&self.env_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(
                            &env_filtered.storage_view(level)?,
                        ),
                    },
                ],
            });

            let mip_size = (size >> level).max(1);
            {
                let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                    label: Some("ibl.prefilter.pass"),
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.prefilter_pipeline);
                pass.set_bind_group(0, &bind_group, &[]);
                let groups = dispatch_groups(mip_size);
                pass.dispatch_workgroups(groups, groups, 6);
            }
        }

        ctx.queue.submit(Some(encoder.finish()));

        // The pipeline exclusively owns the intermediate; stage 2 was its
        // last consumer
        env_unfiltered.destroy();

        Ok(env_filtered)
    }

    /// Stage 3: integrate cosine-weighted incoming radiance per direction.
    fn convolve_irradiance(&self, ctx: &GpuContext, env: &Texture) -> RenderResult<Texture> {
        let size = self.config.irradiance_size;
        info!("IBL stage 3: convolving {size}x{size} diffuse irradiance cubemap");

        let irradiance = Texture::new(ctx, &self.config.irradiance_desc())?;

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ibl.irradiance.bind_group"),
            layout: &self.convolve_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&env.view()?),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.env_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&irradiance.storage_view(0)?),
                },
            ],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ibl.irradiance.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ibl.irradiance.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.irradiance_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = dispatch_groups(size);
            pass.dispatch_workgroups(groups, groups, 6);
        }
        ctx.queue.submit(Some(encoder.finish()));

        Ok(irradiance)
    }

    /// Stage 4: tabulate the split-sum BRDF scale/bias terms. Environment
    /// independent; reusable across scenes.
    fn integrate_brdf(&self, ctx: &GpuContext) -> RenderResult<Texture> {
        let size = self.config.brdf_lut_size;
        info!("IBL stage 4: integrating {size}x{size} BRDF lookup table");

        let brdf_lut = Texture::new(ctx, &self.config.brdf_lut_desc())?;

        let bind_group = ctx.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("ibl.brdf.bind_group"),
            layout: &self.brdf_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&brdf_lut.view()?),
            }],
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("ibl.brdf.encoder"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("ibl.brdf.pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.brdf_pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            let groups = dispatch_groups(size);
            pass.dispatch_workgroups(groups, groups, 1);
        }
        ctx.queue.submit(Some(encoder.finish()));

        Ok(brdf_lut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roughness_schedule() {
        // An 11-level chain spans roughness 0.1 .. 1.0 over levels 1..=10
        assert!((prefilter_roughness(1, 11) - 0.1).abs() < 1e-6);
        assert!((prefilter_roughness(10, 11) - 1.0).abs() < 1e-6);
        for level in 1..10 {
            assert!(prefilter_roughness(level, 11) < prefilter_roughness(level + 1, 11));
        }
    }

    #[test]
    fn test_roughness_two_level_chain() {
        // With two levels the single filtered level is fully rough
        assert_eq!(prefilter_roughness(1, 2), 1.0);
    }

    #[test]
    fn test_roughness_single_level_does_not_divide_by_zero() {
        // A single-level cubemap runs no prefilter dispatches; the schedule
        // itself must still be well defined
        let r = prefilter_roughness(0, 1);
        assert!(r.is_finite());
        assert_eq!(r, 0.0);
        assert!(prefilter_roughness(1, 1).is_finite());
    }

    #[test]
    fn test_config_validation() {
        assert!(IblConfig::default().validate().is_ok());
        let bad = IblConfig {
            env_map_size: 1000,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
        let zero = IblConfig {
            irradiance_size: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_artifact_descriptions() {
        let config = IblConfig::default();
        assert_eq!(config.env_map_desc().resolved_levels(), 11);
        assert_eq!(config.irradiance_desc().resolved_levels(), 1);
        assert_eq!(config.brdf_lut_desc().resolved_levels(), 1);
        assert_eq!(
            config.brdf_lut_desc().format.bytes_per_texel(),
            4 // two 16-bit channels
        );
    }
}
