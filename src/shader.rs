//! Shader stage resolution and program linking.
//!
//! Programs are linked from per-stage source files living under a shader
//! root; the stage kind is derived from each file's extension, exactly as
//! the shading pass expects (`vert`, `frag`, `comp`, `tesc`, `tese`). A
//! linked [`Program`] is opaque and stateless: per-dispatch parameters are
//! bound through uniform buffers, never stored on the program.

use std::path::{Path, PathBuf};

use log::info;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;

/// Pipeline stage a shader source file feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
    TessellationControl,
    TessellationEvaluation,
}

impl ShaderStage {
    /// Derive the stage kind from a source file's extension.
    ///
    /// Any unrecognized extension is a fatal configuration error naming the
    /// offending path. This runs before any file I/O or compilation.
    pub fn from_path(path: &Path) -> RenderResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        match ext {
            "vert" => Ok(Self::Vertex),
            "frag" => Ok(Self::Fragment),
            "comp" => Ok(Self::Compute),
            "tesc" => Ok(Self::TessellationControl),
            "tese" => Ok(Self::TessellationEvaluation),
            _ => Err(RenderError::precondition(format!(
                "unsupported shader stage extension '.{ext}' in '{}'",
                path.display()
            ))),
        }
    }
}

/// Resolve the stage of every file before anything is read or compiled.
pub(crate) fn resolve_stages(files: &[&str]) -> RenderResult<Vec<(PathBuf, ShaderStage)>> {
    files
        .iter()
        .map(|file| {
            let path = PathBuf::from(file);
            let stage = ShaderStage::from_path(&path)?;
            Ok((path, stage))
        })
        .collect()
}

/// An executable program: one validated shader module per stage.
///
/// Carries no further state once built; any compile or validation failure
/// during linking reports the toolchain diagnostic and yields no handle.
#[derive(Debug)]
pub struct Program {
    label: String,
    stages: Vec<(ShaderStage, wgpu::ShaderModule)>,
}

impl Program {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Module for the given stage, if the program was linked with one.
    pub fn stage(&self, stage: ShaderStage) -> Option<&wgpu::ShaderModule> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, m)| m)
    }

    /// The sole compute module of a compute program.
    pub fn compute_module(&self) -> RenderResult<&wgpu::ShaderModule> {
        self.stage(ShaderStage::Compute).ok_or_else(|| {
            RenderError::precondition(format!("program '{}' has no compute stage", self.label))
        })
    }
}

/// Links per-stage WGSL source files from a shader root into [`Program`]s.
pub struct ShaderCompiler {
    root: PathBuf,
}

impl ShaderCompiler {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self {
        Self { root: root.into() }
    }

    /// Compiler rooted at the shader sources shipped with this crate.
    pub fn bundled() -> Self {
        Self::new(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/wgsl"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Link the named stage files into one executable program.
    ///
    /// Stage resolution happens up front for every file; compilation failures
    /// surface the validation diagnostic together with the source path.
    pub fn link(&self, ctx: &GpuContext, files: &[&str]) -> RenderResult<Program> {
        let resolved = resolve_stages(files)?;

        let has_compute = resolved
            .iter()
            .any(|(_, stage)| *stage == ShaderStage::Compute);
        if has_compute && resolved.len() > 1 {
            return Err(RenderError::precondition(format!(
                "a compute program must consist of a single stage, got {} files",
                resolved.len()
            )));
        }

        let label = files.join("+");
        let mut stages = Vec::with_capacity(resolved.len());
        for (relative, stage) in resolved {
            let path = self.root.join(&relative);
            let source = std::fs::read_to_string(&path).map_err(|e| {
                RenderError::shader(path.display(), format!("could not read source: {e}"))
            })?;

            info!("Compiling WGSL shader: {}", path.display());

            ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
            let module = ctx
                .device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&format!("shader.{}", relative.display())),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
            if let Some(err) = pollster::block_on(ctx.device.pop_error_scope()) {
                return Err(RenderError::shader(path.display(), err));
            }

            stages.push((stage, module));
        }

        Ok(Program { label, stages })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_from_extension() {
        assert_eq!(
            ShaderStage::from_path(Path::new("tonemap.vert")).unwrap(),
            ShaderStage::Vertex
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("tonemap.frag")).unwrap(),
            ShaderStage::Fragment
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("spmap.comp")).unwrap(),
            ShaderStage::Compute
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("patch.tesc")).unwrap(),
            ShaderStage::TessellationControl
        );
        assert_eq!(
            ShaderStage::from_path(Path::new("patch.tese")).unwrap(),
            ShaderStage::TessellationEvaluation
        );
    }

    #[test]
    fn test_unknown_extension_is_fatal() {
        let err = ShaderStage::from_path(Path::new("oops.xyz")).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains(".xyz"), "message should name the extension: {msg}");
        assert!(msg.contains("oops.xyz"), "message should name the path: {msg}");
    }

    #[test]
    fn test_resolution_precedes_io() {
        // The file does not exist anywhere; resolution must still fail on the
        // extension alone, before any attempt to open it.
        let err = resolve_stages(&["no/such/dir/kernel.xyz"]).unwrap_err();
        assert!(matches!(err, RenderError::Precondition(_)));

        // A fully resolvable list passes without touching the filesystem
        let resolved = resolve_stages(&["tonemap.vert", "tonemap.frag"]).unwrap();
        assert_eq!(resolved[0].1, ShaderStage::Vertex);
        assert_eq!(resolved[1].1, ShaderStage::Fragment);
    }
}
