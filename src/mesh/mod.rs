//! CPU-side mesh data with the fixed PBR vertex layout.

pub mod obj;

use bytemuck::{Pod, Zeroable};

use crate::error::{RenderError, RenderResult};

pub use obj::load_mesh;

/// One vertex of the fixed 14-scalar layout the whole renderer shares.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub tangent: [f32; 3],
    pub bitangent: [f32; 3],
    pub texcoord: [f32; 2],
}

const _: () = assert!(std::mem::size_of::<Vertex>() == 14 * 4);

/// One triangle as three vertex indices.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Triangle(pub [u32; 3]);

const _: () = assert!(std::mem::size_of::<Triangle>() == 3 * 4);

/// An indexed triangle mesh ready for GPU upload.
#[derive(Debug, Clone, Default)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<Triangle>,
}

impl Mesh {
    /// Check the structural invariant: every index addresses a vertex.
    pub fn validate(&self) -> RenderResult<()> {
        let count = self.vertices.len() as u32;
        for (i, tri) in self.triangles.iter().enumerate() {
            if tri.0.iter().any(|&v| v >= count) {
                return Err(RenderError::resource(format!(
                    "triangle {i} references vertex out of range (vertex count {count})"
                )));
            }
        }
        Ok(())
    }

    pub fn index_count(&self) -> u32 {
        self.triangles.len() as u32 * 3
    }
}
