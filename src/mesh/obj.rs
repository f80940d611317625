//! Wavefront OBJ loading with tangent-basis generation.
//!
//! The loader is strict about what the PBR vertex layout needs: a file with
//! no mesh data, without vertex normals, or with any non-triangular face is
//! rejected with a descriptive error. Tangents and bitangents are derived
//! from texture coordinates and accumulated per vertex.

use std::path::Path;

use glam::Vec3;
use log::info;

use super::{Mesh, Triangle, Vertex};
use crate::error::{RenderError, RenderResult};

/// Load the first mesh of an OBJ file into the fixed vertex layout.
pub fn load_mesh<P: AsRef<Path>>(path: P) -> RenderResult<Mesh> {
    let path = path.as_ref();
    info!("Loading mesh: {}", path.display());

    let (models, _materials) = tobj::load_obj(
        path,
        &tobj::LoadOptions {
            single_index: true,
            triangulate: false,
            ignore_points: true,
            ignore_lines: true,
            ..Default::default()
        },
    )
    .map_err(|e| RenderError::decode(format!("failed to load mesh '{}': {e}", path.display())))?;

    let model = models.first().ok_or_else(|| {
        RenderError::resource(format!("mesh file '{}' contains no mesh data", path.display()))
    })?;
    let raw = &model.mesh;

    if raw.positions.is_empty() {
        return Err(RenderError::resource(format!(
            "mesh file '{}' contains no mesh data",
            path.display()
        )));
    }
    if raw.normals.is_empty() {
        return Err(RenderError::resource(format!(
            "mesh '{}' lacks vertex normals",
            path.display()
        )));
    }
    if let Some(&arity) = raw.face_arities.iter().find(|&&a| a != 3) {
        return Err(RenderError::resource(format!(
            "mesh '{}' has a non-triangular face ({arity} vertices)",
            path.display()
        )));
    }

    let vertex_count = raw.positions.len() / 3;
    let has_uvs = !raw.texcoords.is_empty();

    let mut vertices = Vec::with_capacity(vertex_count);
    for i in 0..vertex_count {
        let texcoord = if has_uvs {
            [raw.texcoords[i * 2], raw.texcoords[i * 2 + 1]]
        } else {
            [0.0, 0.0]
        };
        vertices.push(Vertex {
            position: [
                raw.positions[i * 3],
                raw.positions[i * 3 + 1],
                raw.positions[i * 3 + 2],
            ],
            normal: [
                raw.normals[i * 3],
                raw.normals[i * 3 + 1],
                raw.normals[i * 3 + 2],
            ],
            tangent: [0.0; 3],
            bitangent: [0.0; 3],
            texcoord,
        });
    }

    let triangles: Vec<Triangle> = raw
        .indices
        .chunks_exact(3)
        .map(|c| Triangle([c[0], c[1], c[2]]))
        .collect();

    let mut mesh = Mesh {
        vertices,
        triangles,
    };
    mesh.validate()?;
    generate_tangents(&mut mesh);
    Ok(mesh)
}

/// Accumulate per-face tangent frames and orthonormalize them per vertex.
pub fn generate_tangents(mesh: &mut Mesh) {
    let n = mesh.vertices.len();
    let mut tangents = vec![Vec3::ZERO; n];
    let mut bitangents = vec![Vec3::ZERO; n];

    for tri in &mesh.triangles {
        let [i0, i1, i2] = tri.0.map(|i| i as usize);
        let p0 = Vec3::from(mesh.vertices[i0].position);
        let p1 = Vec3::from(mesh.vertices[i1].position);
        let p2 = Vec3::from(mesh.vertices[i2].position);
        let uv0 = mesh.vertices[i0].texcoord;
        let uv1 = mesh.vertices[i1].texcoord;
        let uv2 = mesh.vertices[i2].texcoord;

        let edge1 = p1 - p0;
        let edge2 = p2 - p0;
        let du1 = uv1[0] - uv0[0];
        let dv1 = uv1[1] - uv0[1];
        let du2 = uv2[0] - uv0[0];
        let dv2 = uv2[1] - uv0[1];

        let det = du1 * dv2 - du2 * dv1;
        let (face_t, face_b) = if det.abs() < 1e-8 {
            // Degenerate UVs: fall back to an arbitrary frame on the face
            let face_n = edge1.cross(edge2).normalize_or_zero();
            let t = perpendicular(face_n);
            (t, face_n.cross(t))
        } else {
            let r = 1.0 / det;
            (
                (edge1 * dv2 - edge2 * dv1) * r,
                (edge2 * du1 - edge1 * du2) * r,
            )
        };

        for &i in &[i0, i1, i2] {
            tangents[i] += face_t;
            bitangents[i] += face_b;
        }
    }

    for (i, vertex) in mesh.vertices.iter_mut().enumerate() {
        let normal = Vec3::from(vertex.normal).normalize_or_zero();
        let mut tangent = tangents[i];
        if tangent.length_squared() < 1e-12 {
            tangent = perpendicular(normal);
        }
        // Gram-Schmidt against the normal
        tangent = (tangent - normal * normal.dot(tangent)).normalize_or_zero();
        if tangent.length_squared() < 1e-12 {
            tangent = perpendicular(normal);
        }
        let handedness = if normal.cross(tangent).dot(bitangents[i]) < 0.0 {
            -1.0
        } else {
            1.0
        };
        let bitangent = normal.cross(tangent) * handedness;

        vertex.tangent = tangent.to_array();
        vertex.bitangent = bitangent.to_array();
    }
}

/// Any unit vector perpendicular to `v`.
fn perpendicular(v: Vec3) -> Vec3 {
    let axis = if v.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
    v.cross(axis).normalize_or_zero()
}
