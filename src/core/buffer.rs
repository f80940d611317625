//! GPU buffer resources: immutable mesh storage and updatable uniform regions.

use wgpu::util::DeviceExt;

use crate::error::{RenderError, RenderResult};
use crate::gpu::GpuContext;
use crate::mesh::{Mesh, Vertex};

/// Immutable vertex/index storage for one mesh, sized exactly to its input.
///
/// The handle owns both buffers; [`MeshBuffer::destroy`] releases them and
/// zeroes the handle, and is a no-op on an already-zeroed handle.
pub struct MeshBuffer {
    vertex_buffer: Option<wgpu::Buffer>,
    index_buffer: Option<wgpu::Buffer>,
    index_count: u32,
}

impl MeshBuffer {
    /// Upload a mesh into immutable GPU storage.
    pub fn new(ctx: &GpuContext, mesh: &Mesh) -> RenderResult<Self> {
        if mesh.vertices.is_empty() || mesh.triangles.is_empty() {
            return Err(RenderError::resource(
                "mesh has no vertices or no triangles",
            ));
        }
        mesh.validate()?;

        let vertex_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh.vertices"),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index_buffer = ctx
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("mesh.indices"),
                contents: bytemuck::cast_slice(&mesh.triangles),
                usage: wgpu::BufferUsages::INDEX,
            });

        Ok(Self {
            vertex_buffer: Some(vertex_buffer),
            index_buffer: Some(index_buffer),
            index_count: mesh.index_count(),
        })
    }

    /// The fixed five-attribute vertex layout: position, normal, tangent,
    /// bitangent as vec3, texcoord as vec2.
    pub fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 9]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: std::mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x2,
                },
            ],
        }
    }

    pub fn vertex_buffer(&self) -> RenderResult<&wgpu::Buffer> {
        self.vertex_buffer
            .as_ref()
            .ok_or_else(|| RenderError::precondition("mesh buffer already destroyed"))
    }

    pub fn index_buffer(&self) -> RenderResult<&wgpu::Buffer> {
        self.index_buffer
            .as_ref()
            .ok_or_else(|| RenderError::precondition("mesh buffer already destroyed"))
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Release both buffers and zero the handle. Safe to call twice.
    pub fn destroy(&mut self) {
        if let Some(buffer) = self.vertex_buffer.take() {
            buffer.destroy();
        }
        if let Some(buffer) = self.index_buffer.take() {
            buffer.destroy();
        }
        self.index_count = 0;
    }

    pub fn is_destroyed(&self) -> bool {
        self.vertex_buffer.is_none() && self.index_buffer.is_none()
    }
}

/// A fixed-size, dynamically updatable uniform region.
///
/// Callers rewrite the full or a partial range every frame; the region never
/// grows after creation.
pub struct UniformBuffer {
    buffer: wgpu::Buffer,
    size: u64,
}

impl UniformBuffer {
    /// Allocate the region, optionally pre-populated.
    pub fn new(ctx: &GpuContext, size: u64, initial: Option<&[u8]>) -> RenderResult<Self> {
        if size == 0 {
            return Err(RenderError::resource("uniform region must be nonempty"));
        }
        let buffer = match initial {
            Some(data) => {
                if data.len() as u64 != size {
                    return Err(RenderError::resource(format!(
                        "initial data length {} does not match region size {size}",
                        data.len()
                    )));
                }
                ctx.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("uniform.region"),
                        contents: data,
                        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    })
            }
            None => ctx.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("uniform.region"),
                size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            }),
        };

        Ok(Self { buffer, size })
    }

    /// Update a full or partial range of the region.
    pub fn write(&self, ctx: &GpuContext, offset: u64, data: &[u8]) -> RenderResult<()> {
        if offset + data.len() as u64 > self.size {
            return Err(RenderError::precondition(format!(
                "uniform write of {} bytes at offset {offset} exceeds region size {}",
                data.len(),
                self.size
            )));
        }
        ctx.queue.write_buffer(&self.buffer, offset, data);
        Ok(())
    }

    pub fn raw(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_layout_matches_mesh_vertex() {
        let layout = MeshBuffer::vertex_layout();
        assert_eq!(layout.array_stride, 56);
        assert_eq!(layout.attributes.len(), 5);
        // Last attribute is the two-component texcoord
        let last = layout.attributes.last().unwrap();
        assert_eq!(last.format, wgpu::VertexFormat::Float32x2);
        assert_eq!(last.offset, 48);
        for attr in &layout.attributes[..4] {
            assert_eq!(attr.format, wgpu::VertexFormat::Float32x3);
        }
    }
}
