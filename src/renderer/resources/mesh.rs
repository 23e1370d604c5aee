use std::path::Path;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, Result, WrapErr};
use glam::{Vec2, Vec3};
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;

use crate::renderer::core::upload::UploadContext;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::vertex::Vertex;

/// GPU-resident geometry: a device-local vertex buffer, a device-local
/// 16-bit index buffer, and the index count. Immutable after load; objects
/// reference meshes by index in the engine's mesh list.
pub struct Mesh {
    pub vertex_buffer: Buffer,
    pub index_buffer: Buffer,
    pub index_count: u32,
}

impl Mesh {
    /// Load an OBJ file and upload its geometry.
    pub fn load(
        path: &Path,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        upload: &UploadContext,
    ) -> Result<Self> {
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                single_index: true,
                triangulate: true,
                ..Default::default()
            },
        )
        .wrap_err_with(|| format!("Failed to read mesh file: {:?}", path))?;

        let (vertices, indices) = collect_meshes(&models)?;
        log::debug!(
            "Loaded mesh {:?}: {} vertices, {} indices",
            path,
            vertices.len(),
            indices.len()
        );

        Self::from_data(&vertices, &indices, memory_allocator, device, upload)
    }

    /// Upload in-memory geometry.
    pub fn from_data(
        vertices: &[Vertex],
        indices: &[u16],
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        upload: &UploadContext,
    ) -> Result<Self> {
        let vertex_buffer = Buffer::new_with_data(
            bytemuck::cast_slice(vertices),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            MemoryLocation::GpuOnly,
            "Vertex buffer",
            memory_allocator.clone(),
            device.clone(),
            upload,
        )?;
        let index_buffer = Buffer::new_with_data(
            bytemuck::cast_slice(indices),
            vk::BufferUsageFlags::INDEX_BUFFER,
            MemoryLocation::GpuOnly,
            "Index buffer",
            memory_allocator,
            device,
            upload,
        )?;

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        })
    }

    /// A unit quad in the XY plane, counter-clockwise winding.
    pub fn quad_data() -> (Vec<Vertex>, Vec<u16>) {
        let vertices = vec![
            Vertex { // Top left
                position: Vec3::new(-1.0, 1.0, 0.0),
                color: Vec3::new(1.0, 0.0, 0.0),
                texcoord: Vec2::new(0.0, 0.0),
                normal: Vec3::Z,
            },
            Vertex { // Bottom left
                position: Vec3::new(-1.0, -1.0, 0.0),
                color: Vec3::new(0.0, 1.0, 0.0),
                texcoord: Vec2::new(0.0, 1.0),
                normal: Vec3::Z,
            },
            Vertex { // Top right
                position: Vec3::new(1.0, 1.0, 0.0),
                color: Vec3::new(0.0, 0.0, 1.0),
                texcoord: Vec2::new(1.0, 0.0),
                normal: Vec3::Z,
            },
            Vertex { // Bottom right
                position: Vec3::new(1.0, -1.0, 0.0),
                color: Vec3::new(1.0, 1.0, 0.0),
                texcoord: Vec2::new(1.0, 1.0),
                normal: Vec3::Z,
            },
        ];

        let indices = vec![
            0, 1, 2, // Top left triangle
            2, 1, 3, // Bottom right triangle
        ];

        (vertices, indices)
    }

    pub fn destroy(&mut self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

/// Flatten every model in an OBJ scene into one vertex/index pair.
/// Texture V is flipped into Vulkan's top-left convention; missing vertex
/// colors fall back to a neutral grey; indices must fit in 16 bits.
fn collect_meshes(models: &[tobj::Model]) -> Result<(Vec<Vertex>, Vec<u16>)> {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();

    for model in models {
        let mesh = &model.mesh;
        let base_vertex = vertices.len();
        let vertex_count = mesh.positions.len() / 3;

        for i in 0..vertex_count {
            let position = Vec3::new(
                mesh.positions[3 * i],
                mesh.positions[3 * i + 1],
                mesh.positions[3 * i + 2],
            );
            let color = if mesh.vertex_color.len() >= 3 * (i + 1) {
                Vec3::new(
                    mesh.vertex_color[3 * i],
                    mesh.vertex_color[3 * i + 1],
                    mesh.vertex_color[3 * i + 2],
                )
            } else {
                Vec3::splat(0.4)
            };
            let texcoord = if mesh.texcoords.len() >= 2 * (i + 1) {
                Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
            } else {
                Vec2::ZERO
            };
            let normal = if mesh.normals.len() >= 3 * (i + 1) {
                Vec3::new(
                    mesh.normals[3 * i],
                    mesh.normals[3 * i + 1],
                    mesh.normals[3 * i + 2],
                )
            } else {
                Vec3::ZERO
            };

            vertices.push(Vertex {
                position,
                color,
                texcoord,
                normal,
            });
        }

        for index in &mesh.indices {
            let index = base_vertex + *index as usize;
            if index > u16::MAX as usize {
                return Err(eyre!(
                    "Mesh has too many vertices for 16-bit indices: {}",
                    index + 1
                ));
            }
            indices.push(index as u16);
        }
    }

    Ok((vertices, indices))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_model() -> tobj::Model {
        let mesh = tobj::Mesh {
            positions: vec![
                0.0, 0.0, 0.0, //
                1.0, 0.0, 0.0, //
                0.0, 1.0, 0.0,
            ],
            normals: vec![
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0, //
                0.0, 0.0, 1.0,
            ],
            texcoords: vec![
                0.0, 0.0, //
                1.0, 0.0, //
                0.0, 1.0,
            ],
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        tobj::Model::new(mesh, "triangle".to_string())
    }

    #[test]
    fn collect_meshes_builds_interleaved_vertices() {
        let (vertices, indices) = collect_meshes(&[triangle_model()]).unwrap();

        assert_eq!(vertices.len(), 3);
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(vertices[1].position, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(vertices[0].normal, Vec3::Z);
        // No vertex colors in the file: neutral grey fallback
        assert_eq!(vertices[0].color, Vec3::splat(0.4));
        // Texture V flipped into top-left convention
        assert_eq!(vertices[2].texcoord, Vec2::new(0.0, 0.0));
        assert_eq!(vertices[0].texcoord, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn collect_meshes_offsets_indices_across_models() {
        let (vertices, indices) =
            collect_meshes(&[triangle_model(), triangle_model()]).unwrap();

        assert_eq!(vertices.len(), 6);
        assert_eq!(indices, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn collect_meshes_rejects_indices_beyond_u16() {
        let vertex_count = u16::MAX as usize + 2;
        let mesh = tobj::Mesh {
            positions: vec![0.0; 3 * vertex_count],
            indices: vec![vertex_count as u32 - 1],
            ..Default::default()
        };
        let model = tobj::Model::new(mesh, "huge".to_string());

        assert!(collect_meshes(&[model]).is_err());
    }

    #[test]
    fn quad_is_four_vertices_and_two_triangles() {
        let (vertices, indices) = Mesh::quad_data();
        assert_eq!(vertices.len(), 4);
        assert_eq!(indices.len(), 6);
        assert!(indices.iter().all(|i| (*i as usize) < vertices.len()));
    }
}
