use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::Result;
use glam::Mat4;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;

use crate::renderer::core::descriptors::DescriptorAllocator;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::shader_data::ObjectTransforms;

/// One scene entity: its transform matrices, the uniform buffer they are
/// mirrored into every frame, and indices into the engine's mesh, texture,
/// and pipeline lists. Objects live for the whole engine lifetime.
pub struct Object {
    pub transforms: ObjectTransforms,

    pub texture_index: usize,
    pub mesh_index: usize,
    pub pipeline_index: usize,

    pub ubo: Buffer,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

impl Object {
    pub fn new(
        transforms: ObjectTransforms,
        texture_index: usize,
        mesh_index: usize,
        pipeline_index: usize,
        descriptors: &DescriptorAllocator,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let mut ubo = Buffer::new(
            std::mem::size_of::<ObjectTransforms>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Object uniform buffer",
            memory_allocator,
            device,
        )?;
        ubo.write(bytemuck::bytes_of(&transforms), 0)?;

        let descriptor_sets = descriptors.allocate_per_frame(descriptors.object_set_layout)?;
        for set in &descriptor_sets {
            descriptors.write_uniform_buffer(*set, 0, &ubo);
        }

        Ok(Self {
            transforms,
            texture_index,
            mesh_index,
            pipeline_index,
            ubo,
            descriptor_sets,
        })
    }

    /// Advance the idle-spin animation: rotate around Y, scaled by the frame
    /// delta so speed is frame-rate independent.
    pub fn animate(&mut self, delta_time: f32) {
        self.transforms.rotation *= Mat4::from_rotation_y(0.1_f32.to_radians() * delta_time);
    }

    /// Mirror the current transforms into the mapped uniform buffer.
    pub fn write_uniform(&mut self) -> Result<()> {
        self.ubo.write(bytemuck::bytes_of(&self.transforms), 0)
    }

    pub fn destroy(&mut self) {
        self.ubo.destroy();
    }
}
