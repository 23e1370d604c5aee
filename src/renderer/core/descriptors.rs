use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, Result};

use crate::renderer::resources::buffer::Buffer;

/// Descriptors each consumer kind may allocate over the engine lifetime.
/// The pool is sized once at startup; exhausting it is a fatal error.
const MAX_BOUND_SETS_PER_FRAME: u32 = 64;

/// Owns the shared descriptor pool and the three set layouts every pipeline
/// in the engine is built against:
///
/// - set 0: texture (combined image sampler, fragment stage)
/// - set 1: scene (projection + light uniform buffers)
/// - set 2: object (model-transform uniform buffer)
pub struct DescriptorAllocator {
    pub pool: vk::DescriptorPool,
    pub texture_set_layout: vk::DescriptorSetLayout,
    pub scene_set_layout: vk::DescriptorSetLayout,
    pub object_set_layout: vk::DescriptorSetLayout,

    frame_count: u32,
    device: Arc<ash::Device>,
}

impl DescriptorAllocator {
    pub fn new(frame_count: u32, device: Arc<ash::Device>) -> Result<Self> {
        let capacity = pool_capacity(frame_count);
        let pool_sizes = [
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .descriptor_count(capacity),
            vk::DescriptorPoolSize::default()
                .ty(vk::DescriptorType::UNIFORM_BUFFER)
                .descriptor_count(capacity),
        ];
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(capacity)
            .pool_sizes(&pool_sizes);
        let pool = unsafe { device.create_descriptor_pool(&pool_info, None)? };

        let texture_set_layout = {
            let bindings = [
                vk::DescriptorSetLayoutBinding::default()
                    .binding(0)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
            ];
            let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            unsafe { device.create_descriptor_set_layout(&info, None)? }
        };

        let scene_set_layout = {
            let bindings = [
                vk::DescriptorSetLayoutBinding::default()
                    .binding(0)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER),
                vk::DescriptorSetLayoutBinding::default()
                    .binding(1)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER),
            ];
            let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            unsafe { device.create_descriptor_set_layout(&info, None)? }
        };

        let object_set_layout = {
            let bindings = [
                vk::DescriptorSetLayoutBinding::default()
                    .binding(0)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER),
            ];
            let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
            unsafe { device.create_descriptor_set_layout(&info, None)? }
        };

        Ok(Self {
            pool,
            texture_set_layout,
            scene_set_layout,
            object_set_layout,
            frame_count,
            device,
        })
    }

    /// Allocate one descriptor set per in-flight frame from the shared pool.
    pub fn allocate_per_frame(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<Vec<vk::DescriptorSet>> {
        let layouts = vec![layout; self.frame_count as usize];
        let info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.device
                .allocate_descriptor_sets(&info)
                .map_err(|e| eyre!("Descriptor pool exhausted or invalid: {e}"))?
        };
        Ok(sets)
    }

    /// Point `binding` of `set` at `buffer`. Overwrites any previous binding.
    pub fn write_uniform_buffer(&self, set: vk::DescriptorSet, binding: u32, buffer: &Buffer) {
        let buffer_info = vk::DescriptorBufferInfo::default()
            .buffer(buffer.buffer)
            .offset(0)
            .range(buffer.size);
        let buffer_infos = [buffer_info];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .buffer_info(&buffer_infos);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    /// Point `binding` of `set` at a sampled image view paired with the
    /// shared sampler. Overwrites any previous binding.
    pub fn write_combined_image_sampler(
        &self,
        set: vk::DescriptorSet,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) {
        let image_info = vk::DescriptorImageInfo::default()
            .sampler(sampler)
            .image_view(view)
            .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        let image_infos = [image_info];
        let write = vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(binding)
            .dst_array_element(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&image_infos);
        unsafe {
            self.device.update_descriptor_sets(&[write], &[]);
        }
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.device
                .destroy_descriptor_set_layout(self.object_set_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.scene_set_layout, None);
            self.device
                .destroy_descriptor_set_layout(self.texture_set_layout, None);
            self.device.destroy_descriptor_pool(self.pool, None);
        }
    }
}

/// Total descriptors (and sets) the pool can hand out per descriptor type.
fn pool_capacity(frame_count: u32) -> u32 {
    frame_count * MAX_BOUND_SETS_PER_FRAME
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_capacity_scales_with_frames_in_flight() {
        assert_eq!(pool_capacity(2), 128);
        assert_eq!(pool_capacity(3), 192);
    }
}
