use std::path::Path;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{Result, WrapErr};
use gpu_allocator::vulkan::Allocator;

use crate::renderer::core::descriptors::DescriptorAllocator;
use crate::renderer::core::upload::UploadContext;
use crate::renderer::resources::image::Image;

/// A sampled color texture plus one descriptor set per in-flight frame
/// binding it with the engine's shared sampler.
pub struct Texture {
    pub image: Image,
    pub descriptor_sets: Vec<vk::DescriptorSet>,
}

impl Texture {
    /// Decode an image file to RGBA8 and upload it.
    pub fn load(
        path: &Path,
        sampler: vk::Sampler,
        descriptors: &DescriptorAllocator,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        upload: &UploadContext,
    ) -> Result<Self> {
        let decoded = image::open(path)
            .wrap_err_with(|| format!("Failed to read texture file: {:?}", path))?;
        let width = decoded.width();
        let height = decoded.height();
        let data = decoded.to_rgba8().into_raw();
        log::debug!("Loaded texture {:?}: {}x{}", path, width, height);

        Self::from_rgba8(
            &data,
            width,
            height,
            sampler,
            descriptors,
            memory_allocator,
            device,
            upload,
        )
    }

    pub fn from_rgba8(
        data: &[u8],
        width: u32,
        height: u32,
        sampler: vk::Sampler,
        descriptors: &DescriptorAllocator,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        upload: &UploadContext,
    ) -> Result<Self> {
        let image = Image::new_color(data, width, height, memory_allocator, device, upload)?;

        let descriptor_sets = descriptors.allocate_per_frame(descriptors.texture_set_layout)?;
        for set in &descriptor_sets {
            descriptors.write_combined_image_sampler(*set, 0, image.view, sampler);
        }

        Ok(Self {
            image,
            descriptor_sets,
        })
    }

    /// The descriptor sets are returned to the pool when it is destroyed;
    /// only the image owns GPU memory.
    pub fn destroy(&mut self) {
        self.image.destroy();
    }
}
