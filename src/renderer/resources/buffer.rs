use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::Result;
use color_eyre::eyre::eyre;
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};

use crate::renderer::core::upload::UploadContext;

/// One GPU buffer paired with its memory allocation. Size and usage are
/// immutable after creation; the handle is released exactly once through
/// [`Buffer::destroy`].
pub struct Buffer {
    pub buffer: vk::Buffer,
    pub size: u64,
    location: MemoryLocation,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Buffer {
    pub fn new(
        size: u64,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let buffer = {
            let info = vk::BufferCreateInfo::default()
                .size(size)
                .usage(usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);
            unsafe { device.create_buffer(&info, None)? }
        };
        let requirements = unsafe { device.get_buffer_memory_requirements(buffer) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))?
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear: true,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })?;
        unsafe {
            device.bind_buffer_memory(buffer, allocation.memory(), allocation.offset())?;
        }

        Ok(Self {
            buffer,
            size,
            location,
            allocation: Some(allocation),
            memory_allocator,
            device,
        })
    }

    /// Create a buffer and fill it with `data`: a direct mapped write for
    /// host-visible memory, or a staged copy through `upload` for
    /// device-local memory.
    pub fn new_with_data(
        data: &[u8],
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
        name: &str,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
        upload: &UploadContext,
    ) -> Result<Self> {
        let size = data.len() as u64;

        if location != MemoryLocation::GpuOnly {
            let mut buffer = Self::new(
                size,
                usage,
                location,
                name,
                memory_allocator,
                device,
            )?;
            buffer.write(data, 0)?;
            return Ok(buffer);
        }

        let buffer = Self::new(
            size,
            usage | vk::BufferUsageFlags::TRANSFER_DST,
            location,
            name,
            memory_allocator.clone(),
            device.clone(),
        )?;

        let mut staging_buffer = Self::new(
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            MemoryLocation::CpuToGpu,
            "Staging buffer",
            memory_allocator,
            device,
        )?;
        staging_buffer.write(data, 0)?;

        upload.immediate_submit(|cmd, device| {
            let copy_region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(0)
                .size(size);
            unsafe {
                device.cmd_copy_buffer(cmd, staging_buffer.buffer, buffer.buffer, &[copy_region]);
            }
            Ok(())
        })?;
        staging_buffer.destroy();

        Ok(buffer)
    }

    /// Write `data` into the mapped range starting at `offset`. Only valid
    /// for host-visible buffers; device-local data goes through
    /// [`Buffer::new_with_data`].
    pub fn write(&mut self, data: &[u8], offset: usize) -> Result<()> {
        if self.location == MemoryLocation::GpuOnly {
            return Err(eyre!("Cannot write directly to a device-local buffer"));
        }

        let allocation = self
            .allocation
            .as_mut()
            .ok_or_else(|| eyre!("Cannot write to a destroyed buffer"))?;
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or_else(|| eyre!("Buffer memory is not mapped"))?;

        let end = offset
            .checked_add(data.len())
            .ok_or_else(|| eyre!("Buffer write range overflows"))?;
        if end > mapped.len() {
            return Err(eyre!(
                "Data too large to write into buffer: {} > {}",
                end,
                mapped.len()
            ));
        }
        mapped[offset..end].copy_from_slice(data);

        Ok(())
    }

    /// Release the handle and allocation. The first call frees everything;
    /// later calls are no-ops so teardown paths can be defensive.
    pub fn destroy(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            if let Ok(mut allocator) = self.memory_allocator.lock() {
                if let Err(e) = allocator.free(allocation) {
                    log::error!("Failed to free buffer allocation: {e}");
                }
            }
            unsafe {
                self.device.destroy_buffer(self.buffer, None);
            }
        }
    }
}
