use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::Result;

/// One-shot command submission for load-time work: staging copies and image
/// layout transitions. Every submit blocks the calling thread until the GPU
/// finishes, so this must never be used from the per-frame path.
pub struct UploadContext {
    upload_fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,

    queue: vk::Queue,
    device: Arc<ash::Device>,
}

impl UploadContext {
    pub fn new(
        queue: vk::Queue,
        queue_family_index: u32,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let upload_fence_info = vk::FenceCreateInfo::default();
        let upload_fence = unsafe { device.create_fence(&upload_fence_info, None)? };

        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            // Allow the pool to reset individual command buffers
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool = unsafe { device.create_command_pool(&command_pool_info, None)? };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = unsafe { device.allocate_command_buffers(&command_buffer_info)?[0] };

        Ok(Self {
            upload_fence,
            command_pool,
            command_buffer,
            queue,
            device,
        })
    }

    /// Record commands through `func`, submit them, and block until the GPU
    /// completes. The command buffer is reset afterwards so the context can
    /// be reused for the next upload.
    pub fn immediate_submit<F>(&self, func: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer, &ash::Device) -> Result<()>,
    {
        let cmd = self.command_buffer;

        // This command buffer will be used exactly once before resetting
        let cmd_begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device.begin_command_buffer(cmd, &cmd_begin_info)?;
        }

        func(cmd, &self.device)?;

        unsafe {
            self.device.end_command_buffer(cmd)?;
        }

        let cmd = [cmd];
        let submit = vk::SubmitInfo::default().command_buffers(&cmd);
        unsafe {
            self.device
                .queue_submit(self.queue, &[submit], self.upload_fence)?;
        }

        unsafe {
            // `upload_fence` blocks until the commands finish execution
            self.device
                .wait_for_fences(&[self.upload_fence], true, u64::MAX)?;
            self.device.reset_fences(&[self.upload_fence])?;
            // Reset command buffers inside the command pool
            self.device
                .reset_command_pool(self.command_pool, vk::CommandPoolResetFlags::empty())?;
        }

        Ok(())
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_fence(self.upload_fence, None);
        }
    }
}
