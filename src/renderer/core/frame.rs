use std::sync::Arc;
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::{eyre, Result};

use crate::renderer::core::context::RenderContext;

/// Synchronization primitives and the command buffer for one in-flight
/// frame. The fence gates CPU reuse of everything in the slot: it must be
/// signaled before the command buffer is reset or any resource the slot's
/// last submit referenced is touched.
pub struct FrameSlot {
    // Signals on the CPU when this slot's submitted work has finished.
    pub render_fence: vk::Fence,

    // Signaled by the swapchain when the acquired image is ready;
    // waited on by the submit at the color-attachment-output stage.
    pub acquire_semaphore: vk::Semaphore,

    // Signaled when rendering commands complete; waited on by present.
    pub render_semaphore: vk::Semaphore,

    pub command_buffer: vk::CommandBuffer,
}

/// Owns the per-frame slots and the pacing state. Bounds GPU work in flight
/// to the slot count, letting the CPU prepare frame `k+1` while the GPU
/// renders frame `k`.
pub struct FrameScheduler {
    pub slots: Vec<FrameSlot>,
    pub pacer: FramePacer,

    device: Arc<ash::Device>,
}

impl FrameScheduler {
    pub fn new(ctx: &RenderContext, frame_count: u32) -> Result<Self> {
        let command_buffers = {
            let info = vk::CommandBufferAllocateInfo::default()
                .command_pool(ctx.command_pool)
                .command_buffer_count(frame_count)
                .level(vk::CommandBufferLevel::PRIMARY);
            unsafe { ctx.device.allocate_command_buffers(&info)? }
        };

        let mut slots = Vec::with_capacity(frame_count as usize);
        for command_buffer in command_buffers {
            // Created signaled so the very first wait passes immediately
            let render_fence = unsafe {
                ctx.device.create_fence(
                    &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                    None,
                )?
            };
            let acquire_semaphore = unsafe {
                ctx.device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            };
            let render_semaphore = unsafe {
                ctx.device
                    .create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            };
            slots.push(FrameSlot {
                render_fence,
                acquire_semaphore,
                render_semaphore,
                command_buffer,
            });
        }

        Ok(Self {
            slots,
            pacer: FramePacer::new(frame_count as usize),
            device: ctx.device.clone(),
        })
    }

    pub fn current(&self) -> &FrameSlot {
        &self.slots[self.pacer.frame_index()]
    }

    /// Block until the current slot's previous submit has completed.
    pub fn wait_current_fence(&self) -> Result<()> {
        let fence = self.current().render_fence;
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| eyre!("Failed to wait for frame fence: {e}"))?;
        }
        Ok(())
    }

    /// Un-signal the current slot's fence so the upcoming submit can signal
    /// it again. Only called once this frame is certain to submit.
    pub fn reset_current_fence(&self) -> Result<()> {
        let fence = self.current().render_fence;
        unsafe {
            self.device
                .reset_fences(&[fence])
                .map_err(|e| eyre!("Failed to reset frame fence: {e}"))?;
        }
        Ok(())
    }

}

/// Outcome of a swapchain acquire, folded down from the raw Vulkan result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl AcquireStatus {
    /// Classify an `acquire_next_image` result. Out-of-date comes back as a
    /// status with no image index; anything else unexpected is fatal.
    pub fn classify(result: VkResult<(u32, bool)>) -> Result<(Option<u32>, AcquireStatus)> {
        match result {
            Ok((index, false)) => Ok((Some(index), AcquireStatus::Success)),
            Ok((index, true)) => Ok((Some(index), AcquireStatus::Suboptimal)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok((None, AcquireStatus::OutOfDate)),
            Err(e) => Err(eyre!("Failed to acquire next swapchain image: {e}")),
        }
    }
}

/// Outcome of a present, folded down from the raw Vulkan result.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentStatus {
    Success,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    pub fn classify(result: VkResult<bool>) -> Result<PresentStatus> {
        match result {
            Ok(false) => Ok(PresentStatus::Success),
            Ok(true) => Ok(PresentStatus::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentStatus::OutOfDate),
            Err(e) => Err(eyre!("Failed to present swapchain image: {e}")),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquireAction {
    Render,
    SkipAndRebuild,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentAction {
    Continue,
    Rebuild,
}

/// The frame-loop policy, free of any Vulkan handles so the sequencing is
/// testable on its own: frame-index advance, resize coalescing, and the
/// acquire/present recovery rules.
///
/// Policy: a suboptimal acquire still renders this frame (acceptable
/// staleness); a suboptimal or out-of-date present rebuilds so the next
/// frame acquires against a fresh swapchain.
pub struct FramePacer {
    frame_count: usize,
    frame_index: usize,
    resize_requested: bool,
}

impl FramePacer {
    pub fn new(frame_count: usize) -> Self {
        Self {
            frame_count,
            frame_index: 0,
            resize_requested: false,
        }
    }

    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    /// Flag a resize. Any number of resize events before the next frame
    /// collapse into a single pending rebuild.
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// Claim the pending resize, clearing it. The caller rebuilds exactly
    /// once per claim.
    pub fn take_resize_request(&mut self) -> bool {
        std::mem::take(&mut self.resize_requested)
    }

    pub fn on_acquire(&self, status: AcquireStatus) -> AcquireAction {
        match status {
            AcquireStatus::Success => AcquireAction::Render,
            // The image is still presentable; render and let the present
            // result decide whether to rebuild
            AcquireStatus::Suboptimal => AcquireAction::Render,
            AcquireStatus::OutOfDate => AcquireAction::SkipAndRebuild,
        }
    }

    pub fn on_present(&self, status: PresentStatus) -> PresentAction {
        match status {
            PresentStatus::Success => PresentAction::Continue,
            PresentStatus::Suboptimal => PresentAction::Rebuild,
            PresentStatus::OutOfDate => PresentAction::Rebuild,
        }
    }

    /// Step to the next frame slot after a successful present.
    pub fn advance(&mut self) {
        self.frame_index = (self.frame_index + 1) % self.frame_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One iteration of the frame loop, mirroring `Engine::draw_frame`'s
    /// control flow with the GPU calls replaced by injected outcomes.
    /// Returns whether the tick presented.
    fn tick(
        pacer: &mut FramePacer,
        acquire: AcquireStatus,
        present: PresentStatus,
        rebuilds: &mut usize,
        presented_indices: &mut Vec<usize>,
    ) -> bool {
        // (fence wait elided: no GPU here)
        if pacer.take_resize_request() {
            *rebuilds += 1;
            return false;
        }

        match pacer.on_acquire(acquire) {
            AcquireAction::SkipAndRebuild => {
                *rebuilds += 1;
                return false;
            }
            AcquireAction::Render => {}
        }

        // (record + submit elided)
        presented_indices.push(pacer.frame_index());

        if pacer.on_present(present) == PresentAction::Rebuild {
            *rebuilds += 1;
        }
        pacer.advance();
        true
    }

    #[test]
    fn five_clean_frames_cycle_two_slots() {
        let mut pacer = FramePacer::new(2);
        let mut rebuilds = 0;
        let mut indices = Vec::new();

        for _ in 0..5 {
            let presented = tick(
                &mut pacer,
                AcquireStatus::Success,
                PresentStatus::Success,
                &mut rebuilds,
                &mut indices,
            );
            assert!(presented);
        }

        assert_eq!(indices, vec![0, 1, 0, 1, 0]);
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn out_of_date_acquire_skips_the_frame_and_rebuilds_once() {
        let mut pacer = FramePacer::new(2);
        let mut rebuilds = 0;
        let mut indices = Vec::new();

        let schedule = [
            AcquireStatus::Success,
            AcquireStatus::Success,
            AcquireStatus::OutOfDate,
            AcquireStatus::Success,
            AcquireStatus::Success,
        ];
        let presented: Vec<bool> = schedule
            .iter()
            .map(|acquire| {
                tick(
                    &mut pacer,
                    *acquire,
                    PresentStatus::Success,
                    &mut rebuilds,
                    &mut indices,
                )
            })
            .collect();

        assert_eq!(presented, vec![true, true, false, true, true]);
        assert_eq!(rebuilds, 1);
        // The skipped tick does not consume a frame slot
        assert_eq!(indices, vec![0, 1, 0, 1]);
    }

    #[test]
    fn repeated_resize_requests_coalesce_into_one_rebuild() {
        let mut pacer = FramePacer::new(2);
        let mut rebuilds = 0;
        let mut indices = Vec::new();

        for _ in 0..4 {
            pacer.request_resize();
        }

        // The first tick claims the flag, rebuilds once, draws nothing
        let presented = tick(
            &mut pacer,
            AcquireStatus::Success,
            PresentStatus::Success,
            &mut rebuilds,
            &mut indices,
        );
        assert!(!presented);
        assert_eq!(rebuilds, 1);

        // The next tick proceeds normally with no further rebuild
        let presented = tick(
            &mut pacer,
            AcquireStatus::Success,
            PresentStatus::Success,
            &mut rebuilds,
            &mut indices,
        );
        assert!(presented);
        assert_eq!(rebuilds, 1);
    }

    #[test]
    fn suboptimal_acquire_still_renders_this_frame() {
        let mut pacer = FramePacer::new(2);
        let mut rebuilds = 0;
        let mut indices = Vec::new();

        let presented = tick(
            &mut pacer,
            AcquireStatus::Suboptimal,
            PresentStatus::Success,
            &mut rebuilds,
            &mut indices,
        );
        assert!(presented);
        assert_eq!(rebuilds, 0);
    }

    #[test]
    fn suboptimal_present_rebuilds_after_presenting() {
        let mut pacer = FramePacer::new(2);
        let mut rebuilds = 0;
        let mut indices = Vec::new();

        let presented = tick(
            &mut pacer,
            AcquireStatus::Success,
            PresentStatus::Suboptimal,
            &mut rebuilds,
            &mut indices,
        );
        assert!(presented);
        assert_eq!(rebuilds, 1);
        // The frame still advanced past the present
        assert_eq!(pacer.frame_index(), 1);
    }

    #[test]
    fn classify_maps_vulkan_results_to_statuses() {
        assert_eq!(
            AcquireStatus::classify(Ok((3, false))).unwrap(),
            (Some(3), AcquireStatus::Success)
        );
        assert_eq!(
            AcquireStatus::classify(Ok((1, true))).unwrap(),
            (Some(1), AcquireStatus::Suboptimal)
        );
        assert_eq!(
            AcquireStatus::classify(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            (None, AcquireStatus::OutOfDate)
        );
        assert!(AcquireStatus::classify(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());

        assert_eq!(
            PresentStatus::classify(Ok(false)).unwrap(),
            PresentStatus::Success
        );
        assert_eq!(
            PresentStatus::classify(Ok(true)).unwrap(),
            PresentStatus::Suboptimal
        );
        assert_eq!(
            PresentStatus::classify(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)).unwrap(),
            PresentStatus::OutOfDate
        );
        assert!(PresentStatus::classify(Err(vk::Result::ERROR_DEVICE_LOST)).is_err());
    }
}
