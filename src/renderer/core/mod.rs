/// "Core" objects own the raw Vulkan state: device context, swapchain,
/// per-frame synchronization, one-shot uploads, descriptors, and the
/// deferred teardown queue.

pub mod context;
pub mod deletion;
pub mod descriptors;
pub mod frame;
pub mod swapchain;
pub mod upload;
