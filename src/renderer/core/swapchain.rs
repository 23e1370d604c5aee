use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::Result;

use crate::renderer::core::context::RenderContext;
use crate::renderer::resources::image::Image;

/// Owns the swapchain, its image views, the depth attachment sized to it,
/// and the viewport/scissor derived from its extent.
///
/// [`Swapchain::rebuild`] is the only path that may destroy and replace the
/// presentable images; the frame loop never touches an image index from a
/// stale swapchain.
pub struct Swapchain {
    pub loader: ash::khr::swapchain::Device,
    pub handle: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,

    pub depth_image: Image,
    pub viewport: vk::Viewport,
    pub scissor: vk::Rect2D,

    min_image_count: u32,
    vsync: bool,
}

impl Swapchain {
    pub fn new(
        ctx: &RenderContext,
        window_extent: vk::Extent2D,
        min_image_count: u32,
        vsync: bool,
    ) -> Result<Self> {
        let loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let (handle, surface_format, extent) = create_swapchain(
            ctx,
            &loader,
            window_extent,
            min_image_count,
            vsync,
            vk::SwapchainKHR::null(),
        )?;
        let (images, image_views) =
            get_swapchain_images(&loader, handle, surface_format.format, ctx)?;

        let depth_image = Image::new_depth(
            extent.width,
            extent.height,
            ctx.allocator(),
            ctx.device.clone(),
        )?;
        let (viewport, scissor) = viewport_and_scissor(extent);

        Ok(Self {
            loader,
            handle,
            surface_format,
            extent,
            images,
            image_views,
            depth_image,
            viewport,
            scissor,
            min_image_count,
            vsync,
        })
    }

    /// Replace the swapchain in place after a resize or an out-of-date
    /// result. Waits for the device to go idle, so no in-flight frame can
    /// still reference the images being destroyed. The previous swapchain is
    /// passed as a creation hint so the driver can reuse its resources.
    pub fn rebuild(&mut self, ctx: &RenderContext, window_extent: vk::Extent2D) -> Result<()> {
        ctx.wait_idle()?;

        self.destroy_image_views(ctx);
        self.depth_image.destroy();

        let old_handle = self.handle;
        let (handle, surface_format, extent) = create_swapchain(
            ctx,
            &self.loader,
            window_extent,
            self.min_image_count,
            self.vsync,
            old_handle,
        )?;
        unsafe {
            self.loader.destroy_swapchain(old_handle, None);
        }

        let (images, image_views) =
            get_swapchain_images(&self.loader, handle, surface_format.format, ctx)?;

        self.handle = handle;
        self.surface_format = surface_format;
        self.extent = extent;
        self.images = images;
        self.image_views = image_views;

        self.depth_image = Image::new_depth(
            extent.width,
            extent.height,
            ctx.allocator(),
            ctx.device.clone(),
        )?;
        (self.viewport, self.scissor) = viewport_and_scissor(extent);

        log::info!(
            "Swapchain rebuilt at {}x{}",
            extent.width,
            extent.height
        );

        Ok(())
    }

    fn destroy_image_views(&mut self, ctx: &RenderContext) {
        for view in self.image_views.drain(..) {
            unsafe {
                ctx.device.destroy_image_view(view, None);
            }
        }
    }

    /// Tear down views, depth image, and the swapchain itself. Only called
    /// once the device is idle.
    pub fn destroy(&mut self, ctx: &RenderContext) {
        self.destroy_image_views(ctx);
        self.depth_image.destroy();
        unsafe {
            self.loader.destroy_swapchain(self.handle, None);
        }
    }
}

fn create_swapchain(
    ctx: &RenderContext,
    loader: &ash::khr::swapchain::Device,
    window_extent: vk::Extent2D,
    min_image_count: u32,
    vsync: bool,
    old_swapchain: vk::SwapchainKHR,
) -> Result<(vk::SwapchainKHR, vk::SurfaceFormatKHR, vk::Extent2D)> {
    let physical_device = ctx.physical_device;

    let surface_capabilities = unsafe {
        ctx.surface_loader
            .get_physical_device_surface_capabilities(physical_device, ctx.surface)?
    };
    let surface_formats = unsafe {
        ctx.surface_loader
            .get_physical_device_surface_formats(physical_device, ctx.surface)?
    };
    let surface_present_modes = unsafe {
        ctx.surface_loader
            .get_physical_device_surface_present_modes(physical_device, ctx.surface)?
    };

    let surface_format = surface_formats
        .iter()
        .find(|format| {
            format.format == vk::Format::B8G8R8A8_SRGB
                && format.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .ok_or_eyre("No suitable surface format found")?;

    let present_mode = if vsync {
        vk::PresentModeKHR::FIFO
    } else {
        *surface_present_modes
            .iter()
            .find(|mode| **mode == vk::PresentModeKHR::MAILBOX)
            .unwrap_or(&vk::PresentModeKHR::FIFO)
    };

    let image_extent = {
        if surface_capabilities.current_extent.width != u32::MAX {
            surface_capabilities.current_extent
        } else {
            vk::Extent2D {
                width: window_extent.width.clamp(
                    surface_capabilities.min_image_extent.width,
                    surface_capabilities.max_image_extent.width,
                ),
                height: window_extent.height.clamp(
                    surface_capabilities.min_image_extent.height,
                    surface_capabilities.max_image_extent.height,
                ),
            }
        }
    };

    let image_count = {
        let min = min_image_count.max(surface_capabilities.min_image_count);
        let max = surface_capabilities.max_image_count;
        if max > 0 && min > max {
            max
        } else {
            min
        }
    };
    let pre_transform = if surface_capabilities
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        surface_capabilities.current_transform
    };

    let swapchain_info = vk::SwapchainCreateInfoKHR::default()
        .surface(ctx.surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(image_extent)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        .pre_transform(pre_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true)
        .image_array_layers(1)
        .old_swapchain(old_swapchain);

    let swapchain = unsafe { loader.create_swapchain(&swapchain_info, None)? };

    Ok((swapchain, *surface_format, image_extent))
}

fn get_swapchain_images(
    loader: &ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    format: vk::Format,
    ctx: &RenderContext,
) -> Result<(Vec<vk::Image>, Vec<vk::ImageView>)> {
    let swapchain_images = unsafe { loader.get_swapchain_images(swapchain)? };
    let swapchain_image_views = swapchain_images
        .iter()
        .map(|image| {
            let view_info = vk::ImageViewCreateInfo::default()
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::R,
                    g: vk::ComponentSwizzle::G,
                    b: vk::ComponentSwizzle::B,
                    a: vk::ComponentSwizzle::A,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                })
                .image(*image);
            unsafe { ctx.device.create_image_view(&view_info, None) }
        })
        .collect::<VkResult<Vec<vk::ImageView>>>()?;

    Ok((swapchain_images, swapchain_image_views))
}

fn viewport_and_scissor(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport::default()
        .x(0.0)
        .y(0.0)
        .width(extent.width as f32)
        .height(extent.height as f32)
        .min_depth(0.0)
        .max_depth(1.0);
    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };
    (viewport, scissor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_and_scissor_cover_the_full_extent() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };
        let (viewport, scissor) = viewport_and_scissor(extent);

        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent, extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
    }
}
