pub mod camera;
pub mod config;
pub mod core;
pub mod resources;
pub mod shader_data;

use std::path::Path;
use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use glam::Vec2;
use winit::window::Window;

use crate::app::input_state::InputState;
use crate::renderer::camera::{Camera, CameraMode};
use crate::renderer::config::RenderConfig;
use crate::renderer::core::context::RenderContext;
use crate::renderer::core::deletion::DeletionQueue;
use crate::renderer::core::descriptors::DescriptorAllocator;
use crate::renderer::core::frame::{
    AcquireAction, AcquireStatus, FrameScheduler, PresentAction, PresentStatus,
};
use crate::renderer::core::swapchain::Swapchain;
use crate::renderer::core::upload::UploadContext;
use crate::renderer::resources::image::image_memory_barrier;
use crate::renderer::resources::mesh::Mesh;
use crate::renderer::resources::object::Object;
use crate::renderer::resources::pipeline::Pipeline;
use crate::renderer::resources::texture::Texture;
use crate::renderer::shader_data::{LightData, ObjectTransforms, SceneTransforms};

/// Index of the textured-lit pipeline built at startup.
pub const PIPELINE_TEXTURED: usize = 0;
/// Index of the solid vertex-color pipeline built at startup.
pub const PIPELINE_SOLID: usize = 1;

/// The engine: owns the device context, swapchain, frame scheduler, and the
/// scene lists (meshes, textures, pipelines, objects), and exposes the
/// load/add/draw/process surface the main loop drives.
pub struct Engine {
    ctx: RenderContext,
    swapchain: Swapchain,
    frames: FrameScheduler,
    upload: UploadContext,
    descriptors: DescriptorAllocator,
    deletion_queue: DeletionQueue,
    sampler: vk::Sampler,

    meshes: Vec<Mesh>,
    textures: Vec<Texture>,
    pipelines: Vec<Pipeline>,
    objects: Vec<Object>,

    pub camera: Camera,
    scene: SceneTransforms,

    window: Arc<Window>,
    is_running: bool,
}

impl Engine {
    pub fn new(window: Arc<Window>, config: &RenderConfig) -> Result<Self> {
        let ctx = RenderContext::new(&window)?;

        let window_size = window.inner_size();
        let swapchain = Swapchain::new(
            &ctx,
            vk::Extent2D {
                width: window_size.width,
                height: window_size.height,
            },
            config.frames_in_flight,
            config.vsync,
        )?;

        let upload = UploadContext::new(ctx.queue, ctx.queue_family_index, ctx.device.clone())?;

        let mut deletion_queue = DeletionQueue::new();

        let frames = FrameScheduler::new(&ctx, config.frames_in_flight)?;
        {
            let device = ctx.device.clone();
            let handles: Vec<(vk::Fence, vk::Semaphore, vk::Semaphore)> = frames
                .slots
                .iter()
                .map(|slot| {
                    (
                        slot.render_fence,
                        slot.acquire_semaphore,
                        slot.render_semaphore,
                    )
                })
                .collect();
            deletion_queue.push("frame sync primitives", move || {
                for (fence, acquire, render) in handles {
                    unsafe {
                        device.destroy_fence(fence, None);
                        device.destroy_semaphore(acquire, None);
                        device.destroy_semaphore(render, None);
                    }
                }
            });
        }

        let sampler = create_sampler(&ctx.device)?;
        {
            let device = ctx.device.clone();
            deletion_queue.push("texture sampler", move || unsafe {
                device.destroy_sampler(sampler, None);
            });
        }

        let descriptors = DescriptorAllocator::new(config.frames_in_flight, ctx.device.clone())?;

        let pipelines = create_pipelines(&ctx, &swapchain, &descriptors)?;

        log::info!(
            "Renderer initialized: {} frames in flight, {}x{}",
            config.frames_in_flight,
            swapchain.extent.width,
            swapchain.extent.height
        );

        Ok(Self {
            ctx,
            swapchain,
            frames,
            upload,
            descriptors,
            deletion_queue,
            sampler,
            meshes: Vec::new(),
            textures: Vec::new(),
            pipelines,
            objects: Vec::new(),
            camera: Camera::new(),
            scene: SceneTransforms::default(),
            window,
            is_running: true,
        })
    }

    pub fn is_running(&self) -> bool {
        self.is_running
    }

    /// Replace the scene transforms (model + perspective); the view matrix
    /// is recomputed from the camera every frame.
    pub fn set_projection(&mut self, scene: SceneTransforms) {
        self.scene = scene;
    }

    /// Update the light every pipeline shades with.
    pub fn set_light(&mut self, light: LightData) -> Result<()> {
        for pipeline in &mut self.pipelines {
            pipeline.write_light(&light)?;
        }
        Ok(())
    }

    /// Load an OBJ mesh; returns its index in the mesh list.
    pub fn load_mesh(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let mesh = Mesh::load(
            path.as_ref(),
            self.ctx.allocator(),
            self.ctx.device.clone(),
            &self.upload,
        )?;
        self.meshes.push(mesh);
        Ok(self.meshes.len() - 1)
    }

    /// Load a texture image; returns its index in the texture list.
    pub fn load_texture(&mut self, path: impl AsRef<Path>) -> Result<usize> {
        let texture = Texture::load(
            path.as_ref(),
            self.sampler,
            &self.descriptors,
            self.ctx.allocator(),
            self.ctx.device.clone(),
            &self.upload,
        )?;
        self.textures.push(texture);
        Ok(self.textures.len() - 1)
    }

    /// Add a scene object referencing already-loaded resources by index.
    /// Fails fast on an index that points outside the loaded lists.
    pub fn add_object(
        &mut self,
        transforms: ObjectTransforms,
        texture_index: usize,
        mesh_index: usize,
        pipeline_index: usize,
    ) -> Result<usize> {
        validate_scene_indices(
            texture_index,
            mesh_index,
            pipeline_index,
            self.textures.len(),
            self.meshes.len(),
            self.pipelines.len(),
        )?;

        let object = Object::new(
            transforms,
            texture_index,
            mesh_index,
            pipeline_index,
            &self.descriptors,
            self.ctx.allocator(),
            self.ctx.device.clone(),
        )?;
        self.objects.push(object);
        Ok(self.objects.len() - 1)
    }

    /// Apply one tick of input: quit, resize flagging, camera mode, and
    /// free-look movement. Called once per iteration before `draw_frame`.
    pub fn process_input(&mut self, input: &InputState, delta_time: f32) {
        if input.quit_requested {
            log::info!("Quit requested");
            self.is_running = false;
        }
        if input.resize_requested {
            self.frames.pacer.request_resize();
        }

        if input.mouse_right_just_pressed {
            self.camera.mode = CameraMode::Free;
        }
        if input.mouse_right_just_released {
            self.camera.mode = CameraMode::Fixed;
        }

        if self.camera.mode == CameraMode::Free {
            if input.move_forward {
                self.camera.move_forward(delta_time);
            }
            if input.move_backward {
                self.camera.move_backward(delta_time);
            }
            if input.move_left {
                self.camera.move_left(delta_time);
            }
            if input.move_right {
                self.camera.move_right(delta_time);
            }

            let delta = input.mouse_delta();
            if delta != Vec2::ZERO {
                // Screen Y grows downward; dragging up looks up
                self.camera.rotate(delta.x, -delta.y);
            }
        }
    }

    /// Run one frame through the scheduler: fence wait, optional rebuild,
    /// acquire, record, submit, present, advance.
    pub fn draw_frame(&mut self, delta_time: f32) -> Result<()> {
        // 1. The slot's previous submit must have fully retired before its
        //    command buffer or any resource it referenced is reused
        self.frames.wait_current_fence()?;

        // 2. A flagged resize rebuilds the swapchain and skips this tick
        if self.frames.pacer.take_resize_request() {
            let extent = self.window_extent();
            self.swapchain.rebuild(&self.ctx, extent)?;
            return Ok(());
        }

        let (cmd, acquire_semaphore, render_semaphore, render_fence) = {
            let slot = self.frames.current();
            (
                slot.command_buffer,
                slot.acquire_semaphore,
                slot.render_semaphore,
                slot.render_fence,
            )
        };

        // 3. Acquire the next presentable image
        let acquire_result = unsafe {
            self.swapchain.loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                acquire_semaphore,
                vk::Fence::null(),
            )
        };
        let (image_index, status) = AcquireStatus::classify(acquire_result)?;
        let image_index = match self.frames.pacer.on_acquire(status) {
            AcquireAction::SkipAndRebuild => {
                let extent = self.window_extent();
                self.swapchain.rebuild(&self.ctx, extent)?;
                return Ok(());
            }
            AcquireAction::Render => {
                image_index.ok_or_eyre("Acquire returned no image index")? as usize
            }
        };

        // 4. This frame is certain to submit: reset the fence and re-record
        self.frames.reset_current_fence()?;
        unsafe {
            self.ctx
                .device
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())?;
        }
        self.record_commands(cmd, image_index, delta_time)?;

        // 5. Submit, waiting for the acquired image at color-attachment
        //    output, signaling the render semaphore and the slot fence
        let wait_semaphores = [acquire_semaphore];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [cmd];
        let signal_semaphores = [render_semaphore];
        let submit = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);
        unsafe {
            self.ctx
                .device
                .queue_submit(self.ctx.queue, &[submit], render_fence)
                .map_err(|e| eyre!("Failed to submit frame commands: {e}"))?;
        }

        // 6. Present once rendering completes
        let swapchains = [self.swapchain.handle];
        let image_indices = [image_index as u32];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let present_result = unsafe {
            self.swapchain
                .loader
                .queue_present(self.ctx.queue, &present_info)
        };
        let status = PresentStatus::classify(present_result)?;
        if self.frames.pacer.on_present(status) == PresentAction::Rebuild {
            let extent = self.window_extent();
            self.swapchain.rebuild(&self.ctx, extent)?;
        }

        // 7. Step to the next frame slot
        self.frames.pacer.advance();

        Ok(())
    }

    fn record_commands(
        &mut self,
        cmd: vk::CommandBuffer,
        image_index: usize,
        delta_time: f32,
    ) -> Result<()> {
        let device = self.ctx.device.clone();
        let frame_index = self.frames.pacer.frame_index();

        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        // The acquired image and the depth target come in with undefined
        // contents; move both into attachment layouts before rendering
        let pre_barriers = [
            image_memory_barrier(
                self.swapchain.depth_image.image,
                vk::ImageAspectFlags::DEPTH,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            ),
            image_memory_barrier(
                self.swapchain.images[image_index],
                vk::ImageAspectFlags::COLOR,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
        ];
        let dependency_info = vk::DependencyInfo::default().image_memory_barriers(&pre_barriers);
        unsafe {
            device.cmd_pipeline_barrier2(cmd, &dependency_info);
        }

        let clear_color = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: [1.0, 1.0, 1.0, 1.0],
            },
        };
        let depth_clear = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
        };

        let color_attachments = [vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.image_views[image_index])
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(clear_color)];
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.swapchain.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .clear_value(depth_clear);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(self.swapchain.scissor)
            .layer_count(1)
            .color_attachments(&color_attachments)
            .depth_attachment(&depth_attachment);
        unsafe {
            device.cmd_begin_rendering(cmd, &rendering_info);
            device.cmd_set_viewport(cmd, 0, &[self.swapchain.viewport]);
            device.cmd_set_scissor(cmd, 0, &[self.swapchain.scissor]);
        }

        // The view follows the camera; every pipeline sees the same scene
        self.scene.view = self.camera.view_matrix();
        let scene = self.scene;
        for pipeline in &mut self.pipelines {
            pipeline.write_scene(&scene)?;
        }

        for object in &mut self.objects {
            let mesh = self.meshes.get(object.mesh_index).ok_or_else(|| {
                eyre!(
                    "Mesh index {} out of range: {} meshes loaded",
                    object.mesh_index,
                    self.meshes.len()
                )
            })?;
            let texture = self.textures.get(object.texture_index).ok_or_else(|| {
                eyre!(
                    "Texture index {} out of range: {} textures loaded",
                    object.texture_index,
                    self.textures.len()
                )
            })?;
            let pipeline = self.pipelines.get(object.pipeline_index).ok_or_else(|| {
                eyre!(
                    "Pipeline index {} out of range: {} pipelines built",
                    object.pipeline_index,
                    self.pipelines.len()
                )
            })?;

            pipeline.bind_pipeline(cmd);

            object.animate(delta_time);
            object.write_uniform()?;

            let sets = [
                texture.descriptor_sets[frame_index],
                pipeline.descriptor_sets[frame_index],
                object.descriptor_sets[frame_index],
            ];
            pipeline.bind_descriptor_sets(cmd, 0, &sets);

            unsafe {
                device.cmd_bind_vertex_buffers(cmd, 0, &[mesh.vertex_buffer.buffer], &[0]);
                device.cmd_bind_index_buffer(
                    cmd,
                    mesh.index_buffer.buffer,
                    0,
                    vk::IndexType::UINT16,
                );
                device.cmd_draw_indexed(cmd, mesh.index_count, 1, 0, 0, 0);
            }
        }

        unsafe {
            device.cmd_end_rendering(cmd);
        }

        // Hand the image to the presentation engine
        let present_barriers = [image_memory_barrier(
            self.swapchain.images[image_index],
            vk::ImageAspectFlags::COLOR,
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            vk::ImageLayout::PRESENT_SRC_KHR,
        )];
        let dependency_info =
            vk::DependencyInfo::default().image_memory_barriers(&present_barriers);
        unsafe {
            device.cmd_pipeline_barrier2(cmd, &dependency_info);
            device.end_command_buffer(cmd)?;
        }

        Ok(())
    }

    /// Drain the GPU and tear everything down in reverse creation order.
    /// Call exactly once; the engine is unusable afterwards.
    pub fn destroy(&mut self) -> Result<()> {
        self.ctx.wait_idle()?;

        for object in &mut self.objects {
            object.destroy();
        }
        self.objects.clear();
        for texture in &mut self.textures {
            texture.destroy();
        }
        self.textures.clear();
        for mesh in &mut self.meshes {
            mesh.destroy();
        }
        self.meshes.clear();
        for pipeline in &mut self.pipelines {
            pipeline.destroy();
        }
        self.pipelines.clear();

        self.descriptors.destroy();
        self.deletion_queue.flush();
        self.upload.destroy();
        self.swapchain.destroy(&self.ctx);
        self.ctx.destroy();

        log::info!("Renderer destroyed");
        Ok(())
    }

    fn window_extent(&self) -> vk::Extent2D {
        let size = self.window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

fn create_sampler(device: &ash::Device) -> Result<vk::Sampler> {
    let info = vk::SamplerCreateInfo::default()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(false)
        .compare_enable(false);
    Ok(unsafe { device.create_sampler(&info, None)? })
}

fn create_pipelines(
    ctx: &RenderContext,
    swapchain: &Swapchain,
    descriptors: &DescriptorAllocator,
) -> Result<Vec<Pipeline>> {
    let color_format = swapchain.surface_format.format;
    let depth_format = swapchain.depth_image.format;

    Ok(vec![
        Pipeline::new(
            "default",
            "default",
            color_format,
            depth_format,
            descriptors,
            ctx.allocator(),
            ctx.device.clone(),
        )?,
        Pipeline::new(
            "default",
            "default-solid",
            color_format,
            depth_format,
            descriptors,
            ctx.allocator(),
            ctx.device.clone(),
        )?,
    ])
}

/// Reject an object whose resource indices point outside the loaded lists,
/// with a message naming the offending index.
fn validate_scene_indices(
    texture_index: usize,
    mesh_index: usize,
    pipeline_index: usize,
    texture_count: usize,
    mesh_count: usize,
    pipeline_count: usize,
) -> Result<()> {
    if texture_index >= texture_count {
        return Err(eyre!(
            "Texture index {} out of range: {} textures loaded",
            texture_index,
            texture_count
        ));
    }
    if mesh_index >= mesh_count {
        return Err(eyre!(
            "Mesh index {} out of range: {} meshes loaded",
            mesh_index,
            mesh_count
        ));
    }
    if pipeline_index >= pipeline_count {
        return Err(eyre!(
            "Pipeline index {} out of range: {} pipelines built",
            pipeline_index,
            pipeline_count
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scene_indices_inside_the_lists_are_accepted() {
        assert!(validate_scene_indices(0, 1, 1, 1, 2, 2).is_ok());
    }

    #[test]
    fn out_of_range_indices_fail_with_a_named_index() {
        let err = validate_scene_indices(3, 0, 0, 1, 1, 1).unwrap_err();
        assert!(err.to_string().contains("Texture index 3"));

        let err = validate_scene_indices(0, 5, 0, 1, 1, 1).unwrap_err();
        assert!(err.to_string().contains("Mesh index 5"));

        let err = validate_scene_indices(0, 0, 2, 1, 1, 2).unwrap_err();
        assert!(err.to_string().contains("Pipeline index 2"));
    }

    #[test]
    fn empty_lists_reject_every_index() {
        assert!(validate_scene_indices(0, 0, 0, 0, 0, 0).is_err());
    }
}
