use std::ffi::CString;
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt};
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;

use crate::renderer::core::descriptors::DescriptorAllocator;
use crate::renderer::resources::buffer::Buffer;
use crate::renderer::resources::shader::GraphicsShader;
use crate::renderer::resources::vertex::VertexInputDescription;
use crate::renderer::shader_data::{LightData, SceneTransforms};

/// An immutable compiled graphics pipeline plus the pipeline-local state it
/// renders with: its layout, shader modules, per-frame scene descriptor
/// sets, and the scene/light uniform buffers those sets point at.
///
/// A viewport or format change requires building a fresh `Pipeline`; there
/// is no in-place mutation.
pub struct Pipeline {
    pipeline: vk::Pipeline,
    pipeline_layout: vk::PipelineLayout,
    shader: GraphicsShader,

    pub descriptor_sets: Vec<vk::DescriptorSet>,
    pub scene_ubo: Buffer,
    pub light_ubo: Buffer,

    device: Arc<ash::Device>,
}

impl Pipeline {
    /// Build a pipeline over the engine's three-set layout
    /// {texture, scene, object} with the fixed-function state every material
    /// in the engine shares.
    pub fn new(
        vert_name: &str,
        frag_name: &str,
        color_format: vk::Format,
        depth_format: vk::Format,
        descriptors: &DescriptorAllocator,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let shader = GraphicsShader::new(vert_name, frag_name, device.clone())?;

        let pipeline_layout = {
            let set_layouts = [
                descriptors.texture_set_layout,
                descriptors.scene_set_layout,
                descriptors.object_set_layout,
            ];
            let info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);
            unsafe { device.create_pipeline_layout(&info, None)? }
        };

        let pipeline = PipelineBuilder::new(device.clone())
            .with_shader(&shader)
            .with_pipeline_layout(pipeline_layout)
            .with_vertex_input(VertexInputDescription::default())
            .with_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .with_polygon_mode(vk::PolygonMode::FILL)
            .with_cull_mode(vk::CullModeFlags::BACK, vk::FrontFace::COUNTER_CLOCKWISE)
            .with_blending_disabled()
            .with_depth_test(true, Some(vk::CompareOp::LESS_OR_EQUAL))
            .with_color_attachment_format(color_format)
            .with_depth_attachment_format(depth_format)
            .build()?;

        let mut scene_ubo = Buffer::new(
            std::mem::size_of::<SceneTransforms>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Scene uniform buffer",
            memory_allocator.clone(),
            device.clone(),
        )?;
        scene_ubo.write(bytemuck::bytes_of(&SceneTransforms::default()), 0)?;

        let mut light_ubo = Buffer::new(
            std::mem::size_of::<LightData>() as u64,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            "Light uniform buffer",
            memory_allocator,
            device.clone(),
        )?;
        light_ubo.write(bytemuck::bytes_of(&LightData::default()), 0)?;

        let descriptor_sets = descriptors.allocate_per_frame(descriptors.scene_set_layout)?;
        for set in &descriptor_sets {
            descriptors.write_uniform_buffer(*set, 0, &scene_ubo);
            descriptors.write_uniform_buffer(*set, 1, &light_ubo);
        }

        Ok(Self {
            pipeline,
            pipeline_layout,
            shader,
            descriptor_sets,
            scene_ubo,
            light_ubo,
            device,
        })
    }

    pub fn bind_pipeline(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_bind_pipeline(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline,
            );
        }
    }

    pub fn bind_descriptor_sets(
        &self,
        command_buffer: vk::CommandBuffer,
        first_set: u32,
        descriptor_sets: &[vk::DescriptorSet],
    ) {
        unsafe {
            self.device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                self.pipeline_layout,
                first_set,
                descriptor_sets,
                &[],
            );
        }
    }

    /// Host-visible write of this frame's scene transforms; no reallocation.
    pub fn write_scene(&mut self, scene: &SceneTransforms) -> Result<()> {
        self.scene_ubo.write(bytemuck::bytes_of(scene), 0)
    }

    pub fn write_light(&mut self, light: &LightData) -> Result<()> {
        self.light_ubo.write(bytemuck::bytes_of(light), 0)
    }

    pub fn destroy(&mut self) {
        unsafe {
            self.device.destroy_pipeline(self.pipeline, None);
            self.device
                .destroy_pipeline_layout(self.pipeline_layout, None);
        }
        self.shader.destroy();
        self.scene_ubo.destroy();
        self.light_ubo.destroy();
    }
}

pub struct PipelineBuilder<'a> {
    device: Arc<ash::Device>,

    vertex_input_description: VertexInputDescription,
    input_assembly: vk::PipelineInputAssemblyStateCreateInfo<'a>,
    rasterization: vk::PipelineRasterizationStateCreateInfo<'a>,
    color_blend_attachment: vk::PipelineColorBlendAttachmentState,
    multisample: vk::PipelineMultisampleStateCreateInfo<'a>,
    depth_stencil: vk::PipelineDepthStencilStateCreateInfo<'a>,
    color_attachment_format: vk::Format,
    depth_attachment_format: vk::Format,
    shader: Option<&'a GraphicsShader>,
    pipeline_layout: Option<vk::PipelineLayout>,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(device: Arc<ash::Device>) -> Self {
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);
        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            // 1 sample per pixel means no multisampling
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .depth_bounds_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
            .stencil_test_enable(false);

        Self {
            device,

            vertex_input_description: VertexInputDescription::default(),
            input_assembly,
            rasterization,
            color_blend_attachment,
            multisample,
            depth_stencil,
            color_attachment_format: vk::Format::UNDEFINED,
            depth_attachment_format: vk::Format::UNDEFINED,
            shader: None,
            pipeline_layout: None,
        }
    }

    pub fn with_shader(mut self, shader: &'a GraphicsShader) -> Self {
        let _ = self.shader.replace(shader);
        self
    }

    pub fn with_pipeline_layout(mut self, layout: vk::PipelineLayout) -> Self {
        let _ = self.pipeline_layout.replace(layout);
        self
    }

    pub fn with_vertex_input(mut self, description: VertexInputDescription) -> Self {
        self.vertex_input_description = description;
        self
    }

    pub fn with_input_topology(mut self, topology: vk::PrimitiveTopology) -> Self {
        self.input_assembly.topology = topology;
        self.input_assembly.primitive_restart_enable = vk::FALSE;
        self
    }

    pub fn with_polygon_mode(mut self, mode: vk::PolygonMode) -> Self {
        self.rasterization.polygon_mode = mode;
        self.rasterization.line_width = 1.0;
        self
    }

    pub fn with_cull_mode(
        mut self,
        cull_mode: vk::CullModeFlags,
        front_face: vk::FrontFace,
    ) -> Self {
        self.rasterization.cull_mode = cull_mode;
        self.rasterization.front_face = front_face;
        self
    }

    pub fn with_blending_disabled(mut self) -> Self {
        // Default RGBA write mask
        self.color_blend_attachment.color_write_mask = vk::ColorComponentFlags::RGBA;
        // No blending
        self.color_blend_attachment.blend_enable = vk::FALSE;
        self
    }

    pub fn with_depth_test(mut self, enable: bool, compare: Option<vk::CompareOp>) -> Self {
        self.depth_stencil.depth_test_enable = if enable { vk::TRUE } else { vk::FALSE };
        self.depth_stencil.depth_write_enable = if enable { vk::TRUE } else { vk::FALSE };
        self.depth_stencil.depth_compare_op = if enable {
            compare.unwrap_or(vk::CompareOp::LESS_OR_EQUAL)
        } else {
            vk::CompareOp::ALWAYS
        };
        self.depth_stencil.min_depth_bounds = 0.0;
        self.depth_stencil.max_depth_bounds = 1.0;
        self
    }

    pub fn with_color_attachment_format(mut self, format: vk::Format) -> Self {
        self.color_attachment_format = format;
        self
    }

    pub fn with_depth_attachment_format(mut self, format: vk::Format) -> Self {
        self.depth_attachment_format = format;
        self
    }

    pub fn build(self) -> Result<vk::Pipeline> {
        let device = self.device;

        let shader = self
            .shader
            .ok_or_eyre("No shader provided for PipelineBuilder")?;
        let shader_main_fn_name = CString::new("main")?;
        let shader_stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(shader.vert_mod)
                .name(&shader_main_fn_name),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(shader.frag_mod)
                .name(&shader_main_fn_name),
        ];

        let pipeline_layout = self
            .pipeline_layout
            .ok_or_eyre("No pipeline layout provided for PipelineBuilder")?;

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_attribute_descriptions(&self.vertex_input_description.attributes)
            .vertex_binding_descriptions(&self.vertex_input_description.bindings);

        let viewport_state = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let color_blend_info = vk::PipelineColorBlendStateCreateInfo {
            logic_op_enable: vk::FALSE,
            logic_op: vk::LogicOp::COPY,
            attachment_count: 1,
            p_attachments: &self.color_blend_attachment,
            ..Default::default()
        };

        // Rendering without render passes: declare the attachment formats
        // the dynamic-rendering pass will use
        let color_attachment_formats = [self.color_attachment_format];
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_attachment_formats)
            .depth_attachment_format(self.depth_attachment_format);

        // Use dynamic state for viewport and scissor configuration
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .push_next(&mut rendering_info)
            .stages(&shader_stages)
            .layout(pipeline_layout)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&self.input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&self.rasterization)
            .multisample_state(&self.multisample)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&self.depth_stencil)
            .dynamic_state(&dynamic_info);

        let pipeline = unsafe {
            match device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_info],
                None,
            ) {
                Ok(pipelines) => Ok(pipelines),
                Err(_) => Err(eyre!("Failed to create graphics pipeline")),
            }
        }?[0];

        Ok(pipeline)
    }
}
