//! The graphics pipeline. Viewport and scissor are dynamic so the pipeline
//! itself survives resizes; only the attachments behind it are rebuilt.

use vulkanalia::bytecode::Bytecode;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

use super::device::VulkanDevice;
use super::error::RendererError;
use super::shaders;
use super::vertex::Vertex;
use super::context::VulkanContext;

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    unsafe fn create_shader_module(
        device: &VulkanDevice,
        bytecode: &[u8],
    ) -> Result<vk::ShaderModule, RendererError> {
        let bytecode = Bytecode::new(bytecode)
            .map_err(|e| RendererError::Pipeline(format!("invalid SPIR-V: {}", e)))?;

        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }

    pub unsafe fn create(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        let vert = shaders::load("shader.vert")?;
        let frag = shaders::load("shader.frag")?;

        let vert_module = Self::create_shader_module(device, &vert)?;
        let frag_module = match Self::create_shader_module(device, &frag) {
            Ok(module) => module,
            Err(error) => {
                device.vk_device.destroy_shader_module(vert_module, None);
                return Err(error);
            }
        };

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Counts only; the actual rectangles are set per frame.
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .depth_bias_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        // The render pass carries a depth attachment; the pipeline leaves it
        // untouched for now.
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(false)
            .depth_write_enable(false)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(attachments);

        let dynamic_states = &[vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(dynamic_states);

        let layout_info = vk::PipelineLayoutCreateInfo::builder();
        context.pipeline_layout = device.vk_device.create_pipeline_layout(&layout_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        let result = device
            .vk_device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None);

        device.vk_device.destroy_shader_module(vert_module, None);
        device.vk_device.destroy_shader_module(frag_module, None);

        context.pipeline = result
            .map_err(|e| RendererError::Pipeline(format!("pipeline creation failed: {:?}", e)))?
            .0[0];

        Ok(())
    }
}
