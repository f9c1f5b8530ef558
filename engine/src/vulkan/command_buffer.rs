//! Command pool and per-frame command recording.

use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

use super::constants;
use super::device::VulkanDevice;
use super::error::RendererError;
use super::context::VulkanContext;

#[derive(Debug)]
pub struct VulkanCommandBuffer;

/// Full-extent viewport with the standard 0..1 depth range.
pub fn viewport_for(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

pub fn scissor_for(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

impl VulkanCommandBuffer {
    /// The pool allows per-buffer reset so each frame's buffer can be
    /// re-recorded in place.
    pub unsafe fn create_command_pool(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(context.graphics_family);

        context.command_pool = device.vk_device.create_command_pool(&info, None)?;

        Ok(())
    }

    /// One primary command buffer per swapchain image.
    pub unsafe fn allocate(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(context.swapchain_images.len() as u32);

        context.command_buffers = device.vk_device.allocate_command_buffers(&info)?;

        Ok(())
    }

    /// Re-records the command buffer for `frame` from scratch: clear, dynamic
    /// viewport and scissor, then the indexed mesh draw. The fence for `frame`
    /// must have been waited on, so the buffer is no longer in flight; the
    /// framebuffer is the one for the acquired `image_index`.
    pub unsafe fn record_frame(
        device: &VulkanDevice,
        context: &VulkanContext,
        frame: usize,
        image_index: usize,
    ) -> Result<(), RendererError> {
        let command_buffer = context.command_buffers[frame];

        device
            .vk_device
            .reset_command_buffer(command_buffer, vk::CommandBufferResetFlags::empty())?;

        let begin_info = vk::CommandBufferBeginInfo::builder();
        device
            .vk_device
            .begin_command_buffer(command_buffer, &begin_info)?;

        let color_clear_value = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: constants::CLEAR_COLOR,
            },
        };
        let depth_clear_value = vk::ClearValue {
            depth_stencil: vk::ClearDepthStencilValue {
                depth: constants::CLEAR_DEPTH,
                stencil: constants::CLEAR_STENCIL,
            },
        };

        let clear_values = &[color_clear_value, depth_clear_value];
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(context.render_pass)
            .framebuffer(context.framebuffers[image_index])
            .render_area(scissor_for(context.swapchain_extent))
            .clear_values(clear_values);

        device.vk_device.cmd_begin_render_pass(
            command_buffer,
            &render_pass_begin,
            vk::SubpassContents::INLINE,
        );

        device.vk_device.cmd_bind_pipeline(
            command_buffer,
            vk::PipelineBindPoint::GRAPHICS,
            context.pipeline,
        );

        device
            .vk_device
            .cmd_set_viewport(command_buffer, 0, &[viewport_for(context.swapchain_extent)]);
        device
            .vk_device
            .cmd_set_scissor(command_buffer, 0, &[scissor_for(context.swapchain_extent)]);

        device.vk_device.cmd_bind_vertex_buffers(
            command_buffer,
            0,
            &[context.vertex_buffer],
            &[0],
        );
        device.vk_device.cmd_bind_index_buffer(
            command_buffer,
            context.index_buffer,
            0,
            vk::IndexType::UINT16,
        );

        device
            .vk_device
            .cmd_draw_indexed(command_buffer, context.index_count, 1, 0, 0, 0);

        device.vk_device.cmd_end_render_pass(command_buffer);
        device.vk_device.end_command_buffer(command_buffer)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_covers_the_extent() {
        let viewport = viewport_for(vk::Extent2D {
            width: 800,
            height: 600,
        });

        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!((viewport.min_depth, viewport.max_depth), (0.0, 1.0));
    }

    #[test]
    fn scissor_starts_at_the_origin() {
        let scissor = scissor_for(vk::Extent2D {
            width: 640,
            height: 480,
        });

        assert_eq!((scissor.offset.x, scissor.offset.y), (0, 0));
        assert_eq!(scissor.extent.width, 640);
        assert_eq!(scissor.extent.height, 480);
    }
}
