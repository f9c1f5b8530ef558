use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

use super::device::VulkanDevice;
use super::error::RendererError;
use super::context::VulkanContext;

#[derive(Debug)]
pub struct VulkanFramebuffer;

impl VulkanFramebuffer {
    /// One framebuffer per swapchain image view, all sharing the single
    /// depth view, sized to the swapchain extent.
    pub unsafe fn create(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        context.framebuffers = context
            .swapchain_image_views
            .iter()
            .map(|view| {
                let attachments = &[*view, context.depth_image_view];
                let info = vk::FramebufferCreateInfo::builder()
                    .render_pass(context.render_pass)
                    .attachments(attachments)
                    .width(context.swapchain_extent.width)
                    .height(context.swapchain_extent.height)
                    .layers(1);

                device.vk_device.create_framebuffer(&info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(())
    }
}
