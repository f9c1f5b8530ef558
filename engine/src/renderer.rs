use anyhow::Result;
use winit::window::Window;

use crate::vulkan::{FrameStatus, VulkanRenderer};

#[derive(Debug)]
pub struct Renderer {
    pub vk_renderer: VulkanRenderer,
    resized: bool,
}

impl Renderer {
    /// Brings up the full Vulkan context for the given window.
    pub unsafe fn create(window: &Window) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window)?;

        Ok(Self {
            vk_renderer,
            resized: false,
        })
    }

    /// Called from the window event loop; the actual rebuild happens on the
    /// next `render` so resize storms collapse into one swapchain rebuild.
    pub fn notify_resize(&mut self) {
        self.resized = true;
    }

    /// Renders a frame, running the resize protocol when the window changed
    /// size or the driver invalidated the surface. A zero-sized (minimized)
    /// window skips the frame entirely.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }

        let status = self.vk_renderer.draw()?;

        if self.resized || status == FrameStatus::RequiresResize {
            self.resized = false;
            self.vk_renderer.resize(size.width, size.height)?;
        }

        Ok(())
    }

    /// Tears the Vulkan context down. Safe to call more than once.
    pub unsafe fn destroy(&mut self) {
        self.vk_renderer.destroy();
    }
}
