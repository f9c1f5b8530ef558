//! The Vulkan backend: ordered resource acquisition, the frame loop, and
//! teardown driven by the progress tracker.

use log::*;
use vulkanalia::loader::{LibloadingLoader, LIBRARY};
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{self, ExtDebugUtilsExtension, KhrSurfaceExtension, KhrSwapchainExtension};
use vulkanalia::window as vk_window;
use vulkanalia::Entry;
use winit::window::Window;

use buffer::VulkanBuffer;
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use device::VulkanDevice;
use framebuffer::VulkanFramebuffer;
use image::VulkanImage;
use instance::VulkanInstance;
use pipeline::VulkanPipeline;
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;

mod buffer;
mod command_buffer;
mod constants;
mod context;
mod device;
mod error;
mod framebuffer;
mod image;
mod instance;
mod memory;
mod pipeline;
mod progress;
mod render_pass;
mod shaders;
mod swapchain;
mod vertex;

pub use error::{FrameStatus, RendererError};
pub use memory::{FirstFitSelector, MemoryTypeSelector};
pub use progress::{ProgressTracker, ResourceState, Stage};

#[derive(Debug)]
pub struct VulkanRenderer {
    // Keeps the loaded Vulkan library alive for the renderer's lifetime.
    _entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    progress: ProgressTracker,
    memory_selector: Box<dyn MemoryTypeSelector>,
    frame: usize,
}

/// Round-robin frame index over the per-image synchronization sets.
pub fn advance_frame(frame: usize, count: usize) -> usize {
    (frame + 1) % count
}

impl VulkanRenderer {
    pub unsafe fn new(window: &Window) -> Result<VulkanRenderer, RendererError> {
        let loader =
            LibloadingLoader::new(LIBRARY).map_err(|e| RendererError::Library(e.to_string()))?;
        let entry = Entry::new(loader).map_err(|e| RendererError::Library(e.to_string()))?;

        let mut context = VulkanContext::default();
        let mut progress = ProgressTracker::new();
        progress.mark_created(Stage::Initialized);

        let instance = VulkanInstance::new(window, &entry, &mut context)?;
        progress.mark_created(Stage::InstanceCreated);

        let device =
            match Self::create_surface_and_device(window, &entry, &instance, &mut context, &mut progress)
            {
                Ok(device) => device,
                Err(error) => {
                    Self::destroy_instance_objects(&instance, &context, &mut progress);
                    return Err(error);
                }
            };

        let mut renderer = VulkanRenderer {
            _entry: entry,
            instance,
            device,
            context,
            progress,
            memory_selector: Box::new(FirstFitSelector),
            frame: 0,
        };

        let size = window.inner_size();
        if let Err(error) = renderer.init_render_resources(size.width, size.height) {
            renderer.destroy();
            return Err(error);
        }

        Ok(renderer)
    }

    unsafe fn create_surface_and_device(
        window: &Window,
        entry: &Entry,
        instance: &VulkanInstance,
        context: &mut VulkanContext,
        progress: &mut ProgressTracker,
    ) -> Result<VulkanDevice, RendererError> {
        context.surface = vk_window::create_surface(&instance.vk_instance, &window, &window)?;
        progress.mark_created(Stage::SurfaceCreated);

        let device = VulkanDevice::new(entry, instance, context)?;
        progress.mark_created(Stage::PhysicalDeviceSelected);
        progress.mark_created(Stage::DeviceCreated);

        Ok(device)
    }

    /// Cleanup path for failures before the logical device exists.
    unsafe fn destroy_instance_objects(
        instance: &VulkanInstance,
        context: &VulkanContext,
        progress: &mut ProgressTracker,
    ) {
        let vk_instance = &instance.vk_instance;

        progress.destroy_if_created(Stage::SurfaceCreated, || {
            vk_instance.destroy_surface_khr(context.surface, None)
        });
        progress.destroy_if_created(Stage::InstanceCreated, || {
            if context.messenger_enabled {
                vk_instance.destroy_debug_utils_messenger_ext(context.messenger, None);
            }
            instance.destroy();
        });
    }

    /// The swapchain-dependent part of initialization, shared with the
    /// resize protocol: swapchain, image views, depth target, render pass
    /// and framebuffers, in dependency order.
    unsafe fn create_render_resources(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(), RendererError> {
        self.progress.assert_created(Stage::DeviceCreated);
        VulkanSwapchain::create(width, height, &self.instance, &self.device, &mut self.context)?;
        self.progress.mark_created(Stage::SwapchainCreated);

        self.progress.assert_created(Stage::SwapchainCreated);
        VulkanSwapchain::create_image_views(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::ImageViewsCreated);

        self.progress.assert_created(Stage::ImageViewsCreated);
        VulkanImage::create_depth_objects(
            &self.instance,
            &self.device,
            &mut self.context,
            self.memory_selector.as_ref(),
        )?;
        self.progress.mark_created(Stage::DepthResourcesCreated);

        self.progress.assert_created(Stage::DepthResourcesCreated);
        VulkanRenderPass::create(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::RenderPassCreated);

        self.progress.assert_created(Stage::RenderPassCreated);
        VulkanFramebuffer::create(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::FramebuffersCreated);

        Ok(())
    }

    unsafe fn init_render_resources(
        &mut self,
        width: u32,
        height: u32,
    ) -> Result<(), RendererError> {
        self.create_render_resources(width, height)?;

        self.progress.assert_created(Stage::SwapchainCreated);
        VulkanCommandBuffer::create_command_pool(&self.device, &mut self.context)?;
        VulkanCommandBuffer::allocate(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::CommandBuffersAllocated);

        self.progress.assert_created(Stage::CommandBuffersAllocated);
        VulkanBuffer::create(
            &self.instance,
            &self.device,
            &mut self.context,
            self.memory_selector.as_ref(),
        )?;
        self.progress.mark_created(Stage::VertexInputUploaded);

        self.progress.assert_created(Stage::RenderPassCreated);
        VulkanPipeline::create(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::PipelineCreated);

        self.create_sync_objects()?;
        self.progress.mark_created(Stage::SyncObjectsCreated);

        Ok(())
    }

    /// One fence (created signaled, so the first wait passes) and two
    /// semaphores per swapchain image.
    unsafe fn create_sync_objects(&mut self) -> Result<(), RendererError> {
        self.progress.assert_created(Stage::SwapchainCreated);

        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..self.context.swapchain_images.len() {
            self.context.image_available_semaphores.push(
                self.device
                    .vk_device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(RendererError::SyncObject)?,
            );
            self.context.render_finished_semaphores.push(
                self.device
                    .vk_device
                    .create_semaphore(&semaphore_info, None)
                    .map_err(RendererError::SyncObject)?,
            );
            self.context.in_flight_fences.push(
                self.device
                    .vk_device
                    .create_fence(&fence_info, None)
                    .map_err(RendererError::SyncObject)?,
            );
        }

        Ok(())
    }

    /// Runs one frame: fence-gated reuse of this frame's command buffer,
    /// semaphore-ordered acquire/submit/present, and round-robin advance.
    ///
    /// `RequiresResize` means the surface no longer matches the swapchain;
    /// the caller must run `resize` before drawing again.
    pub unsafe fn draw(&mut self) -> Result<FrameStatus, RendererError> {
        self.progress.assert_created(Stage::SyncObjectsCreated);

        let device = &self.device.vk_device;
        let fence = self.context.in_flight_fences[self.frame];

        device.wait_for_fences(&[fence], true, u64::MAX)?;

        let acquired = device.acquire_next_image_khr(
            self.context.swapchain,
            u64::MAX,
            self.context.image_available_semaphores[self.frame],
            vk::Fence::null(),
        );
        let image_index = match acquired {
            Ok((index, _)) => index as usize,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => return Ok(FrameStatus::RequiresResize),
            Err(error) => return Err(error.into()),
        };

        // Reset only after a successful acquire: an aborted frame leaves the
        // fence signaled, so the next draw after a resize cannot deadlock.
        device.reset_fences(&[fence])?;

        VulkanCommandBuffer::record_frame(&self.device, &self.context, self.frame, image_index)?;

        let wait_semaphores = &[self.context.image_available_semaphores[self.frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.context.command_buffers[self.frame]];
        let signal_semaphores = &[self.context.render_finished_semaphores[self.frame]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        device.queue_submit(self.context.graphics_queue, &[submit_info], fence)?;

        let swapchains = &[self.context.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let status = match device.queue_present_khr(self.context.present_queue, &present_info) {
            Ok(vk::SuccessCode::SUBOPTIMAL_KHR) => FrameStatus::RequiresResize,
            Ok(_) => FrameStatus::Rendered,
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => FrameStatus::RequiresResize,
            Err(error) => return Err(error.into()),
        };

        self.frame = advance_frame(self.frame, self.context.in_flight_fences.len());

        Ok(status)
    }

    /// Rebuilds everything that depends on the surface extent. Forces the
    /// GPU idle first, then destroys pipeline, framebuffers, render pass,
    /// depth target, image views and command buffers in reverse dependency
    /// order before recreating them. Synchronization objects and mesh
    /// buffers are left untouched; their count matches the swapchain image
    /// count, which is assumed stable across resizes.
    pub unsafe fn resize(&mut self, width: u32, height: u32) -> Result<(), RendererError> {
        self.device.vk_device.device_wait_idle()?;

        self.destroy_extent_dependents();
        self.create_render_resources(width, height)?;

        self.progress.assert_created(Stage::CommandBuffersAllocated);
        VulkanCommandBuffer::allocate(&self.device, &mut self.context)?;

        self.progress.assert_created(Stage::RenderPassCreated);
        VulkanPipeline::create(&self.device, &mut self.context)?;
        self.progress.mark_created(Stage::PipelineCreated);

        info!("Resized render resources to {}x{}.", width, height);

        Ok(())
    }

    /// Resize-scope teardown. The old swapchain itself is not destroyed
    /// here: recreation hands it to the driver as a reuse hint. Command
    /// buffers are returned to the surviving pool rather than destroying
    /// the pool.
    unsafe fn destroy_extent_dependents(&mut self) {
        {
            let device = &self.device.vk_device;
            let context = &self.context;
            let progress = &mut self.progress;

            progress.destroy_if_created(Stage::PipelineCreated, || {
                device.destroy_pipeline(context.pipeline, None);
                device.destroy_pipeline_layout(context.pipeline_layout, None);
            });
            progress.destroy_if_created(Stage::FramebuffersCreated, || {
                context
                    .framebuffers
                    .iter()
                    .for_each(|f| device.destroy_framebuffer(*f, None));
            });
            progress.destroy_if_created(Stage::RenderPassCreated, || {
                device.destroy_render_pass(context.render_pass, None);
            });
            progress.destroy_if_created(Stage::DepthResourcesCreated, || {
                device.destroy_image_view(context.depth_image_view, None);
                device.destroy_image(context.depth_image, None);
                device.free_memory(context.depth_image_memory, None);
            });
            progress.destroy_if_created(Stage::ImageViewsCreated, || {
                context
                    .swapchain_image_views
                    .iter()
                    .for_each(|v| device.destroy_image_view(*v, None));
            });

            device.free_command_buffers(context.command_pool, &context.command_buffers);
        }

        self.context.framebuffers.clear();
        self.context.swapchain_image_views.clear();
        self.context.command_buffers.clear();
    }

    /// Full teardown in reverse dependency order. Each destroy action runs
    /// only if its stage actually completed, so this is safe to call after
    /// a partial initialization failure and is idempotent.
    pub unsafe fn destroy(&mut self) {
        if self.progress.is_created(Stage::DeviceCreated) {
            if let Err(error) = self.device.vk_device.device_wait_idle() {
                warn!("Device wait before teardown failed: {}.", error);
            }
        }

        let device = &self.device.vk_device;
        let instance = &self.instance.vk_instance;
        let context = &self.context;
        let progress = &mut self.progress;

        progress.destroy_if_created(Stage::SyncObjectsCreated, || {
            context
                .in_flight_fences
                .iter()
                .for_each(|f| device.destroy_fence(*f, None));
            context
                .render_finished_semaphores
                .iter()
                .for_each(|s| device.destroy_semaphore(*s, None));
            context
                .image_available_semaphores
                .iter()
                .for_each(|s| device.destroy_semaphore(*s, None));
        });
        progress.destroy_if_created(Stage::PipelineCreated, || {
            device.destroy_pipeline(context.pipeline, None);
            device.destroy_pipeline_layout(context.pipeline_layout, None);
        });
        progress.destroy_if_created(Stage::FramebuffersCreated, || {
            context
                .framebuffers
                .iter()
                .for_each(|f| device.destroy_framebuffer(*f, None));
        });
        progress.destroy_if_created(Stage::DepthResourcesCreated, || {
            device.destroy_image_view(context.depth_image_view, None);
            device.destroy_image(context.depth_image, None);
            device.free_memory(context.depth_image_memory, None);
        });
        progress.destroy_if_created(Stage::ImageViewsCreated, || {
            context
                .swapchain_image_views
                .iter()
                .for_each(|v| device.destroy_image_view(*v, None));
        });
        progress.destroy_if_created(Stage::SwapchainCreated, || {
            device.destroy_swapchain_khr(context.swapchain, None);
        });
        progress.destroy_if_created(Stage::CommandBuffersAllocated, || {
            device.destroy_command_pool(context.command_pool, None);
        });
        progress.destroy_if_created(Stage::RenderPassCreated, || {
            device.destroy_render_pass(context.render_pass, None);
        });
        progress.destroy_if_created(Stage::VertexInputUploaded, || {
            device.destroy_buffer(context.index_buffer, None);
            device.destroy_buffer(context.vertex_buffer, None);
            device.free_memory(context.mesh_memory, None);
        });

        let vk_device_owner = &self.device;
        progress.destroy_if_created(Stage::DeviceCreated, || {
            vk_device_owner.destroy();
        });
        progress.destroy_if_created(Stage::SurfaceCreated, || {
            instance.destroy_surface_khr(context.surface, None);
        });

        let instance_owner = &self.instance;
        progress.destroy_if_created(Stage::InstanceCreated, || {
            if context.messenger_enabled {
                instance.destroy_debug_utils_messenger_ext(context.messenger, None);
            }
            instance_owner.destroy();
        });
    }

    pub unsafe fn device_wait_idle(&self) -> Result<(), RendererError> {
        Ok(self.device.vk_device.device_wait_idle()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_cycles_through_the_image_count() {
        let count = 3;
        let mut frame = 0;
        let mut seen = vec![];

        for _ in 0..count {
            seen.push(frame);
            frame = advance_frame(frame, count);
        }

        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(frame, 0);
    }
}
