//! Swapchain creation and the pure selection rules it is built from.

use log::*;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::{self, KhrSwapchainExtension};

use super::device::{SwapchainSupport, VulkanDevice};
use super::error::RendererError;
use super::{context::VulkanContext, instance::VulkanInstance};

#[derive(Debug)]
pub struct VulkanSwapchain;

/// Prefers an 8-bit sRGB format in the sRGB-nonlinear color space, BGRA or
/// RGBA ordering. Never hard-fails: falls back to the first reported format.
pub fn select_surface_format(formats: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .find(|f| {
            f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
                && (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
        })
        .copied()
        .unwrap_or_else(|| formats[0])
}

/// Prefers the low-latency replace-newest mode; FIFO is the universally
/// supported fallback.
pub fn select_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    modes
        .iter()
        .copied()
        .find(|m| *m == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// The surface's reported current extent, unless it reports "don't care"
/// (both dimensions `u32::MAX`), in which case the window size is clamped
/// into the supported range.
pub fn select_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D::builder()
            .width(width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

/// One more image than the reported minimum, so acquisition does not block,
/// clamped to the maximum when the driver reports one (0 means unbounded).
pub fn select_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

impl VulkanSwapchain {
    /// Builds the swapchain for the current surface state. Capabilities are
    /// re-queried on every call because they change across resizes; the old
    /// swapchain is handed to the driver as a reuse hint, then destroyed.
    pub unsafe fn create(
        width: u32,
        height: u32,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        let support = SwapchainSupport::get(instance, context, context.physical_device)?;

        let extent = select_extent(&support.capabilities, width, height);
        let image_count = select_image_count(&support.capabilities);

        let mut queue_family_indices = vec![];
        let image_sharing_mode = if context.graphics_family != context.present_family {
            queue_family_indices.push(context.graphics_family);
            queue_family_indices.push(context.present_family);
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let old_swapchain = context.swapchain;

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(context.surface_format.format)
            .image_color_space(context.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(image_sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(context.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = device
            .vk_device
            .create_swapchain_khr(&info, None)
            .map_err(RendererError::SwapchainCreation)?;

        if !old_swapchain.is_null() {
            device.vk_device.destroy_swapchain_khr(old_swapchain, None);
        }

        context.swapchain = swapchain;
        context.swapchain_extent = extent;
        context.swapchain_images = device.vk_device.get_swapchain_images_khr(swapchain)?;

        info!(
            "Swapchain created ({} images, {:?}, {}x{}).",
            context.swapchain_images.len(),
            context.surface_format.format,
            extent.width,
            extent.height
        );

        Ok(())
    }

    /// One 2D color view per swapchain image: identity component mapping,
    /// single mip level and array layer.
    pub unsafe fn create_image_views(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        context.swapchain_image_views = context
            .swapchain_images
            .iter()
            .map(|i| {
                let components = vk::ComponentMapping::builder()
                    .r(vk::ComponentSwizzle::IDENTITY)
                    .g(vk::ComponentSwizzle::IDENTITY)
                    .b(vk::ComponentSwizzle::IDENTITY)
                    .a(vk::ComponentSwizzle::IDENTITY);

                let subresource_range = vk::ImageSubresourceRange::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1);

                let info = vk::ImageViewCreateInfo::builder()
                    .image(*i)
                    .view_type(vk::ImageViewType::_2D)
                    .format(context.surface_format.format)
                    .components(components)
                    .subresource_range(subresource_range);

                device.vk_device.create_image_view(&info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    #[test]
    fn srgb_nonlinear_bgra_is_preferred() {
        let formats = [
            format(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = select_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_SRGB);
    }

    #[test]
    fn rgba_srgb_is_accepted_too() {
        let formats = [format(vk::Format::R8G8B8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(select_surface_format(&formats).format, vk::Format::R8G8B8A8_SRGB);
    }

    #[test]
    fn format_selection_falls_back_to_first_reported() {
        let formats = [
            format(vk::Format::R5G6B5_UNORM_PACK16, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];

        let chosen = select_surface_format(&formats);
        assert_eq!(chosen.format, vk::Format::R5G6B5_UNORM_PACK16);
    }

    #[test]
    fn mailbox_present_mode_is_preferred() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let modes = [vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED];
        assert_eq!(select_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn current_extent_wins_when_reported() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: 1024,
                height: 768,
            },
            ..Default::default()
        };

        let extent = select_extent(&capabilities, 555, 333);
        assert_eq!((extent.width, extent.height), (1024, 768));
    }

    #[test]
    fn dont_care_extent_clamps_the_window_size() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 320,
                height: 240,
            },
            max_image_extent: vk::Extent2D {
                width: 2048,
                height: 2048,
            },
            ..Default::default()
        };

        let extent = select_extent(&capabilities, 4000, 100);
        assert_eq!((extent.width, extent.height), (2048, 240));
    }

    #[test]
    fn image_count_is_min_plus_one() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            ..Default::default()
        };

        assert_eq!(select_image_count(&capabilities), 3);
    }

    #[test]
    fn image_count_respects_the_maximum() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 3,
            max_image_count: 3,
            ..Default::default()
        };

        assert_eq!(select_image_count(&capabilities), 3);
    }

    #[test]
    fn zero_maximum_means_unbounded() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 4,
            max_image_count: 0,
            ..Default::default()
        };

        assert_eq!(select_image_count(&capabilities), 5);
    }
}
