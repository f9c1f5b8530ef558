//! Depth target: format probing, image and view creation, and the memory
//! binding behind them.

use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

use super::device::VulkanDevice;
use super::error::RendererError;
use super::memory::MemoryTypeSelector;
use super::{context::VulkanContext, instance::VulkanInstance};

const DEPTH_FORMAT_CANDIDATES: &[vk::Format] = &[
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

#[derive(Debug)]
pub struct VulkanImage;

/// First candidate whose reported properties carry `features` for the given
/// tiling. `properties_of` is the driver query, injected so the scan itself
/// stays a plain function.
pub fn first_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    properties_of: impl Fn(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|f| {
        let properties = properties_of(*f);
        match tiling {
            vk::ImageTiling::LINEAR => properties.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => properties.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

impl VulkanImage {
    unsafe fn create_image(
        device: &VulkanDevice,
        selector: &dyn MemoryTypeSelector,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        width: u32,
        height: u32,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory), RendererError> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(format)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .samples(vk::SampleCountFlags::_1)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let image = device
            .vk_device
            .create_image(&info, None)
            .map_err(RendererError::Memory)?;

        let requirements = device.vk_device.get_image_memory_requirements(image);
        let memory_type_index = selector.select(
            memory_properties,
            requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = device
            .vk_device
            .allocate_memory(&allocate_info, None)
            .map_err(RendererError::Memory)?;

        device
            .vk_device
            .bind_image_memory(image, memory, 0)
            .map_err(RendererError::Memory)?;

        Ok((image, memory))
    }

    unsafe fn create_image_view(
        device: &VulkanDevice,
        image: vk::Image,
        format: vk::Format,
        aspects: vk::ImageAspectFlags,
    ) -> Result<vk::ImageView, RendererError> {
        let subresource_range = vk::ImageSubresourceRange::builder()
            .aspect_mask(aspects)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::_2D)
            .format(format)
            .subresource_range(subresource_range);

        Ok(device.vk_device.create_image_view(&info, None)?)
    }

    /// Probes a depth format, then creates the image, memory and view sized
    /// to the current swapchain extent. Called again on every resize.
    pub unsafe fn create_depth_objects(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        selector: &dyn MemoryTypeSelector,
    ) -> Result<(), RendererError> {
        let physical_device = context.physical_device;
        let format = first_supported_format(
            DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| {
                instance
                    .vk_instance
                    .get_physical_device_format_properties(physical_device, f)
            },
        )
        .ok_or(RendererError::Driver(vk::ErrorCode::FORMAT_NOT_SUPPORTED))?;

        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);

        let (image, memory) = Self::create_image(
            device,
            selector,
            &memory_properties,
            context.swapchain_extent.width,
            context.swapchain_extent.height,
            format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;

        context.depth_format = format;
        context.depth_image = image;
        context.depth_image_memory = memory;
        context.depth_image_view =
            Self::create_image_view(device, image, format, vk::ImageAspectFlags::DEPTH)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(optimal: vk::FormatFeatureFlags) -> vk::FormatProperties {
        vk::FormatProperties {
            optimal_tiling_features: optimal,
            ..Default::default()
        }
    }

    #[test]
    fn first_candidate_with_the_feature_wins() {
        let chosen = first_supported_format(
            DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |f| {
                if f == vk::Format::D32_SFLOAT {
                    properties(vk::FormatFeatureFlags::empty())
                } else {
                    properties(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
                }
            },
        );

        assert_eq!(chosen, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn no_supported_candidate_yields_none() {
        let chosen = first_supported_format(
            DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| properties(vk::FormatFeatureFlags::empty()),
        );

        assert_eq!(chosen, None);
    }

    #[test]
    fn linear_tiling_reads_the_linear_feature_set() {
        let chosen = first_supported_format(
            &[vk::Format::D32_SFLOAT],
            vk::ImageTiling::LINEAR,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );

        assert_eq!(chosen, Some(vk::Format::D32_SFLOAT));
    }
}
