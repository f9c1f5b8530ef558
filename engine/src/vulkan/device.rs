//! Physical device selection and logical device creation.
//!
//! Selection is first-fit: devices are scanned in enumeration order (discrete
//! GPUs moved to the front, but never hard-required) and the first one that
//! satisfies the queue and extension requirements wins.

use log::*;
use std::collections::HashSet;
use thiserror::Error;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk::KhrSurfaceExtension;
use vulkanalia::{vk, Device, Entry};

use super::swapchain::{select_present_mode, select_surface_format};
use super::{constants, context::VulkanContext, instance::VulkanInstance};
use super::error::RendererError;

#[derive(Debug)]
pub struct VulkanDevice {
    pub vk_device: Device,
}

/// Why a particular physical device was skipped during selection.
#[derive(Debug, Error)]
#[error("Missing {0}.")]
pub struct SuitabilityError(pub &'static str);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: u32,
    pub present: u32,
}

/// Resolves the graphics and presentation roles to queue family indices.
/// The two roles may alias to the same family.
pub fn select_queue_families(
    properties: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Option<QueueFamilyIndices> {
    let graphics = properties
        .iter()
        .position(|p| p.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|i| i as u32)?;

    let present = present_support.iter().position(|s| *s).map(|i| i as u32)?;

    Some(QueueFamilyIndices { graphics, present })
}

/// Device extensions from `required` that the device does not report.
pub fn missing_device_extensions(
    available: &HashSet<vk::ExtensionName>,
    required: &[vk::ExtensionName],
) -> Vec<vk::ExtensionName> {
    required
        .iter()
        .filter(|e| !available.contains(e))
        .copied()
        .collect()
}

/// Discrete GPUs are scanned first; everything else keeps enumeration order.
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    if device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
        0
    } else {
        1
    }
}

impl QueueFamilyIndices {
    pub unsafe fn get(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, SuitabilityError> {
        let properties = instance
            .vk_instance
            .get_physical_device_queue_family_properties(physical_device);

        let present_support = (0..properties.len() as u32)
            .map(|index| {
                instance
                    .vk_instance
                    .get_physical_device_surface_support_khr(
                        physical_device,
                        index,
                        context.surface,
                    )
                    .unwrap_or(false)
            })
            .collect::<Vec<_>>();

        select_queue_families(&properties, &present_support)
            .ok_or(SuitabilityError("required queue families"))
    }
}

/// Surface capabilities, formats and present modes reported for a device.
/// Capabilities are re-queried on every swapchain rebuild; formats and
/// present modes are sampled once at selection time.
#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self, RendererError> {
        Ok(Self {
            capabilities: instance
                .vk_instance
                .get_physical_device_surface_capabilities_khr(physical_device, context.surface)?,
            formats: instance
                .vk_instance
                .get_physical_device_surface_formats_khr(physical_device, context.surface)?,
            present_modes: instance
                .vk_instance
                .get_physical_device_surface_present_modes_khr(physical_device, context.surface)?,
        })
    }
}

impl VulkanDevice {
    unsafe fn check_physical_device(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<(), SuitabilityError> {
        QueueFamilyIndices::get(instance, context, physical_device)?;

        let available = instance
            .vk_instance
            .enumerate_device_extension_properties(physical_device, None)
            .map_err(|_| SuitabilityError("queryable device extensions"))?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let missing = missing_device_extensions(&available, constants::REQUIRED_DEVICE_EXTENSIONS);
        if !missing.is_empty() {
            return Err(SuitabilityError("required device extensions"));
        }

        let support = SwapchainSupport::get(instance, context, physical_device)
            .map_err(|_| SuitabilityError("queryable swapchain support"))?;
        if support.formats.is_empty() || support.present_modes.is_empty() {
            return Err(SuitabilityError("swapchain support"));
        }

        Ok(())
    }

    /// First-fit scan over all physical devices. Records the chosen device,
    /// its queue family indices, and the surface format / present mode that
    /// stay fixed for the lifetime of the context.
    unsafe fn pick_physical_device(
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<(), RendererError> {
        let mut candidates = instance.vk_instance.enumerate_physical_devices()?;
        candidates.sort_by_key(|d| {
            device_type_rank(
                instance
                    .vk_instance
                    .get_physical_device_properties(*d)
                    .device_type,
            )
        });

        for physical_device in candidates {
            let properties = instance
                .vk_instance
                .get_physical_device_properties(physical_device);

            if let Err(error) =
                VulkanDevice::check_physical_device(instance, context, physical_device)
            {
                warn!(
                    "Skipping physical device (`{}`): {}",
                    properties.device_name, error
                );
            } else {
                info!("Selected physical device (`{}`).", properties.device_name);

                let indices = QueueFamilyIndices::get(instance, context, physical_device)
                    .map_err(|_| RendererError::NoSuitableDevice)?;
                let support = SwapchainSupport::get(instance, context, physical_device)?;

                context.physical_device = physical_device;
                context.graphics_family = indices.graphics;
                context.present_family = indices.present;
                context.surface_format = select_surface_format(&support.formats);
                context.present_mode = select_present_mode(&support.present_modes);

                info!(
                    "Surface format {:?} ({:?}), present mode {:?}.",
                    context.surface_format.format,
                    context.surface_format.color_space,
                    context.present_mode
                );
                return Ok(());
            }
        }

        Err(RendererError::NoSuitableDevice)
    }

    /// Creates the logical device with one queue-create-info per *distinct*
    /// queue family and resolves the queue handles.
    pub unsafe fn new(
        entry: &Entry,
        instance: &VulkanInstance,
        context: &mut VulkanContext,
    ) -> Result<VulkanDevice, RendererError> {
        VulkanDevice::pick_physical_device(instance, context)?;

        let mut unique_families = HashSet::new();
        unique_families.insert(context.graphics_family);
        unique_families.insert(context.present_family);

        let queue_priorities = &[1.0];
        let queue_infos = unique_families
            .iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(*family)
                    .queue_priorities(queue_priorities)
            })
            .collect::<Vec<_>>();

        let layers = if constants::VALIDATION_ENABLED {
            vec![constants::VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let mut extensions = constants::REQUIRED_DEVICE_EXTENSIONS
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        if cfg!(target_os = "macos") && entry.version()? >= constants::PORTABILITY_MACOS_VERSION {
            extensions.push(vk::KHR_PORTABILITY_SUBSET_EXTENSION.name.as_ptr());
        }

        let features = vk::PhysicalDeviceFeatures::builder();

        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        let device = instance
            .vk_instance
            .create_device(context.physical_device, &info, None)
            .map_err(RendererError::DeviceCreation)?;

        context.graphics_queue = device.get_device_queue(context.graphics_family, 0);
        context.present_queue = device.get_device_queue(context.present_family, 0);

        Ok(VulkanDevice { vk_device: device })
    }

    pub unsafe fn destroy(&self) {
        self.vk_device.destroy_device(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn graphics_and_present_may_alias() {
        let properties = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = select_queue_families(&properties, &[true]).unwrap();

        assert_eq!(indices.graphics, 0);
        assert_eq!(indices.present, 0);
    }

    #[test]
    fn split_graphics_and_present_families_are_resolved() {
        let properties = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
        ];
        let indices = select_queue_families(&properties, &[false, false, true]).unwrap();

        assert_eq!(indices.graphics, 1);
        assert_eq!(indices.present, 2);
    }

    #[test]
    fn no_present_capable_family_means_no_device() {
        let properties = [family(vk::QueueFlags::GRAPHICS)];
        assert!(select_queue_families(&properties, &[false]).is_none());
    }

    #[test]
    fn no_graphics_family_means_no_device() {
        let properties = [family(vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER)];
        assert!(select_queue_families(&properties, &[true]).is_none());
    }

    #[test]
    fn missing_device_extension_is_reported() {
        let available: HashSet<_> = [vk::ExtensionName::from_bytes(b"VK_KHR_maintenance1")]
            .into_iter()
            .collect();

        let missing = missing_device_extensions(&available, constants::REQUIRED_DEVICE_EXTENSIONS);

        assert_eq!(missing, vec![vk::KHR_SWAPCHAIN_EXTENSION.name]);
    }

    #[test]
    fn present_device_extensions_pass_the_check() {
        let available: HashSet<_> = [vk::KHR_SWAPCHAIN_EXTENSION.name].into_iter().collect();
        assert!(missing_device_extensions(&available, constants::REQUIRED_DEVICE_EXTENSIONS)
            .is_empty());
    }

    #[test]
    fn discrete_gpus_rank_before_everything_else() {
        assert!(
            device_type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
                < device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU)
        );
        assert_eq!(
            device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU),
            device_type_rank(vk::PhysicalDeviceType::CPU)
        );
    }
}
