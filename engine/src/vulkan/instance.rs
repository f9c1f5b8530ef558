//! Capability negotiation and instance creation: verifies the driver's API
//! version, builds the enabled extension/layer lists from what is actually
//! available, and registers the diagnostic callback when possible.

use log::*;
use std::collections::HashSet;
use std::ffi::CStr;
use std::os::raw::c_void;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;
use vulkanalia::vk::ExtDebugUtilsExtension;
use vulkanalia::window as vk_window;
use vulkanalia::{Entry, Instance, Version};
use winit::window::Window;

use super::constants;
use super::context::VulkanContext;
use super::error::RendererError;

#[derive(Debug)]
pub struct VulkanInstance {
    pub vk_instance: Instance,
}

/// Fails when the driver's reported version is below the required minimum.
pub fn check_api_version(found: Version, required: Version) -> Result<(), RendererError> {
    if found < required {
        Err(RendererError::UnsupportedApiVersion { found, required })
    } else {
        Ok(())
    }
}

/// Builds the enabled instance extension list. Every `required` extension
/// must be present; `optional` ones (debug utils) degrade silently to
/// disabled so builds without them still run.
pub fn negotiate_extensions(
    available: &HashSet<vk::ExtensionName>,
    required: &[vk::ExtensionName],
    optional: &[vk::ExtensionName],
) -> Result<Vec<vk::ExtensionName>, RendererError> {
    let mut enabled = Vec::with_capacity(required.len() + optional.len());

    for extension in required {
        if !available.contains(extension) {
            return Err(RendererError::MissingExtension(extension.to_string()));
        }
        enabled.push(*extension);
    }

    for extension in optional {
        if available.contains(extension) {
            enabled.push(*extension);
        } else {
            warn!("Optional instance extension {} unavailable, disabling.", extension);
        }
    }

    Ok(enabled)
}

/// The validation layer is debug-only: absence downgrades to "disabled"
/// rather than failing negotiation.
pub fn negotiate_layers(available: &HashSet<vk::ExtensionName>) -> Vec<vk::ExtensionName> {
    if constants::VALIDATION_ENABLED && available.contains(&constants::VALIDATION_LAYER) {
        vec![constants::VALIDATION_LAYER]
    } else {
        if constants::VALIDATION_ENABLED {
            warn!("Validation layer requested but not supported, running without it.");
        }
        Vec::new()
    }
}

impl VulkanInstance {
    pub unsafe fn new(
        window: &Window,
        entry: &Entry,
        context: &mut VulkanContext,
    ) -> Result<VulkanInstance, RendererError> {
        check_api_version(entry.version()?, constants::REQUIRED_API_VERSION)?;

        // Application Info
        let application_info = vk::ApplicationInfo::builder()
            .application_name(b"Meridian\0")
            .application_version(vk::make_version(1, 0, 0))
            .engine_name(b"Meridian\0")
            .engine_version(vk::make_version(1, 0, 0))
            .api_version(vk::make_version(1, 2, 0));

        // Layers
        let available_layers = entry
            .enumerate_instance_layer_properties()?
            .iter()
            .map(|l| l.layer_name)
            .collect::<HashSet<_>>();

        let enabled_layers = negotiate_layers(&available_layers);
        let layers = enabled_layers.iter().map(|l| l.as_ptr()).collect::<Vec<_>>();

        // Extensions
        let available_extensions = entry
            .enumerate_instance_extension_properties(None)?
            .iter()
            .map(|e| e.extension_name)
            .collect::<HashSet<_>>();

        let mut required = vk_window::get_required_instance_extensions(window)
            .iter()
            .map(|e| **e)
            .collect::<Vec<_>>();

        // Required by Vulkan SDK on macOS since 1.3.216.
        let flags = if cfg!(target_os = "macos")
            && entry.version()? >= constants::PORTABILITY_MACOS_VERSION
        {
            info!("Enabling extensions for macOS portability.");
            required.push(vk::KHR_GET_PHYSICAL_DEVICE_PROPERTIES2_EXTENSION.name);
            required.push(vk::KHR_PORTABILITY_ENUMERATION_EXTENSION.name);
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let optional = if constants::VALIDATION_ENABLED {
            vec![vk::EXT_DEBUG_UTILS_EXTENSION.name]
        } else {
            Vec::new()
        };

        let enabled_extensions = negotiate_extensions(&available_extensions, &required, &optional)?;
        let debug_enabled = enabled_extensions.contains(&vk::EXT_DEBUG_UTILS_EXTENSION.name);
        let extensions = enabled_extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        // Create
        let mut info = vk::InstanceCreateInfo::builder()
            .application_info(&application_info)
            .enabled_layer_names(&layers)
            .enabled_extension_names(&extensions)
            .flags(flags);

        let mut debug_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(vk::DebugUtilsMessageSeverityFlagsEXT::all())
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .user_callback(Some(debug_callback));

        if debug_enabled {
            info = info.push_next(&mut debug_info);
        }

        let instance = entry.create_instance(&info, None)?;

        // Messenger
        if debug_enabled {
            context.messenger = instance.create_debug_utils_messenger_ext(&debug_info, None)?;
            context.messenger_enabled = true;
        }

        Ok(VulkanInstance {
            vk_instance: instance,
        })
    }

    pub unsafe fn destroy(&self) {
        self.vk_instance.destroy_instance(None);
    }
}

/// Diagnostic callback for driver messages. Must never abort the triggering
/// operation, hence the unconditional `vk::FALSE`.
extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    type_: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _: *mut c_void,
) -> vk::Bool32 {
    let data = unsafe { *data };
    let message = unsafe { CStr::from_ptr(data.message) }.to_string_lossy();

    if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        error!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        warn!("({:?}) {}", type_, message);
    } else if severity >= vk::DebugUtilsMessageSeverityFlagsEXT::INFO {
        debug!("({:?}) {}", type_, message);
    } else {
        trace!("({:?}) {}", type_, message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn name(bytes: &[u8]) -> vk::ExtensionName {
        vk::ExtensionName::from_bytes(bytes)
    }

    #[test]
    fn api_version_below_required_is_rejected() {
        let result = check_api_version(Version::new(1, 1, 0), Version::new(1, 2, 0));
        assert!(matches!(
            result,
            Err(RendererError::UnsupportedApiVersion { .. })
        ));
    }

    #[test]
    fn api_version_at_or_above_required_passes() {
        assert!(check_api_version(Version::new(1, 2, 0), Version::new(1, 2, 0)).is_ok());
        assert!(check_api_version(Version::new(1, 3, 250), Version::new(1, 2, 0)).is_ok());
    }

    #[test]
    fn missing_required_extension_fails_negotiation() {
        let available: HashSet<_> = [name(b"VK_KHR_surface")].into_iter().collect();
        let required = [name(b"VK_KHR_surface"), name(b"VK_KHR_xcb_surface")];

        let result = negotiate_extensions(&available, &required, &[]);

        match result {
            Err(RendererError::MissingExtension(extension)) => {
                assert!(extension.contains("VK_KHR_xcb_surface"));
            }
            other => panic!("expected MissingExtension, got {:?}", other),
        }
    }

    #[test]
    fn missing_optional_extension_degrades_silently() {
        let available: HashSet<_> = [name(b"VK_KHR_surface")].into_iter().collect();
        let required = [name(b"VK_KHR_surface")];
        let optional = [name(b"VK_EXT_debug_utils")];

        let enabled = negotiate_extensions(&available, &required, &optional).unwrap();

        assert_eq!(enabled, vec![name(b"VK_KHR_surface")]);
    }

    #[test]
    fn available_optional_extension_is_enabled() {
        let available: HashSet<_> = [name(b"VK_KHR_surface"), name(b"VK_EXT_debug_utils")]
            .into_iter()
            .collect();
        let required = [name(b"VK_KHR_surface")];
        let optional = [name(b"VK_EXT_debug_utils")];

        let enabled = negotiate_extensions(&available, &required, &optional).unwrap();

        assert!(enabled.contains(&name(b"VK_EXT_debug_utils")));
    }
}
