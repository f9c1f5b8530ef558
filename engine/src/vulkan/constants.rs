use vulkanalia::{vk, Version};

/// The driver must report at least this version for negotiation to succeed.
pub const REQUIRED_API_VERSION: Version = Version::new(1, 2, 0);

pub const PORTABILITY_MACOS_VERSION: Version = Version::new(1, 3, 216);
pub const VALIDATION_ENABLED: bool = cfg!(debug_assertions);
pub const VALIDATION_LAYER: vk::ExtensionName =
    vk::ExtensionName::from_bytes(b"VK_LAYER_KHRONOS_validation");

pub const REQUIRED_DEVICE_EXTENSIONS: &[vk::ExtensionName] = &[vk::KHR_SWAPCHAIN_EXTENSION.name];

/// Clear values for every recorded frame.
pub const CLEAR_COLOR: [f32; 4] = [0.015, 0.015, 0.03, 1.0];
pub const CLEAR_DEPTH: f32 = 0.0;
pub const CLEAR_STENCIL: u32 = 0;
