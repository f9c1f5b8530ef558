use thiserror::Error;
use vulkanalia::{vk, Version};

/// Errors surfaced by the Vulkan backend.
///
/// Every initialization sub-step fails fast: the first error aborts the
/// enclosing multi-step operation and is returned to the caller unchanged.
/// Nothing here is retried automatically.
#[derive(Debug, Error)]
pub enum RendererError {
    #[error("failed to load the Vulkan library: {0}")]
    Library(String),

    #[error("the driver reports Vulkan {found:?}, but at least {required:?} is required")]
    UnsupportedApiVersion { found: Version, required: Version },

    #[error("required instance extension `{0}` is not available")]
    MissingExtension(String),

    #[error("no physical device satisfies the queue and extension requirements")]
    NoSuitableDevice,

    #[error("failed to create the logical device: {0}")]
    DeviceCreation(vk::ErrorCode),

    #[error("failed to create the swapchain: {0}")]
    SwapchainCreation(vk::ErrorCode),

    #[error("device memory allocation or mapping failed: {0}")]
    Memory(vk::ErrorCode),

    #[error("mesh upload failed: {0}")]
    Upload(vk::ErrorCode),

    #[error("failed to build the graphics pipeline: {0}")]
    Pipeline(String),

    #[error("failed to create synchronization objects: {0}")]
    SyncObject(vk::ErrorCode),

    /// Catch-all for driver return codes no other variant claims.
    #[error("unexpected driver error: {0}")]
    Driver(#[from] vk::ErrorCode),
}

/// Outcome of a successfully executed frame.
///
/// `RequiresResize` is a control-flow signal, not a failure: the surface no
/// longer matches the swapchain and the caller must run the resize protocol
/// before drawing again.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Rendered,
    RequiresResize,
}
