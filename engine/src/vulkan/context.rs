use vulkanalia::vk;

/// The Vulkan handles and associated properties owned by the renderer.
///
/// Handles default to null; a null handle is never destroyed, so a partially
/// filled context can always be torn down safely.
#[derive(Clone, Debug, Default)]
pub struct VulkanContext {
    // Debug
    pub messenger: vk::DebugUtilsMessengerEXT,
    pub messenger_enabled: bool,

    // Surface
    pub surface: vk::SurfaceKHR,

    // Physical device and queues
    pub physical_device: vk::PhysicalDevice,
    pub graphics_family: u32,
    pub present_family: u32,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,

    // Chosen once at device selection, assumed stable across resizes
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,

    // Swapchain
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,

    // Depth target
    pub depth_format: vk::Format,
    pub depth_image: vk::Image,
    pub depth_image_memory: vk::DeviceMemory,
    pub depth_image_view: vk::ImageView,

    // Render pass and framebuffers
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,

    // Mesh buffers (one shared device-local allocation)
    pub vertex_buffer: vk::Buffer,
    pub index_buffer: vk::Buffer,
    pub mesh_memory: vk::DeviceMemory,
    pub index_count: u32,

    // Pipeline
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,

    // Commands
    pub command_pool: vk::CommandPool,
    pub command_buffers: Vec<vk::CommandBuffer>,

    // Per-image synchronization
    pub image_available_semaphores: Vec<vk::Semaphore>,
    pub render_finished_semaphores: Vec<vk::Semaphore>,
    pub in_flight_fences: Vec<vk::Fence>,
}
