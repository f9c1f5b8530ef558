//! Mesh upload: a host-visible staging buffer is filled, then copied into
//! vertex and index buffers backed by one shared device-local allocation.

use log::*;
use std::mem::size_of_val;
use std::ptr::copy_nonoverlapping as memcpy;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

use super::device::VulkanDevice;
use super::error::RendererError;
use super::memory::MemoryTypeSelector;
use super::vertex::{TRIANGLE_INDICES, TRIANGLE_VERTICES};
use super::{context::VulkanContext, instance::VulkanInstance};

#[derive(Debug)]
pub struct VulkanBuffer;

/// Placement of the vertex and index regions inside one allocation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct AllocationPlan {
    pub vertex_offset: u64,
    pub index_offset: u64,
    pub total_size: u64,
    pub memory_type_bits: u32,
}

/// Smallest multiple of `alignment` at or above `offset`. Vulkan alignments
/// are powers of two and never zero.
pub fn align_up(offset: u64, alignment: u64) -> u64 {
    (offset + alignment - 1) & !(alignment - 1)
}

/// Lays out the vertex region at offset zero and the index region at the
/// next offset satisfying its alignment. The usable memory types are the
/// intersection of what both buffers accept.
pub fn plan_shared_allocation(
    vertex: vk::MemoryRequirements,
    index: vk::MemoryRequirements,
) -> AllocationPlan {
    let index_offset = align_up(vertex.size, index.alignment);
    AllocationPlan {
        vertex_offset: 0,
        index_offset,
        total_size: index_offset + index.size,
        memory_type_bits: vertex.memory_type_bits & index.memory_type_bits,
    }
}

impl VulkanBuffer {
    unsafe fn create_buffer(
        device: &VulkanDevice,
        size: u64,
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::MemoryRequirements), RendererError> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device
            .vk_device
            .create_buffer(&info, None)
            .map_err(RendererError::Memory)?;
        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);

        Ok((buffer, requirements))
    }

    unsafe fn allocate(
        device: &VulkanDevice,
        selector: &dyn MemoryTypeSelector,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<vk::DeviceMemory, RendererError> {
        let memory_type_index = selector.select(memory_properties, requirements, properties)?;

        let info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        device
            .vk_device
            .allocate_memory(&info, None)
            .map_err(RendererError::Memory)
    }

    /// Records a one-shot copy of both regions out of the staging buffer and
    /// blocks until the queue has drained it. Blocking makes it safe to
    /// destroy the staging buffer immediately afterwards.
    unsafe fn copy_from_staging(
        device: &VulkanDevice,
        context: &VulkanContext,
        staging: vk::Buffer,
        vertex_size: u64,
        index_size: u64,
    ) -> Result<(), RendererError> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_pool(context.command_pool)
            .command_buffer_count(1);

        let command_buffer = device
            .vk_device
            .allocate_command_buffers(&allocate_info)
            .map_err(RendererError::Upload)?[0];

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        device
            .vk_device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(RendererError::Upload)?;

        let vertex_region = vk::BufferCopy::builder().src_offset(0).size(vertex_size);
        device.vk_device.cmd_copy_buffer(
            command_buffer,
            staging,
            context.vertex_buffer,
            &[vertex_region],
        );

        let index_region = vk::BufferCopy::builder()
            .src_offset(vertex_size)
            .dst_offset(0)
            .size(index_size);
        device.vk_device.cmd_copy_buffer(
            command_buffer,
            staging,
            context.index_buffer,
            &[index_region],
        );

        device
            .vk_device
            .end_command_buffer(command_buffer)
            .map_err(RendererError::Upload)?;

        let command_buffers = &[command_buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers);

        device
            .vk_device
            .queue_submit(context.graphics_queue, &[submit_info], vk::Fence::null())
            .map_err(RendererError::Upload)?;
        device
            .vk_device
            .queue_wait_idle(context.graphics_queue)
            .map_err(RendererError::Upload)?;

        device
            .vk_device
            .free_command_buffers(context.command_pool, &[command_buffer]);

        Ok(())
    }

    /// Uploads the mesh once at startup. The resulting buffers survive
    /// swapchain rebuilds untouched.
    pub unsafe fn create(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        selector: &dyn MemoryTypeSelector,
    ) -> Result<(), RendererError> {
        let vertex_size = size_of_val(&TRIANGLE_VERTICES) as u64;
        let index_size = size_of_val(&TRIANGLE_INDICES) as u64;

        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);

        // Device-local destination buffers sharing one allocation.
        let (vertex_buffer, vertex_requirements) = Self::create_buffer(
            device,
            vertex_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;
        let (index_buffer, index_requirements) = Self::create_buffer(
            device,
            index_size,
            vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        let plan = plan_shared_allocation(vertex_requirements, index_requirements);
        let shared_requirements = vk::MemoryRequirements {
            size: plan.total_size,
            alignment: vertex_requirements.alignment.max(index_requirements.alignment),
            memory_type_bits: plan.memory_type_bits,
        };

        let mesh_memory = Self::allocate(
            device,
            selector,
            &memory_properties,
            shared_requirements,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )?;

        device
            .vk_device
            .bind_buffer_memory(vertex_buffer, mesh_memory, plan.vertex_offset)
            .map_err(RendererError::Memory)?;
        device
            .vk_device
            .bind_buffer_memory(index_buffer, mesh_memory, plan.index_offset)
            .map_err(RendererError::Memory)?;

        context.vertex_buffer = vertex_buffer;
        context.index_buffer = index_buffer;
        context.mesh_memory = mesh_memory;
        context.index_count = TRIANGLE_INDICES.len() as u32;

        // Staging buffer carrying vertices then indices, back to back.
        let (staging_buffer, staging_requirements) = Self::create_buffer(
            device,
            vertex_size + index_size,
            vk::BufferUsageFlags::TRANSFER_SRC,
        )?;
        let staging_memory = Self::allocate(
            device,
            selector,
            &memory_properties,
            staging_requirements,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;
        device
            .vk_device
            .bind_buffer_memory(staging_buffer, staging_memory, 0)
            .map_err(RendererError::Memory)?;

        let mapped = device
            .vk_device
            .map_memory(
                staging_memory,
                0,
                vertex_size + index_size,
                vk::MemoryMapFlags::empty(),
            )
            .map_err(RendererError::Memory)?;

        memcpy(
            TRIANGLE_VERTICES.as_ptr(),
            mapped.cast(),
            TRIANGLE_VERTICES.len(),
        );
        memcpy(
            TRIANGLE_INDICES.as_ptr(),
            mapped.cast::<u8>().add(vertex_size as usize).cast(),
            TRIANGLE_INDICES.len(),
        );

        device.vk_device.unmap_memory(staging_memory);

        let copied = Self::copy_from_staging(device, context, staging_buffer, vertex_size, index_size);

        device.vk_device.destroy_buffer(staging_buffer, None);
        device.vk_device.free_memory(staging_memory, None);
        copied?;

        info!(
            "Mesh uploaded ({} vertices, {} indices, {} bytes device-local).",
            TRIANGLE_VERTICES.len(),
            context.index_count,
            plan.total_size
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirements(size: u64, alignment: u64, memory_type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size,
            alignment,
            memory_type_bits,
        }
    }

    #[test]
    fn align_up_rounds_to_the_next_multiple() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn index_region_starts_at_an_aligned_offset() {
        let plan = plan_shared_allocation(
            requirements(100, 4, 0b1111),
            requirements(24, 16, 0b1111),
        );

        assert_eq!(plan.vertex_offset, 0);
        assert_eq!(plan.index_offset, 112);
        assert_eq!(plan.total_size, 136);
    }

    #[test]
    fn already_aligned_regions_stay_packed() {
        let plan = plan_shared_allocation(
            requirements(128, 16, 0b1),
            requirements(64, 16, 0b1),
        );

        assert_eq!(plan.index_offset, 128);
        assert_eq!(plan.total_size, 192);
    }

    #[test]
    fn memory_type_bits_are_intersected() {
        let plan = plan_shared_allocation(
            requirements(8, 4, 0b0110),
            requirements(8, 4, 0b1100),
        );

        assert_eq!(plan.memory_type_bits, 0b0100);
    }
}
