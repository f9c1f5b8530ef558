//! Memory type selection, injected as a strategy so buffer and image code
//! never hard-codes how a memory type index is picked.

use vulkanalia::vk;

use super::error::RendererError;

/// Maps an allocation request onto one of the physical device's reported
/// memory types. Implementations are pure over the queried properties.
pub trait MemoryTypeSelector: std::fmt::Debug {
    fn select(
        &self,
        properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, RendererError>;
}

/// Default strategy: the first memory type that is both allowed by the
/// requirements bitmask and carries all requested property flags.
#[derive(Clone, Copy, Debug, Default)]
pub struct FirstFitSelector;

impl MemoryTypeSelector for FirstFitSelector {
    fn select(
        &self,
        properties: &vk::PhysicalDeviceMemoryProperties,
        requirements: vk::MemoryRequirements,
        flags: vk::MemoryPropertyFlags,
    ) -> Result<u32, RendererError> {
        (0..properties.memory_type_count)
            .find(|i| {
                let allowed = requirements.memory_type_bits & (1 << i) != 0;
                let memory_type = properties.memory_types[*i as usize];
                allowed && memory_type.property_flags.contains(flags)
            })
            .ok_or(RendererError::Memory(vk::ErrorCode::OUT_OF_DEVICE_MEMORY))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut properties = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            properties.memory_types[i].property_flags = *f;
        }
        properties
    }

    fn requirements(type_bits: u32) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: 1024,
            alignment: 256,
            memory_type_bits: type_bits,
        }
    }

    #[test]
    fn picks_first_matching_type() {
        let properties = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = FirstFitSelector
            .select(
                &properties,
                requirements(0b111),
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )
            .unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn respects_the_requirements_bitmask() {
        let properties = properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 carries the right flags but is excluded by the bitmask.
        let index = FirstFitSelector
            .select(
                &properties,
                requirements(0b10),
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            )
            .unwrap();

        assert_eq!(index, 1);
    }

    #[test]
    fn fails_when_nothing_matches() {
        let properties = properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = FirstFitSelector.select(
            &properties,
            requirements(0b1),
            vk::MemoryPropertyFlags::HOST_VISIBLE,
        );

        assert!(matches!(result, Err(RendererError::Memory(_))));
    }
}
