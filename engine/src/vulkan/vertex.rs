//! The vertex format and the built-in triangle geometry.

use std::mem::size_of;
use vulkanalia::prelude::v1_0::*;
use vulkanalia::vk;

/// Interleaved position and color, tightly packed.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Vertex {
    pub position: [f32; 3],
    pub color: [f32; 3],
}

impl Vertex {
    pub const fn new(position: [f32; 3], color: [f32; 3]) -> Self {
        Self { position, color }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        let position = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(0)
            .build();

        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(size_of::<[f32; 3]>() as u32)
            .build();

        [position, color]
    }
}

// Counter-clockwise winding, matching the pipeline's front-face setting.
pub const TRIANGLE_VERTICES: [Vertex; 3] = [
    Vertex::new([0.0, -0.5, 0.0], [1.0, 0.2, 0.2]),
    Vertex::new([-0.5, 0.5, 0.0], [0.2, 0.2, 1.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.2, 1.0, 0.2]),
];

pub const TRIANGLE_INDICES: [u16; 3] = [0, 1, 2];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_is_tightly_packed() {
        assert_eq!(size_of::<Vertex>(), 6 * size_of::<f32>());
    }

    #[test]
    fn stride_matches_the_vertex_size() {
        assert_eq!(
            Vertex::binding_description().stride as usize,
            size_of::<Vertex>()
        );
    }

    #[test]
    fn color_attribute_starts_after_position() {
        let [position, color] = Vertex::attribute_descriptions();
        assert_eq!(position.offset, 0);
        assert_eq!(color.offset as usize, size_of::<[f32; 3]>());
    }

    #[test]
    fn triangle_indices_cover_every_vertex() {
        assert_eq!(TRIANGLE_INDICES.len(), TRIANGLE_VERTICES.len());
        for index in TRIANGLE_INDICES {
            assert!((index as usize) < TRIANGLE_VERTICES.len());
        }
    }
}
