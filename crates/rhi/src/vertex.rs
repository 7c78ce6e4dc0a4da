//! Vertex format of the geometry subpass.
//!
//! # Memory Layout
//!
//! | location | field | format | offset |
//! |---|---|---|---|
//! | 0 | `position` | R32G32B32_SFLOAT | 0 |
//! | 1 | `color` | R32G32B32_SFLOAT | 12 |
//! | 2 | `tex_coord` | R32G32_SFLOAT | 24 |
//!
//! Stride is 32 bytes.

use std::mem::offset_of;

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Per-vertex attributes: position, color and texture coordinate.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Position in model space.
    pub position: Vec3,
    /// Linear RGB color.
    pub color: Vec3,
    /// Texture coordinate.
    pub tex_coord: Vec2,
}

impl Vertex {
    /// Creates a new vertex.
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Binding 0, advanced per vertex.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Attribute descriptions for locations 0..=2.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        let offsets: Vec<u32> = attrs.iter().map(|a| a.offset).collect();
        let locations: Vec<u32> = attrs.iter().map(|a| a.location).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(locations, vec![0, 1, 2]);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
    }

    #[test]
    fn test_vertex_bytes() {
        let v = Vertex::new(Vec3::new(1.0, 2.0, 3.0), Vec3::X, Vec2::new(0.5, 0.25));
        let floats: &[f32] = bytemuck::cast_slice(bytemuck::bytes_of(&v));
        assert_eq!(floats, &[1.0, 2.0, 3.0, 1.0, 0.0, 0.0, 0.5, 0.25]);
    }
}
