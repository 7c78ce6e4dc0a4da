//! Host-side mesh descriptions.
//!
//! [`MeshData`] is what the mesh/scene import side hands to the renderer:
//! vertices, triangle-list indices and an optional texture reference.

use glam::{Vec2, Vec3};
use subpass_rhi::vertex::Vertex;

use crate::image_data::ImageData;

/// A named texture to be bound to a mesh.
///
/// Textures are deduplicated by `name` on the GPU side, so two references
/// with the same name share one upload.
#[derive(Clone, Debug)]
pub struct TextureRef {
    pub name: String,
    pub image: ImageData,
}

impl TextureRef {
    pub fn new(name: impl Into<String>, image: ImageData) -> Self {
        Self {
            name: name.into(),
            image,
        }
    }
}

/// One indexed triangle list.
#[derive(Clone, Debug, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    /// `None` draws with the default white texture.
    pub texture: Option<TextureRef>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self {
            vertices,
            indices,
            texture: None,
        }
    }

    pub fn with_texture(mut self, texture: TextureRef) -> Self {
        self.texture = Some(texture);
        self
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Index list shared by both reference quads.
pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

fn quad(half_width: f32, half_height: f32, colors: [Vec3; 4]) -> MeshData {
    let corners = [
        (Vec3::new(-half_width, half_height, 0.0), Vec2::new(1.0, 1.0)),
        (Vec3::new(-half_width, -half_height, 0.0), Vec2::new(1.0, 0.0)),
        (Vec3::new(half_width, -half_height, 0.0), Vec2::new(0.0, 0.0)),
        (Vec3::new(half_width, half_height, 0.0), Vec2::new(0.0, 1.0)),
    ];
    let vertices = corners
        .iter()
        .zip(colors)
        .map(|(&(position, uv), color)| Vertex::new(position, color, uv))
        .collect();
    MeshData::new(vertices, QUAD_INDICES.to_vec())
}

/// The two quads of the reference scene.
///
/// Quad A spans ±0.4 with red, green, blue and yellow corners. Quad B spans
/// ±0.25 by ±0.6 with magenta, yellow, cyan and white corners.
pub fn reference_quads() -> [MeshData; 2] {
    let a = quad(
        0.4,
        0.4,
        [
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(0.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
        ],
    );
    let b = quad(
        0.25,
        0.6,
        [
            Vec3::new(1.0, 0.0, 1.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(0.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 1.0),
        ],
    );
    [a, b]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reference_quads_shape() {
        for mesh in reference_quads() {
            assert_eq!(mesh.vertices.len(), 4);
            assert_eq!(mesh.indices, QUAD_INDICES);
            assert_eq!(mesh.triangle_count(), 2);
            assert!(mesh.texture.is_none());
        }
    }

    #[test]
    fn test_reference_quad_extents() {
        let [a, b] = reference_quads();
        let max_x = |m: &MeshData| m.vertices.iter().map(|v| v.position.x).fold(f32::MIN, f32::max);
        let max_y = |m: &MeshData| m.vertices.iter().map(|v| v.position.y).fold(f32::MIN, f32::max);
        assert_eq!((max_x(&a), max_y(&a)), (0.4, 0.4));
        assert_eq!((max_x(&b), max_y(&b)), (0.25, 0.6));
    }

    #[test]
    fn test_with_texture() {
        let mesh = MeshData::default().with_texture(TextureRef::new("white", ImageData::solid([255; 4])));
        assert_eq!(mesh.texture.map(|t| t.name), Some("white".to_string()));
    }
}
