//! Host-side resources handed to the renderer.
//!
//! This crate holds what the external collaborators produce before anything
//! touches the GPU:
//! - Decoded RGBA8 images ([`ImageData`])
//! - Mesh descriptions with optional texture references ([`MeshData`])
//! - The two quads of the reference scene ([`reference_quads`])

mod error;
pub mod image_data;
pub mod mesh_data;

pub use error::{ResourceError, ResourceResult};
pub use image_data::ImageData;
pub use mesh_data::{MeshData, QUAD_INDICES, TextureRef, reference_quads};
