//! Device-local meshes and the models that group them.

use glam::Mat4;
use subpass_resources::MeshData;
use subpass_rhi::buffer::{Buffer, BufferUsage};
use subpass_rhi::transfer::TransferContext;
use tracing::debug;

use crate::error::{RendererError, RendererResult};

/// Checks index data against the vertex count before anything is uploaded.
///
/// The index count must be a positive multiple of three and every index must
/// address an existing vertex.
///
/// # Errors
///
/// Returns [`RendererError::InvalidMesh`] describing the first problem.
pub fn validate_mesh(vertex_count: usize, indices: &[u32]) -> RendererResult<()> {
    if vertex_count == 0 {
        return Err(RendererError::InvalidMesh("mesh has no vertices".to_string()));
    }
    if indices.is_empty() || indices.len() % 3 != 0 {
        return Err(RendererError::InvalidMesh(format!(
            "index count {} is not a positive multiple of 3",
            indices.len()
        )));
    }
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertex_count) {
        return Err(RendererError::InvalidMesh(format!(
            "index {} out of range for {} vertices",
            bad, vertex_count
        )));
    }
    Ok(())
}

/// Checks every mesh of a model before any of them is uploaded.
///
/// A model needs at least one mesh.
///
/// # Errors
///
/// Returns [`RendererError::InvalidMesh`] naming the first bad mesh.
pub fn validate_model(meshes: &[MeshData]) -> RendererResult<()> {
    if meshes.is_empty() {
        return Err(RendererError::InvalidMesh("model has no meshes".to_string()));
    }
    for (i, mesh) in meshes.iter().enumerate() {
        validate_mesh(mesh.vertices.len(), &mesh.indices).map_err(|e| match e {
            RendererError::InvalidMesh(reason) => {
                RendererError::InvalidMesh(format!("mesh {}: {}", i, reason))
            }
            other => other,
        })?;
    }
    Ok(())
}

/// Vertex and index buffers of one indexed triangle list.
pub struct Mesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    texture_index: usize,
}

impl Mesh {
    /// Validates `data` and stages it into device-local buffers.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::InvalidMesh`] for bad index data, or the
    /// classified upload failure.
    pub fn upload(
        transfer: &TransferContext,
        data: &MeshData,
        texture_index: usize,
    ) -> RendererResult<Self> {
        validate_mesh(data.vertices.len(), &data.indices)?;

        let vertex_buffer = transfer
            .upload_buffer(BufferUsage::Vertex, bytemuck::cast_slice(&data.vertices))
            .map_err(RendererError::from_upload)?;
        let index_buffer = transfer
            .upload_buffer(BufferUsage::Index, bytemuck::cast_slice(&data.indices))
            .map_err(RendererError::from_upload)?;

        debug!(
            "Uploaded mesh: {} vertices, {} indices, texture {}",
            data.vertices.len(),
            data.indices.len(),
            texture_index
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.indices.len() as u32,
            texture_index,
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &Buffer {
        &self.vertex_buffer
    }

    #[inline]
    pub fn index_buffer(&self) -> &Buffer {
        &self.index_buffer
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Index into the texture descriptor sets.
    #[inline]
    pub fn texture_index(&self) -> usize {
        self.texture_index
    }
}

/// Opaque reference to a loaded model.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModelHandle(usize);

impl ModelHandle {
    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Meshes drawn with one shared transform.
pub struct Model {
    meshes: Vec<Mesh>,
    transform: Mat4,
}

impl Model {
    pub fn new(meshes: Vec<Mesh>) -> Self {
        Self {
            meshes,
            transform: Mat4::IDENTITY,
        }
    }

    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }

    #[inline]
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Mat4) {
        self.transform = transform;
    }
}

/// Models in load order, addressed by [`ModelHandle`].
#[derive(Default)]
pub struct ModelList {
    models: Vec<Model>,
}

impl ModelList {
    pub fn insert(&mut self, model: Model) -> ModelHandle {
        self.models.push(model);
        ModelHandle(self.models.len() - 1)
    }

    /// # Errors
    ///
    /// Returns [`RendererError::UnknownModel`] for a handle this list never
    /// issued.
    pub fn get_mut(&mut self, handle: ModelHandle) -> RendererResult<&mut Model> {
        self.models
            .get_mut(handle.0)
            .ok_or(RendererError::UnknownModel(handle.0))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Model> {
        self.models.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subpass_resources::{ImageData, TextureRef, reference_quads};

    #[test]
    fn test_reference_quads_are_valid() {
        for quad in reference_quads() {
            assert!(validate_mesh(quad.vertices.len(), &quad.indices).is_ok());
        }
    }

    #[test]
    fn test_rejects_partial_triangle() {
        assert!(matches!(
            validate_mesh(4, &[0, 1, 2, 3]),
            Err(RendererError::InvalidMesh(_))
        ));
        assert!(validate_mesh(4, &[]).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_index() {
        let err = validate_mesh(4, &[0, 1, 4]).unwrap_err();
        assert!(err.to_string().contains("index 4"));
    }

    #[test]
    fn test_rejects_empty_vertices() {
        assert!(validate_mesh(0, &[0, 0, 0]).is_err());
    }

    #[test]
    fn test_model_without_meshes_is_rejected() {
        assert!(matches!(
            validate_model(&[]),
            Err(RendererError::InvalidMesh(_))
        ));
    }

    #[test]
    fn test_model_rejects_any_bad_mesh() {
        let [good, mut bad] = reference_quads();
        bad.indices = vec![0, 1, 9];
        bad.texture = Some(TextureRef::new("a", ImageData::solid([1, 2, 3, 4])));

        let err = validate_model(&[good.clone(), bad]).unwrap_err();
        assert!(err.to_string().contains("mesh 1"));
        assert!(validate_model(&[good]).is_ok());
    }

    #[test]
    fn test_unknown_handle() {
        let mut models = ModelList::default();
        let handle = models.insert(Model::new(Vec::new()));
        assert!(models.get_mut(handle).is_ok());
        assert!(matches!(
            models.get_mut(ModelHandle(7)),
            Err(RendererError::UnknownModel(7))
        ));
    }
}
