//! Textures, deduplicated by name.
//!
//! Index 0 is always a 1x1 white texture, so untextured meshes sample white
//! and keep their vertex colors.

use std::collections::HashMap;
use std::sync::Arc;

use ash::vk;
use subpass_resources::{ImageData, TextureRef};
use subpass_rhi::device::Device;
use subpass_rhi::image::Image;
use subpass_rhi::sampler::Sampler;
use subpass_rhi::transfer::TransferContext;
use tracing::debug;

use crate::descriptors::{TexturePool, check_texture_capacity};
use crate::error::{RendererError, RendererResult};

/// Format textures are uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Descriptor index of the default white texture.
pub const DEFAULT_TEXTURE: usize = 0;

/// Uploaded textures and their descriptor sets.
pub struct TextureCache {
    device: Arc<Device>,
    layout: vk::DescriptorSetLayout,
    by_name: HashMap<String, usize>,
    pool: TexturePool,
    images: Vec<Image>,
    sampler: Sampler,
}

impl TextureCache {
    /// Creates the cache and uploads the default texture.
    ///
    /// `layout` must outlive the cache.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::Init`] if sampler, pool or default texture
    /// creation fails.
    pub fn new(
        device: Arc<Device>,
        transfer: &TransferContext,
        layout: vk::DescriptorSetLayout,
        limit: usize,
    ) -> RendererResult<Self> {
        let sampler = Sampler::new_linear_repeat(device.clone()).map_err(RendererError::Init)?;
        let pool = TexturePool::new(&device, limit).map_err(RendererError::Init)?;

        let mut cache = Self {
            device,
            layout,
            by_name: HashMap::new(),
            pool,
            images: Vec::new(),
            sampler,
        };
        let index = cache
            .insert(transfer, &ImageData::solid([255, 255, 255, 255]))
            .map_err(RendererError::into_init)?;
        debug_assert_eq!(index, DEFAULT_TEXTURE);
        Ok(cache)
    }

    /// Returns the descriptor index for `texture`, uploading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::TextureLimitExceeded`] if a new texture would
    /// not fit, or the classified upload failure.
    pub fn resolve(
        &mut self,
        transfer: &TransferContext,
        texture: Option<&TextureRef>,
    ) -> RendererResult<usize> {
        let Some(texture) = texture else {
            return Ok(DEFAULT_TEXTURE);
        };
        if let Some(&index) = self.by_name.get(&texture.name) {
            return Ok(index);
        }

        let index = self.insert(transfer, &texture.image)?;
        self.by_name.insert(texture.name.clone(), index);
        debug!(
            "Texture '{}' uploaded at index {} ({}x{})",
            texture.name,
            index,
            texture.image.width(),
            texture.image.height()
        );
        Ok(index)
    }

    fn insert(&mut self, transfer: &TransferContext, image: &ImageData) -> RendererResult<usize> {
        check_texture_capacity(self.pool.len(), self.pool.limit())?;

        let extent = vk::Extent2D {
            width: image.width(),
            height: image.height(),
        };
        let uploaded = transfer
            .upload_image(image.pixels(), extent, TEXTURE_FORMAT)
            .map_err(RendererError::from_upload)?;

        let index = self.pool.add(
            &self.device,
            self.layout,
            uploaded.view(),
            self.sampler.handle(),
        )?;
        self.images.push(uploaded);
        Ok(index)
    }

    pub fn set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.pool.get(index)
    }

    /// Number of textures, the default included.
    #[inline]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}
