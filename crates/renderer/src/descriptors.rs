//! Descriptor layouts and the three descriptor families.
//!
//! # Overview
//!
//! | set | family | lifetime |
//! |---|---|---|
//! | geometry set 0 | per-image uniform buffer | rebuilt with the swapchain |
//! | geometry set 1 | per-texture combined image sampler | lives as long as the texture |
//! | composite set 0 | per-image input attachments | rebuilt with the swapchain |
//!
//! The per-image families share one pool ([`PerImageDescriptors`]) that is
//! dropped and rebuilt wholesale whenever the attachments change, so input
//! attachment sets always point at the current images. Texture sets come
//! from a separate fixed-size pool ([`TexturePool`]).

use std::sync::Arc;

use ash::vk;
use subpass_rhi::RhiResult;
use subpass_rhi::buffer::{Buffer, BufferUsage};
use subpass_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, buffer_info, image_info,
    update_descriptor_sets,
};
use subpass_rhi::device::Device;
use tracing::debug;

use crate::attachments::AttachmentSet;
use crate::error::{RendererError, RendererResult};
use crate::ubo::UboViewProjection;

/// Layouts for the three families.
pub struct DescriptorLayouts {
    uniform: DescriptorSetLayout,
    texture: DescriptorSetLayout,
    input: DescriptorSetLayout,
}

impl DescriptorLayouts {
    /// # Errors
    ///
    /// Returns an error if layout creation fails.
    pub fn new(device: &Arc<Device>) -> RhiResult<Self> {
        let uniform = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX,
            )],
        )?;
        let texture = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::combined_image_sampler(
                0,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        let input = DescriptorSetLayout::new(
            device.clone(),
            &[
                DescriptorBindingBuilder::input_attachment(0, vk::ShaderStageFlags::FRAGMENT),
                DescriptorBindingBuilder::input_attachment(1, vk::ShaderStageFlags::FRAGMENT),
            ],
        )?;
        Ok(Self {
            uniform,
            texture,
            input,
        })
    }

    /// Set layouts of the geometry pipeline: uniform, then texture.
    pub fn geometry(&self) -> [vk::DescriptorSetLayout; 2] {
        [self.uniform.handle(), self.texture.handle()]
    }

    /// Set layouts of the composite pipeline.
    pub fn composite(&self) -> [vk::DescriptorSetLayout; 1] {
        [self.input.handle()]
    }

    #[inline]
    pub fn texture(&self) -> vk::DescriptorSetLayout {
        self.texture.handle()
    }
}

/// Pool sizes for `image_count` uniform sets and `image_count` input sets.
pub fn per_image_pool_sizes(image_count: u32) -> [vk::DescriptorPoolSize; 2] {
    [
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(image_count),
        vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::INPUT_ATTACHMENT)
            .descriptor_count(image_count * 2),
    ]
}

/// Uniform buffers and the per-image sets pointing at them and at the
/// attachments.
pub struct PerImageDescriptors {
    uniform_buffers: Vec<Buffer>,
    uniform_sets: Vec<vk::DescriptorSet>,
    input_sets: Vec<vk::DescriptorSet>,
    _pool: DescriptorPool,
}

impl PerImageDescriptors {
    /// Creates one uniform buffer and two sets per attachment set.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer, pool or set creation fails.
    pub fn new(
        device: &Arc<Device>,
        layouts: &DescriptorLayouts,
        attachments: &[AttachmentSet],
    ) -> RhiResult<Self> {
        let count = attachments.len() as u32;
        let pool = DescriptorPool::new(device.clone(), count * 2, &per_image_pool_sizes(count))?;

        let uniform_layouts = vec![layouts.uniform.handle(); attachments.len()];
        let input_layouts = vec![layouts.input.handle(); attachments.len()];
        let uniform_sets = pool.allocate(&uniform_layouts)?;
        let input_sets = pool.allocate(&input_layouts)?;

        let uniform_buffers = (0..attachments.len())
            .map(|_| {
                Buffer::new(
                    device.clone(),
                    BufferUsage::Uniform,
                    UboViewProjection::SIZE as vk::DeviceSize,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        for ((&uniform_set, &input_set), (buffer, attachment)) in uniform_sets
            .iter()
            .zip(&input_sets)
            .zip(uniform_buffers.iter().zip(attachments))
        {
            let buffer_infos = [buffer_info(
                buffer.handle(),
                0,
                UboViewProjection::SIZE as vk::DeviceSize,
            )];
            let color_infos = [image_info(
                vk::Sampler::null(),
                attachment.color().view(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )];
            let depth_infos = [image_info(
                vk::Sampler::null(),
                attachment.depth().view(),
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            )];

            let writes = [
                vk::WriteDescriptorSet::default()
                    .dst_set(uniform_set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .buffer_info(&buffer_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(input_set)
                    .dst_binding(0)
                    .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                    .image_info(&color_infos),
                vk::WriteDescriptorSet::default()
                    .dst_set(input_set)
                    .dst_binding(1)
                    .descriptor_type(vk::DescriptorType::INPUT_ATTACHMENT)
                    .image_info(&depth_infos),
            ];
            update_descriptor_sets(device, &writes);
        }

        debug!("Created per-image descriptors for {} images", count);

        Ok(Self {
            uniform_buffers,
            uniform_sets,
            input_sets,
            _pool: pool,
        })
    }

    /// Writes the view/projection of `image_index`.
    ///
    /// # Errors
    ///
    /// Returns an error if `image_index` is out of range or the write fails.
    pub fn write_uniform(&self, image_index: usize, ubo: &UboViewProjection) -> RhiResult<()> {
        let buffer = self.uniform_buffers.get(image_index).ok_or_else(|| {
            subpass_rhi::RhiError::InvalidHandle(format!("No uniform buffer for image {}", image_index))
        })?;
        buffer.write_data(0, bytemuck::bytes_of(ubo))
    }

    pub fn uniform_set(&self, image_index: usize) -> Option<vk::DescriptorSet> {
        self.uniform_sets.get(image_index).copied()
    }

    pub fn input_set(&self, image_index: usize) -> Option<vk::DescriptorSet> {
        self.input_sets.get(image_index).copied()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.uniform_buffers.len()
    }
}

/// Fails once `used` sets fill a pool of `limit`.
pub fn check_texture_capacity(used: usize, limit: usize) -> RendererResult<()> {
    if used >= limit {
        return Err(RendererError::TextureLimitExceeded { limit });
    }
    Ok(())
}

/// Fixed-capacity pool of texture sets.
pub struct TexturePool {
    pool: DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
    limit: usize,
}

impl TexturePool {
    /// # Errors
    ///
    /// Returns an error if pool creation fails.
    pub fn new(device: &Arc<Device>, limit: usize) -> RhiResult<Self> {
        let sizes = [vk::DescriptorPoolSize::default()
            .ty(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(limit as u32)];
        let pool = DescriptorPool::new(device.clone(), limit as u32, &sizes)?;
        Ok(Self {
            pool,
            sets: Vec::with_capacity(limit),
            limit,
        })
    }

    /// Allocates a set for `view` and returns its index.
    ///
    /// # Errors
    ///
    /// Returns [`RendererError::TextureLimitExceeded`] when the pool is full,
    /// otherwise classifies the allocation failure.
    pub fn add(
        &mut self,
        device: &Device,
        layout: vk::DescriptorSetLayout,
        view: vk::ImageView,
        sampler: vk::Sampler,
    ) -> RendererResult<usize> {
        check_texture_capacity(self.sets.len(), self.limit)?;

        let set = self
            .pool
            .allocate(&[layout])
            .map_err(RendererError::from_upload)?
            .into_iter()
            .next()
            .ok_or(RendererError::TextureLimitExceeded { limit: self.limit })?;

        let infos = [image_info(
            sampler,
            view,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )];
        let writes = [vk::WriteDescriptorSet::default()
            .dst_set(set)
            .dst_binding(0)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .image_info(&infos)];
        update_descriptor_sets(device, &writes);

        self.sets.push(set);
        Ok(self.sets.len() - 1)
    }

    pub fn get(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_image_pool_sizes() {
        let sizes = per_image_pool_sizes(3);
        assert_eq!(sizes[0].ty, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(sizes[0].descriptor_count, 3);
        assert_eq!(sizes[1].ty, vk::DescriptorType::INPUT_ATTACHMENT);
        assert_eq!(sizes[1].descriptor_count, 6);
    }

    #[test]
    fn test_texture_capacity_is_a_hard_cap() {
        assert!(check_texture_capacity(0, 1).is_ok());
        assert!(check_texture_capacity(15, 16).is_ok());
        assert!(matches!(
            check_texture_capacity(16, 16),
            Err(RendererError::TextureLimitExceeded { limit: 16 })
        ));
    }
}
