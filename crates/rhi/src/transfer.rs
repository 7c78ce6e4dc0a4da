//! Synchronous staging transfers.
//!
//! # Overview
//!
//! [`TransferContext`] copies host data into device-local buffers and images
//! through a host-visible staging buffer, and copies device data back into a
//! host-readable buffer for diagnostics. Every operation records a one-shot
//! command buffer, submits it to the transfer queue and blocks until the
//! queue is idle, so nothing here belongs in the per-frame path.
//!
//! Failures are returned as-is and never retried.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subpass_rhi::device::Device;
//! use subpass_rhi::buffer::BufferUsage;
//! use subpass_rhi::transfer::TransferContext;
//!
//! # fn example(device: Arc<Device>) -> Result<(), subpass_rhi::RhiError> {
//! let transfer = TransferContext::new(device)?;
//! let indices: [u32; 6] = [0, 1, 2, 2, 3, 0];
//! let index_buffer = transfer.upload_buffer(BufferUsage::Index, bytemuck::cast_slice(&indices))?;
//! assert_eq!(transfer.download_buffer(&index_buffer)?, bytemuck::cast_slice::<u32, u8>(&indices));
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{Image, barrier_aspect_for_format};

/// Access masks and stages of one supported image layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LayoutTransition {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Looks up the barrier parameters for `old -> new`.
///
/// # Errors
///
/// Returns [`RhiError::TransferError`] for transitions the transfer path
/// never performs.
pub fn layout_transition(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<LayoutTransition> {
    use vk::ImageLayout as L;

    let transition = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::SHADER_READ,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => LayoutTransition {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => {
            return Err(RhiError::TransferError(format!(
                "Unsupported layout transition {:?} -> {:?}",
                old, new
            )));
        }
    };

    Ok(transition)
}

/// Builds an image memory barrier covering the whole single-level image.
///
/// # Errors
///
/// Returns an error if the transition is not in the table.
pub fn image_barrier(
    image: vk::Image,
    format: vk::Format,
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<(vk::ImageMemoryBarrier<'static>, LayoutTransition)> {
    let transition = layout_transition(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(
            vk::ImageSubresourceRange::default()
                .aspect_mask(barrier_aspect_for_format(format))
                .base_mip_level(0)
                .level_count(1)
                .base_array_layer(0)
                .layer_count(1),
        )
        .src_access_mask(transition.src_access)
        .dst_access_mask(transition.dst_access);

    Ok((barrier, transition))
}

/// Bytes per texel for the formats the transfer path accepts.
pub fn texel_size(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SRGB => Some(4),
        _ => None,
    }
}

fn expected_image_bytes(extent: vk::Extent2D, format: vk::Format) -> RhiResult<usize> {
    let texel = texel_size(format).ok_or_else(|| {
        RhiError::TransferError(format!("Unsupported transfer format {:?}", format))
    })?;
    Ok(extent.width as usize * extent.height as usize * texel)
}

fn full_image_copy(extent: vk::Extent2D) -> vk::BufferImageCopy {
    vk::BufferImageCopy::default()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(
            vk::ImageSubresourceLayers::default()
                .aspect_mask(vk::ImageAspectFlags::COLOR)
                .mip_level(0)
                .base_array_layer(0)
                .layer_count(1),
        )
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
}

/// Owns the command pool used for one-shot transfers.
pub struct TransferContext {
    device: Arc<Device>,
    pool: CommandPool,
}

impl TransferContext {
    /// Creates a transient command pool on the transfer queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if the device has no transfer family or pool
    /// creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let family = device
            .queue_families()
            .transfer_family
            .ok_or(RhiError::NoSuitableGpu)?;
        let pool = CommandPool::new_transient(device.clone(), family)?;
        Ok(Self { device, pool })
    }

    /// Records `record` into a fresh command buffer, submits it and waits.
    ///
    /// # Errors
    ///
    /// Returns an error from recording, submission or the wait.
    pub fn one_shot<F>(&self, record: F) -> RhiResult<()>
    where
        F: FnOnce(&CommandBuffer) -> RhiResult<()>,
    {
        let cmd = CommandBuffer::new(self.device.clone(), &self.pool)?;

        let result = (|| {
            cmd.begin()?;
            record(&cmd)?;
            cmd.end()?;

            let command_buffers = [cmd.handle()];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);
            unsafe { self.device.submit_transfer_and_wait(&[submit_info]) }
        })();

        self.pool.free(&[cmd.handle()]);
        result
    }

    /// Uploads `data` into a new device-local buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if `data` is empty, `usage` is host-visible, or any
    /// allocation or submission fails.
    pub fn upload_buffer(&self, usage: BufferUsage, data: &[u8]) -> RhiResult<Buffer> {
        if usage.is_host_visible() {
            return Err(RhiError::TransferError(format!(
                "{} buffers are written directly, not staged",
                usage.name()
            )));
        }

        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, data)?;
        let buffer = Buffer::new(self.device.clone(), usage, staging.size())?;

        self.one_shot(|cmd| {
            let region = vk::BufferCopy::default()
                .src_offset(0)
                .dst_offset(0)
                .size(staging.size());
            cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
            Ok(())
        })?;

        debug!("Uploaded {} bytes into {} buffer", data.len(), usage.name());
        Ok(buffer)
    }

    /// Uploads tightly packed `pixels` into a new sampled image.
    ///
    /// The image ends in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the pixel count does not match the extent, the
    /// format is unsupported, or any allocation or submission fails.
    pub fn upload_image(
        &self,
        pixels: &[u8],
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Image> {
        let expected = expected_image_bytes(extent, format)?;
        if pixels.len() != expected {
            return Err(RhiError::TransferError(format!(
                "Image data is {} bytes, expected {} for {}x{}",
                pixels.len(),
                expected,
                extent.width,
                extent.height
            )));
        }

        let staging = Buffer::new_with_data(self.device.clone(), BufferUsage::Staging, pixels)?;
        let image = Image::new(
            self.device.clone(),
            extent,
            format,
            vk::ImageUsageFlags::SAMPLED
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::TRANSFER_SRC,
        )?;

        let (to_dst, into_copy) = image_barrier(
            image.handle(),
            format,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )?;
        let (to_read, out_of_copy) = image_barrier(
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        self.one_shot(|cmd| {
            cmd.pipeline_barrier(into_copy.src_stage, into_copy.dst_stage, &[to_dst]);
            cmd.copy_buffer_to_image(
                staging.handle(),
                image.handle(),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[full_image_copy(extent)],
            );
            cmd.pipeline_barrier(out_of_copy.src_stage, out_of_copy.dst_stage, &[to_read]);
            Ok(())
        })?;

        debug!(
            "Uploaded {}x{} image ({:?})",
            extent.width, extent.height, format
        );
        Ok(image)
    }

    /// Copies the full contents of `buffer` back to the host.
    ///
    /// # Errors
    ///
    /// Returns an error if the readback allocation or submission fails.
    pub fn download_buffer(&self, buffer: &Buffer) -> RhiResult<Vec<u8>> {
        let readback = Buffer::new(self.device.clone(), BufferUsage::Readback, buffer.size())?;

        self.one_shot(|cmd| {
            let region = vk::BufferCopy::default().size(buffer.size());
            cmd.copy_buffer(buffer.handle(), readback.handle(), &[region]);
            cmd.buffer_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                &[host_read_barrier(readback.handle())],
            );
            Ok(())
        })?;

        readback.read_data(0, buffer.size() as usize)
    }

    /// Copies an image uploaded by [`TransferContext::upload_image`] back to
    /// the host, leaving it in `SHADER_READ_ONLY_OPTIMAL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the format is unsupported or the readback
    /// allocation or submission fails.
    pub fn download_image(&self, image: &Image) -> RhiResult<Vec<u8>> {
        let extent = image.extent();
        let format = image.format();
        let size = expected_image_bytes(extent, format)?;

        let readback = Buffer::new(
            self.device.clone(),
            BufferUsage::Readback,
            size as vk::DeviceSize,
        )?;

        let (to_src, into_copy) = image_barrier(
            image.handle(),
            format,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        )?;
        let (to_read, out_of_copy) = image_barrier(
            image.handle(),
            format,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )?;

        self.one_shot(|cmd| {
            cmd.pipeline_barrier(into_copy.src_stage, into_copy.dst_stage, &[to_src]);
            cmd.copy_image_to_buffer(
                image.handle(),
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                readback.handle(),
                &[full_image_copy(extent)],
            );
            cmd.pipeline_barrier(out_of_copy.src_stage, out_of_copy.dst_stage, &[to_read]);
            cmd.buffer_barrier(
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::HOST,
                &[host_read_barrier(readback.handle())],
            );
            Ok(())
        })?;

        readback.read_data(0, size)
    }
}

fn host_read_barrier(buffer: vk::Buffer) -> vk::BufferMemoryBarrier<'static> {
    vk::BufferMemoryBarrier::default()
        .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
        .dst_access_mask(vk::AccessFlags::HOST_READ)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .buffer(buffer)
        .offset(0)
        .size(vk::WHOLE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_transitions() {
        let before = layout_transition(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(before.src_access, vk::AccessFlags::empty());
        assert_eq!(before.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(before.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let after = layout_transition(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();
        assert_eq!(after.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(after.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(after.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_unsupported_transition_is_error() {
        let result = layout_transition(
            vk::ImageLayout::PRESENT_SRC_KHR,
            vk::ImageLayout::GENERAL,
        );
        assert!(matches!(result, Err(RhiError::TransferError(_))));
    }

    #[test]
    fn test_image_barrier_covers_color_aspect() {
        let (barrier, _) = image_barrier(
            vk::Image::null(),
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();
        assert_eq!(
            barrier.subresource_range.aspect_mask,
            vk::ImageAspectFlags::COLOR
        );
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(barrier.new_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    fn test_expected_image_bytes() {
        let extent = vk::Extent2D {
            width: 3,
            height: 2,
        };
        assert_eq!(
            expected_image_bytes(extent, vk::Format::R8G8B8A8_UNORM).unwrap(),
            24
        );
        assert!(expected_image_bytes(extent, vk::Format::D32_SFLOAT).is_err());
    }
}
