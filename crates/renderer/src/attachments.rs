//! Per-image attachments of the frame graph.
//!
//! Every swapchain image gets its own color-input and depth-input image. The
//! geometry subpass writes them, the composite subpass reads them as input
//! attachments, and nothing outside one render-pass instance ever sees them,
//! so they are created without TRANSFER or SAMPLED usage.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subpass_rhi::device::Device;
//! use subpass_rhi::vk;
//! use subpass_renderer::attachments::{AttachmentSet, negotiate_depth_format};
//!
//! # fn example(device: Arc<Device>) -> Result<(), subpass_rhi::RhiError> {
//! let depth_format = negotiate_depth_format(&device)?;
//! let extent = vk::Extent2D { width: 800, height: 600 };
//! let sets = AttachmentSet::for_images(&device, 3, extent, depth_format)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use subpass_rhi::RhiResult;
use subpass_rhi::device::Device;
use subpass_rhi::image::Image;
use tracing::debug;

/// Format of the color-input attachment.
pub const COLOR_INPUT_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Depth formats in order of preference.
///
/// Depth-only formats, so the one depth view serves as both the depth
/// attachment of the geometry subpass and the input attachment of the
/// composite subpass. Every device supports at least one of them.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 2] =
    [vk::Format::D32_SFLOAT, vk::Format::X8_D24_UNORM_PACK32];

/// Usage of the color-input attachment.
pub fn color_input_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT
}

/// Usage of the depth-input attachment.
pub fn depth_input_usage() -> vk::ImageUsageFlags {
    vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT
}

/// Picks the first candidate usable as an optimally tiled depth attachment
/// that the composite subpass can also read.
///
/// A depth format is readable as an input attachment exactly when it has
/// `DEPTH_STENCIL_ATTACHMENT` support, so that one feature covers both uses.
///
/// # Errors
///
/// Returns an error if no candidate is supported.
pub fn negotiate_depth_format(device: &Device) -> RhiResult<vk::Format> {
    let format = device.find_supported_format(
        &DEPTH_FORMAT_CANDIDATES,
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )?;
    debug!("Depth attachment format: {:?}", format);
    Ok(format)
}

/// Color and depth inputs for one swapchain image.
pub struct AttachmentSet {
    color: Image,
    depth: Image,
}

impl AttachmentSet {
    /// Creates the attachments for one image.
    ///
    /// # Errors
    ///
    /// Returns an error if image creation or allocation fails.
    pub fn new(
        device: &Arc<Device>,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> RhiResult<Self> {
        let color = Image::new(device.clone(), extent, COLOR_INPUT_FORMAT, color_input_usage())?;
        let depth = Image::new(device.clone(), extent, depth_format, depth_input_usage())?;
        Ok(Self { color, depth })
    }

    /// Creates one set per swapchain image.
    ///
    /// # Errors
    ///
    /// Returns the first creation error; sets created so far are dropped.
    pub fn for_images(
        device: &Arc<Device>,
        image_count: usize,
        extent: vk::Extent2D,
        depth_format: vk::Format,
    ) -> RhiResult<Vec<Self>> {
        let sets = (0..image_count)
            .map(|_| Self::new(device, extent, depth_format))
            .collect::<RhiResult<Vec<_>>>()?;
        debug!(
            "Created {} attachment sets at {}x{}",
            sets.len(),
            extent.width,
            extent.height
        );
        Ok(sets)
    }

    #[inline]
    pub fn color(&self) -> &Image {
        &self.color
    }

    #[inline]
    pub fn depth(&self) -> &Image {
        &self.depth
    }

    /// Views in framebuffer order, after the swapchain view.
    pub fn framebuffer_views(&self, swapchain_view: vk::ImageView) -> [vk::ImageView; 3] {
        [swapchain_view, self.color.view(), self.depth.view()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use subpass_rhi::image::{aspect_for_format, barrier_aspect_for_format, is_depth_format};

    #[test]
    fn test_depth_candidates_are_depth_formats() {
        assert!(DEPTH_FORMAT_CANDIDATES.iter().all(|&f| is_depth_format(f)));
        assert_eq!(DEPTH_FORMAT_CANDIDATES[0], vk::Format::D32_SFLOAT);
    }

    #[test]
    fn test_depth_view_covers_whole_format() {
        // The framebuffer attachment and the input attachment share one view,
        // so that view must cover every aspect of the format.
        for format in DEPTH_FORMAT_CANDIDATES {
            assert_eq!(aspect_for_format(format), vk::ImageAspectFlags::DEPTH);
            assert_eq!(barrier_aspect_for_format(format), vk::ImageAspectFlags::DEPTH);
        }
    }

    #[test]
    fn test_usages_allow_input_attachment() {
        assert!(color_input_usage().contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
        assert!(depth_input_usage().contains(vk::ImageUsageFlags::INPUT_ATTACHMENT));
        assert!(!color_input_usage().contains(vk::ImageUsageFlags::SAMPLED));
    }
}
