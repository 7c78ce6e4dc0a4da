//! Device-local 2D images with a single view.
//!
//! Used for sampled textures and for the per-swapchain-image color and depth
//! attachments. Memory comes from gpu-allocator; the view covers the single
//! mip level and layer.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subpass_rhi::device::Device;
//! use subpass_rhi::image::Image;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), subpass_rhi::RhiError> {
//! let color = Image::new(
//!     device,
//!     vk::Extent2D { width: 800, height: 600 },
//!     vk::Format::R8G8B8A8_UNORM,
//!     vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::INPUT_ATTACHMENT,
//! )?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Returns true for depth formats that also carry a stencil component.
pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D16_UNORM_S8_UINT
    )
}

/// Returns true for formats usable as a depth attachment.
pub fn is_depth_format(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D16_UNORM
            | vk::Format::X8_D24_UNORM_PACK32
            | vk::Format::D32_SFLOAT
            | vk::Format::D16_UNORM_S8_UINT
            | vk::Format::D24_UNORM_S8_UINT
            | vk::Format::D32_SFLOAT_S8_UINT
    )
}

/// Returns the aspect a view of `format` should cover.
///
/// Depth views only cover the depth aspect, even for combined formats, so
/// they can be read as input attachments.
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if is_depth_format(format) {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Returns the aspect mask a layout transition of `format` must name.
pub fn barrier_aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    if has_stencil_component(format) {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else {
        aspect_for_format(format)
    }
}

/// A device-local image with one view.
///
/// # Resource Destruction
///
/// The view is destroyed first, then the image, then the allocation is freed.
pub struct Image {
    /// Reference to the logical device.
    device: Arc<Device>,
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
    format: vk::Format,
    extent: vk::Extent2D,
}

impl Image {
    /// Creates a device-local 2D image and its view.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `extent` - Image size in pixels
    /// * `format` - Pixel format
    /// * `usage` - Vulkan usage flags
    ///
    /// # Errors
    ///
    /// Returns an error if the extent is zero, or if image creation, memory
    /// allocation or view creation fails.
    pub fn new(
        device: Arc<Device>,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> RhiResult<Self> {
        if extent.width == 0 || extent.height == 0 {
            return Err(RhiError::InvalidHandle(
                "Image dimensions must be greater than 0".to_string(),
            ));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let requirements = unsafe { device.handle().get_image_memory_requirements(image) };

        let allocated = device.lock_allocator().and_then(|mut allocator| {
            allocator
                .allocate(&AllocationCreateDesc {
                    name: "image",
                    requirements,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(RhiError::from)
        });
        let allocation = match allocated {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.handle().destroy_image(image, None) };
                return Err(e);
            }
        };

        let mut this = Self {
            device,
            image,
            view: vk::ImageView::null(),
            allocation: Some(allocation),
            format,
            extent,
        };

        if let Some(allocation) = this.allocation.as_ref() {
            unsafe {
                this.device.handle().bind_image_memory(
                    this.image,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }

        let view_info = vk::ImageViewCreateInfo::default()
            .image(this.image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_for_format(format))
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        this.view = unsafe { this.device.handle().create_image_view(&view_info, None)? };

        debug!(
            "Created image: {}x{} ({:?}, {:?})",
            extent.width, extent.height, format, usage
        );

        Ok(this)
    }

    /// Returns the Vulkan image handle.
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    /// Returns the image view handle.
    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    /// Returns the pixel format.
    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the image extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.handle().destroy_image_view(self.view, None);
            }
            self.device.handle().destroy_image(self.image, None);
        }

        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free image allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking image allocation: {}", e),
            }
        }

        debug!(
            "Destroyed image: {}x{} ({:?})",
            self.extent.width, self.extent.height, self.format
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aspect_for_color_format() {
        assert_eq!(
            aspect_for_format(vk::Format::R8G8B8A8_UNORM),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_aspect_for_depth_formats() {
        for format in [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ] {
            assert_eq!(aspect_for_format(format), vk::ImageAspectFlags::DEPTH);
        }
    }

    #[test]
    fn test_barrier_aspect_includes_stencil() {
        assert_eq!(
            barrier_aspect_for_format(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            barrier_aspect_for_format(vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
    }

    #[test]
    fn test_has_stencil_component() {
        assert!(has_stencil_component(vk::Format::D32_SFLOAT_S8_UINT));
        assert!(!has_stencil_component(vk::Format::D32_SFLOAT));
        assert!(!has_stencil_component(vk::Format::R8G8B8A8_UNORM));
    }
}
