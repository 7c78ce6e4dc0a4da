//! GPU buffer management.
//!
//! Vertex and index data live in device-local memory and are filled through
//! the staging path in [`crate::transfer`]. Uniform buffers stay host-visible
//! so a frame can rewrite them directly.
//!
//! # Overview
//!
//! - [`BufferUsage`] defines how a buffer will be used and where it lives
//! - [`Buffer`] wraps VkBuffer with gpu-allocator managed memory
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use subpass_rhi::device::Device;
//! use subpass_rhi::buffer::{Buffer, BufferUsage};
//!
//! # fn example(device: Arc<Device>) -> Result<(), subpass_rhi::RhiError> {
//! let staging = Buffer::new_with_data(
//!     device,
//!     BufferUsage::Staging,
//!     bytemuck::cast_slice(&[0.0f32, 0.5, -0.5]),
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

/// Buffer usage type.
///
/// Decides both the Vulkan usage flags and the memory location.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferUsage {
    /// Vertex buffer, device-local, filled by a transfer
    Vertex,
    /// Index buffer, device-local, filled by a transfer
    Index,
    /// Uniform buffer, host-visible, rewritten every frame
    Uniform,
    /// Staging buffer, CPU-writable source of a transfer
    Staging,
    /// Readback buffer, CPU-readable destination of a transfer
    Readback,
}

impl BufferUsage {
    /// Converts to Vulkan buffer usage flags.
    pub fn to_vk_usage(self) -> vk::BufferUsageFlags {
        match self {
            BufferUsage::Vertex => {
                vk::BufferUsageFlags::VERTEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Index => {
                vk::BufferUsageFlags::INDEX_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_DST
                    | vk::BufferUsageFlags::TRANSFER_SRC
            }
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
            BufferUsage::Staging => vk::BufferUsageFlags::TRANSFER_SRC,
            BufferUsage::Readback => vk::BufferUsageFlags::TRANSFER_DST,
        }
    }

    /// Returns the memory location for this buffer type.
    pub fn memory_location(self) -> MemoryLocation {
        match self {
            BufferUsage::Vertex | BufferUsage::Index => MemoryLocation::GpuOnly,
            BufferUsage::Uniform | BufferUsage::Staging => MemoryLocation::CpuToGpu,
            BufferUsage::Readback => MemoryLocation::GpuToCpu,
        }
    }

    /// Returns true if the CPU can map this buffer.
    pub fn is_host_visible(self) -> bool {
        self.memory_location() != MemoryLocation::GpuOnly
    }

    /// Returns a human-readable name for the buffer type.
    pub fn name(self) -> &'static str {
        match self {
            BufferUsage::Vertex => "vertex",
            BufferUsage::Index => "index",
            BufferUsage::Uniform => "uniform",
            BufferUsage::Staging => "staging",
            BufferUsage::Readback => "readback",
        }
    }
}

/// GPU buffer wrapper with managed memory.
///
/// # Thread Safety
///
/// The buffer itself is not thread-safe. Synchronize access externally
/// when sharing between threads.
pub struct Buffer {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan buffer handle.
    buffer: vk::Buffer,
    /// GPU memory allocation.
    allocation: Option<Allocation>,
    /// Buffer size in bytes.
    size: vk::DeviceSize,
    /// Buffer usage type.
    usage: BufferUsage,
}

impl Buffer {
    /// Creates a new buffer with the specified size.
    ///
    /// # Arguments
    ///
    /// * `device` - The logical device
    /// * `usage` - The intended buffer usage
    /// * `size` - Buffer size in bytes
    ///
    /// # Errors
    ///
    /// Returns an error if buffer or memory allocation fails. Running out of
    /// memory is reported as-is; see [`RhiError::is_out_of_memory`].
    pub fn new(device: Arc<Device>, usage: BufferUsage, size: vk::DeviceSize) -> RhiResult<Self> {
        if size == 0 {
            return Err(RhiError::InvalidHandle(
                "Buffer size must be greater than 0".to_string(),
            ));
        }

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage.to_vk_usage())
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe { device.handle().create_buffer(&buffer_info, None)? };

        let requirements = unsafe { device.handle().get_buffer_memory_requirements(buffer) };

        let allocation = {
            let allocated = device.lock_allocator().and_then(|mut allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: usage.name(),
                        requirements,
                        location: usage.memory_location(),
                        linear: true,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(RhiError::from)
            });
            match allocated {
                Ok(allocation) => allocation,
                Err(e) => {
                    unsafe { device.handle().destroy_buffer(buffer, None) };
                    return Err(e);
                }
            }
        };

        let this = Self {
            device,
            buffer,
            allocation: Some(allocation),
            size,
            usage,
        };

        // From here on Drop releases the buffer and its memory on failure.
        if let Some(allocation) = this.allocation.as_ref() {
            unsafe {
                this.device.handle().bind_buffer_memory(
                    this.buffer,
                    allocation.memory(),
                    allocation.offset(),
                )?;
            }
        }
        debug!("Created {} buffer: {} bytes", usage.name(), size);

        Ok(this)
    }

    /// Creates a host-visible buffer and initializes it with data.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation fails or `usage` is not
    /// host-visible.
    pub fn new_with_data(device: Arc<Device>, usage: BufferUsage, data: &[u8]) -> RhiResult<Self> {
        let buffer = Self::new(device, usage, data.len() as vk::DeviceSize)?;
        buffer.write_data(0, data)?;
        Ok(buffer)
    }

    /// Writes data to the buffer at the specified offset.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The buffer memory is not mapped
    /// - The write would exceed the buffer size
    pub fn write_data(&self, offset: vk::DeviceSize, data: &[u8]) -> RhiResult<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.check_range(offset, data.len())?;
        let mapped_ptr = self.mapped_ptr()?;

        unsafe {
            let dst = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }

        Ok(())
    }

    /// Reads `len` bytes starting at `offset` from a host-visible buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the memory is not mapped or the range is out of
    /// bounds.
    pub fn read_data(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<Vec<u8>> {
        if len == 0 {
            return Ok(Vec::new());
        }

        self.check_range(offset, len)?;
        let mapped_ptr = self.mapped_ptr()?;

        let mut out = vec![0u8; len];
        unsafe {
            let src = mapped_ptr.as_ptr().cast::<u8>().add(offset as usize);
            std::ptr::copy_nonoverlapping(src, out.as_mut_ptr(), len);
        }

        Ok(out)
    }

    fn check_range(&self, offset: vk::DeviceSize, len: usize) -> RhiResult<()> {
        let end = offset + len as vk::DeviceSize;
        if end > self.size {
            return Err(RhiError::InvalidHandle(format!(
                "Access exceeds buffer size: offset {} + len {} > buffer {}",
                offset, len, self.size
            )));
        }
        Ok(())
    }

    fn mapped_ptr(&self) -> RhiResult<std::ptr::NonNull<std::ffi::c_void>> {
        let allocation = self.allocation.as_ref().ok_or_else(|| {
            RhiError::InvalidHandle("Buffer allocation is not available".to_string())
        })?;

        allocation.mapped_ptr().ok_or_else(|| {
            RhiError::InvalidHandle(format!("{} buffer memory is not mapped", self.usage.name()))
        })
    }

    /// Returns the Vulkan buffer handle.
    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Returns the buffer size in bytes.
    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Returns the buffer usage type.
    #[inline]
    pub fn usage(&self) -> BufferUsage {
        self.usage
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            match self.device.lock_allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!("Failed to free buffer allocation: {:?}", e);
                    }
                }
                Err(e) => tracing::error!("Leaking buffer allocation: {}", e),
            }
        }

        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
        }

        debug!("Destroyed {} buffer", self.usage.name());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_usage_to_vk_usage() {
        let vertex = BufferUsage::Vertex.to_vk_usage();
        assert!(vertex.contains(vk::BufferUsageFlags::VERTEX_BUFFER));
        assert!(vertex.contains(vk::BufferUsageFlags::TRANSFER_DST));

        let index = BufferUsage::Index.to_vk_usage();
        assert!(index.contains(vk::BufferUsageFlags::INDEX_BUFFER));
        assert!(index.contains(vk::BufferUsageFlags::TRANSFER_DST));

        assert!(
            BufferUsage::Uniform
                .to_vk_usage()
                .contains(vk::BufferUsageFlags::UNIFORM_BUFFER)
        );
        assert_eq!(
            BufferUsage::Staging.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_SRC
        );
        assert_eq!(
            BufferUsage::Readback.to_vk_usage(),
            vk::BufferUsageFlags::TRANSFER_DST
        );
    }

    #[test]
    fn test_buffer_usage_memory_location() {
        assert_eq!(BufferUsage::Vertex.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(BufferUsage::Index.memory_location(), MemoryLocation::GpuOnly);
        assert_eq!(
            BufferUsage::Uniform.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Staging.memory_location(),
            MemoryLocation::CpuToGpu
        );
        assert_eq!(
            BufferUsage::Readback.memory_location(),
            MemoryLocation::GpuToCpu
        );
    }

    #[test]
    fn test_geometry_buffers_are_not_host_visible() {
        assert!(!BufferUsage::Vertex.is_host_visible());
        assert!(!BufferUsage::Index.is_host_visible());
        assert!(BufferUsage::Staging.is_host_visible());
        assert!(BufferUsage::Readback.is_host_visible());
    }

    #[test]
    fn test_buffer_usage_name() {
        assert_eq!(BufferUsage::Vertex.name(), "vertex");
        assert_eq!(BufferUsage::Index.name(), "index");
        assert_eq!(BufferUsage::Uniform.name(), "uniform");
        assert_eq!(BufferUsage::Staging.name(), "staging");
        assert_eq!(BufferUsage::Readback.name(), "readback");
    }
}
