//! RHI-specific error types.

use thiserror::Error;

/// RHI-specific error type.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error
    #[error("Vulkan error: {0}")]
    VulkanError(#[from] ash::vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    LoadingError(#[from] ash::LoadingError),

    /// GPU allocator error
    #[error("Allocator error: {0}")]
    AllocatorError(#[from] gpu_allocator::AllocationError),

    /// No physical device satisfies the requirements
    #[error("No suitable GPU found")]
    NoSuitableGpu,

    /// Shader module creation or loading error
    #[error("Shader error: {0}")]
    ShaderError(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    SurfaceError(String),

    /// Swapchain error
    #[error("Swapchain error: {0}")]
    SwapchainError(String),

    /// Invalid handle or argument
    #[error("Invalid handle: {0}")]
    InvalidHandle(String),

    /// Render pass or pipeline creation error
    #[error("Pipeline error: {0}")]
    PipelineError(String),

    /// One-shot transfer failed
    #[error("Transfer error: {0}")]
    TransferError(String),
}

impl RhiError {
    /// Returns true if this error means host or device memory ran out.
    ///
    /// Allocation failures are never transient here, so callers use this to
    /// report resource exhaustion separately from other failures.
    pub fn is_out_of_memory(&self) -> bool {
        match self {
            RhiError::VulkanError(result) => matches!(
                *result,
                ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY
                    | ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY
            ),
            RhiError::AllocatorError(gpu_allocator::AllocationError::OutOfMemory) => true,
            _ => false,
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_out_of_memory_classification() {
        assert!(RhiError::from(ash::vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).is_out_of_memory());
        assert!(RhiError::from(ash::vk::Result::ERROR_OUT_OF_HOST_MEMORY).is_out_of_memory());
        assert!(RhiError::from(gpu_allocator::AllocationError::OutOfMemory).is_out_of_memory());

        assert!(!RhiError::from(ash::vk::Result::ERROR_DEVICE_LOST).is_out_of_memory());
        assert!(!RhiError::NoSuitableGpu.is_out_of_memory());
    }
}
