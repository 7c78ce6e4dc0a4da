//! Platform error types.

use thiserror::Error;

/// Errors from window and surface creation.
#[derive(Error, Debug)]
pub enum PlatformError {
    /// winit refused to create the window
    #[error("Window creation failed: {0}")]
    WindowCreation(#[from] winit::error::OsError),

    /// Raw display or window handle unavailable
    #[error("Window handle unavailable: {0}")]
    Handle(#[from] raw_window_handle::HandleError),

    /// vkCreate*SurfaceKHR failed
    #[error("Surface creation failed: {0}")]
    Surface(ash::vk::Result),
}

/// Result type alias for platform operations.
pub type PlatformResult<T> = Result<T, PlatformError>;
