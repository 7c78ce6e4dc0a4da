//! Renderer error types.

use subpass_rhi::RhiError;
use thiserror::Error;

use crate::schedule::ScheduleError;

/// Errors surfaced by the [`crate::Renderer`] API.
///
/// None of these are retried. `Init` and `Frame` are fatal; the upload
/// variants are returned to the `load_model` caller, which may carry on
/// without the model.
#[derive(Error, Debug)]
pub enum RendererError {
    /// Missing capability or creation failure during initialization
    #[error("Initialization failed: {0}")]
    Init(#[source] RhiError),

    /// Acquire, submit or present failure
    #[error("Frame failed: {0}")]
    Frame(#[source] RhiError),

    /// Device or host memory ran out while uploading
    #[error("Out of device memory: {0}")]
    OutOfDeviceMemory(#[source] RhiError),

    /// The texture descriptor pool is full
    #[error("Texture limit of {limit} reached")]
    TextureLimitExceeded { limit: usize },

    /// No model was registered under this handle
    #[error("Unknown model handle {0}")]
    UnknownModel(usize),

    /// Mesh data rejected before upload
    #[error("Invalid mesh: {0}")]
    InvalidMesh(String),

    /// Engine configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    Config(#[from] subpass_core::Error),

    /// Window or surface creation failed
    #[error("Platform error: {0}")]
    Platform(#[from] subpass_platform::PlatformError),

    /// Frame contexts used out of order
    #[error("Frame schedule violated: {0}")]
    Schedule(#[from] ScheduleError),
}

impl RendererError {
    /// Classifies an upload failure: memory exhaustion or a plain frame error.
    pub fn from_upload(err: RhiError) -> Self {
        if err.is_out_of_memory() {
            RendererError::OutOfDeviceMemory(err)
        } else {
            RendererError::Frame(err)
        }
    }

    /// Reclassifies a device failure that happened during startup as
    /// [`RendererError::Init`]. Other variants pass through.
    pub fn into_init(self) -> Self {
        match self {
            RendererError::Frame(err) | RendererError::OutOfDeviceMemory(err) => {
                RendererError::Init(err)
            }
            other => other,
        }
    }
}

/// Result type alias for renderer operations.
pub type RendererResult<T> = Result<T, RendererError>;

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_upload_error_classification() {
        let oom = RendererError::from_upload(RhiError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert!(matches!(oom, RendererError::OutOfDeviceMemory(_)));

        let lost = RendererError::from_upload(RhiError::from(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(lost, RendererError::Frame(_)));
    }

    #[test]
    fn test_startup_upload_failure_is_init() {
        let oom = RendererError::from_upload(RhiError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert!(matches!(oom.into_init(), RendererError::Init(_)));

        let lost = RendererError::from_upload(RhiError::from(vk::Result::ERROR_DEVICE_LOST));
        assert!(matches!(lost.into_init(), RendererError::Init(_)));

        let full = RendererError::TextureLimitExceeded { limit: 1 };
        assert!(matches!(
            full.into_init(),
            RendererError::TextureLimitExceeded { limit: 1 }
        ));
    }

    #[test]
    fn test_zero_frames_in_flight_is_config_error() {
        let config = subpass_core::EngineConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        let err = config.validate().map_err(RendererError::from).unwrap_err();
        assert!(matches!(err, RendererError::Config(_)));
    }
}
