//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps the parts of Vulkan the frame scheduler needs, using
//! `ash` for the API and `gpu-allocator` for memory:
//! - Instance, physical device selection and logical device creation
//! - Swapchain negotiation (format, present mode, extent, image count)
//! - Command pools/buffers, fences and semaphores
//! - Buffers, images, samplers and descriptor sets
//! - Render passes with subpass dependencies, framebuffers and pipelines
//! - Synchronous staging transfers with a readback path for diagnostics

mod error;

pub mod buffer;
pub mod command;
pub mod descriptor;
pub mod device;
pub mod framebuffer;
pub mod image;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod sampler;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod transfer;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
