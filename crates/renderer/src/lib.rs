//! Frame scheduler and two-subpass render graph.
//!
//! This crate drives the frame loop on top of `subpass_rhi`:
//! - Frame contexts with their fences and semaphores ([`FramePool`])
//! - GPU-independent scheduling of those contexts ([`FrameSchedule`])
//! - The render pass with a geometry and a composite subpass ([`RenderGraph`])
//! - Meshes, textures and per-image descriptors
//! - The [`Renderer`] that ties them to a window

pub mod attachments;
pub mod descriptors;
mod error;
pub mod frame_pool;
pub mod mesh;
pub mod render_graph;
mod renderer;
pub mod schedule;
pub mod texture;
pub mod ubo;

pub use error::{RendererError, RendererResult};
pub use frame_pool::{FrameContext, FramePool};
pub use mesh::{ModelHandle, validate_mesh, validate_model};
pub use render_graph::RenderGraph;
pub use renderer::Renderer;
pub use schedule::{Acquired, FrameBackend, FrameSchedule, FrameState, ScheduleError, TickOutcome};
pub use subpass_core::MAX_FRAMES_IN_FLIGHT;
pub use ubo::CameraParams;
