//! Per-frame resource pool.
//!
//! This module provides the [`FramePool`], a ring of [`FrameContext`]s. Each
//! context owns what one frame in flight needs:
//!
//! - A primary command buffer, re-recorded every time the context comes round
//! - An image-acquired semaphore (signaled by acquire, waited by submit)
//! - A render-finished semaphore (signaled by submit, waited by present)
//! - A fence, created signaled, that the host waits on before reuse
//!
//! # Synchronization Flow
//!
//! ```text
//! 1. Wait on in_flight_fence (previous use of this context has finished)
//! 2. Acquire swapchain image (signals image_acquired)
//! 3. Reset in_flight_fence, record commands
//! 4. Submit:
//!    - wait image_acquired at COLOR_ATTACHMENT_OUTPUT
//!    - signal render_finished
//!    - signal in_flight_fence
//! 5. Present (waits on render_finished)
//! ```
//!
//! The state of each context lives in [`crate::schedule::FrameSchedule`];
//! this module only owns the Vulkan objects.

use std::sync::Arc;

use subpass_rhi::RhiResult;
use subpass_rhi::command::{CommandBuffer, CommandPool};
use subpass_rhi::device::Device;
use subpass_rhi::sync::{Fence, Semaphore};
use tracing::{debug, info};

/// Resources of one frame in flight.
pub struct FrameContext {
    command_buffer: CommandBuffer,
    image_acquired: Semaphore,
    render_finished: Semaphore,
    in_flight_fence: Fence,
}

impl FrameContext {
    fn new(device: Arc<Device>, command_pool: &CommandPool) -> RhiResult<Self> {
        let command_buffer = CommandBuffer::new(device.clone(), command_pool)?;
        let image_acquired = Semaphore::new(device.clone())?;
        let render_finished = Semaphore::new(device.clone())?;
        // Signaled so the first wait returns immediately
        let in_flight_fence = Fence::new(device, true)?;

        Ok(Self {
            command_buffer,
            image_acquired,
            render_finished,
            in_flight_fence,
        })
    }

    #[inline]
    pub fn command_buffer(&self) -> &CommandBuffer {
        &self.command_buffer
    }

    #[inline]
    pub fn image_acquired(&self) -> &Semaphore {
        &self.image_acquired
    }

    #[inline]
    pub fn render_finished(&self) -> &Semaphore {
        &self.render_finished
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }
}

/// Rejects an empty ring; the schedule always needs a context to wait on.
fn check_frames_in_flight(frames_in_flight: usize) -> RhiResult<()> {
    if frames_in_flight == 0 {
        return Err(subpass_rhi::RhiError::InvalidHandle(
            "frame pool needs at least one frame context".to_string(),
        ));
    }
    Ok(())
}

/// Ring of N frame contexts sharing one command pool.
///
/// # Thread Safety
///
/// Only the render thread touches the pool; it is `Send` so the renderer can
/// be built on one thread and moved to another.
pub struct FramePool {
    frames: Vec<FrameContext>,
    // Dropped after `frames`: command buffers are freed with the pool.
    _command_pool: CommandPool,
}

impl FramePool {
    /// Creates `frames_in_flight` contexts on the graphics queue family.
    ///
    /// # Errors
    ///
    /// Returns an error if `frames_in_flight` is zero, the device has no
    /// graphics family, or any object creation fails.
    pub fn new(device: Arc<Device>, frames_in_flight: usize) -> RhiResult<Self> {
        check_frames_in_flight(frames_in_flight)?;
        let family = device
            .queue_families()
            .graphics_family
            .ok_or(subpass_rhi::RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), family)?;

        let mut frames = Vec::with_capacity(frames_in_flight);
        for i in 0..frames_in_flight {
            frames.push(FrameContext::new(device.clone(), &command_pool)?);
            debug!("Created frame context {}", i);
        }

        info!("Frame pool created with {} frames in flight", frames_in_flight);

        Ok(Self {
            frames,
            _command_pool: command_pool,
        })
    }

    #[inline]
    pub fn get(&self, index: usize) -> Option<&FrameContext> {
        self.frames.get(index)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Replaces every semaphore with a fresh, unsignaled one.
    ///
    /// Called after swapchain recreation, when an acquire may have signaled
    /// an image-acquired semaphore that no submission will ever wait on. The
    /// device must be idle.
    ///
    /// # Errors
    ///
    /// Returns an error if semaphore creation fails.
    pub fn reset_semaphores(&mut self, device: &Arc<Device>) -> RhiResult<()> {
        for frame in &mut self.frames {
            frame.image_acquired = Semaphore::new(device.clone())?;
            frame.render_finished = Semaphore::new(device.clone())?;
        }
        debug!("Reset semaphores of {} frame contexts", self.frames.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_pool_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<FramePool>();
        assert_send::<FrameContext>();
    }

    #[test]
    fn test_empty_frame_pool_is_rejected() {
        assert!(check_frames_in_flight(0).is_err());
        assert!(check_frames_in_flight(1).is_ok());
        assert!(check_frames_in_flight(subpass_core::MAX_FRAMES_IN_FLIGHT).is_ok());
    }
}
