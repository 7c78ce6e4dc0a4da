//! Frame scheduling, independent of any GPU object.
//!
//! [`FrameSchedule`] owns the bookkeeping of the frame loop: which frame
//! context is current, what state each context is in, and which context last
//! rendered to each swapchain image. The GPU work itself goes through a
//! [`FrameBackend`], so the same tick drives the Vulkan renderer and the
//! simulated fences used in tests.
//!
//! # Overview
//!
//! One call to [`FrameSchedule::tick`] performs:
//!
//! ```text
//! 1. wait on the current context's fence
//! 2. acquire an image (signals the context's image-acquired semaphore)
//!    and wait on the fence of the context that last used that image
//! 3. reset the fence, write the uniform buffer of that image
//! 4. record the render graph into the context's command buffer
//! 5. submit: wait image-acquired, signal render-finished, fence
//! 6. present: wait render-finished
//! 7. advance to the next context
//! ```
//!
//! The fence is reset only after an image was acquired, so an out-of-date
//! swapchain never leaves a context with an unsignaled fence and no
//! submission to signal it.
//!
//! # Example
//!
//! ```no_run
//! use subpass_renderer::schedule::{FrameBackend, FrameSchedule, TickOutcome};
//!
//! # fn example<B: FrameBackend>(backend: &mut B) -> Result<(), B::Error> {
//! let mut schedule = FrameSchedule::new(2, 3);
//! match schedule.tick(backend)? {
//!     TickOutcome::Presented { recreate: true, .. } | TickOutcome::OutOfDate => {
//!         // recreate the swapchain, then:
//!         schedule.reset_images(3);
//!     }
//!     TickOutcome::Presented { .. } => {}
//! }
//! # Ok(())
//! # }
//! ```

use thiserror::Error;
use tracing::trace;

/// Lifecycle of a frame context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameState {
    /// Fence observed signaled; the command buffer may be reset.
    Idle,
    /// Commands are being recorded.
    Recording,
    /// Submitted; the GPU may still be executing.
    Submitted,
}

/// Out-of-order use of a frame context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("frame context {context} is {actual:?}, expected {expected:?}")]
    UnexpectedState {
        context: usize,
        expected: FrameState,
        actual: FrameState,
    },

    #[error("image index {index} out of range for {count} swapchain images")]
    ImageOutOfRange { index: u32, count: usize },
}

/// Result of an image acquisition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    /// The swapchain no longer matches the surface.
    OutOfDate,
}

/// What one tick accomplished.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Presented {
        context: usize,
        image_index: u32,
        /// The swapchain should be recreated before the next tick.
        recreate: bool,
    },
    /// Nothing was submitted; recreate the swapchain.
    OutOfDate,
}

/// GPU side of a tick.
///
/// Each method maps to one step of the frame loop. Implementations block
/// where the step blocks (fence waits) and return errors unchanged; the
/// schedule never retries.
pub trait FrameBackend {
    type Error: From<ScheduleError>;

    /// Blocks until the fence of `context` is signaled.
    fn wait_for_fence(&mut self, context: usize) -> Result<(), Self::Error>;

    /// Returns the fence of `context` to the unsignaled state.
    fn reset_fence(&mut self, context: usize) -> Result<(), Self::Error>;

    /// Acquires the next image, signaling the image-acquired semaphore of
    /// `context`.
    fn acquire_image(&mut self, context: usize) -> Result<Acquired, Self::Error>;

    /// Writes the per-image uniform buffer.
    fn update_uniforms(&mut self, image_index: u32) -> Result<(), Self::Error>;

    /// Records the render graph into the command buffer of `context`.
    fn record(&mut self, context: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Submits the command buffer of `context`.
    fn submit(&mut self, context: usize, image_index: u32) -> Result<(), Self::Error>;

    /// Presents `image_index`. Returns true if the swapchain should be
    /// recreated.
    fn present(&mut self, context: usize, image_index: u32) -> Result<bool, Self::Error>;
}

/// Bookkeeping for N frame contexts cycling over the swapchain images.
#[derive(Debug)]
pub struct FrameSchedule {
    states: Vec<FrameState>,
    images_in_flight: Vec<Option<usize>>,
    current: usize,
    frame_number: u64,
}

impl FrameSchedule {
    /// Creates a schedule with all contexts idle.
    ///
    /// `frames_in_flight` is clamped to at least one.
    pub fn new(frames_in_flight: usize, image_count: usize) -> Self {
        Self {
            states: vec![FrameState::Idle; frames_in_flight.max(1)],
            images_in_flight: vec![None; image_count],
            current: 0,
            frame_number: 0,
        }
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.states.len()
    }

    /// Index of the context the next tick will use.
    #[inline]
    pub fn current_context(&self) -> usize {
        self.current
    }

    /// Number of completed ticks.
    #[inline]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    pub fn state(&self, context: usize) -> Option<FrameState> {
        self.states.get(context).copied()
    }

    /// Context that last rendered to `image_index`, if any.
    pub fn image_owner(&self, image_index: u32) -> Option<usize> {
        self.images_in_flight
            .get(image_index as usize)
            .copied()
            .flatten()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images_in_flight.len()
    }

    /// Forgets image ownership after the swapchain was rebuilt.
    ///
    /// Only valid after the device went idle: every context is marked
    /// [`FrameState::Idle`].
    pub fn reset_images(&mut self, image_count: usize) {
        self.images_in_flight = vec![None; image_count];
        self.states.fill(FrameState::Idle);
    }

    /// Runs one frame.
    ///
    /// # Errors
    ///
    /// Returns the first backend error, or a [`ScheduleError`] if a context
    /// is found in the wrong state. Contexts are left as they were at the
    /// failing step.
    pub fn tick<B: FrameBackend>(&mut self, backend: &mut B) -> Result<TickOutcome, B::Error> {
        let context = self.current;

        backend.wait_for_fence(context)?;
        self.observe_signaled(context);

        let (image_index, suboptimal) = match backend.acquire_image(context)? {
            Acquired::Image { index, suboptimal } => (index, suboptimal),
            Acquired::OutOfDate => return Ok(TickOutcome::OutOfDate),
        };

        let slot = self.image_slot(image_index)?;
        if let Some(owner) = self.images_in_flight[slot] {
            if owner != context {
                trace!(
                    "Image {} still owned by frame context {}, waiting",
                    image_index, owner
                );
                backend.wait_for_fence(owner)?;
                self.observe_signaled(owner);
            }
        }
        self.images_in_flight[slot] = Some(context);

        backend.reset_fence(context)?;
        self.transition(context, FrameState::Idle, FrameState::Recording)?;

        backend.update_uniforms(image_index)?;
        backend.record(context, image_index)?;
        backend.submit(context, image_index)?;
        self.transition(context, FrameState::Recording, FrameState::Submitted)?;

        let recreate = backend.present(context, image_index)? || suboptimal;

        self.current = (context + 1) % self.states.len();
        self.frame_number += 1;

        Ok(TickOutcome::Presented {
            context,
            image_index,
            recreate,
        })
    }

    fn observe_signaled(&mut self, context: usize) {
        if let Some(state) = self.states.get_mut(context) {
            if *state == FrameState::Submitted {
                *state = FrameState::Idle;
            }
        }
    }

    fn transition(
        &mut self,
        context: usize,
        expected: FrameState,
        next: FrameState,
    ) -> Result<(), ScheduleError> {
        let actual = self.states[context];
        if actual != expected {
            return Err(ScheduleError::UnexpectedState {
                context,
                expected,
                actual,
            });
        }
        self.states[context] = next;
        Ok(())
    }

    fn image_slot(&self, image_index: u32) -> Result<usize, ScheduleError> {
        let slot = image_index as usize;
        if slot >= self.images_in_flight.len() {
            return Err(ScheduleError::ImageOutOfRange {
                index: image_index,
                count: self.images_in_flight.len(),
            });
        }
        Ok(slot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Records calls; images are handed out round-robin.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<String>,
        next_image: u32,
        image_count: u32,
        out_of_date: bool,
    }

    impl FrameBackend for Recorder {
        type Error = ScheduleError;

        fn wait_for_fence(&mut self, context: usize) -> Result<(), Self::Error> {
            self.calls.push(format!("wait {context}"));
            Ok(())
        }

        fn reset_fence(&mut self, context: usize) -> Result<(), Self::Error> {
            self.calls.push(format!("reset {context}"));
            Ok(())
        }

        fn acquire_image(&mut self, _context: usize) -> Result<Acquired, Self::Error> {
            if self.out_of_date {
                return Ok(Acquired::OutOfDate);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            self.calls.push(format!("acquire {index}"));
            Ok(Acquired::Image {
                index,
                suboptimal: false,
            })
        }

        fn update_uniforms(&mut self, image_index: u32) -> Result<(), Self::Error> {
            self.calls.push(format!("ubo {image_index}"));
            Ok(())
        }

        fn record(&mut self, context: usize, image_index: u32) -> Result<(), Self::Error> {
            self.calls.push(format!("record {context} {image_index}"));
            Ok(())
        }

        fn submit(&mut self, context: usize, _image_index: u32) -> Result<(), Self::Error> {
            self.calls.push(format!("submit {context}"));
            Ok(())
        }

        fn present(&mut self, _context: usize, image_index: u32) -> Result<bool, Self::Error> {
            self.calls.push(format!("present {image_index}"));
            Ok(false)
        }
    }

    #[test]
    fn test_tick_step_order() {
        let mut schedule = FrameSchedule::new(2, 3);
        let mut backend = Recorder {
            image_count: 3,
            ..Default::default()
        };

        let outcome = schedule.tick(&mut backend).unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Presented {
                context: 0,
                image_index: 0,
                recreate: false
            }
        );
        assert_eq!(
            backend.calls,
            [
                "wait 0", "acquire 0", "reset 0", "ubo 0", "record 0 0", "submit 0", "present 0"
            ]
        );
        assert_eq!(schedule.state(0), Some(FrameState::Submitted));
        assert_eq!(schedule.current_context(), 1);
    }

    #[test]
    fn test_contexts_cycle_modulo_n() {
        let mut schedule = FrameSchedule::new(2, 3);
        let mut backend = Recorder {
            image_count: 3,
            ..Default::default()
        };

        let contexts: Vec<usize> = (0..5)
            .map(|_| match schedule.tick(&mut backend).unwrap() {
                TickOutcome::Presented { context, .. } => context,
                TickOutcome::OutOfDate => unreachable!(),
            })
            .collect();
        assert_eq!(contexts, [0, 1, 0, 1, 0]);
        assert_eq!(schedule.frame_number(), 5);
    }

    #[test]
    fn test_waits_on_previous_owner_of_image() {
        // More contexts than images, so image 0 comes back to a new context.
        let mut schedule = FrameSchedule::new(3, 2);
        let mut backend = Recorder {
            image_count: 2,
            ..Default::default()
        };

        for _ in 0..3 {
            schedule.tick(&mut backend).unwrap();
        }
        // Third tick: context 2 acquires image 0, owned by context 0.
        let third: Vec<&str> = backend
            .calls
            .iter()
            .map(String::as_str)
            .skip_while(|c| *c != "wait 2")
            .take(3)
            .collect();
        assert_eq!(third, ["wait 2", "acquire 0", "wait 0"]);
        assert_eq!(schedule.image_owner(0), Some(2));
        assert_eq!(schedule.state(0), Some(FrameState::Idle));
    }

    #[test]
    fn test_out_of_date_leaves_fence_untouched() {
        let mut schedule = FrameSchedule::new(2, 3);
        let mut backend = Recorder {
            image_count: 3,
            out_of_date: true,
            ..Default::default()
        };

        assert_eq!(schedule.tick(&mut backend).unwrap(), TickOutcome::OutOfDate);
        assert_eq!(backend.calls, ["wait 0"]);
        assert_eq!(schedule.current_context(), 0);
        assert_eq!(schedule.state(0), Some(FrameState::Idle));
    }

    #[test]
    fn test_image_index_out_of_range() {
        let mut schedule = FrameSchedule::new(2, 1);
        let mut backend = Recorder {
            image_count: 3,
            next_image: 2,
            ..Default::default()
        };
        assert_eq!(
            schedule.tick(&mut backend),
            Err(ScheduleError::ImageOutOfRange { index: 2, count: 1 })
        );
    }

    #[test]
    fn test_reset_images_clears_owners() {
        let mut schedule = FrameSchedule::new(2, 3);
        let mut backend = Recorder {
            image_count: 3,
            ..Default::default()
        };
        schedule.tick(&mut backend).unwrap();
        assert_eq!(schedule.image_owner(0), Some(0));

        schedule.reset_images(4);
        assert_eq!(schedule.image_count(), 4);
        assert_eq!(schedule.image_owner(0), None);
        assert_eq!(schedule.state(0), Some(FrameState::Idle));
    }

    #[test]
    fn test_zero_frames_in_flight_clamped() {
        assert_eq!(FrameSchedule::new(0, 3).frames_in_flight(), 1);
    }
}
