//! Frame scheduling against a simulated GPU.
//!
//! The simulated device keeps a virtual clock. Each submission completes a
//! fixed number of ticks after it was made, fence waits advance the clock to
//! the completion time, and the presentation engine hands out images in a
//! scripted order. Every hazard the schedule must prevent is recorded as a
//! violation instead of panicking, so a test can report all of them.

use std::collections::VecDeque;

use subpass_renderer::{
    Acquired, FrameBackend, FrameSchedule, FrameState, ScheduleError, TickOutcome, validate_mesh,
};
use subpass_resources::reference_quads;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SimFence {
    Signaled,
    Unsignaled,
    Pending { done_at: u64 },
}

#[derive(Debug)]
enum SimError {
    /// A wait on a fence no submission will ever signal.
    Deadlock { context: usize },
    Schedule(ScheduleError),
}

impl From<ScheduleError> for SimError {
    fn from(e: ScheduleError) -> Self {
        SimError::Schedule(e)
    }
}

#[derive(Clone, Copy, Debug)]
struct Submission {
    context: usize,
    image: u32,
    done_at: u64,
}

struct SimGpu {
    now: u64,
    fences: Vec<SimFence>,
    submissions: Vec<Submission>,
    /// Per-submission GPU time, cycled.
    delays: Vec<u64>,
    image_order: VecDeque<Acquired>,
    acquired: Vec<u32>,
    presented: Vec<u32>,
    waits: Vec<(usize, u64)>,
    violations: Vec<String>,
}

impl SimGpu {
    fn new(frames: usize, delays: &[u64], order: impl IntoIterator<Item = Acquired>) -> Self {
        Self {
            now: 0,
            fences: vec![SimFence::Signaled; frames],
            submissions: Vec::new(),
            delays: delays.to_vec(),
            image_order: order.into_iter().collect(),
            acquired: Vec::new(),
            presented: Vec::new(),
            waits: Vec::new(),
            violations: Vec::new(),
        }
    }

    fn cycling_images(frames: usize, delays: &[u64], images: u32, ticks: usize) -> Self {
        let order = (0..ticks).map(|i| Acquired::Image {
            index: i as u32 % images,
            suboptimal: false,
        });
        Self::new(frames, delays, order)
    }

    fn busy(&self, pred: impl Fn(&Submission) -> bool) -> Option<Submission> {
        self.submissions
            .iter()
            .copied()
            .find(|s| pred(s) && s.done_at > self.now)
    }
}

impl FrameBackend for SimGpu {
    type Error = SimError;

    fn wait_for_fence(&mut self, context: usize) -> Result<(), SimError> {
        match self.fences[context] {
            SimFence::Signaled => {
                self.waits.push((context, 0));
                Ok(())
            }
            SimFence::Pending { done_at } => {
                let waited = done_at.saturating_sub(self.now);
                self.now = self.now.max(done_at);
                self.fences[context] = SimFence::Signaled;
                self.waits.push((context, waited));
                Ok(())
            }
            SimFence::Unsignaled => Err(SimError::Deadlock { context }),
        }
    }

    fn reset_fence(&mut self, context: usize) -> Result<(), SimError> {
        if let SimFence::Pending { done_at } = self.fences[context] {
            if done_at > self.now {
                self.violations
                    .push(format!("fence {} reset while its work is pending", context));
            }
        }
        self.fences[context] = SimFence::Unsignaled;
        Ok(())
    }

    fn acquire_image(&mut self, _context: usize) -> Result<Acquired, SimError> {
        let acquired = self.image_order.pop_front().unwrap_or(Acquired::OutOfDate);
        if let Acquired::Image { index, .. } = acquired {
            self.acquired.push(index);
        }
        Ok(acquired)
    }

    fn update_uniforms(&mut self, image_index: u32) -> Result<(), SimError> {
        if let Some(s) = self.busy(|s| s.image == image_index) {
            self.violations.push(format!(
                "uniforms of image {} written while context {} renders to it",
                image_index, s.context
            ));
        }
        Ok(())
    }

    fn record(&mut self, context: usize, _image_index: u32) -> Result<(), SimError> {
        if let Some(s) = self.busy(|s| s.context == context) {
            self.violations.push(format!(
                "context {} re-recorded at t={} before its submission finished at t={}",
                context, self.now, s.done_at
            ));
        }
        self.now += 1;
        Ok(())
    }

    fn submit(&mut self, context: usize, image_index: u32) -> Result<(), SimError> {
        if self.fences[context] != SimFence::Unsignaled {
            self.violations
                .push(format!("context {} submitted without a reset fence", context));
        }
        let delay = self.delays[self.submissions.len() % self.delays.len()];
        let done_at = self.now + delay;
        self.submissions.push(Submission {
            context,
            image: image_index,
            done_at,
        });
        self.fences[context] = SimFence::Pending { done_at };
        Ok(())
    }

    fn present(&mut self, _context: usize, image_index: u32) -> Result<bool, SimError> {
        self.presented.push(image_index);
        Ok(false)
    }
}

fn run(schedule: &mut FrameSchedule, gpu: &mut SimGpu, ticks: usize) -> Vec<TickOutcome> {
    (0..ticks)
        .map(|_| schedule.tick(&mut *gpu).expect("tick failed"))
        .collect()
}

#[test]
fn test_context_reused_only_after_submission_completes() {
    let mut schedule = FrameSchedule::new(2, 3);
    let mut gpu = SimGpu::cycling_images(2, &[10, 3, 7, 25], 3, 16);

    let outcomes = run(&mut schedule, &mut gpu, 16);

    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
    let contexts: Vec<usize> = outcomes
        .iter()
        .map(|o| match o {
            TickOutcome::Presented { context, .. } => *context,
            TickOutcome::OutOfDate => usize::MAX,
        })
        .collect();
    assert_eq!(&contexts[..4], &[0, 1, 0, 1]);
    assert_eq!(schedule.frame_number(), 16);
}

#[test]
fn test_uniforms_never_written_while_image_in_flight() {
    // More contexts than images, with an engine that hands the same image
    // back twice in a row.
    let order = [0, 1, 1, 0, 0, 1, 0, 1, 1, 0]
        .into_iter()
        .map(|index| Acquired::Image {
            index,
            suboptimal: false,
        });
    let mut schedule = FrameSchedule::new(3, 2);
    let mut gpu = SimGpu::new(3, &[40, 5, 17, 2, 33], order);

    run(&mut schedule, &mut gpu, 10);

    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
    assert_eq!(gpu.presented, gpu.acquired);
}

#[test]
fn test_image_owner_fence_is_waited() {
    let order = [0, 0].into_iter().map(|index| Acquired::Image {
        index,
        suboptimal: false,
    });
    let mut schedule = FrameSchedule::new(2, 1);
    let mut gpu = SimGpu::new(2, &[50], order);

    run(&mut schedule, &mut gpu, 2);

    // Second tick: context 1's own fence is free, then it waits on context 0
    // because image 0 is still being rendered by it.
    assert_eq!(gpu.waits[1], (1, 0));
    assert_eq!(gpu.waits[2].0, 0);
    assert!(gpu.waits[2].1 > 0);
    assert_eq!(schedule.image_owner(0), Some(1));
    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
}

#[test]
fn test_reference_scene_three_frames() {
    let quads = reference_quads();
    for quad in &quads {
        validate_mesh(quad.vertices.len(), &quad.indices).expect("reference quad is valid");
    }

    const GPU_TIME: u64 = 8;
    let mut schedule = FrameSchedule::new(2, 3);
    let mut gpu = SimGpu::cycling_images(2, &[GPU_TIME], 3, 3);

    let outcomes = run(&mut schedule, &mut gpu, 3);

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes.iter().all(|o| matches!(
        o,
        TickOutcome::Presented {
            recreate: false,
            ..
        }
    )));
    assert_eq!(gpu.presented, vec![0, 1, 2]);
    assert_eq!(gpu.presented, gpu.acquired);
    assert!(gpu.waits.iter().all(|&(_, waited)| waited <= GPU_TIME));
    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
    assert_eq!(schedule.state(0), Some(FrameState::Submitted));
}

#[test]
fn test_out_of_date_keeps_fence_signaled() {
    let order = [
        Acquired::Image {
            index: 0,
            suboptimal: false,
        },
        Acquired::OutOfDate,
        Acquired::Image {
            index: 1,
            suboptimal: true,
        },
    ];
    let mut schedule = FrameSchedule::new(2, 2);
    let mut gpu = SimGpu::new(2, &[4], order);

    assert!(matches!(
        schedule.tick(&mut gpu).unwrap(),
        TickOutcome::Presented { context: 0, .. }
    ));
    assert_eq!(schedule.tick(&mut gpu).unwrap(), TickOutcome::OutOfDate);
    assert_eq!(gpu.fences[1], SimFence::Signaled);

    // Device idle, swapchain rebuilt.
    gpu.now += 100;
    schedule.reset_images(2);

    let outcome = schedule.tick(&mut gpu).expect("no deadlock after out-of-date");
    assert_eq!(
        outcome,
        TickOutcome::Presented {
            context: 1,
            image_index: 1,
            recreate: true,
        }
    );
    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
}

#[test]
fn test_single_context_serializes_frames() {
    let mut schedule = FrameSchedule::new(1, 3);
    let mut gpu = SimGpu::cycling_images(1, &[6], 3, 5);

    run(&mut schedule, &mut gpu, 5);

    let total_wait: u64 = gpu.waits.iter().map(|&(_, w)| w).sum();
    assert!(total_wait > 0);
    assert!(gpu.violations.is_empty(), "{:#?}", gpu.violations);
}
