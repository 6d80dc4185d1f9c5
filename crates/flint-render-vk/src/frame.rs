// SPDX-License-Identifier: CEPL-1.0
//! Per-frame state machine:
//! WAIT_PREV -> ACQUIRE -> RESET -> RECORD -> SUBMIT -> PRESENT -> ADVANCE.

use crate::error::RenderResult;
use crate::present::Recreation;
use ash::vk;
use flint_render::{FrameOutcome, WindowSystem};
use tracing::{debug, error};

pub const FRAMES_IN_FLIGHT: usize = 2;

/// Synchronization and recording state for one frame in flight.
#[derive(Clone, Copy, Debug)]
pub struct FrameSlot {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
    pub command_buffer: vk::CommandBuffer,
}

/// Monotonic frame count; the active slot is the count modulo
/// [`FRAMES_IN_FLIGHT`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameCounter(u64);

impl FrameCounter {
    pub fn active(&self) -> usize {
        (self.0 % FRAMES_IN_FLIGHT as u64) as usize
    }

    pub fn advance(&mut self) {
        self.0 = self.0.wrapping_add(1);
    }

    pub fn frames(&self) -> u64 {
        self.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Acquired {
    Image { index: u32, suboptimal: bool },
    OutOfDate,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Presented {
    Fresh,
    /// Out of date or suboptimal: the chain should be rebuilt.
    Stale,
}

/// GPU-facing steps of a frame, one call per state.
pub trait FrameOps {
    /// Blocks until the slot's fence is signaled.
    fn wait_for_slot(&mut self, slot: usize) -> RenderResult<()>;
    /// Signals the slot's image-available semaphore on success.
    fn acquire_image(&mut self, slot: usize) -> RenderResult<Acquired>;
    /// Unsignals the fence and empties the command buffer.
    fn reset_slot(&mut self, slot: usize) -> RenderResult<()>;
    fn record(&mut self, slot: usize, image: u32) -> RenderResult<()>;
    fn submit(&mut self, slot: usize) -> RenderResult<()>;
    fn present(&mut self, slot: usize, image: u32) -> RenderResult<Presented>;
    /// Returns a slot whose image was acquired but never submitted to a state
    /// where its next wait completes and its semaphore is unsignaled.
    fn abandon_slot(&mut self, slot: usize) -> RenderResult<()>;
    fn recreate(&mut self, window: &mut dyn WindowSystem) -> RenderResult<Recreation>;
}

#[derive(Debug, Default)]
pub struct FrameScheduler {
    counter: FrameCounter,
    // An abandoned frame still holds its acquired image; only destroying the
    // chain gives it back.
    needs_recreate: bool,
}

impl FrameScheduler {
    pub fn counter(&self) -> FrameCounter {
        self.counter
    }

    /// Runs one frame.
    ///
    /// Stale presentation is handled by rebuilding the chain. Other per-frame
    /// failures are logged and the frame dropped; a frame dropped after its
    /// image was acquired forces a rebuild before the next acquire. Only failures to wait on the
    /// slot, to restore an abandoned slot, or to rebuild come back as errors.
    pub fn draw_frame<F>(
        &mut self,
        ops: &mut F,
        window: &mut dyn WindowSystem,
    ) -> RenderResult<FrameOutcome>
    where
        F: FrameOps + ?Sized,
    {
        let slot = self.counter.active();

        // WAIT_PREV
        ops.wait_for_slot(slot)?;

        if self.needs_recreate {
            debug!("rebuilding chain to release an abandoned image");
            if ops.recreate(window)? == Recreation::Interrupted {
                return Ok(FrameOutcome::Interrupted);
            }
            self.needs_recreate = false;
        }

        // ACQUIRE
        let image = match ops.acquire_image(slot) {
            Ok(Acquired::Image { index, suboptimal }) => {
                if suboptimal {
                    debug!("acquired image {index} from a suboptimal chain");
                }
                index
            }
            Ok(Acquired::OutOfDate) => {
                debug!("chain out of date at acquire");
                return Ok(match ops.recreate(window)? {
                    Recreation::Rebuilt(_) => FrameOutcome::Skipped,
                    Recreation::Interrupted => FrameOutcome::Interrupted,
                });
            }
            Err(err) => {
                // Nothing was signaled or reset; the slot is untouched.
                error!("acquire failed, frame dropped: {err}");
                return Ok(FrameOutcome::Abandoned);
            }
        };

        // RESET, RECORD, SUBMIT
        let submitted = ops
            .reset_slot(slot)
            .and_then(|()| ops.record(slot, image))
            .and_then(|()| ops.submit(slot));
        if let Err(err) = submitted {
            error!("frame {} dropped before submit: {err}", self.counter.frames());
            ops.abandon_slot(slot)?;
            self.needs_recreate = true;
            return Ok(FrameOutcome::Abandoned);
        }

        // PRESENT
        let outcome = match ops.present(slot, image) {
            Ok(Presented::Fresh) => FrameOutcome::Presented,
            Ok(Presented::Stale) => {
                debug!("chain stale at present");
                match ops.recreate(window)? {
                    Recreation::Rebuilt(_) => FrameOutcome::PresentedAndRecreated,
                    Recreation::Interrupted => FrameOutcome::Interrupted,
                }
            }
            Err(err) => {
                error!("present failed: {err}");
                FrameOutcome::Abandoned
            }
        };

        // ADVANCE
        self.counter.advance();
        Ok(outcome)
    }
}
