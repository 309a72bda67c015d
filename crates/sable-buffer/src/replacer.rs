//! Page replacement policies for the buffer pool.

use crate::frame::{FrameDescriptor, FrameId, FrameState};
use tracing::trace;

/// Trait for page replacement algorithms.
///
/// The pool calls the `on_*` hooks while holding its lock, right after it
/// has updated the descriptor's pin count, so a policy can read the new
/// count. Policies keep per-frame state in `FrameDescriptor::state` and any
/// global state (a clock hand, a queue) in themselves.
pub trait Replacer: Send {
    /// The frame now holds a freshly allocated page.
    fn on_new_page(&mut self, frame: &mut FrameDescriptor);

    /// The frame's page was deallocated; the frame must be reclaimable at once.
    fn on_free_page(&mut self, frame: &mut FrameDescriptor);

    /// The frame gained a pin and must not be reclaimed.
    fn on_pin(&mut self, frame: &mut FrameDescriptor);

    /// The frame lost a pin. At pin count zero it becomes eligible for reclamation.
    fn on_unpin(&mut self, frame: &mut FrameDescriptor);

    /// Selects a frame that can be reclaimed now.
    ///
    /// Returns None if no frame is eligible, i.e. every frame is pinned.
    fn pick_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId>;
}

/// Clock (second-chance) replacement.
///
/// The hand sweeps the frame table circularly. `Available` frames are taken,
/// `SecondChance` frames are demoted to `Available` and skipped, `Pinned`
/// frames are skipped. A sweep is bounded by two rotations: the first may
/// only demote, the second then finds a demoted frame unless every frame is
/// pinned.
#[derive(Debug, Default)]
pub struct ClockReplacer {
    /// Last slot the hand stopped at; None until the first sweep.
    hand: Option<usize>,
}

impl ClockReplacer {
    /// Creates a clock replacer with the hand just before slot 0.
    pub fn new() -> Self {
        Self { hand: None }
    }

    /// Returns the slot the hand last stopped at.
    #[cfg(test)]
    pub(crate) fn hand(&self) -> Option<FrameId> {
        self.hand.map(|h| FrameId(h as u32))
    }
}

impl Replacer for ClockReplacer {
    fn on_new_page(&mut self, _frame: &mut FrameDescriptor) {}

    fn on_free_page(&mut self, frame: &mut FrameDescriptor) {
        frame.set_state(FrameState::Available);
    }

    fn on_pin(&mut self, frame: &mut FrameDescriptor) {
        frame.set_state(FrameState::Pinned);
    }

    fn on_unpin(&mut self, frame: &mut FrameDescriptor) {
        if frame.pin_count() == 0 {
            frame.set_state(FrameState::SecondChance);
        }
    }

    fn pick_victim(&mut self, frames: &mut [FrameDescriptor]) -> Option<FrameId> {
        let num_frames = frames.len();

        for _ in 0..2 * num_frames {
            let slot = self.hand.map_or(0, |h| (h + 1) % num_frames);
            self.hand = Some(slot);

            let frame = &mut frames[slot];
            match frame.state() {
                FrameState::Available => {
                    trace!(frame_id = %frame.frame_id(), "clock picked victim");
                    return Some(frame.frame_id());
                }
                FrameState::SecondChance => frame.set_state(FrameState::Available),
                FrameState::Pinned => {}
            }
        }

        trace!(num_frames, "clock found no victim, every frame pinned");
        None
    }
}
