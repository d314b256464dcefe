//! Decides when, within a slot, a duty should fire.
//!
//! Attestations are produced one third of the way through the slot, or as soon as a valid block
//! for the slot has been observed, whichever comes first. Block proposals fire at the start of
//! the slot.
use slot_clock::SlotClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use types::Slot;

/// The reason a call to `DutyTimer::wait_one_third_or_valid_block` returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A valid block for the slot (or a later one) had already been seen.
    AlreadyKnown,
    /// One third of the slot elapsed.
    Deadline,
    /// A valid block for the slot arrived during the wait.
    ValidBlock,
}

impl WaitOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitOutcome::AlreadyKnown => "already_known",
            WaitOutcome::Deadline => "deadline",
            WaitOutcome::ValidBlock => "valid_block",
        }
    }
}

/// Publishes the highest slot for which a valid block has been observed.
#[derive(Clone)]
pub struct ValidBlockEvents {
    tx: Arc<watch::Sender<Option<Slot>>>,
}

impl Default for ValidBlockEvents {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidBlockEvents {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Record that a valid block at `slot` was observed. The published slot never decreases.
    pub fn publish(&self, slot: Slot) {
        self.tx.send_if_modified(|highest| {
            if highest.map_or(true, |highest| slot > highest) {
                *highest = Some(slot);
                true
            } else {
                false
            }
        });
    }

    pub fn highest(&self) -> Option<Slot> {
        *self.tx.borrow()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Slot>> {
        self.tx.subscribe()
    }
}

pub struct DutyTimer<S> {
    slot_clock: S,
    events: ValidBlockEvents,
    attest_on_valid_block: bool,
}

impl<S: SlotClock> DutyTimer<S> {
    pub fn new(slot_clock: S, events: ValidBlockEvents, attest_on_valid_block: bool) -> Self {
        Self {
            slot_clock,
            events,
            attest_on_valid_block,
        }
    }

    /// Wait until one third of the way through `slot`, returning early if a valid block for
    /// `slot` is observed first.
    ///
    /// The returned future holds no state, dropping it cancels the wait.
    pub async fn wait_one_third_or_valid_block(&self, slot: Slot) -> WaitOutcome {
        let delay = self.duration_to_one_third(slot);

        if !self.attest_on_valid_block {
            tokio::time::sleep(delay).await;
            return WaitOutcome::Deadline;
        }

        let mut rx = self.events.subscribe();
        let already_known = rx
            .borrow_and_update()
            .map_or(false, |highest| highest >= slot);
        if already_known {
            return WaitOutcome::AlreadyKnown;
        }

        let valid_block = async {
            rx.wait_for(|highest| highest.map_or(false, |highest| highest >= slot))
                .await
                .is_ok()
        };

        // A closed channel disables the block branch, leaving only the deadline.
        tokio::select! {
            _ = tokio::time::sleep(delay) => WaitOutcome::Deadline,
            true = valid_block => WaitOutcome::ValidBlock,
        }
    }

    /// The remaining time until one third of the way through `slot`, zero if already passed.
    pub fn duration_to_one_third(&self, slot: Slot) -> Duration {
        self.slot_clock
            .one_third_of(slot)
            .zip(self.slot_clock.now_duration())
            .and_then(|(deadline, now)| deadline.checked_sub(now))
            .unwrap_or(Duration::ZERO)
    }

    /// The remaining time until the start of `slot`, zero if already passed.
    pub fn duration_to_slot_start(&self, slot: Slot) -> Duration {
        self.slot_clock
            .duration_to_slot(slot)
            .unwrap_or(Duration::ZERO)
    }

    pub fn slot_clock(&self) -> &S {
        &self.slot_clock
    }
}
