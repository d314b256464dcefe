use super::{ManualSlotClock, SlotClock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use types::Slot;

pub use std::time::SystemTimeError;

/// Determines the present slot based upon the present system time.
#[derive(Clone)]
pub struct SystemTimeSlotClock {
    clock: ManualSlotClock,
}

impl SlotClock for SystemTimeSlotClock {
    fn new(genesis_slot: Slot, genesis_duration: Duration, slot_duration: Duration) -> Self {
        Self {
            clock: ManualSlotClock::new(genesis_slot, genesis_duration, slot_duration),
        }
    }

    fn now(&self) -> Option<Slot> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        self.clock.slot_of(now)
    }

    fn now_duration(&self) -> Option<Duration> {
        SystemTime::now().duration_since(UNIX_EPOCH).ok()
    }

    fn slot_of(&self, now: Duration) -> Option<Slot> {
        self.clock.slot_of(now)
    }

    fn duration_to_next_slot(&self) -> Option<Duration> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        self.clock.duration_to_next_slot_from(now)
    }

    fn duration_to_next_epoch(&self, slots_per_epoch: u64) -> Option<Duration> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        self.clock.duration_to_next_epoch_from(now, slots_per_epoch)
    }

    fn slot_duration(&self) -> Duration {
        self.clock.slot_duration()
    }

    fn duration_to_slot(&self, slot: Slot) -> Option<Duration> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH).ok()?;
        self.clock.duration_to_slot(slot, now)
    }

    fn start_of(&self, slot: Slot) -> Option<Duration> {
        self.clock.start_of(slot)
    }

    fn genesis_slot(&self) -> Slot {
        self.clock.genesis_slot()
    }

    fn genesis_duration(&self) -> Duration {
        *self.clock.genesis_duration()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_now() {
        let genesis_slot = Slot::new(0);

        let prior_genesis = |milliseconds_prior: u64| {
            let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap();
            let genesis = now + Duration::from_millis(milliseconds_prior);

            SystemTimeSlotClock::new(genesis_slot, genesis, Duration::from_secs(1))
        };

        assert_eq!(prior_genesis(0).now(), Some(Slot::new(0)));
        assert_eq!(prior_genesis(5_000).now(), None);
        assert_eq!(prior_genesis(5_000).is_prior_to_genesis(), Some(true));

        let clock = SystemTimeSlotClock::new(genesis_slot, Duration::from_secs(0), Duration::from_secs(1));
        assert!(clock.now().unwrap() > Slot::new(0));
    }

    #[test]
    fn genesis_at_current_time() -> Result<(), crate::SystemTimeError> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?;
        let clock = SystemTimeSlotClock::new(Slot::new(0), now, Duration::from_secs(12));
        assert_eq!(clock.genesis_duration(), now);
        assert_eq!(clock.is_prior_to_genesis(), Some(false));
        Ok(())
    }

    #[test]
    #[should_panic]
    fn zero_slot_duration() {
        SystemTimeSlotClock::new(Slot::new(0), Duration::from_secs(0), Duration::from_secs(0));
    }
}
