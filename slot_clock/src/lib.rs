//! Wall-clock → slot/epoch conversion and fork-aware slot-phase scheduling.
//!
//! A slot is divided into three phases (*propose*, *attest*, *aggregate*) by configured
//! millisecond budgets; subscribers receive phase-transition events on a broadcast channel.
//! Unlike the rest of this crate, time here is a true external input (Unix seconds) rather than
//! a counter the coordinator owns, so `SlotClock` takes `now` as an explicit parameter everywhere
//! instead of reading `SystemTime` itself — that keeps it trivially testable.

use thiserror::Error;
use types::primitives::{Epoch, Slot};

pub type UnixSeconds = u64;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Phase {
    Propose,
    Attest,
    Aggregate,
}

/// One entry in the fork schedule: from `activation_time` onward, slots last `seconds_per_slot`
/// and epochs span `slots_per_epoch` slots.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ForkScheduleEntry {
    pub activation_time: UnixSeconds,
    pub seconds_per_slot: u64,
    pub slots_per_epoch: u64,
}

#[derive(Clone, Debug, Error)]
pub enum ConfigError {
    #[error("seconds_per_slot must be nonzero")]
    ZeroSecondsPerSlot,
    #[error("slots_per_epoch must be nonzero")]
    ZeroSlotsPerEpoch,
}

#[derive(Clone, Debug)]
pub struct PhaseBudgetsMs {
    pub propose: u64,
    pub attest: u64,
    pub aggregate: u64,
}

impl Default for PhaseBudgetsMs {
    fn default() -> Self {
        Self {
            propose: 2_000,
            attest: 2_000,
            aggregate: 2_000,
        }
    }
}

impl PhaseBudgetsMs {
    fn total_ms(&self) -> u64 {
        self.propose + self.attest + self.aggregate
    }
}

#[derive(Clone, Debug)]
pub struct SlotClockConfig {
    pub genesis_time: UnixSeconds,
    pub initial_seconds_per_slot: u64,
    pub initial_slots_per_epoch: u64,
    pub fork_schedule: Vec<ForkScheduleEntry>,
    pub phase_budgets_ms: PhaseBudgetsMs,
}

impl SlotClockConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_seconds_per_slot == 0 {
            return Err(ConfigError::ZeroSecondsPerSlot);
        }
        if self.initial_slots_per_epoch == 0 {
            return Err(ConfigError::ZeroSlotsPerEpoch);
        }
        for entry in &self.fork_schedule {
            if entry.seconds_per_slot == 0 {
                return Err(ConfigError::ZeroSecondsPerSlot);
            }
            if entry.slots_per_epoch == 0 {
                return Err(ConfigError::ZeroSlotsPerEpoch);
            }
        }
        Ok(())
    }
}

/// A resolved, sorted-by-activation segment: slots `[start_slot, ..)` at `(seconds_per_slot,
/// slots_per_epoch)` starting at wall-clock `start_time`.
#[derive(Clone, Copy, Debug)]
struct Segment {
    start_time: UnixSeconds,
    start_slot: Slot,
    seconds_per_slot: u64,
    slots_per_epoch: u64,
}

#[derive(Clone, Debug)]
pub struct SlotClock {
    config: SlotClockConfig,
    segments: Vec<Segment>,
}

impl SlotClock {
    pub fn new(config: SlotClockConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut sorted_forks = config.fork_schedule.clone();
        sorted_forks.sort_by_key(|f| f.activation_time);

        let mut segments = vec![Segment {
            start_time: config.genesis_time,
            start_slot: 0,
            seconds_per_slot: config.initial_seconds_per_slot,
            slots_per_epoch: config.initial_slots_per_epoch,
        }];

        for fork in sorted_forks {
            let previous = *segments.last().expect("segments is never empty");
            if fork.activation_time <= previous.start_time {
                continue;
            }
            let elapsed = fork.activation_time - previous.start_time;
            let slots_elapsed = elapsed / previous.seconds_per_slot;
            segments.push(Segment {
                start_time: previous.start_time + slots_elapsed * previous.seconds_per_slot,
                start_slot: previous.start_slot + slots_elapsed,
                seconds_per_slot: fork.seconds_per_slot,
                slots_per_epoch: fork.slots_per_epoch,
            });
        }

        Ok(Self { config, segments })
    }

    fn segment_for_time(&self, t: UnixSeconds) -> &Segment {
        self.segments
            .iter()
            .rev()
            .find(|segment| segment.start_time <= t)
            .unwrap_or(&self.segments[0])
    }

    fn segment_for_slot(&self, slot: Slot) -> &Segment {
        self.segments
            .iter()
            .rev()
            .find(|segment| segment.start_slot <= slot)
            .unwrap_or(&self.segments[0])
    }

    /// Wall time before genesis maps to slot 0.
    pub fn slot_at_time(&self, t: UnixSeconds) -> Slot {
        if t < self.config.genesis_time {
            return 0;
        }
        let segment = self.segment_for_time(t);
        let elapsed = t - segment.start_time;
        segment.start_slot + elapsed / segment.seconds_per_slot
    }

    pub fn time_at_slot(&self, slot: Slot) -> UnixSeconds {
        let segment = self.segment_for_slot(slot);
        segment.start_time + (slot - segment.start_slot) * segment.seconds_per_slot
    }

    pub fn epoch_of(&self, slot: Slot) -> Epoch {
        let segment = self.segment_for_slot(slot);
        slot / segment.slots_per_epoch
    }

    pub fn is_epoch_boundary(&self, slot: Slot) -> bool {
        let segment = self.segment_for_slot(slot);
        slot % segment.slots_per_epoch == 0
    }

    fn seconds_per_slot_at(&self, t: UnixSeconds) -> u64 {
        self.segment_for_time(t).seconds_per_slot
    }

    /// Which of the three phases `t` falls in, scaled so the budgets always span the segment's
    /// actual slot duration (the default 2s/2s/2s only adds up to a 6s slot; other segments scale
    /// proportionally).
    pub fn current_phase(&self, t: UnixSeconds) -> Phase {
        let slot_start = self.time_at_slot(self.slot_at_time(t));
        let offset_ms = t.saturating_sub(slot_start) * 1000;
        let seconds_per_slot = self.seconds_per_slot_at(t);
        self.phase_at_offset(offset_ms, seconds_per_slot)
    }

    fn phase_at_offset(&self, offset_ms: u64, seconds_per_slot: u64) -> Phase {
        let budgets = &self.config.phase_budgets_ms;
        let scale = |ms: u64| ms * seconds_per_slot * 1000 / budgets.total_ms().max(1);
        let propose_end = scale(budgets.propose);
        let attest_end = propose_end + scale(budgets.attest);
        if offset_ms < propose_end {
            Phase::Propose
        } else if offset_ms < attest_end {
            Phase::Attest
        } else {
            Phase::Aggregate
        }
    }

    pub fn time_to_next_phase(&self, t: UnixSeconds) -> u64 {
        let slot_start = self.time_at_slot(self.slot_at_time(t));
        let seconds_per_slot = self.seconds_per_slot_at(t);
        let offset_ms = t.saturating_sub(slot_start) * 1000;
        let budgets = &self.config.phase_budgets_ms;
        let scale = |ms: u64| ms * seconds_per_slot * 1000 / budgets.total_ms().max(1);
        let boundaries = [scale(budgets.propose), scale(budgets.propose) + scale(budgets.attest), seconds_per_slot * 1000];
        let next = boundaries.into_iter().find(|&b| b > offset_ms).unwrap_or(seconds_per_slot * 1000);
        (next - offset_ms) / 1000
    }
}

/// Broadcasts phase transitions to subscribers as the driving loop advances wall time.
pub struct PhaseScheduler {
    clock: SlotClock,
    sender: tokio::sync::broadcast::Sender<PhaseEvent>,
}

#[derive(Clone, Copy, Debug)]
pub struct PhaseEvent {
    pub slot: Slot,
    pub phase: Phase,
}

impl PhaseScheduler {
    pub fn new(clock: SlotClock) -> Self {
        let (sender, _) = tokio::sync::broadcast::channel(1024);
        Self { clock, sender }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<PhaseEvent> {
        self.sender.subscribe()
    }

    /// Called by the driving loop on every phase change; a send with no subscribers is not an
    /// error (the channel simply has zero receivers at that instant).
    pub fn announce(&self, t: UnixSeconds) {
        let slot = self.clock.slot_at_time(t);
        let phase = self.clock.current_phase(t);
        log::trace!("slot {} entering phase {:?}", slot, phase);
        let _ = self.sender.send(PhaseEvent { slot, phase });
    }

    pub fn clock(&self) -> &SlotClock {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> SlotClock {
        SlotClock::new(SlotClockConfig {
            genesis_time: 1_000,
            initial_seconds_per_slot: 6,
            initial_slots_per_epoch: 32,
            fork_schedule: vec![],
            phase_budgets_ms: PhaseBudgetsMs::default(),
        })
        .unwrap()
    }

    #[test]
    fn before_genesis_is_slot_zero_and_propose_phase() {
        let clock = clock();
        assert_eq!(clock.slot_at_time(0), 0);
        assert_eq!(clock.current_phase(0), Phase::Propose);
    }

    #[test]
    fn slot_time_round_trip() {
        let clock = clock();
        for slot in 0..100 {
            let t = clock.time_at_slot(slot);
            assert_eq!(clock.slot_at_time(t), slot);
        }
    }

    #[test]
    fn phases_partition_the_slot() {
        let clock = clock();
        let slot_start = clock.time_at_slot(10);
        assert_eq!(clock.current_phase(slot_start), Phase::Propose);
        assert_eq!(clock.current_phase(slot_start + 2), Phase::Attest);
        assert_eq!(clock.current_phase(slot_start + 4), Phase::Aggregate);
    }

    #[test]
    fn fork_schedule_changes_slot_duration() {
        let clock = SlotClock::new(SlotClockConfig {
            genesis_time: 0,
            initial_seconds_per_slot: 12,
            initial_slots_per_epoch: 32,
            fork_schedule: vec![ForkScheduleEntry {
                activation_time: 1_200,
                seconds_per_slot: 6,
                slots_per_epoch: 32,
            }],
            phase_budgets_ms: PhaseBudgetsMs::default(),
        })
        .unwrap();
        assert_eq!(clock.slot_at_time(1_199), 99);
        assert_eq!(clock.slot_at_time(1_200), 100);
        assert_eq!(clock.slot_at_time(1_206), 101);
    }

    #[test]
    fn zero_seconds_per_slot_is_rejected() {
        let result = SlotClock::new(SlotClockConfig {
            genesis_time: 0,
            initial_seconds_per_slot: 0,
            initial_slots_per_epoch: 32,
            fork_schedule: vec![],
            phase_budgets_ms: PhaseBudgetsMs::default(),
        });
        assert!(result.is_err());
    }

    #[test]
    fn epoch_of_respects_slots_per_epoch() {
        let clock = clock();
        assert_eq!(clock.epoch_of(0), 0);
        assert_eq!(clock.epoch_of(31), 0);
        assert_eq!(clock.epoch_of(32), 1);
        assert!(clock.is_epoch_boundary(32));
        assert!(!clock.is_epoch_boundary(33));
    }
}
