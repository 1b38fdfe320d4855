//! When renderers are allowed to read shared state and draw.
//!
//! Mutation always happens on the owner thread between draws. A scheduler
//! only answers "draw now?" and "when should the host wake up next?".

use crate::config::{ScheduleConfig, ScheduleMode};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// FIFO of work produced while drawing. Drained at the start of the next
/// quantum, never inside the draw that queued it.
#[derive(Debug)]
pub struct DeferredQueue<C> {
    pending: VecDeque<C>,
}

impl<C> Default for DeferredQueue<C> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }
}

impl<C> DeferredQueue<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: C) {
        self.pending.push_back(command);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn drain(&mut self) -> Vec<C> {
        self.pending.drain(..).collect()
    }
}

pub trait Scheduler {
    fn mode(&self) -> ScheduleMode;
    /// Some mutator changed state a renderer reads.
    fn mark_dirty(&mut self);
    fn is_dirty(&self) -> bool;
    /// Whether the renderers should draw in the quantum starting at `now`.
    fn should_draw(&self, now: Instant) -> bool;
    fn did_draw(&mut self, now: Instant);
    /// Next time the host must run a quantum on its own; `None` means wait
    /// for input.
    fn next_wake(&self, now: Instant) -> Option<Instant>;
}

/// Redraws only after something changed.
#[derive(Debug)]
pub struct DirtyFlagScheduler {
    dirty: bool,
}

impl DirtyFlagScheduler {
    pub fn new() -> Self {
        // The first frame always draws.
        Self { dirty: true }
    }
}

impl Default for DirtyFlagScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for DirtyFlagScheduler {
    fn mode(&self) -> ScheduleMode {
        ScheduleMode::OnDemand
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn should_draw(&self, _now: Instant) -> bool {
        self.dirty
    }

    fn did_draw(&mut self, _now: Instant) {
        self.dirty = false;
    }

    fn next_wake(&self, now: Instant) -> Option<Instant> {
        self.dirty.then_some(now)
    }
}

/// Redraws every tick whether or not anything changed.
#[derive(Debug)]
pub struct FixedRateScheduler {
    interval: Duration,
    next_tick: Option<Instant>,
    dirty: bool,
}

impl FixedRateScheduler {
    pub fn new(tick_hz: u32) -> Self {
        Self {
            interval: Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1))),
            next_tick: None,
            dirty: true,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Scheduler for FixedRateScheduler {
    fn mode(&self) -> ScheduleMode {
        ScheduleMode::FixedRate
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn should_draw(&self, now: Instant) -> bool {
        self.next_tick.map(|tick| now >= tick).unwrap_or(true)
    }

    fn did_draw(&mut self, now: Instant) {
        self.dirty = false;
        let next = self
            .next_tick
            .map(|tick| tick + self.interval)
            .unwrap_or(now + self.interval);
        // After a stall, restart the cadence instead of bursting to catch up.
        self.next_tick = Some(if next <= now { now + self.interval } else { next });
    }

    fn next_wake(&self, now: Instant) -> Option<Instant> {
        Some(self.next_tick.unwrap_or(now))
    }
}

pub fn scheduler_for(config: &ScheduleConfig) -> Box<dyn Scheduler> {
    log::info!(
        "Update scheduling: {:?} ({} Hz tick)",
        config.mode,
        config.tick_hz
    );
    match config.mode {
        ScheduleMode::OnDemand => Box::new(DirtyFlagScheduler::new()),
        ScheduleMode::FixedRate => Box::new(FixedRateScheduler::new(config.tick_hz)),
    }
}

#[cfg(test)]
mod tests {
    use super::{DeferredQueue, DirtyFlagScheduler, FixedRateScheduler, Scheduler, scheduler_for};
    use crate::config::{ScheduleConfig, ScheduleMode};
    use std::time::{Duration, Instant};

    #[test]
    fn dirty_flag_draws_only_after_mutation() {
        let now = Instant::now();
        let mut scheduler = DirtyFlagScheduler::new();
        assert!(scheduler.should_draw(now));
        scheduler.did_draw(now);
        assert!(!scheduler.should_draw(now));
        assert_eq!(scheduler.next_wake(now), None);

        scheduler.mark_dirty();
        assert!(scheduler.should_draw(now));
        assert_eq!(scheduler.next_wake(now), Some(now));
    }

    #[test]
    fn default_dirty_flag_draws_first_frame() {
        let now = Instant::now();
        let scheduler = DirtyFlagScheduler::default();
        assert!(scheduler.should_draw(now));
        assert_eq!(scheduler.next_wake(now), Some(now));
    }

    #[test]
    fn fixed_rate_draws_on_every_tick_without_changes() {
        let start = Instant::now();
        let mut scheduler = FixedRateScheduler::new(60);
        let step = scheduler.interval();
        let mut draws = 0;
        for i in 0..10u32 {
            let now = start + step * i;
            if scheduler.should_draw(now) {
                scheduler.did_draw(now);
                draws += 1;
            }
        }
        assert_eq!(draws, 10);
        assert!(!scheduler.is_dirty());
    }

    #[test]
    fn fixed_rate_waits_for_next_tick() {
        let start = Instant::now();
        let mut scheduler = FixedRateScheduler::new(10);
        scheduler.did_draw(start);
        assert!(!scheduler.should_draw(start + Duration::from_millis(50)));
        assert!(scheduler.should_draw(start + Duration::from_millis(100)));
        assert_eq!(
            scheduler.next_wake(start),
            Some(start + Duration::from_millis(100))
        );
    }

    #[test]
    fn fixed_rate_restarts_after_stall() {
        let start = Instant::now();
        let mut scheduler = FixedRateScheduler::new(10);
        scheduler.did_draw(start);
        let late = start + Duration::from_secs(2);
        scheduler.did_draw(late);
        assert_eq!(
            scheduler.next_wake(late),
            Some(late + Duration::from_millis(100))
        );
    }

    #[test]
    fn deferred_queue_is_fifo() {
        let mut queue = DeferredQueue::new();
        queue.push(1);
        queue.push(2);
        queue.push(3);
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.drain(), vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn config_selects_implementation() {
        let on_demand = scheduler_for(&ScheduleConfig {
            mode: ScheduleMode::OnDemand,
            tick_hz: 60,
        });
        assert_eq!(on_demand.mode(), ScheduleMode::OnDemand);
        let fixed = scheduler_for(&ScheduleConfig {
            mode: ScheduleMode::FixedRate,
            tick_hz: 30,
        });
        assert_eq!(fixed.mode(), ScheduleMode::FixedRate);
    }
}
