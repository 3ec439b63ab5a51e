//! Tick scheduling as a pure state machine.
//!
//! States are Idle and Ticking (exactly one fetch in flight). Timer fires that
//! land while a fetch is in flight are coalesced; navigation never preempts the
//! in-flight fetch but queues an extra tick for the new page. Time is passed in
//! so tests can drive the machine without sleeping.

#![allow(missing_docs)]

use std::time::{Duration, Instant};

use serde::Serialize;

use crate::core::config::SchedulerConfig;

/// Out-of-band page change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    To(u32),
}

/// A fetch the runtime should start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickRequest {
    pub page: u32,
    pub seq: u64,
}

/// What to do with a finished fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Apply,
    /// Issued for a page that is no longer current.
    DiscardStale,
    /// Not the in-flight request, or the scheduler is shut down.
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Ticking(TickRequest),
}

#[derive(Debug)]
pub struct Scheduler {
    interval: Duration,
    discard_stale: bool,
    page: u32,
    state: State,
    next_seq: u64,
    pending_extra: bool,
    last_issued: Option<Instant>,
    alive: bool,
    coalesced_ticks: u64,
    stale_discards: u64,
}

impl Scheduler {
    #[must_use]
    pub fn new(config: &SchedulerConfig) -> Self {
        Self {
            interval: Duration::from_millis(config.interval_ms.max(1)),
            discard_stale: config.discard_stale,
            page: config.start_page.max(1),
            state: State::Idle,
            next_seq: 1,
            pending_extra: false,
            last_issued: None,
            alive: true,
            coalesced_ticks: 0,
            stale_discards: 0,
        }
    }

    /// Timer entry point, called every loop iteration.
    ///
    /// Issues a request when idle and either the interval elapsed, nothing was
    /// issued yet, or an extra tick is pending.
    pub fn on_timer(&mut self, now: Instant) -> Option<TickRequest> {
        if !self.alive {
            return None;
        }
        let due = self
            .last_issued
            .is_none_or(|last| now.saturating_duration_since(last) >= self.interval);

        match self.state {
            State::Ticking(_) => {
                if due {
                    self.coalesced_ticks += 1;
                    self.last_issued = Some(now);
                }
                None
            }
            State::Idle if due || self.pending_extra => Some(self.issue(now)),
            State::Idle => None,
        }
    }

    fn issue(&mut self, now: Instant) -> TickRequest {
        let request = TickRequest {
            page: self.page,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending_extra = false;
        self.last_issued = Some(now);
        self.state = State::Ticking(request);
        request
    }

    /// Change page (clamped to >= 1). Returns whether the page changed; if so
    /// an extra tick is queued for the next [`Scheduler::on_timer`].
    pub fn navigate(&mut self, navigation: Navigation) -> bool {
        if !self.alive {
            return false;
        }
        let target = match navigation {
            Navigation::Next => self.page.saturating_add(1),
            Navigation::Previous => self.page.saturating_sub(1).max(1),
            Navigation::To(page) => page.max(1),
        };
        if target == self.page {
            return false;
        }
        self.page = target;
        self.pending_extra = true;
        true
    }

    /// Queue an extra tick without changing page.
    pub fn request_refresh(&mut self) {
        if self.alive {
            self.pending_extra = true;
        }
    }

    /// A fetch finished. Returns to Idle when `seq` is the in-flight request.
    pub fn complete(&mut self, seq: u64) -> Disposition {
        if !self.alive {
            return Disposition::Ignore;
        }
        match self.state {
            State::Ticking(request) if request.seq == seq => {
                self.state = State::Idle;
                if self.discard_stale && request.page != self.page {
                    self.stale_discards += 1;
                    Disposition::DiscardStale
                } else {
                    Disposition::Apply
                }
            }
            _ => Disposition::Ignore,
        }
    }

    /// The request could not be handed to the worker; retry on the next timer.
    pub fn abandon(&mut self, seq: u64) {
        if let State::Ticking(request) = self.state
            && request.seq == seq
        {
            self.state = State::Idle;
            self.pending_extra = true;
        }
    }

    /// Stop issuing ticks. Every later call is a no-op.
    pub fn shutdown(&mut self) {
        self.alive = false;
        self.state = State::Idle;
        self.pending_extra = false;
    }

    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }

    #[must_use]
    pub const fn is_alive(&self) -> bool {
        self.alive
    }

    #[must_use]
    pub const fn in_flight(&self) -> Option<TickRequest> {
        match self.state {
            State::Idle => None,
            State::Ticking(request) => Some(request),
        }
    }

    #[must_use]
    pub const fn has_pending_extra(&self) -> bool {
        self.pending_extra
    }

    #[must_use]
    pub const fn coalesced_ticks(&self) -> u64 {
        self.coalesced_ticks
    }

    #[must_use]
    pub const fn stale_discards(&self) -> u64 {
        self.stale_discards
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(discard_stale: bool) -> Scheduler {
        Scheduler::new(&SchedulerConfig {
            interval_ms: 500,
            start_page: 1,
            discard_stale,
        })
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn first_timer_issues_immediately_then_waits_for_interval() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        let first = s.on_timer(t0).expect("first tick");
        assert_eq!(first, TickRequest { page: 1, seq: 1 });
        assert_eq!(s.complete(1), Disposition::Apply);
        assert!(s.on_timer(t0 + ms(499)).is_none());
        assert_eq!(s.on_timer(t0 + ms(500)).map(|r| r.seq), Some(2));
    }

    #[test]
    fn timer_fires_while_ticking_are_coalesced() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        s.on_timer(t0);
        assert!(s.on_timer(t0 + ms(500)).is_none());
        assert!(s.on_timer(t0 + ms(600)).is_none());
        assert!(s.on_timer(t0 + ms(1_000)).is_none());
        assert_eq!(s.coalesced_ticks(), 2);
        assert_eq!(s.in_flight().map(|r| r.seq), Some(1));
    }

    #[test]
    fn navigate_during_tick_queues_extra_tick_for_new_page() {
        let t0 = Instant::now();
        let mut s = scheduler(false);
        s.on_timer(t0);
        assert!(s.navigate(Navigation::Next));
        assert!(s.on_timer(t0 + ms(10)).is_none(), "in-flight tick is not preempted");
        // Lenient policy applies the stale result.
        assert_eq!(s.complete(1), Disposition::Apply);
        let extra = s.on_timer(t0 + ms(20)).expect("extra tick");
        assert_eq!(extra.page, 2);
    }

    #[test]
    fn stale_results_are_discarded_under_strict_policy() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        s.on_timer(t0);
        s.navigate(Navigation::To(5));
        assert_eq!(s.complete(1), Disposition::DiscardStale);
        assert_eq!(s.stale_discards(), 1);
        assert_eq!(s.on_timer(t0 + ms(1)).map(|r| r.page), Some(5));
    }

    #[test]
    fn previous_clamps_at_page_one() {
        let mut s = scheduler(true);
        for _ in 0..10 {
            assert!(!s.navigate(Navigation::Previous));
            assert_eq!(s.page(), 1);
        }
        assert!(!s.navigate(Navigation::To(0)));
        assert_eq!(s.page(), 1);
    }

    #[test]
    fn unknown_or_repeated_completion_is_ignored() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        s.on_timer(t0);
        assert_eq!(s.complete(42), Disposition::Ignore);
        assert_eq!(s.complete(1), Disposition::Apply);
        assert_eq!(s.complete(1), Disposition::Ignore);
    }

    #[test]
    fn abandon_retries_on_next_timer() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        let req = s.on_timer(t0).unwrap();
        s.abandon(req.seq);
        assert!(s.in_flight().is_none());
        assert_eq!(s.on_timer(t0 + ms(1)).map(|r| r.seq), Some(2));
    }

    #[test]
    fn refresh_queues_extra_tick() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        s.on_timer(t0);
        s.complete(1);
        assert!(s.on_timer(t0 + ms(1)).is_none());
        s.request_refresh();
        assert!(s.has_pending_extra());
        assert!(s.on_timer(t0 + ms(2)).is_some());
    }

    #[test]
    fn shutdown_makes_everything_a_noop() {
        let t0 = Instant::now();
        let mut s = scheduler(true);
        s.on_timer(t0);
        s.shutdown();
        assert!(!s.is_alive());
        assert!(s.on_timer(t0 + ms(10_000)).is_none());
        assert!(!s.navigate(Navigation::Next));
        assert_eq!(s.complete(1), Disposition::Ignore);
        s.request_refresh();
        assert!(!s.has_pending_extra());
    }
}
