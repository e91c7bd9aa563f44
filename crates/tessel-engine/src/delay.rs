//! Frame-clock delays that settle [`BusyToken`]s.
//!
//! Handlers that want to say "don't send me this event again for 400 ms"
//! schedule a delay and return its token as [`Reply::Busy`](tessel_core::event::Reply::Busy).
//! The world's frame loop advances the clock with [`DelayQueue::advance`],
//! which settles every token whose deadline has passed.
//!
//! The queue is a shared handle so handlers can hold a clone.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use tessel_core::event::BusyToken;
use tracing::trace;

#[derive(Debug, Default)]
struct Clock {
    now: Duration,
    /// (deadline, token), unordered.
    pending: Vec<(Duration, BusyToken)>,
}

/// Shared frame clock with pending delays.
#[derive(Debug, Clone, Default)]
pub struct DelayQueue {
    clock: Rc<RefCell<Clock>>,
}

impl DelayQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Time accumulated through [`advance`](Self::advance).
    pub fn now(&self) -> Duration {
        self.clock.borrow().now
    }

    /// A token that settles once the clock has advanced by `after`.
    /// A zero delay returns an already-settled token.
    pub fn schedule(&self, after: Duration) -> BusyToken {
        let token = BusyToken::new();
        if after.is_zero() {
            token.settle();
            return token;
        }
        let mut clock = self.clock.borrow_mut();
        let deadline = clock.now + after;
        clock.pending.push((deadline, token.clone()));
        token
    }

    /// Move the clock forward by `dt` and settle expired delays. Returns how
    /// many delays left the queue, including ones their holder settled early.
    pub fn advance(&self, dt: Duration) -> usize {
        let mut clock = self.clock.borrow_mut();
        clock.now += dt;
        let now = clock.now;
        let before = clock.pending.len();
        clock.pending.retain(|(deadline, token)| {
            if *deadline <= now {
                token.settle();
                false
            } else {
                // Settled early by its holder; nothing left to wait for.
                !token.is_settled()
            }
        });
        let settled = before - clock.pending.len();
        if settled > 0 {
            trace!(retired = settled, ?now, "delays settled");
        }
        settled
    }

    /// Delays still waiting for their deadline.
    pub fn pending(&self) -> usize {
        self.clock.borrow().pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_settles_at_deadline() {
        let delays = DelayQueue::new();
        let token = delays.schedule(Duration::from_millis(400));
        assert!(!token.is_settled());

        delays.advance(Duration::from_millis(399));
        assert!(!token.is_settled());
        assert_eq!(delays.pending(), 1);

        assert_eq!(delays.advance(Duration::from_millis(1)), 1);
        assert!(token.is_settled());
        assert_eq!(delays.pending(), 0);
        assert_eq!(delays.now(), Duration::from_millis(400));
    }

    #[test]
    fn zero_delay_is_already_settled() {
        let delays = DelayQueue::new();
        assert!(delays.schedule(Duration::ZERO).is_settled());
        assert_eq!(delays.pending(), 0);
    }

    #[test]
    fn deadlines_are_relative_to_schedule_time() {
        let delays = DelayQueue::new();
        delays.advance(Duration::from_millis(1000));
        let token = delays.schedule(Duration::from_millis(100));
        delays.advance(Duration::from_millis(50));
        assert!(!token.is_settled());
        delays.advance(Duration::from_millis(50));
        assert!(token.is_settled());
    }

    #[test]
    fn clones_share_the_clock() {
        let delays = DelayQueue::new();
        let handle = delays.clone();
        let token = handle.schedule(Duration::from_millis(10));
        delays.advance(Duration::from_millis(10));
        assert!(token.is_settled());
    }
}
