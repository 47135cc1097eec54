//! Bounded retries for collaborators that become ready asynchronously.
//!
//! Everything in this crate runs on one cooperative thread, so a retry never sleeps. Instead a
//! [`Retrier`] is polled with the current time from whatever tick the host already has (a frame
//! callback, a timer) and decides whether another attempt is due.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// How often and how many times to try something before giving up.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Time between consecutive attempts, in milliseconds.
    pub interval_ms: u64,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: u32, interval_ms: u64) -> Self {
        Self {
            max_attempts,
            interval_ms,
        }
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// Starts a fresh retry schedule under this policy.
    #[must_use]
    pub fn start(self) -> Retrier {
        Retrier::new(self)
    }
}

/// Outcome of [`Retrier::poll`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryPoll<T> {
    /// The attempt succeeded.
    Ready(T),
    /// No attempt was due, or the attempt failed and another one is scheduled.
    Pending,
    /// The last allowed attempt failed.
    Exhausted { attempts: u32 },
}

impl<T> RetryPoll<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, RetryPoll::Pending)
    }
}

/// A running retry schedule.
#[derive(Clone, Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    attempts: u32,
    next_at: Option<Instant>,
}

impl Retrier {
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            next_at: None,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.policy.max_attempts
    }

    /// Runs `attempt` if one is due at `now`.
    ///
    /// The first poll always attempts immediately. After a failed attempt the next one is due
    /// `interval` later. Once `max_attempts` attempts have failed every further poll reports
    /// [`RetryPoll::Exhausted`] without calling `attempt`.
    pub fn poll<T>(&mut self, now: Instant, attempt: impl FnOnce() -> Option<T>) -> RetryPoll<T> {
        if self.is_exhausted() {
            return RetryPoll::Exhausted {
                attempts: self.attempts,
            };
        }
        if self.next_at.is_some_and(|due| now < due) {
            return RetryPoll::Pending;
        }

        if let Some(value) = attempt() {
            return RetryPoll::Ready(value);
        }

        self.attempts += 1;
        if self.is_exhausted() {
            log::debug!("giving up after {} attempts", self.attempts);
            RetryPoll::Exhausted {
                attempts: self.attempts,
            }
        } else {
            log::trace!(
                "attempt {}/{} failed; retrying in {:?}",
                self.attempts,
                self.policy.max_attempts,
                self.policy.interval()
            );
            self.next_at = Some(now + self.policy.interval());
            RetryPoll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MS: Duration = Duration::from_millis(1);

    #[test]
    fn first_poll_attempts_immediately() {
        let mut retrier = RetryPolicy::new(3, 300).start();
        assert_eq!(retrier.poll(Instant::now(), || Some(7)), RetryPoll::Ready(7));
        assert_eq!(retrier.attempts(), 0);
    }

    #[test]
    fn waits_for_the_interval_between_attempts() {
        let start = Instant::now();
        let mut retrier = RetryPolicy::new(3, 300).start();
        let mut calls = 0;

        assert!(retrier.poll(start, || { calls += 1; None::<()> }).is_pending());
        // too early; the closure must not run
        assert!(retrier.poll(start + 299 * MS, || { calls += 1; None::<()> }).is_pending());
        assert_eq!(calls, 1);
        assert!(retrier.poll(start + 300 * MS, || { calls += 1; None::<()> }).is_pending());
        assert_eq!(calls, 2);
    }

    #[test]
    fn exhausts_after_max_attempts() {
        let start = Instant::now();
        let mut retrier = RetryPolicy::new(15, 300).start();
        let mut last = RetryPoll::Pending;
        for i in 0..15 {
            last = retrier.poll(start + i * 300 * MS, || None::<()>);
        }
        assert_eq!(last, RetryPoll::Exhausted { attempts: 15 });
        assert!(retrier.is_exhausted());

        let mut called = false;
        assert_eq!(
            retrier.poll(start + 10_000 * MS, || {
                called = true;
                Some(())
            }),
            RetryPoll::Exhausted { attempts: 15 }
        );
        assert!(!called);
    }

    #[test]
    fn succeeds_on_a_later_attempt() {
        let start = Instant::now();
        let mut retrier = RetryPolicy::new(10, 200).start();
        let mut ready = false;
        for i in 0..10 {
            if i == 4 {
                ready = true;
            }
            let poll = retrier.poll(start + i * 200 * MS, || ready.then_some(()));
            if let RetryPoll::Ready(()) = poll {
                assert_eq!(retrier.attempts(), 4);
                return;
            }
        }
        panic!("should have become ready");
    }
}
