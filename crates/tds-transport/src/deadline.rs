//! Monotonic deadlines for the login retry loops.
//!
//! Every retry loop in the connection layer is bounded by a [`Deadline`]
//! derived from the user's connect timeout. A timeout of zero seconds maps to
//! [`Deadline::Infinite`] rather than a literal zero budget: a zero-second
//! timeout is a historical footgun, not a user intent.
//!
//! All arithmetic is over [`tokio::time::Instant`], so comparisons are
//! monotonic and immune to wall-clock adjustment, and tests under a paused
//! runtime clock observe exact virtual time.

use std::time::Duration;

use tokio::time::Instant;

/// An absolute expiration point, or no expiration at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deadline {
    /// The operation may take arbitrarily long.
    Infinite,
    /// The operation must complete before this monotonic instant.
    At(Instant),
}

impl Deadline {
    /// Derive a deadline from a timeout in whole seconds and a start instant.
    ///
    /// `timeout_seconds == 0` yields [`Deadline::Infinite`].
    #[must_use]
    pub fn from_seconds(timeout_seconds: u32, start: Instant) -> Self {
        if timeout_seconds == 0 {
            Self::Infinite
        } else {
            Self::At(start + Duration::from_secs(u64::from(timeout_seconds)))
        }
    }

    /// A deadline `budget` from now.
    #[must_use]
    pub fn after(budget: Duration) -> Self {
        Self::At(Instant::now() + budget)
    }

    /// Whether this deadline never expires.
    #[must_use]
    pub fn is_infinite(&self) -> bool {
        matches!(self, Self::Infinite)
    }

    /// Time left before expiry, or `None` for an infinite deadline.
    ///
    /// Returns `Some(Duration::ZERO)` once expired.
    #[must_use]
    pub fn remaining(&self) -> Option<Duration> {
        match self {
            Self::Infinite => None,
            Self::At(at) => Some(at.saturating_duration_since(Instant::now())),
        }
    }

    /// Milliseconds left before expiry; negative-or-zero means expired.
    ///
    /// Infinite deadlines report `i64::MAX`.
    #[must_use]
    pub fn remaining_millis(&self) -> i64 {
        match self {
            Self::Infinite => i64::MAX,
            Self::At(at) => {
                let now = Instant::now();
                match at.checked_duration_since(now) {
                    Some(left) => i64::try_from(left.as_millis()).unwrap_or(i64::MAX),
                    None => {
                        let over = now.saturating_duration_since(*at);
                        i64::try_from(over.as_millis())
                            .map(i64::wrapping_neg)
                            .unwrap_or(i64::MIN)
                    }
                }
            }
        }
    }

    /// Whether the deadline has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        match self {
            Self::Infinite => false,
            Self::At(at) => *at <= Instant::now(),
        }
    }

    /// Whether strictly more than `interval` remains.
    ///
    /// The retry loops call this before sleeping; a loop must raise its last
    /// failure rather than sleep past the deadline.
    #[must_use]
    pub fn outlasts(&self, interval: Duration) -> bool {
        match self.remaining() {
            None => true,
            Some(left) => left > interval,
        }
    }

    /// A sub-deadline `budget` from now, capped at this deadline.
    ///
    /// Used by the dual-target login loop to hand each attempt its per-round
    /// timeout slice without ever exceeding the overall budget.
    #[must_use]
    pub fn slice(&self, budget: Duration) -> Self {
        let candidate = Instant::now() + budget;
        match self {
            Self::Infinite => Self::At(candidate),
            Self::At(at) => Self::At(candidate.min(*at)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_seconds_is_infinite() {
        let deadline = Deadline::from_seconds(0, Instant::now());
        assert!(deadline.is_infinite());
        assert!(!deadline.is_expired());
        assert_eq!(deadline.remaining(), None);
        assert_eq!(deadline.remaining_millis(), i64::MAX);
    }

    #[test]
    fn positive_timeout_produces_finite_deadline() {
        let start = Instant::now();
        let deadline = Deadline::from_seconds(30, start);
        assert!(!deadline.is_infinite());
        let left = deadline.remaining().unwrap();
        assert!(left <= Duration::from_secs(30));
        assert!(left > Duration::from_secs(29));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_reports_negative_millis() {
        let deadline = Deadline::from_seconds(1, Instant::now());
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(deadline.is_expired());
        assert!(deadline.remaining_millis() <= -500);
        assert_eq!(deadline.remaining(), Some(Duration::ZERO));
    }

    #[tokio::test(start_paused = true)]
    async fn outlasts_checks_strict_margin() {
        let deadline = Deadline::from_seconds(1, Instant::now());
        assert!(deadline.outlasts(Duration::from_millis(500)));
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(!deadline.outlasts(Duration::from_millis(200)));
        assert!(Deadline::Infinite.outlasts(Duration::from_secs(86_400)));
    }

    #[tokio::test(start_paused = true)]
    async fn slice_is_capped_at_parent() {
        let overall = Deadline::from_seconds(10, Instant::now());
        let short = overall.slice(Duration::from_secs(2));
        assert!(short.remaining().unwrap() <= Duration::from_secs(2));

        let long = overall.slice(Duration::from_secs(60));
        assert!(long.remaining().unwrap() <= Duration::from_secs(10));

        let from_infinite = Deadline::Infinite.slice(Duration::from_secs(5));
        assert!(!from_infinite.is_infinite());
    }

    proptest! {
        #[test]
        fn from_seconds_matches_zero_contract(secs in 0u32..=86_400) {
            let deadline = Deadline::from_seconds(secs, Instant::now());
            prop_assert_eq!(deadline.is_infinite(), secs == 0);
        }

        #[test]
        fn slice_never_exceeds_budget_or_parent(
            parent_ms in 1u64..=600_000,
            budget_ms in 1u64..=600_000,
        ) {
            let parent = Deadline::after(Duration::from_millis(parent_ms));
            let slice = parent.slice(Duration::from_millis(budget_ms));
            let left = slice.remaining().unwrap().as_millis() as u64;
            prop_assert!(left <= budget_ms);
            prop_assert!(left <= parent_ms);
        }
    }
}
