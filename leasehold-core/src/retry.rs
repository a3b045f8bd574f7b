//! Attempt budget for acquisition conflicts.

use std::{fmt, num::NonZeroU32, str::FromStr};

/// How many times acquire-or-renew may be attempted while the lock is
/// held by someone else. The delay between attempts is the lock's renewal
/// interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryPolicy {
    /// at most `n` attempts
    Bounded(NonZeroU32),
    /// keep trying until acquired, cancelled or a fatal error
    Unlimited,
}

impl RetryPolicy {
    /// A single attempt.
    pub const ONCE: RetryPolicy = RetryPolicy::Bounded(NonZeroU32::MIN);

    /// `Bounded(n)`, or `None` if `n` is zero.
    pub fn bounded(n: u32) -> Option<Self> {
        NonZeroU32::new(n).map(RetryPolicy::Bounded)
    }

    /// Fresh attempt counter for one acquisition call.
    pub fn budget(&self) -> Budget {
        Budget {
            policy: *self,
            attempts: 0,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::ONCE
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryPolicy::Bounded(n) => write!(f, "{n}"),
            RetryPolicy::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// Parses a positive count, or `unlimited`/`-1` for [`RetryPolicy::Unlimited`].
/// Zero is rejected.
impl FromStr for RetryPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("unlimited") || s == "-1" {
            return Ok(RetryPolicy::Unlimited);
        }
        let n: u32 = s
            .parse()
            .map_err(|e| format!("invalid retry count '{s}': {e}"))?;
        RetryPolicy::bounded(n)
            .ok_or_else(|| "retry count must be >= 1, 'unlimited' or -1".to_owned())
    }
}

/// Attempts used so far in one acquisition call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    policy: RetryPolicy,
    attempts: u32,
}

impl Budget {
    /// Record an attempt.
    pub fn record_attempt(&mut self) {
        self.attempts = self.attempts.saturating_add(1);
    }

    /// Attempts recorded so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Can another attempt be made?
    pub fn has_remaining(&self) -> bool {
        match self.policy {
            RetryPolicy::Bounded(max) => self.attempts < max.get(),
            RetryPolicy::Unlimited => true,
        }
    }
}
