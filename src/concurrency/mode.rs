// SimpleDBM Lock Modes and Timeouts

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Lock and latch modes, ordered by strength
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LockMode {
    None,
    Shared,
    Update,
    Exclusive,
}

impl LockMode {
    /// Whether a request in this mode can be granted alongside a holder of `other`
    pub fn is_compatible(self, other: LockMode) -> bool {
        match (self, other) {
            (LockMode::None, _) | (_, LockMode::None) => true,
            (LockMode::Shared, LockMode::Shared) => true,
            (LockMode::Shared, LockMode::Update) | (LockMode::Update, LockMode::Shared) => true,
            _ => false,
        }
    }

    pub fn maximum_of(self, other: LockMode) -> LockMode {
        self.max(other)
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LockMode::None => "NONE",
            LockMode::Shared => "SHARED",
            LockMode::Update => "UPDATE",
            LockMode::Exclusive => "EXCLUSIVE",
        };
        f.write_str(name)
    }
}

/// How long a latch or lock request may wait
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail immediately if the request cannot be granted
    NoWait,
    /// Wait until granted
    Forever,
    /// Wait at most the given duration
    After(Duration),
}

impl Timeout {
    /// Interprets a millisecond count: 0 is no-wait, negative waits forever.
    pub fn from_millis(millis: i64) -> Self {
        match millis {
            0 => Timeout::NoWait,
            m if m < 0 => Timeout::Forever,
            m => Timeout::After(Duration::from_millis(m as u64)),
        }
    }

    pub fn is_no_wait(&self) -> bool {
        matches!(self, Timeout::NoWait)
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        match self {
            Timeout::After(duration) => Some(Instant::now() + *duration),
            _ => None,
        }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Timeout::Forever
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compatibility_matrix() {
        use LockMode::*;
        assert!(Shared.is_compatible(Shared));
        assert!(Shared.is_compatible(Update));
        assert!(Update.is_compatible(Shared));
        assert!(!Update.is_compatible(Update));
        assert!(!Exclusive.is_compatible(Shared));
        assert!(!Shared.is_compatible(Exclusive));
        assert!(Exclusive.is_compatible(None));
    }

    #[test]
    fn test_timeout_from_millis() {
        assert_eq!(Timeout::from_millis(0), Timeout::NoWait);
        assert_eq!(Timeout::from_millis(-1), Timeout::Forever);
        assert_eq!(Timeout::from_millis(25), Timeout::After(Duration::from_millis(25)));
    }
}
