// SimpleDBM Statistics
//
// Named counters published by the buffer, log and lock managers.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A named counter that remembers when it was last changed
#[derive(Debug)]
pub struct Statistic {
    name: &'static str,
    value: AtomicU64,
    /// Milliseconds since the epoch, 0 when never updated
    updated_at: AtomicU64,
}

impl Statistic {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            value: AtomicU64::new(0),
            updated_at: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn increment(&self) {
        self.add(1);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
        self.touch();
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
        self.touch();
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Time of the most recent update, or `None` if the counter was never touched
    pub fn last_updated(&self) -> Option<SystemTime> {
        match self.updated_at.load(Ordering::Relaxed) {
            0 => None,
            millis => Some(UNIX_EPOCH + Duration::from_millis(millis)),
        }
    }

    pub fn snapshot(&self) -> StatisticSnapshot {
        StatisticSnapshot {
            name: self.name,
            value: self.get(),
            last_updated: self.last_updated(),
        }
    }

    fn touch(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        self.updated_at.store(now.max(1), Ordering::Relaxed);
    }
}

/// Point-in-time copy of a statistic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatisticSnapshot {
    pub name: &'static str,
    pub value: u64,
    pub last_updated: Option<SystemTime>,
}

impl fmt::Display for StatisticSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} = {}", self.name, self.value)?;
        if let Some(updated) = self.last_updated {
            let millis = updated
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            write!(f, " (updated at {} ms)", millis)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_updated_tracks_changes() {
        let stat = Statistic::new("buffer.hits");
        assert!(stat.last_updated().is_none());

        let before = SystemTime::now();
        stat.increment();
        stat.add(4);

        assert_eq!(stat.get(), 5);
        let updated = stat.last_updated().expect("statistic was updated");
        assert!(updated + Duration::from_millis(1) >= before);
    }

    #[test]
    fn test_snapshot_display() {
        let stat = Statistic::new("log.flushes");
        stat.set(12);
        let text = stat.snapshot().to_string();
        assert!(text.starts_with("log.flushes = 12"));
    }
}
