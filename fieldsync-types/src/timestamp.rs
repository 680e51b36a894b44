//! Recency stamps for last-write-wins merging.
//!
//! A plain wall-clock timestamp is not enough: two edits on the same
//! device within the same millisecond would compare equal, and a clock
//! that steps backwards would reorder them. `UpdatedAt` pairs wall time
//! with a logical counter so local mutations are always strictly
//! increasing.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Recency marker assigned on every local mutation of a record.
///
/// Consists of:
/// - `wall_ms`: milliseconds since Unix epoch (physical component)
/// - `counter`: logical counter for mutations at the same wall time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UpdatedAt {
    /// Physical time component (milliseconds since Unix epoch).
    wall_ms: u64,
    /// Logical counter for ordering mutations at the same wall time.
    counter: u32,
}

impl UpdatedAt {
    /// Creates a stamp at the current time.
    #[must_use]
    pub fn now() -> Self {
        Self {
            wall_ms: wall_clock_ms(),
            counter: 0,
        }
    }

    /// Creates a stamp from components.
    #[must_use]
    pub const fn new(wall_ms: u64, counter: u32) -> Self {
        Self { wall_ms, counter }
    }

    /// Returns the wall time component in milliseconds.
    #[must_use]
    pub const fn wall_ms(&self) -> u64 {
        self.wall_ms
    }

    /// Returns the logical counter.
    #[must_use]
    pub const fn counter(&self) -> u32 {
        self.counter
    }

    /// Generates the next stamp, ensuring monotonicity even if the
    /// system clock has not advanced (or stepped backwards).
    ///
    /// Call this when recording a local mutation.
    #[must_use]
    pub fn tick(&self) -> Self {
        let now = wall_clock_ms();
        if now > self.wall_ms {
            Self {
                wall_ms: now,
                counter: 0,
            }
        } else {
            Self {
                wall_ms: self.wall_ms,
                counter: self.counter.saturating_add(1),
            }
        }
    }

    /// Advances this stamp past a stamp received from another device.
    ///
    /// The result is greater than both the current stamp and the
    /// received one, so a mutation made after applying remote data
    /// is ordered after that data.
    #[must_use]
    pub fn receive(&self, other: &Self) -> Self {
        let now = wall_clock_ms();
        let max_wall = now.max(self.wall_ms).max(other.wall_ms);

        let counter = if max_wall == self.wall_ms && max_wall == other.wall_ms {
            self.counter.max(other.counter).saturating_add(1)
        } else if max_wall == self.wall_ms {
            self.counter.saturating_add(1)
        } else if max_wall == other.wall_ms {
            other.counter.saturating_add(1)
        } else {
            0
        };

        Self {
            wall_ms: max_wall,
            counter,
        }
    }
}

impl Default for UpdatedAt {
    fn default() -> Self {
        Self::now()
    }
}

impl PartialOrd for UpdatedAt {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for UpdatedAt {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.wall_ms.cmp(&other.wall_ms) {
            Ordering::Equal => self.counter.cmp(&other.counter),
            other => other,
        }
    }
}

impl fmt::Display for UpdatedAt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.wall_ms, self.counter)
    }
}

fn wall_clock_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before Unix epoch")
        .as_millis() as u64
}
