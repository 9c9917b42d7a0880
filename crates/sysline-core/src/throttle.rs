//! Rate-limited logging of repeated backend failures.

use crate::error::Error;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

#[derive(Debug)]
struct Entry {
    repeats: u32,
    last_logged: Instant,
}

/// Logs the first failure of each metric family, then at most one summary per
/// interval while it keeps failing.
#[derive(Debug)]
pub struct ErrorThrottle {
    interval: Duration,
    failing: HashMap<&'static str, Entry>,
}

impl ErrorThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            failing: HashMap::new(),
        }
    }

    /// Records a failure. Returns true if it was logged.
    pub fn failure(&mut self, family: &'static str, error: &Error) -> bool {
        match self.failing.get_mut(family) {
            None => {
                warn!("{}: {}", family, error);
                self.failing.insert(
                    family,
                    Entry {
                        repeats: 0,
                        last_logged: Instant::now(),
                    },
                );
                true
            }
            Some(entry) => {
                entry.repeats += 1;
                let elapsed = entry.last_logged.elapsed();
                if elapsed < self.interval {
                    return false;
                }
                warn!(
                    "{}: {} (repeated {} times in {:?})",
                    family, error, entry.repeats, elapsed
                );
                entry.repeats = 0;
                entry.last_logged = Instant::now();
                true
            }
        }
    }

    /// Records a success, logging recovery if the family was failing.
    pub fn success(&mut self, family: &'static str) {
        if self.failing.remove(family).is_some() {
            info!("{}: recovered", family);
        }
    }

    #[cfg(test)]
    pub fn is_failing(&self, family: &str) -> bool {
        self.failing.contains_key(family)
    }
}

impl Default for ErrorThrottle {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}
