//! Conversion of cumulative counters into per-second rates.

use crate::sample::Metric;
use std::collections::HashMap;
use std::time::SystemTime;
use tracing::debug;

/// Irregularity seen by the most recent observation of a counter.
///
/// Neither is an error: both are recovered inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anomaly {
    /// Value decreased without a known wrap; baseline was reset.
    CounterReset,
    /// Timestamp did not advance; previous rate was reused.
    StaleClock,
}

/// Previous observation of one counter.
#[derive(Debug, Clone, Copy)]
struct RateState {
    last_value: u64,
    last_at: SystemTime,
    last_rate: f64,
    anomaly: Option<Anomaly>,
}

/// Per-counter rate tracker.
///
/// Deterministic: the rates depend only on the sequence of `(timestamp, value)`
/// pairs fed to [`RateEngine::observe`]. State lives for the whole process.
#[derive(Debug, Default)]
pub struct RateEngine {
    states: HashMap<Metric, RateState>,
    wraps: HashMap<Metric, u64>,
}

impl RateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares that `metric` wraps to zero after reaching `modulus`.
    ///
    /// A decrease on such a counter is read as a wraparound instead of a reset.
    pub fn set_wrap(&mut self, metric: Metric, modulus: u64) {
        self.wraps.insert(metric, modulus);
    }

    /// Records a counter value and returns the rate in raw units per second.
    ///
    /// - First observation: stores a baseline, returns 0.
    /// - Elapsed time zero or negative: state untouched, previous rate returned.
    /// - Value decreased: new baseline, returns 0 (unless a wrap modulus applies).
    pub fn observe(&mut self, metric: Metric, at: SystemTime, value: u64) -> f64 {
        let Some(state) = self.states.get_mut(&metric) else {
            self.states.insert(
                metric,
                RateState {
                    last_value: value,
                    last_at: at,
                    last_rate: 0.0,
                    anomaly: None,
                },
            );
            return 0.0;
        };

        let elapsed = match at.duration_since(state.last_at) {
            Ok(d) if !d.is_zero() => d.as_secs_f64(),
            _ => {
                debug!("{}: non-increasing timestamp, keeping previous rate", metric);
                state.anomaly = Some(Anomaly::StaleClock);
                return state.last_rate;
            }
        };

        let delta = if value >= state.last_value {
            Some(value - state.last_value)
        } else {
            match self.wraps.get(&metric) {
                Some(&modulus) if state.last_value <= modulus => {
                    debug!("{}: counter wrapped at {}", metric, modulus);
                    Some(modulus - state.last_value + value)
                }
                _ => {
                    debug!(
                        "{}: counter went backwards ({} -> {}), new baseline",
                        metric, state.last_value, value
                    );
                    None
                }
            }
        };

        state.anomaly = delta.is_none().then_some(Anomaly::CounterReset);
        state.last_rate = delta.map(|d| d as f64 / elapsed).unwrap_or(0.0);
        state.last_value = value;
        state.last_at = at;
        state.last_rate
    }

    /// Returns the last reported rate, if the counter has been seen.
    pub fn last_rate(&self, metric: Metric) -> Option<f64> {
        self.states.get(&metric).map(|s| s.last_rate)
    }

    /// Returns the anomaly recovered from on the latest observation of `metric`.
    pub fn anomaly(&self, metric: Metric) -> Option<Anomaly> {
        self.states.get(&metric).and_then(|s| s.anomaly)
    }
}
