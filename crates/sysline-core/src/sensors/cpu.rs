//! CPU usage and temperature sensors.

use crate::error::{Error, Result};
use crate::host::Host;
use std::path::Path;

/// Aggregate jiffy counters from the first line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTimes {
    /// idle + iowait
    pub idle: u64,
    /// user through steal; guest time is already folded into user
    pub total: u64,
}

impl CpuTimes {
    /// Parses the aggregate `cpu` line.
    pub fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|l| l.starts_with("cpu "))?;
        let parts: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .filter_map(|s| s.parse().ok())
            .collect();

        if parts.len() >= 4 {
            let idle = parts[3] + parts.get(4).copied().unwrap_or(0);
            let total: u64 = parts.iter().sum();
            Some(Self { idle, total })
        } else {
            None
        }
    }

    /// Busy percentage between `previous` and `self`, if any time has passed.
    pub fn usage_since(&self, previous: &CpuTimes) -> Option<f64> {
        let idle_delta = self.idle.saturating_sub(previous.idle);
        let total_delta = self.total.saturating_sub(previous.total);
        if total_delta == 0 {
            return None;
        }
        Some((100.0 * (1.0 - idle_delta as f64 / total_delta as f64)).clamp(0.0, 100.0))
    }
}

/// CPU usage sensor.
///
/// Usage is measured over the window since the previous call, so the first
/// tick is served by the baseline taken in [`CpuSensor::prime`].
#[derive(Debug, Default)]
pub struct CpuSensor {
    last: Option<CpuTimes>,
    last_sample: f64,
}

impl CpuSensor {
    /// Creates a new CPU sensor.
    pub fn new() -> Self {
        Self::default()
    }

    async fn read_times(host: &Host) -> Result<CpuTimes> {
        let content = host.read(&host.path("/proc/stat")).await?;
        CpuTimes::parse(&content).ok_or_else(|| Error::parse("/proc/stat", "no aggregate cpu line"))
    }

    /// Takes the baseline for the first measurement window.
    pub async fn prime(&mut self, host: &Host) {
        self.last = Self::read_times(host).await.ok();
    }

    /// Returns busy percent since the previous call.
    pub async fn sample(&mut self, host: &Host) -> Result<f64> {
        let times = Self::read_times(host).await?;
        if let Some(previous) = self.last {
            if let Some(usage) = times.usage_since(&previous) {
                self.last_sample = usage;
            }
        }
        self.last = Some(times);
        Ok(self.last_sample)
    }
}

/// Reads a temperature input in degrees Celsius.
///
/// Kernel sensors report millidegrees; small values are taken as degrees already.
pub async fn read_temperature(host: &Host, path: &Path) -> Result<f64> {
    let content = host.read(path).await?;
    let raw: f64 = content.parse().map_err(|_| {
        Error::parse(
            path.display().to_string(),
            format!("expected temperature, got '{}'", content),
        )
    })?;
    Ok(if raw > 200.0 { raw / 1000.0 } else { raw })
}
