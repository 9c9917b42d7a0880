//! Memory usage sensor.

use crate::error::{Error, Result};
use crate::host::Host;

const KIB_PER_GIB: f64 = 1024.0 * 1024.0;

/// Used and total memory in GiB.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub used_gib: f64,
    pub total_gib: f64,
}

fn field_kb(meminfo: &str, key: &str) -> Option<u64> {
    meminfo
        .lines()
        .find(|l| l.starts_with(key))?
        .split_whitespace()
        .nth(1)?
        .parse()
        .ok()
}

impl MemoryUsage {
    /// Parses `/proc/meminfo`; used is total minus available.
    pub fn parse(meminfo: &str) -> Option<Self> {
        let total = field_kb(meminfo, "MemTotal:")?;
        let available = field_kb(meminfo, "MemAvailable:")?;
        Some(Self {
            used_gib: total.saturating_sub(available) as f64 / KIB_PER_GIB,
            total_gib: total as f64 / KIB_PER_GIB,
        })
    }

    pub async fn read(host: &Host) -> Result<Self> {
        let content = host.read(&host.path("/proc/meminfo")).await?;
        Self::parse(&content)
            .ok_or_else(|| Error::parse("/proc/meminfo", "missing MemTotal or MemAvailable"))
    }
}
