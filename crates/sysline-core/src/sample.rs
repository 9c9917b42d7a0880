//! Raw telemetry samples.

use std::fmt;
use std::time::SystemTime;

/// How a sampled value is turned into something displayable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    /// Used as-is (percentages, temperatures, watts, sizes).
    Instantaneous,
    /// Monotonic counter; displayed as a per-second rate.
    Cumulative,
}

/// Every metric the sampler produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Metric {
    CpuUsage,
    CpuTemp,
    MemUsed,
    MemTotal,
    GpuUtil,
    GpuTemp,
    GpuPower,
    DiskRead,
    DiskWrite,
    NetDown,
    NetUp,
    CpuEnergy,
    GpuEnergy,
}

impl Metric {
    /// Returns whether the metric is a gauge or a counter.
    pub fn kind(self) -> ValueKind {
        match self {
            Metric::DiskRead
            | Metric::DiskWrite
            | Metric::NetDown
            | Metric::NetUp
            | Metric::CpuEnergy
            | Metric::GpuEnergy => ValueKind::Cumulative,
            _ => ValueKind::Instantaneous,
        }
    }

    /// Stable name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Metric::CpuUsage => "cpu-usage",
            Metric::CpuTemp => "cpu-temp",
            Metric::MemUsed => "mem-used",
            Metric::MemTotal => "mem-total",
            Metric::GpuUtil => "gpu-util",
            Metric::GpuTemp => "gpu-temp",
            Metric::GpuPower => "gpu-power",
            Metric::DiskRead => "disk-read",
            Metric::DiskWrite => "disk-write",
            Metric::NetDown => "net-down",
            Metric::NetUp => "net-up",
            Metric::CpuEnergy => "cpu-energy",
            Metric::GpuEnergy => "gpu-energy",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit of a raw counter as reported by its source.
///
/// Conversion to display units happens once, after the rate is computed.
/// Per source: `/sys/class/net` statistics are [`CounterUnit::Bytes`],
/// `/proc/diskstats` is [`CounterUnit::Sectors`], RAPL and hwmon energy are
/// [`CounterUnit::Microjoules`]. None of the built-in sources count bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterUnit {
    Bytes,
    /// For sources that count bits; divided by 8.
    Bits,
    /// `/proc/diskstats` counts 512-byte sectors regardless of device geometry.
    Sectors,
    /// RAPL and hwmon energy counters; rates come out in watts.
    Microjoules,
}

impl CounterUnit {
    /// Converts a rate in raw units per second to bytes (or watts) per second.
    pub fn per_second(self, raw_per_sec: f64) -> f64 {
        match self {
            CounterUnit::Bytes => raw_per_sec,
            CounterUnit::Bits => raw_per_sec / 8.0,
            CounterUnit::Sectors => raw_per_sec * 512.0,
            CounterUnit::Microjoules => raw_per_sec / 1_000_000.0,
        }
    }
}

/// A sampled value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Gauge(f64),
    Counter { raw: u64, unit: CounterUnit },
    /// The backend failed this tick; renders as a placeholder.
    Unavailable,
}

/// Immutable snapshot of one metric at one point in time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub at: SystemTime,
    pub metric: Metric,
    pub value: Value,
}

impl Sample {
    pub fn gauge(at: SystemTime, metric: Metric, value: f64) -> Self {
        Self {
            at,
            metric,
            value: Value::Gauge(value),
        }
    }

    pub fn counter(at: SystemTime, metric: Metric, raw: u64, unit: CounterUnit) -> Self {
        Self {
            at,
            metric,
            value: Value::Counter { raw, unit },
        }
    }

    pub fn unavailable(at: SystemTime, metric: Metric) -> Self {
        Self {
            at,
            metric,
            value: Value::Unavailable,
        }
    }

    pub fn kind(&self) -> ValueKind {
        self.metric.kind()
    }
}
