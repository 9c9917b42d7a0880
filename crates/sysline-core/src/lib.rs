//! Sysline Core Library
//!
//! Samples CPU, memory, GPU, disk, network and power telemetry from a Linux
//! host, turns cumulative counters into per-second rates and renders one
//! fixed-width status line per refresh tick.

pub mod command;
pub mod config;
pub mod error;
pub mod format;
pub mod gpu;
pub mod host;
pub mod line;
pub mod monitor;
pub mod probe;
pub mod rate;
pub mod refresh;
pub mod sample;
pub mod sensors;
mod throttle;

pub use command::Tools;
pub use config::Config;
pub use error::{Error, Result};
pub use gpu::{GpuBackend, GpuVendor};
pub use host::Host;
pub use line::{DisplayLine, Layout, LineFormatter, Readings};
pub use monitor::{Monitor, TickPhase};
pub use probe::{RaplStatus, SourceAvailability};
pub use rate::{Anomaly, RateEngine};
pub use refresh::{run, DisplaySink};
pub use sample::{CounterUnit, Metric, Sample, Value};
pub use sensors::{PowerSupply, Sampler, Snapshot};

/// Application id used for the tray item and log messages.
pub const APP_ID: &str = "sysline";
