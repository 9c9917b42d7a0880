//! One refresh tick: sample, compute rates, format.

use crate::command::Tools;
use crate::config::Config;
use crate::host::Host;
use crate::line::{DisplayLine, LineFormatter, Readings};
use crate::probe::{RaplStatus, SourceAvailability};
use crate::rate::RateEngine;
use crate::sample::{Metric, Sample, Value, ValueKind};
use crate::sensors::{Sampler, Snapshot};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, trace};

/// Stage of a tick, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickPhase {
    Idle,
    Sampling,
    RateComputing,
    Formatting,
    Published,
}

/// Owns the sampler, the rate state and the formatter for the process lifetime.
pub struct Monitor {
    sampler: Sampler,
    rates: RateEngine,
    formatter: LineFormatter,
    phase: TickPhase,
}

impl Monitor {
    pub async fn new(
        config: &Config,
        host: Host,
        tools: Tools,
        availability: Arc<SourceAvailability>,
    ) -> Self {
        let mut rates = RateEngine::new();
        let probed_range = match &availability.rapl {
            RaplStatus::Available { max_range_uj, .. } => *max_range_uj,
            _ => None,
        };
        if let Some(modulus) = config.rapl_wrap_uj.or(probed_range) {
            debug!("CPU energy counter wraps at {} uJ", modulus);
            rates.set_wrap(Metric::CpuEnergy, modulus);
        }

        let formatter =
            LineFormatter::new(availability.clone(), config.rate_width, config.max_label_len);
        let sampler = Sampler::new(host, tools, availability).await;
        Self {
            sampler,
            rates,
            formatter,
            phase: TickPhase::Idle,
        }
    }

    pub fn availability(&self) -> &SourceAvailability {
        self.sampler.availability()
    }

    pub fn formatter(&self) -> &LineFormatter {
        &self.formatter
    }

    pub fn phase(&self) -> TickPhase {
        self.phase
    }

    fn enter(&mut self, phase: TickPhase) {
        trace!("tick phase {:?} -> {:?}", self.phase, phase);
        self.phase = phase;
    }

    pub async fn tick(&mut self) -> DisplayLine {
        self.tick_at(SystemTime::now()).await
    }

    /// Runs one tick with every sample stamped `at`.
    pub async fn tick_at(&mut self, at: SystemTime) -> DisplayLine {
        self.enter(TickPhase::Sampling);
        let snapshot = self.sampler.sample(at).await;

        self.enter(TickPhase::RateComputing);
        let readings = self.readings(&snapshot);

        self.enter(TickPhase::Formatting);
        let line = self.formatter.render(&readings);

        self.enter(TickPhase::Published);
        line
    }

    fn value(&mut self, sample: &Sample) -> Option<f64> {
        match (sample.kind(), sample.value) {
            (_, Value::Unavailable) => None,
            (ValueKind::Instantaneous, Value::Gauge(v)) => Some(v),
            (ValueKind::Cumulative, Value::Counter { raw, unit }) => {
                let rate = self.rates.observe(sample.metric, sample.at, raw);
                Some(unit.per_second(rate))
            }
            (kind, value) => {
                debug!("{} is {:?} but sampled as {:?}", sample.metric, kind, value);
                None
            }
        }
    }

    fn readings(&mut self, snapshot: &Snapshot) -> Readings {
        let mut r = Readings {
            supply: snapshot.supply.unwrap_or_default(),
            ..Readings::default()
        };
        for sample in &snapshot.samples {
            let value = self.value(sample);
            let slot = match sample.metric {
                Metric::CpuUsage => &mut r.cpu_usage,
                Metric::CpuTemp => &mut r.cpu_temp,
                Metric::MemUsed => &mut r.mem_used_gib,
                Metric::MemTotal => &mut r.mem_total_gib,
                Metric::GpuUtil => &mut r.gpu_util,
                Metric::GpuTemp => &mut r.gpu_temp,
                Metric::GpuPower | Metric::GpuEnergy => &mut r.gpu_watts,
                Metric::DiskRead => &mut r.disk_read,
                Metric::DiskWrite => &mut r.disk_write,
                Metric::NetDown => &mut r.net_down,
                Metric::NetUp => &mut r.net_up,
                Metric::CpuEnergy => &mut r.cpu_watts,
            };
            *slot = value;
        }
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{fake_root, put};
    use crate::sample::CounterUnit;
    use std::path::Path;
    use std::time::{Duration, UNIX_EPOCH};

    fn t(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(1_700_000_000 + secs)
    }

    fn populate(root: &Path, read_sectors: u64, rx: u64, energy_uj: u64) {
        put(root, "/proc/stat", "cpu  100 0 100 700 100 0 0 0 0 0\n");
        put(root, "/proc/meminfo", "MemTotal: 8388608 kB\nMemAvailable: 4194304 kB\n");
        put(
            root,
            "/proc/diskstats",
            &format!("   8       0 sda 10 0 {} 0 5 0 40 0 0 0 0\n", read_sectors),
        );
        put(root, "/sys/block/sda/size", "1");
        put(root, "/sys/class/net/eth0/statistics/rx_bytes", &rx.to_string());
        put(root, "/sys/class/net/eth0/statistics/tx_bytes", "0");
        put(
            root,
            "/sys/class/powercap/intel-rapl:0/energy_uj",
            &energy_uj.to_string(),
        );
    }

    fn availability(root: &Path, max_range_uj: Option<u64>) -> Arc<SourceAvailability> {
        let mut availability = SourceAvailability::none();
        availability.rapl = RaplStatus::Available {
            energy: root.join("sys/class/powercap/intel-rapl:0/energy_uj"),
            max_range_uj,
        };
        Arc::new(availability)
    }

    async fn monitor(root: &Path, config: &Config, max_range_uj: Option<u64>) -> Monitor {
        let host = Host::new(root, Duration::from_millis(500));
        let tools = Tools::with_dirs(vec![], Duration::from_millis(500));
        Monitor::new(config, host, tools, availability(root, max_range_uj)).await
    }

    #[tokio::test]
    async fn test_rates_converted_to_display_units() {
        let root = fake_root("monitor_rates");
        populate(&root, 1000, 5000, 10_000_000);
        let mut m = monitor(&root, &Config::default(), None).await;

        let first = m.tick_at(t(0)).await;
        assert!(first.as_str().contains("DISK R:     0B "));
        assert_eq!(m.phase(), TickPhase::Published);

        populate(&root, 1002, 6536, 25_000_000);
        let snapshot = m.sampler.sample(t(1)).await;
        let r = m.readings(&snapshot);
        assert_eq!(r.disk_read, Some(1024.0));
        assert_eq!(r.net_down, Some(1536.0));
        assert_eq!(r.cpu_watts, Some(15.0));
        assert_eq!(r.mem_total_gib, Some(8.0));
    }

    #[tokio::test]
    async fn test_energy_wrap_from_sysfs_range() {
        let root = fake_root("monitor_wrap");
        populate(&root, 0, 0, 999_000_000);
        let mut m = monitor(&root, &Config::default(), Some(1_000_000_000)).await;
        m.tick_at(t(0)).await;

        populate(&root, 0, 0, 9_000_000);
        let snapshot = m.sampler.sample(t(2)).await;
        assert_eq!(m.readings(&snapshot).cpu_watts, Some(5.0));
    }

    #[tokio::test]
    async fn test_configured_wrap_overrides_sysfs_range() {
        let root = fake_root("monitor_wrap_cfg");
        populate(&root, 0, 0, 90_000_000);
        let config = Config {
            rapl_wrap_uj: Some(100_000_000),
            ..Config::default()
        };
        let mut m = monitor(&root, &config, Some(1_000_000_000)).await;
        m.tick_at(t(0)).await;

        populate(&root, 0, 0, 4_000_000);
        let snapshot = m.sampler.sample(t(1)).await;
        assert_eq!(m.readings(&snapshot).cpu_watts, Some(14.0));
    }

    #[tokio::test]
    async fn test_counter_reset_shows_zero() {
        let root = fake_root("monitor_reset");
        populate(&root, 5000, 900_000, 0);
        let mut m = monitor(&root, &Config::default(), None).await;
        m.tick_at(t(0)).await;

        populate(&root, 5000, 100, 0);
        let snapshot = m.sampler.sample(t(1)).await;
        assert_eq!(m.readings(&snapshot).net_down, Some(0.0));
    }

    #[tokio::test]
    async fn test_bit_counters_converted_once() {
        let root = fake_root("monitor_bits");
        populate(&root, 0, 0, 0);
        let mut m = monitor(&root, &Config::default(), None).await;
        let first = Sample::counter(t(0), Metric::NetDown, 1000, CounterUnit::Bits);
        let second = Sample::counter(t(1), Metric::NetDown, 1800, CounterUnit::Bits);
        assert_eq!(m.value(&first), Some(0.0));
        assert_eq!(m.value(&second), Some(100.0));
    }

    #[tokio::test]
    async fn test_mismatched_kind_is_unavailable() {
        let root = fake_root("monitor_kind");
        populate(&root, 0, 0, 0);
        let mut m = monitor(&root, &Config::default(), None).await;
        let gauge_for_counter = Sample::gauge(t(0), Metric::DiskRead, 12.0);
        let counter_for_gauge = Sample::counter(t(0), Metric::CpuTemp, 40, CounterUnit::Bytes);
        assert_eq!(m.value(&gauge_for_counter), None);
        assert_eq!(m.value(&counter_for_gauge), None);
        assert_eq!(m.value(&Sample::gauge(t(0), Metric::CpuTemp, 40.0)), Some(40.0));
    }

    #[tokio::test]
    async fn test_line_width_stable_across_ticks() {
        let root = fake_root("monitor_width");
        populate(&root, 0, 0, 0);
        let mut m = monitor(&root, &Config::default(), None).await;
        let width = m.formatter().width();
        for i in 0..4u64 {
            populate(&root, i * 4_000_000, i * i * 1_000_000_000, i * 50_000_000);
            assert_eq!(m.tick_at(t(i)).await.width(), width);
        }
    }
}
