//! System sensors and the per-tick sampler.
//!
//! Provides CPU, memory, GPU, disk, network and power readings. Every backend
//! failure becomes an unavailable sample for that metric only.

mod cpu;
mod disk;
mod memory;
mod network;
mod power;

pub use cpu::{read_temperature, CpuSensor, CpuTimes};
pub use disk::DiskCounters;
pub use memory::MemoryUsage;
pub use network::NetworkCounters;
pub use power::{read_energy, PowerSupply};

use crate::command::Tools;
use crate::error::Result;
use crate::gpu::GpuReading;
use crate::host::Host;
use crate::probe::{RaplStatus, SourceAvailability};
use crate::sample::{CounterUnit, Metric, Sample};
use crate::throttle::ErrorThrottle;
use std::sync::Arc;
use std::time::SystemTime;

/// Everything sampled in one tick.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub at: SystemTime,
    pub samples: Vec<Sample>,
    /// `None` when the supply status could not be read.
    pub supply: Option<PowerSupply>,
}

#[cfg(test)]
impl Snapshot {
    /// Returns the sample for a metric, if one was taken.
    pub fn get(&self, metric: Metric) -> Option<&Sample> {
        self.samples.iter().find(|s| s.metric == metric)
    }
}

/// Reads every metric family from the host, guided by the probe result.
pub struct Sampler {
    host: Host,
    tools: Tools,
    availability: Arc<SourceAvailability>,
    cpu: CpuSensor,
    throttle: ErrorThrottle,
}

impl Sampler {
    /// Creates a sampler and takes the CPU usage baseline.
    pub async fn new(host: Host, tools: Tools, availability: Arc<SourceAvailability>) -> Self {
        let mut cpu = CpuSensor::new();
        cpu.prime(&host).await;
        Self {
            host,
            tools,
            availability,
            cpu,
            throttle: ErrorThrottle::default(),
        }
    }

    pub fn availability(&self) -> &SourceAvailability {
        &self.availability
    }

    /// Logs failures through the throttle and drops the error.
    fn settle<T>(&mut self, family: &'static str, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => {
                self.throttle.success(family);
                Some(value)
            }
            Err(e) => {
                self.throttle.failure(family, &e);
                None
            }
        }
    }

    /// Samples all metric families, stamping every sample with `at`.
    pub async fn sample(&mut self, at: SystemTime) -> Snapshot {
        let mut samples = Vec::with_capacity(16);
        let gauge = |metric, value: Option<f64>| match value {
            Some(v) => Sample::gauge(at, metric, v),
            None => Sample::unavailable(at, metric),
        };

        // CPU
        let usage = self.cpu.sample(&self.host).await;
        let usage = self.settle("cpu", usage);
        samples.push(gauge(Metric::CpuUsage, usage));
        if let Some(path) = self.availability.cpu_temp.clone() {
            let temp = read_temperature(&self.host, &path).await;
            let temp = self.settle("cpu-temp", temp);
            samples.push(gauge(Metric::CpuTemp, temp));
        }

        // Memory
        let memory = MemoryUsage::read(&self.host).await;
        let memory = self.settle("memory", memory);
        samples.push(gauge(Metric::MemUsed, memory.map(|m| m.used_gib)));
        samples.push(gauge(Metric::MemTotal, memory.map(|m| m.total_gib)));

        // GPU
        self.sample_gpu(at, &mut samples).await;

        // Disk
        let disk = DiskCounters::read(&self.host).await;
        match self.settle("disk", disk) {
            Some(c) => {
                let sectors = CounterUnit::Sectors;
                samples.push(Sample::counter(at, Metric::DiskRead, c.read_sectors, sectors));
                samples.push(Sample::counter(at, Metric::DiskWrite, c.write_sectors, sectors));
            }
            None => {
                samples.push(Sample::unavailable(at, Metric::DiskRead));
                samples.push(Sample::unavailable(at, Metric::DiskWrite));
            }
        }

        // Network
        let net = NetworkCounters::read(&self.host).await;
        match self.settle("network", net) {
            Some(c) => {
                samples.push(Sample::counter(at, Metric::NetDown, c.rx_bytes, CounterUnit::Bytes));
                samples.push(Sample::counter(at, Metric::NetUp, c.tx_bytes, CounterUnit::Bytes));
            }
            None => {
                samples.push(Sample::unavailable(at, Metric::NetDown));
                samples.push(Sample::unavailable(at, Metric::NetUp));
            }
        }

        // Power
        let rapl = match &self.availability.rapl {
            RaplStatus::Available { energy, .. } => Some(energy.clone()),
            _ => None,
        };
        if let Some(path) = rapl {
            let energy = read_energy(&self.host, &path).await;
            samples.push(match self.settle("cpu-power", energy) {
                Some(uj) => Sample::counter(at, Metric::CpuEnergy, uj, CounterUnit::Microjoules),
                None => Sample::unavailable(at, Metric::CpuEnergy),
            });
        }
        let supply = PowerSupply::read(&self.host).await;
        let supply = self.settle("power-supply", supply);

        Snapshot {
            at,
            samples,
            supply,
        }
    }

    async fn sample_gpu(&mut self, at: SystemTime, samples: &mut Vec<Sample>) {
        let backend = self.availability.gpu_backend;
        let caps = backend.capabilities();
        // Nothing to query means placeholders without log noise.
        let reading = if caps.any() {
            let result = backend.query(&self.tools).await;
            self.settle("gpu", result).unwrap_or_default()
        } else {
            GpuReading::default()
        };

        // Tools without a temperature column fall back to hwmon.
        let mut temperature = reading.temperature.filter(|_| caps.temperature);
        if temperature.is_none() {
            if let Some(path) = self.availability.gpu_sensors.temperature.clone() {
                let temp = read_temperature(&self.host, &path).await;
                temperature = self.settle("gpu-temp", temp);
            }
        }

        let value = |metric, v: Option<f64>| match v {
            Some(v) => Sample::gauge(at, metric, v),
            None => Sample::unavailable(at, metric),
        };
        samples.push(value(Metric::GpuUtil, reading.utilization));
        samples.push(value(Metric::GpuTemp, temperature));

        if caps.power {
            samples.push(value(Metric::GpuPower, reading.power_watts));
        } else if let Some(path) = self.availability.gpu_sensors.energy.clone() {
            let energy = read_energy(&self.host, &path).await;
            samples.push(match self.settle("gpu-power", energy) {
                Some(uj) => Sample::counter(at, Metric::GpuEnergy, uj, CounterUnit::Microjoules),
                None => Sample::unavailable(at, Metric::GpuEnergy),
            });
        }
    }
}
