//! One-time detection of optional telemetry backends.

use crate::command::Tools;
use crate::error::Error;
use crate::gpu::{GpuBackend, GpuVendor};
use crate::host::Host;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// hwmon chips that carry the CPU package temperature.
const CPU_TEMP_CHIPS: &[&str] = &["coretemp", "k10temp", "zenpower", "cpu_thermal", "cpu-thermal"];

/// Preferred package/composite sensor labels, lowercase.
const CPU_TEMP_LABELS: &[&str] = &["package id 0", "tctl", "tdie", "cpu"];

/// Thermal zone types used when no hwmon chip matches.
const CPU_THERMAL_ZONES: &[&str] = &["x86_pkg_temp", "cpu-thermal", "cpu_thermal"];

/// RAPL package-0 energy counters, in lookup order.
const RAPL_PATHS: &[&str] = &[
    "/sys/class/powercap/intel-rapl:0",
    "/sys/class/powercap/intel-rapl/intel-rapl:0",
];

/// State of the CPU energy counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RaplStatus {
    Available {
        energy: PathBuf,
        /// Counter wraps to zero after this many microjoules.
        max_range_uj: Option<u64>,
    },
    /// Present but only readable by root (the kernel default since 2020).
    PermissionDenied { energy: PathBuf },
    Missing,
}

/// hwmon files belonging to the GPU when its tool does not report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GpuSensors {
    pub temperature: Option<PathBuf>,
    /// Cumulative energy counter in microjoules.
    pub energy: Option<PathBuf>,
}

/// Which optional backends exist on this machine.
///
/// Written once at startup and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceAvailability {
    pub gpu_vendor: GpuVendor,
    pub gpu_backend: GpuBackend,
    pub gpu_sensors: GpuSensors,
    pub cpu_temp: Option<PathBuf>,
    pub rapl: RaplStatus,
}

impl SourceAvailability {
    /// Nothing optional available; only core OS counters.
    pub fn none() -> Self {
        Self {
            gpu_vendor: GpuVendor::Unknown,
            gpu_backend: GpuBackend::None,
            gpu_sensors: GpuSensors::default(),
            cpu_temp: None,
            rapl: RaplStatus::Missing,
        }
    }

    pub fn has_cpu_temp_sensor(&self) -> bool {
        self.cpu_temp.is_some()
    }

    /// GPU power is shown when the tool reports watts or an energy counter exists.
    pub fn has_gpu_power(&self) -> bool {
        self.gpu_backend.capabilities().power || self.gpu_sensors.energy.is_some()
    }

    /// Detects every optional backend. Never fails; each probe failure only
    /// disables its own metric and is logged once here.
    pub async fn probe(host: &Host, tools: &Tools) -> Self {
        let gpu_vendor = detect_gpu_vendor(host).await;
        let gpu_backend = select_gpu_backend(gpu_vendor, tools).await;
        let gpu_sensors = find_gpu_sensors(host, gpu_backend).await;
        info!(
            "GPU vendor {:?}, using backend {:?} (marker '{}')",
            gpu_vendor,
            gpu_backend,
            gpu_backend.marker()
        );

        let cpu_temp = find_cpu_temp(host).await;
        match &cpu_temp {
            Some(path) => info!("CPU temperature from {}", path.display()),
            None => warn!("No CPU package temperature sensor found; showing placeholder"),
        }

        let rapl = probe_rapl(host).await;
        match &rapl {
            RaplStatus::Available { energy, .. } => {
                info!("CPU power from {}", energy.display())
            }
            RaplStatus::PermissionDenied { energy } => warn!(
                "CPU energy counter {} is not readable by this user; CPU power disabled",
                energy.display()
            ),
            RaplStatus::Missing => warn!("No RAPL energy counter found; CPU power disabled"),
        }

        Self {
            gpu_vendor,
            gpu_backend,
            gpu_sensors,
            cpu_temp,
            rapl,
        }
    }
}

/// Classifies the display controllers on the PCI bus.
pub async fn detect_gpu_vendor(host: &Host) -> GpuVendor {
    let devices_dir = host.path("/sys/bus/pci/devices");
    let devices = match host.list_dir(&devices_dir).await {
        Ok(d) => d,
        Err(e) => {
            warn!("Cannot enumerate PCI devices: {}", e);
            return GpuVendor::Unknown;
        }
    };

    let mut found = Vec::new();
    for device in devices {
        let dir = devices_dir.join(&device);
        let Ok(class) = host.read(&dir.join("class")).await else {
            continue;
        };
        // PCI base class 0x03: display controller.
        if !class.starts_with("0x03") {
            continue;
        }
        if let Ok(vendor) = host.read(&dir.join("vendor")).await {
            found.push(GpuVendor::from_pci_id(&vendor));
        }
    }

    [GpuVendor::Nvidia, GpuVendor::Amd, GpuVendor::Intel]
        .into_iter()
        .find(|v| found.contains(v))
        .unwrap_or(GpuVendor::Unknown)
}

/// Walks the vendor fallback chain: NVIDIA, then AMD tools, then Intel.
pub async fn select_gpu_backend(vendor: GpuVendor, tools: &Tools) -> GpuBackend {
    match vendor {
        GpuVendor::Nvidia => match tools.run("nvidia-smi", &["-L"]).await {
            Ok(_) => return GpuBackend::Nvidia,
            Err(e) => warn!("NVIDIA GPU present but nvidia-smi failed: {}", e),
        },
        GpuVendor::Amd => {
            if tools.locate("rocm-smi").is_some() {
                return GpuBackend::AmdRocm;
            }
            if tools.locate("radeontop").is_some() {
                return GpuBackend::AmdRadeontop;
            }
            warn!("AMD GPU present but neither rocm-smi nor radeontop is installed");
        }
        GpuVendor::Intel | GpuVendor::Unknown => {}
    }

    if tools.locate("intel_gpu_top").is_some() {
        GpuBackend::Intel
    } else {
        GpuBackend::None
    }
}

/// Finds hwmon chip directories whose `name` is one of `names`, in `names` order.
async fn find_hwmon(host: &Host, names: &[&str]) -> Vec<PathBuf> {
    let hwmon_dir = host.path("/sys/class/hwmon");
    let Ok(entries) = host.list_dir(&hwmon_dir).await else {
        return Vec::new();
    };
    let mut chips = Vec::new();
    for entry in entries {
        let dir = hwmon_dir.join(&entry);
        if let Ok(name) = host.read(&dir.join("name")).await {
            if let Some(rank) = names.iter().position(|n| *n == name) {
                chips.push((rank, dir));
            }
        }
    }
    chips.sort_by_key(|(rank, _)| *rank);
    chips.into_iter().map(|(_, dir)| dir).collect()
}

/// Returns the `temp*_input` files of a chip with their index, sorted by index.
async fn temp_inputs(host: &Host, chip: &Path) -> Vec<(u32, PathBuf)> {
    let Ok(entries) = host.list_dir(chip).await else {
        return Vec::new();
    };
    let mut inputs: Vec<(u32, PathBuf)> = entries
        .iter()
        .filter_map(|e| {
            let index = e.strip_prefix("temp")?.strip_suffix("_input")?.parse().ok()?;
            Some((index, chip.join(e)))
        })
        .collect();
    inputs.sort_by_key(|(i, _)| *i);
    inputs
}

/// Locates the CPU package temperature input.
pub async fn find_cpu_temp(host: &Host) -> Option<PathBuf> {
    for chip in find_hwmon(host, CPU_TEMP_CHIPS).await {
        let inputs = temp_inputs(host, &chip).await;
        for (index, input) in &inputs {
            let label_path = chip.join(format!("temp{}_label", index));
            if let Ok(label) = host.read(&label_path).await {
                if CPU_TEMP_LABELS.contains(&label.to_lowercase().as_str()) {
                    return Some(input.clone());
                }
            }
        }
        if let Some((_, first)) = inputs.into_iter().next() {
            return Some(first);
        }
    }

    let zones_dir = host.path("/sys/class/thermal");
    let zones = host.list_dir(&zones_dir).await.ok()?;
    for zone in zones.iter().filter(|z| z.starts_with("thermal_zone")) {
        let dir = zones_dir.join(zone);
        if let Ok(kind) = host.read(&dir.join("type")).await {
            if CPU_THERMAL_ZONES.contains(&kind.as_str()) {
                return Some(dir.join("temp"));
            }
        }
    }
    None
}

/// Locates GPU temperature and energy files for backends whose tool lacks them.
pub async fn find_gpu_sensors(host: &Host, backend: GpuBackend) -> GpuSensors {
    let chips: &[&str] = match backend {
        GpuBackend::AmdRadeontop => &["amdgpu"],
        GpuBackend::Intel => &["i915", "xe"],
        _ => return GpuSensors::default(),
    };
    let Some(chip) = find_hwmon(host, chips).await.into_iter().next() else {
        return GpuSensors::default();
    };

    let temperature = temp_inputs(host, &chip).await.into_iter().next().map(|(_, p)| p);
    let energy_path = chip.join("energy1_input");
    let energy = match host.read_u64(&energy_path).await {
        Ok(_) => Some(energy_path),
        Err(Error::PermissionDenied { path }) => {
            warn!("GPU energy counter {} not readable", path.display());
            None
        }
        Err(_) => None,
    };
    GpuSensors {
        temperature,
        energy,
    }
}

/// Checks the RAPL package energy counter.
pub async fn probe_rapl(host: &Host) -> RaplStatus {
    for base in RAPL_PATHS {
        let dir = host.path(base);
        let energy = dir.join("energy_uj");
        match host.read_u64(&energy).await {
            Ok(_) => {
                let max_range_uj = host.read_u64(&dir.join("max_energy_range_uj")).await.ok();
                return RaplStatus::Available {
                    energy,
                    max_range_uj,
                };
            }
            Err(Error::PermissionDenied { .. }) => {
                return RaplStatus::PermissionDenied { energy };
            }
            Err(_) => continue,
        }
    }
    RaplStatus::Missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{fake_root, put, put_script};
    use std::time::Duration;

    fn host(root: &Path) -> Host {
        Host::new(root, Duration::from_millis(500))
    }

    fn tools(dir: PathBuf) -> Tools {
        Tools::with_dirs(vec![dir], Duration::from_millis(2000))
    }

    fn pci(root: &Path, slot: &str, class: &str, vendor: &str) {
        put(root, &format!("/sys/bus/pci/devices/{}/class", slot), class);
        put(root, &format!("/sys/bus/pci/devices/{}/vendor", slot), vendor);
    }

    #[tokio::test]
    async fn test_vendor_prefers_nvidia() {
        let root = fake_root("probe_vendor");
        pci(&root, "0000:00:02.0", "0x030000", "0x8086");
        pci(&root, "0000:01:00.0", "0x030200", "0x10de");
        pci(&root, "0000:00:1f.3", "0x040300", "0x8086");
        assert_eq!(detect_gpu_vendor(&host(&root)).await, GpuVendor::Nvidia);
    }

    #[tokio::test]
    async fn test_vendor_ignores_non_display() {
        let root = fake_root("probe_nodisplay");
        pci(&root, "0000:00:1f.3", "0x040300", "0x10de");
        assert_eq!(detect_gpu_vendor(&host(&root)).await, GpuVendor::Unknown);
        let empty = fake_root("probe_nopci");
        assert_eq!(detect_gpu_vendor(&host(&empty)).await, GpuVendor::Unknown);
    }

    #[tokio::test]
    async fn test_backend_chain() {
        let bin = fake_root("probe_bin");
        assert_eq!(
            select_gpu_backend(GpuVendor::Nvidia, &tools(bin.clone())).await,
            GpuBackend::None
        );
        put_script(&bin, "intel_gpu_top", "exit 0");
        // nvidia-smi missing falls back to the Intel tool.
        assert_eq!(
            select_gpu_backend(GpuVendor::Nvidia, &tools(bin.clone())).await,
            GpuBackend::Intel
        );
        put_script(&bin, "radeontop", "exit 0");
        assert_eq!(
            select_gpu_backend(GpuVendor::Amd, &tools(bin.clone())).await,
            GpuBackend::AmdRadeontop
        );
        put_script(&bin, "rocm-smi", "exit 0");
        assert_eq!(
            select_gpu_backend(GpuVendor::Amd, &tools(bin.clone())).await,
            GpuBackend::AmdRocm
        );
        put_script(&bin, "nvidia-smi", "echo 'GPU 0: Test'");
        assert_eq!(
            select_gpu_backend(GpuVendor::Nvidia, &tools(bin.clone())).await,
            GpuBackend::Nvidia
        );
    }

    #[tokio::test]
    async fn test_failing_nvidia_tool_falls_back() {
        let bin = fake_root("probe_nvfail");
        put_script(&bin, "nvidia-smi", "exit 9");
        assert_eq!(
            select_gpu_backend(GpuVendor::Nvidia, &tools(bin)).await,
            GpuBackend::None
        );
    }

    #[tokio::test]
    async fn test_cpu_temp_prefers_package_label() {
        let root = fake_root("probe_temp");
        put(&root, "/sys/class/hwmon/hwmon0/name", "nvme");
        put(&root, "/sys/class/hwmon/hwmon0/temp1_input", "40000");
        put(&root, "/sys/class/hwmon/hwmon3/name", "coretemp");
        put(&root, "/sys/class/hwmon/hwmon3/temp2_input", "51000");
        put(&root, "/sys/class/hwmon/hwmon3/temp2_label", "Core 0");
        put(&root, "/sys/class/hwmon/hwmon3/temp1_input", "55000");
        put(&root, "/sys/class/hwmon/hwmon3/temp1_label", "Package id 0");
        let found = find_cpu_temp(&host(&root)).await.unwrap();
        assert_eq!(found, root.join("sys/class/hwmon/hwmon3/temp1_input"));
    }

    #[tokio::test]
    async fn test_cpu_temp_thermal_zone_fallback() {
        let root = fake_root("probe_zone");
        put(&root, "/sys/class/thermal/thermal_zone0/type", "acpitz");
        put(&root, "/sys/class/thermal/thermal_zone0/temp", "30000");
        put(&root, "/sys/class/thermal/thermal_zone1/type", "x86_pkg_temp");
        put(&root, "/sys/class/thermal/thermal_zone1/temp", "48000");
        let found = find_cpu_temp(&host(&root)).await.unwrap();
        assert_eq!(found, root.join("sys/class/thermal/thermal_zone1/temp"));

        let empty = fake_root("probe_notemp");
        assert!(find_cpu_temp(&host(&empty)).await.is_none());
    }

    #[tokio::test]
    async fn test_rapl_available() {
        let root = fake_root("probe_rapl");
        put(&root, "/sys/class/powercap/intel-rapl:0/energy_uj", "123456");
        put(
            &root,
            "/sys/class/powercap/intel-rapl:0/max_energy_range_uj",
            "262143328850",
        );
        let status = probe_rapl(&host(&root)).await;
        assert_eq!(
            status,
            RaplStatus::Available {
                energy: root.join("sys/class/powercap/intel-rapl:0/energy_uj"),
                max_range_uj: Some(262_143_328_850),
            }
        );
        assert_eq!(probe_rapl(&host(&fake_root("probe_norapl"))).await, RaplStatus::Missing);
    }

    #[tokio::test]
    async fn test_intel_gpu_sensors() {
        let root = fake_root("probe_i915");
        put(&root, "/sys/class/hwmon/hwmon5/name", "i915");
        put(&root, "/sys/class/hwmon/hwmon5/temp1_input", "45000");
        put(&root, "/sys/class/hwmon/hwmon5/energy1_input", "99000000");
        let sensors = find_gpu_sensors(&host(&root), GpuBackend::Intel).await;
        assert_eq!(
            sensors.temperature,
            Some(root.join("sys/class/hwmon/hwmon5/temp1_input"))
        );
        assert_eq!(
            sensors.energy,
            Some(root.join("sys/class/hwmon/hwmon5/energy1_input"))
        );
        let none = find_gpu_sensors(&host(&root), GpuBackend::Nvidia).await;
        assert_eq!(none, GpuSensors::default());
    }

    #[tokio::test]
    async fn test_detection_never_fails_on_empty_host() {
        let root = fake_root("probe_empty");
        let availability =
            SourceAvailability::probe(&host(&root), &tools(fake_root("probe_emptybin"))).await;
        assert_eq!(availability, SourceAvailability::none());
        assert!(!availability.has_cpu_temp_sensor());
        assert!(!availability.has_gpu_power());
    }
}
