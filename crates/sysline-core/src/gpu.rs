//! GPU query backends.
//!
//! The backend is chosen once by the probe; each tick dispatches on the enum
//! and never re-detects by name.

use crate::command::Tools;
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

/// How long `intel_gpu_top` is allowed to sample before it is killed.
const INTEL_WINDOW: Duration = Duration::from_millis(400);

/// radeontop dumps at whole-second intervals, so one line takes just over a
/// second to appear.
const RADEONTOP_BOUND: Duration = Duration::from_millis(1500);

/// Graphics vendor found on the PCI bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuVendor {
    Nvidia,
    Amd,
    Intel,
    Unknown,
}

impl GpuVendor {
    /// Maps a PCI vendor id such as `0x10de`.
    pub fn from_pci_id(id: &str) -> Self {
        match id.trim().to_ascii_lowercase().as_str() {
            "0x10de" => GpuVendor::Nvidia,
            "0x1002" | "0x1022" => GpuVendor::Amd,
            "0x8086" => GpuVendor::Intel,
            _ => GpuVendor::Unknown,
        }
    }
}

/// Selected GPU query backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GpuBackend {
    Nvidia,
    AmdRocm,
    AmdRadeontop,
    Intel,
    None,
}

/// What a backend's tool reports directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub utilization: bool,
    pub temperature: bool,
    /// Instantaneous watts; no differencing needed.
    pub power: bool,
}

impl Capabilities {
    /// Drops fields the backend is not trusted to report.
    pub fn restrict(self, reading: GpuReading) -> GpuReading {
        GpuReading {
            utilization: reading.utilization.filter(|_| self.utilization),
            temperature: reading.temperature.filter(|_| self.temperature),
            power_watts: reading.power_watts.filter(|_| self.power),
        }
    }

    /// True when the backend's tool reports anything at all.
    pub fn any(self) -> bool {
        self.utilization || self.temperature || self.power
    }
}

/// One GPU reading. Fields the tool did not report are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GpuReading {
    pub utilization: Option<f64>,
    pub temperature: Option<f64>,
    pub power_watts: Option<f64>,
}

impl GpuBackend {
    pub fn capabilities(self) -> Capabilities {
        let (utilization, temperature, power) = match self {
            GpuBackend::Nvidia => (true, true, true),
            GpuBackend::AmdRocm => (true, true, true),
            GpuBackend::AmdRadeontop => (true, false, false),
            GpuBackend::Intel => (true, false, false),
            GpuBackend::None => (false, false, false),
        };
        Capabilities {
            utilization,
            temperature,
            power,
        }
    }

    /// Single-character tag: discrete, integrated, or unknown.
    pub fn marker(self) -> char {
        match self {
            GpuBackend::Nvidia | GpuBackend::AmdRocm | GpuBackend::AmdRadeontop => 'D',
            GpuBackend::Intel => 'I',
            GpuBackend::None => '-',
        }
    }

    /// Runs the backend's tool once and parses its output.
    ///
    /// Only fields listed in [`GpuBackend::capabilities`] are kept.
    pub async fn query(self, tools: &Tools) -> Result<GpuReading> {
        let reading = match self {
            GpuBackend::Nvidia => {
                let out = tools
                    .run(
                        "nvidia-smi",
                        &[
                            "--query-gpu=utilization.gpu,temperature.gpu,power.draw",
                            "--format=csv,noheader,nounits",
                        ],
                    )
                    .await?;
                parse_nvidia(&out)
            }
            GpuBackend::AmdRocm => {
                let out = tools
                    .run(
                        "rocm-smi",
                        &["--showuse", "--showtemp", "--showpower", "--json"],
                    )
                    .await?;
                parse_rocm(&out)
            }
            GpuBackend::AmdRadeontop => {
                let bound = RADEONTOP_BOUND.max(tools.timeout());
                let out = tools
                    .run_for("radeontop", &["-d", "-", "-l", "1"], bound)
                    .await?;
                parse_radeontop(&out)
            }
            GpuBackend::Intel => {
                let out = tools
                    .capture("intel_gpu_top", &["-J", "-s", "100"], INTEL_WINDOW)
                    .await?;
                parse_intel(&out)
            }
            GpuBackend::None => Err(Error::unavailable("gpu", "no supported GPU backend")),
        }?;
        Ok(self.capabilities().restrict(reading))
    }
}

fn parse_field(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok()
}

/// Parses `utilization, temperature, power` CSV. Fields may be `[N/A]`.
pub fn parse_nvidia(out: &str) -> Result<GpuReading> {
    let line = out
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| Error::parse("nvidia-smi output", "empty"))?;
    let fields: Vec<&str> = line.split(',').collect();
    if fields.len() < 2 {
        return Err(Error::parse("nvidia-smi output", line));
    }
    let reading = GpuReading {
        utilization: parse_field(fields[0]),
        temperature: parse_field(fields[1]),
        power_watts: fields.get(2).and_then(|f| parse_field(f)),
    };
    if reading.utilization.is_none() && reading.temperature.is_none() {
        return Err(Error::parse("nvidia-smi output", line));
    }
    Ok(reading)
}

fn json_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_field(s),
        _ => None,
    }
}

/// Parses `rocm-smi --json`. Uses the first card; key names vary by release.
pub fn parse_rocm(out: &str) -> Result<GpuReading> {
    let root: Value = serde_json::from_str(out.trim())
        .map_err(|e| Error::parse("rocm-smi output", e.to_string()))?;
    let card = root
        .as_object()
        .and_then(|cards| {
            cards
                .iter()
                .find(|(name, _)| name.starts_with("card"))
                .and_then(|(_, v)| v.as_object())
        })
        .ok_or_else(|| Error::parse("rocm-smi output", "no card entry"))?;

    let mut reading = GpuReading::default();
    for (key, value) in card {
        let Some(n) = json_number(value) else {
            continue;
        };
        if key.contains("GPU use") {
            reading.utilization = Some(n);
        } else if key.starts_with("Temperature") {
            // Prefer the edge sensor over junction/memory.
            if reading.temperature.is_none() || key.contains("edge") {
                reading.temperature = Some(n);
            }
        } else if key.contains("Power") && key.ends_with("(W)") {
            reading.power_watts.get_or_insert(n);
        }
    }
    Ok(reading)
}

/// Parses a radeontop dump line: `<ts>: bus 03, gpu 12.50%, ee 0.00%, ...`.
pub fn parse_radeontop(out: &str) -> Result<GpuReading> {
    let utilization = out
        .lines()
        .flat_map(|l| l.split(','))
        .map(str::trim)
        .find_map(|part| part.strip_prefix("gpu "))
        .and_then(|v| parse_field(v.trim_end_matches('%')))
        .ok_or_else(|| Error::parse("radeontop output", "no gpu field"))?;
    Ok(GpuReading {
        utilization: Some(utilization),
        ..Default::default()
    })
}

/// Returns the first complete top-level JSON object in a stream.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses the first sample of `intel_gpu_top -J`.
///
/// Utilization is the mean busy percentage across engines. Older releases
/// emit engines as a list, newer ones as an object keyed by engine name.
pub fn parse_intel(out: &str) -> Result<GpuReading> {
    let object =
        first_object(out).ok_or_else(|| Error::parse("intel_gpu_top output", "no sample"))?;
    let sample: Value = serde_json::from_str(object)
        .map_err(|e| Error::parse("intel_gpu_top output", e.to_string()))?;
    let busy: Vec<f64> = match sample.get("engines") {
        Some(Value::Object(engines)) => engines
            .values()
            .filter_map(|e| e.get("busy").and_then(json_number))
            .collect(),
        Some(Value::Array(engines)) => engines
            .iter()
            .filter_map(|e| e.get("busy").and_then(json_number))
            .collect(),
        _ => Vec::new(),
    };
    if busy.is_empty() {
        return Err(Error::parse("intel_gpu_top output", "no engines"));
    }
    let mean = busy.iter().sum::<f64>() / busy.len() as f64;
    Ok(GpuReading {
        utilization: Some(mean.clamp(0.0, 100.0)),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{fake_root, put_script};

    #[test]
    fn test_vendor_ids() {
        assert_eq!(GpuVendor::from_pci_id("0x10de\n"), GpuVendor::Nvidia);
        assert_eq!(GpuVendor::from_pci_id("0x1002"), GpuVendor::Amd);
        assert_eq!(GpuVendor::from_pci_id("0x8086"), GpuVendor::Intel);
        assert_eq!(GpuVendor::from_pci_id("0x1af4"), GpuVendor::Unknown);
    }

    #[test]
    fn test_markers() {
        assert_eq!(GpuBackend::Nvidia.marker(), 'D');
        assert_eq!(GpuBackend::AmdRadeontop.marker(), 'D');
        assert_eq!(GpuBackend::Intel.marker(), 'I');
        assert_eq!(GpuBackend::None.marker(), '-');
    }

    #[test]
    fn test_capability_table() {
        assert!(GpuBackend::Nvidia.capabilities().power);
        assert!(!GpuBackend::Intel.capabilities().power);
        assert!(!GpuBackend::None.capabilities().utilization);
        assert!(GpuBackend::AmdRocm.capabilities().temperature);
        assert!(!GpuBackend::None.capabilities().any());
        assert!(GpuBackend::AmdRadeontop.capabilities().any());
    }

    #[test]
    fn test_restrict_keeps_reported_fields() {
        let full = GpuReading {
            utilization: Some(30.0),
            temperature: Some(60.0),
            power_watts: Some(15.0),
        };
        assert_eq!(GpuBackend::Nvidia.capabilities().restrict(full), full);
        assert_eq!(
            GpuBackend::AmdRadeontop.capabilities().restrict(full),
            GpuReading {
                utilization: Some(30.0),
                ..Default::default()
            }
        );
        assert_eq!(
            GpuBackend::None.capabilities().restrict(full),
            GpuReading::default()
        );
    }

    #[test]
    fn test_parse_nvidia() {
        let r = parse_nvidia("37, 61, 42.15\n").unwrap();
        assert_eq!(r.utilization, Some(37.0));
        assert_eq!(r.temperature, Some(61.0));
        assert_eq!(r.power_watts, Some(42.15));

        let r = parse_nvidia("5, 40, [N/A]\n").unwrap();
        assert_eq!(r.power_watts, None);

        assert!(parse_nvidia("").is_err());
        assert!(parse_nvidia("garbage").is_err());
    }

    #[test]
    fn test_parse_rocm() {
        let out = r#"{"card0": {"Temperature (Sensor junction) (C)": "58.0",
            "Temperature (Sensor edge) (C)": "51.0",
            "Average Graphics Package Power (W)": "23.0",
            "GPU use (%)": "17"}}"#;
        let r = parse_rocm(out).unwrap();
        assert_eq!(r.utilization, Some(17.0));
        assert_eq!(r.temperature, Some(51.0));
        assert_eq!(r.power_watts, Some(23.0));
        assert!(parse_rocm("not json").is_err());
        assert!(parse_rocm("{}").is_err());
    }

    #[test]
    fn test_parse_radeontop() {
        let out = "Dumping to -, line limit 1.\n1700000000.123456: bus 03, gpu 12.50%, ee 0.00%, vgt 3.33%\n";
        assert_eq!(parse_radeontop(out).unwrap().utilization, Some(12.5));
        assert!(parse_radeontop("Dumping to -, line limit 1.\n").is_err());
    }

    #[test]
    fn test_parse_intel_object_engines() {
        let out = r#"[
{
    "period": {"duration": 100.0, "unit": "ms"},
    "engines": {
        "Render/3D": {"busy": 30.0, "sema": 0.0, "wait": 0.0, "unit": "%"},
        "Video": {"busy": 10.0, "sema": 0.0, "wait": 0.0, "unit": "%"}
    }
},
{
    "engines": {"Render/3D": {"busy": 99.0"#;
        let r = parse_intel(out).unwrap();
        assert_eq!(r.utilization, Some(20.0));
    }

    #[test]
    fn test_parse_intel_array_engines() {
        let out = r#"{"engines": [{"name": "rcs0 \"}\"", "busy": 50}, {"busy": 0}]}"#;
        assert_eq!(parse_intel(out).unwrap().utilization, Some(25.0));
        assert!(parse_intel("[\n{\"engines\": {").is_err());
    }

    #[tokio::test]
    async fn test_query_runs_tool() {
        let dir = fake_root("gpu_query");
        put_script(&dir, "nvidia-smi", "echo '88, 70, 120.5'");
        let tools = Tools::with_dirs(vec![dir], Duration::from_millis(2000));
        let r = GpuBackend::Nvidia.query(&tools).await.unwrap();
        assert_eq!(r.utilization, Some(88.0));
        assert_eq!(r.power_watts, Some(120.5));
        assert!(GpuBackend::None.query(&tools).await.is_err());
    }

    #[tokio::test]
    async fn test_radeontop_allowed_its_dump_interval() {
        let dir = fake_root("gpu_radeontop");
        put_script(
            &dir,
            "radeontop",
            "sleep 1; echo '1700000000.5: bus 03, gpu 45.00%, ee 0.00%'",
        );
        let tools = Tools::with_dirs(vec![dir], Duration::from_millis(800));
        let r = GpuBackend::AmdRadeontop.query(&tools).await.unwrap();
        assert_eq!(r.utilization, Some(45.0));
        assert_eq!(r.temperature, None);
    }
}
