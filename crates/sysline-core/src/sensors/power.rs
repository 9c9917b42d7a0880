//! Energy counters and AC/battery status.

use crate::error::Result;
use crate::host::Host;
use std::path::Path;

/// Where the machine is drawing power from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PowerSupply {
    #[default]
    External,
    Battery,
}

impl PowerSupply {
    /// Any online mains/USB supply wins; otherwise a discharging battery means
    /// battery power. Desktops without a battery report external power.
    pub async fn read(host: &Host) -> Result<Self> {
        let supplies_dir = host.path("/sys/class/power_supply");
        let mut discharging = false;
        for supply in host.list_dir(&supplies_dir).await? {
            let dir = supplies_dir.join(&supply);
            let Ok(kind) = host.read(&dir.join("type")).await else {
                continue;
            };
            match kind.as_str() {
                "Mains" | "USB" => {
                    if host.read(&dir.join("online")).await.ok().as_deref() == Some("1") {
                        return Ok(PowerSupply::External);
                    }
                }
                "Battery" => {
                    if host.read(&dir.join("status")).await.ok().as_deref() == Some("Discharging") {
                        discharging = true;
                    }
                }
                _ => {}
            }
        }
        Ok(if discharging {
            PowerSupply::Battery
        } else {
            PowerSupply::External
        })
    }
}

/// Reads a cumulative energy counter in microjoules.
pub async fn read_energy(host: &Host, path: &Path) -> Result<u64> {
    host.read_u64(path).await
}
