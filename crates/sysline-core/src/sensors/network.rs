//! Network throughput counters.

use crate::error::{Error, Result};
use crate::host::Host;

/// Cumulative bytes received and transmitted since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkCounters {
    pub rx_bytes: u64,
    pub tx_bytes: u64,
}

impl NetworkCounters {
    /// Sums the statistics of every interface except loopback.
    ///
    /// Interfaces can disappear between listing and reading; those are skipped.
    /// A vanished interface lowers the sum, which the rate engine treats as a
    /// counter reset.
    pub async fn read(host: &Host) -> Result<Self> {
        let net_dir = host.path("/sys/class/net");
        let mut counters = Self::default();
        let mut seen = 0;
        for interface in host.list_dir(&net_dir).await? {
            if interface == "lo" {
                continue;
            }
            let stats = net_dir.join(&interface).join("statistics");
            let rx = host.read_u64(&stats.join("rx_bytes")).await;
            let tx = host.read_u64(&stats.join("tx_bytes")).await;
            if let (Ok(rx), Ok(tx)) = (rx, tx) {
                counters.rx_bytes += rx;
                counters.tx_bytes += tx;
                seen += 1;
            }
        }
        if seen == 0 {
            return Err(Error::unavailable("/sys/class/net", "no interface statistics"));
        }
        Ok(counters)
    }
}
