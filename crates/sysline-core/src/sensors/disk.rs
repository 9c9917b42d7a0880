//! Disk I/O counters.

use crate::error::{Error, Result};
use crate::host::Host;

/// Cumulative sectors read and written since boot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskCounters {
    pub read_sectors: u64,
    pub write_sectors: u64,
}

impl DiskCounters {
    /// Sums `/proc/diskstats` over the named whole devices.
    ///
    /// Format: https://www.kernel.org/doc/Documentation/ABI/testing/procfs-diskstats
    /// Fields: major minor name reads_completed reads_merged sectors_read time_reading
    ///         writes_completed writes_merged sectors_written ...
    ///
    /// Partitions are skipped so their I/O is not counted twice.
    pub fn parse(diskstats: &str, devices: &[String]) -> Self {
        let mut counters = Self::default();
        for line in diskstats.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 10 || !devices.iter().any(|d| d == parts[2]) {
                continue;
            }
            if let (Ok(read), Ok(write)) = (parts[5].parse::<u64>(), parts[9].parse::<u64>()) {
                counters.read_sectors += read;
                counters.write_sectors += write;
            }
        }
        counters
    }

    /// Reads counters for every device listed under `/sys/block`.
    pub async fn read(host: &Host) -> Result<Self> {
        let devices = host.list_dir(&host.path("/sys/block")).await?;
        if devices.is_empty() {
            return Err(Error::unavailable("/sys/block", "no block devices"));
        }
        let content = host.read(&host.path("/proc/diskstats")).await?;
        Ok(Self::parse(&content, &devices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::testing::{fake_root, put};
    use std::time::Duration;

    const DISKSTATS: &str = "\
 259       0 nvme0n1 1000 0 2000 0 500 0 4000 0 0 0 0
 259       1 nvme0n1p1 900 0 1900 0 400 0 3900 0 0 0 0
   8       0 sda 10 0 20 0 5 0 40 0 0 0 0
   7       0 loop0 1 0 8 0 0 0 0 0 0 0 0
";

    #[test]
    fn test_sums_whole_devices_only() {
        let devices = vec!["nvme0n1".to_string(), "sda".to_string()];
        let c = DiskCounters::parse(DISKSTATS, &devices);
        assert_eq!(c.read_sectors, 2020);
        assert_eq!(c.write_sectors, 4040);
    }

    #[tokio::test]
    async fn test_read_from_host() {
        let root = fake_root("disk_read");
        put(&root, "/proc/diskstats", DISKSTATS);
        put(&root, "/sys/block/sda/size", "1000");
        put(&root, "/sys/block/loop0/size", "8");
        let host = Host::new(&root, Duration::from_millis(500));
        let c = DiskCounters::read(&host).await.unwrap();
        assert_eq!(c.read_sectors, 28);
        assert_eq!(c.write_sectors, 40);
    }

    #[tokio::test]
    async fn test_no_block_devices() {
        let root = fake_root("disk_none");
        put(&root, "/proc/diskstats", DISKSTATS);
        let host = Host::new(&root, Duration::from_millis(500));
        assert!(DiskCounters::read(&host).await.is_err());
    }
}
