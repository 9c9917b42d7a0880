//! The periodic refresh loop.

use crate::error::Result;
use crate::line::DisplayLine;
use crate::monitor::Monitor;
use crate::throttle::ErrorThrottle;
use std::future::Future;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Destination for rendered lines: stdout, a tray label, a test buffer.
pub trait DisplaySink {
    fn publish(&mut self, line: &DisplayLine) -> Result<()>;
}

impl DisplaySink for Vec<DisplayLine> {
    fn publish(&mut self, line: &DisplayLine) -> Result<()> {
        self.push(line.clone());
        Ok(())
    }
}

/// Ticks `monitor` every `interval` and publishes each line to `sink` until
/// `shutdown` resolves.
///
/// A tick is never cancelled halfway; shutdown is only observed between ticks.
/// Ticks that overrun the interval delay the next one rather than bunching up.
pub async fn run<S, F>(monitor: &mut Monitor, sink: &mut S, interval: Duration, shutdown: F)
where
    S: DisplaySink + ?Sized,
    F: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut throttle = ErrorThrottle::default();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Refresh loop stopping");
                return;
            }
            _ = ticker.tick() => {}
        }

        let line = monitor.tick().await;
        match sink.publish(&line) {
            Ok(()) => throttle.success("sink"),
            Err(e) => {
                throttle.failure("sink", &e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Tools;
    use crate::config::Config;
    use crate::error::Error;
    use crate::host::testing::{fake_root, put};
    use crate::host::Host;
    use crate::probe::SourceAvailability;
    use std::sync::Arc;

    async fn monitor(name: &str) -> Monitor {
        let root = fake_root(name);
        put(&root, "/proc/stat", "cpu  100 0 100 700 100 0 0 0 0 0\n");
        put(&root, "/proc/meminfo", "MemTotal: 8388608 kB\nMemAvailable: 4194304 kB\n");
        let host = Host::new(&root, Duration::from_millis(200));
        let tools = Tools::with_dirs(vec![], Duration::from_millis(200));
        Monitor::new(
            &Config::default(),
            host,
            tools,
            Arc::new(SourceAvailability::none()),
        )
        .await
    }

    #[tokio::test]
    async fn test_publishes_until_shutdown() {
        let mut m = monitor("refresh_loop").await;
        let mut lines: Vec<DisplayLine> = Vec::new();
        run(
            &mut m,
            &mut lines,
            Duration::from_millis(20),
            tokio::time::sleep(Duration::from_millis(150)),
        )
        .await;

        assert!(lines.len() >= 2, "only {} lines", lines.len());
        let width = lines[0].width();
        assert!(lines.iter().all(|l| l.width() == width));
        assert!(lines[0].as_str().contains("DISK R:     N/A"));
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let mut m = monitor("refresh_shutdown").await;
        let mut lines: Vec<DisplayLine> = Vec::new();
        run(&mut m, &mut lines, Duration::from_secs(3600), async {}).await;
        assert!(lines.is_empty());
    }

    struct Broken(usize);

    impl DisplaySink for Broken {
        fn publish(&mut self, _line: &DisplayLine) -> Result<()> {
            self.0 += 1;
            Err(Error::unavailable("stdout", "closed"))
        }
    }

    #[tokio::test]
    async fn test_sink_errors_do_not_stop_loop() {
        let mut m = monitor("refresh_broken").await;
        let mut sink = Broken(0);
        run(
            &mut m,
            &mut sink,
            Duration::from_millis(20),
            tokio::time::sleep(Duration::from_millis(120)),
        )
        .await;
        assert!(sink.0 >= 2);
    }
}
