//! Assembly of metric tokens into the display line.

use crate::format::{
    memory_token, percent_token, placeholder, rate_token, temp_token, watts_token, SMALL_FIELD,
};
use crate::probe::{RaplStatus, SourceAvailability};
use crate::sensors::PowerSupply;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// One rendered line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayLine(String);

impl DisplayLine {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Width in characters.
    pub fn width(&self) -> usize {
        self.0.chars().count()
    }
}

impl fmt::Display for DisplayLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Display-ready values for one tick. `None` renders as a placeholder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    pub cpu_usage: Option<f64>,
    pub cpu_temp: Option<f64>,
    pub mem_used_gib: Option<f64>,
    pub mem_total_gib: Option<f64>,
    pub gpu_util: Option<f64>,
    pub gpu_temp: Option<f64>,
    pub gpu_watts: Option<f64>,
    pub disk_read: Option<f64>,
    pub disk_write: Option<f64>,
    pub net_down: Option<f64>,
    pub net_up: Option<f64>,
    pub cpu_watts: Option<f64>,
    pub supply: PowerSupply,
}

/// Section spacing and which optional fields are shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub wide: bool,
    pub cpu_temp: bool,
    pub gpu_temp: bool,
}

impl Layout {
    /// Tried in order; temperatures are the last thing to go.
    pub const LADDER: [Layout; 5] = [
        Layout {
            wide: true,
            cpu_temp: true,
            gpu_temp: true,
        },
        Layout {
            wide: false,
            cpu_temp: true,
            gpu_temp: true,
        },
        Layout {
            wide: false,
            cpu_temp: true,
            gpu_temp: false,
        },
        Layout {
            wide: false,
            cpu_temp: false,
            gpu_temp: true,
        },
        Layout {
            wide: false,
            cpu_temp: false,
            gpu_temp: false,
        },
    ];

    fn separator(self) -> &'static str {
        if self.wide {
            "     "
        } else {
            "  "
        }
    }
}

/// Renders readings into a line whose width depends only on the
/// availability and layout, never on the values.
#[derive(Debug, Clone)]
pub struct LineFormatter {
    availability: Arc<SourceAvailability>,
    layout: Layout,
    rate_width: usize,
}

impl LineFormatter {
    /// Picks the first layout on the ladder whose line fits `max_len`.
    pub fn new(availability: Arc<SourceAvailability>, rate_width: usize, max_len: usize) -> Self {
        let mut formatter = Self::with_layout(availability, rate_width, Layout::LADDER[0]);
        for layout in Layout::LADDER {
            formatter.layout = layout;
            if formatter.width() <= max_len {
                info!("Using layout {:?} ({} columns)", layout, formatter.width());
                return formatter;
            }
        }
        warn!(
            "Line needs {} columns even fully compacted, limit is {}",
            formatter.width(),
            max_len
        );
        formatter
    }

    pub fn with_layout(
        availability: Arc<SourceAvailability>,
        rate_width: usize,
        layout: Layout,
    ) -> Self {
        Self {
            availability,
            layout,
            rate_width,
        }
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Width of every line this formatter produces.
    pub fn width(&self) -> usize {
        self.render(&Readings::default()).width()
    }

    fn cpu(&self, r: &Readings) -> String {
        let mut token = format!("CPU {}", percent_token(r.cpu_usage));
        if self.layout.cpu_temp {
            token.push('/');
            token.push_str(&temp_token(r.cpu_temp));
        }
        token
    }

    fn memory(&self, r: &Readings) -> String {
        format!("RAM {}", memory_token(r.mem_used_gib, r.mem_total_gib))
    }

    fn gpu(&self, r: &Readings) -> String {
        let mut token = format!(
            "GPU[{}] {}",
            self.availability.gpu_backend.marker(),
            percent_token(r.gpu_util)
        );
        if self.layout.gpu_temp {
            token.push('/');
            token.push_str(&temp_token(r.gpu_temp));
        }
        token
    }

    fn disk(&self, r: &Readings) -> String {
        format!(
            "DISK R:{} W:{}",
            rate_token(r.disk_read, self.rate_width),
            rate_token(r.disk_write, self.rate_width)
        )
    }

    fn network(&self, r: &Readings) -> String {
        format!(
            "NET D:{} U:{}",
            rate_token(r.net_down, self.rate_width),
            rate_token(r.net_up, self.rate_width)
        )
    }

    fn power(&self, r: &Readings) -> String {
        let source = match r.supply {
            PowerSupply::External => "AC",
            PowerSupply::Battery => "BAT",
        };
        let cpu = match self.availability.rapl {
            RaplStatus::Available { .. } => watts_token(r.cpu_watts),
            RaplStatus::PermissionDenied { .. } => "DENY".to_string(),
            RaplStatus::Missing => placeholder(SMALL_FIELD),
        };
        let mut token = format!("{:<3} CPU {}", source, cpu);
        if self.availability.has_gpu_power() {
            token.push_str(" GPU ");
            token.push_str(&watts_token(r.gpu_watts));
        }
        token
    }

    /// Renders one line in fixed section order.
    pub fn render(&self, r: &Readings) -> DisplayLine {
        let sections = [
            self.cpu(r),
            self.memory(r),
            self.gpu(r),
            self.disk(r),
            self.network(r),
            self.power(r),
        ];
        DisplayLine(sections.join(self.layout.separator()))
    }
}
