//! Fixed-width value tokens.
//!
//! Every token has the same width whether it holds a value or a placeholder,
//! so the assembled line never shifts between ticks.

/// Text shown in place of a missing value.
pub const PLACEHOLDER: &str = "N/A";

/// Width of percent, temperature and watt fields ("100%", " 85C", " 35W").
pub const SMALL_FIELD: usize = 4;

/// Width of the unit part of a byte-rate token.
const UNIT_WIDTH: usize = 2;

const BYTE_UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Scales a byte count into the largest unit whose displayed numeral is in
/// `[1, 1024)`.
///
/// The unit is chosen after rounding to display precision, so 1023.96 KB
/// shows as `1.0MB` rather than `1024.0KB`. Values below 1 stay in bytes;
/// values beyond the gigabyte range stay in GB.
pub fn scale_bytes(bytes: f64) -> (f64, &'static str) {
    let mut value = if bytes.is_finite() { bytes.max(0.0) } else { 0.0 };
    let mut idx = 0;
    while idx < BYTE_UNITS.len() - 1 && displayed(value, BYTE_UNITS[idx]) >= 1024.0 {
        value /= 1024.0;
        idx += 1;
    }
    (value, BYTE_UNITS[idx])
}

fn numeral(value: f64, unit: &str) -> String {
    if unit == "B" {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value)
    }
}

/// The value as it reads once rounded by [`numeral`].
fn displayed(value: f64, unit: &str) -> f64 {
    numeral(value, unit).parse().unwrap_or(value)
}

/// Formats a byte rate as a numeral right-aligned in `width` followed by a
/// two-column unit. Total width is always `width + 2`.
pub fn rate_token(bytes_per_sec: Option<f64>, width: usize) -> String {
    let Some(rate) = bytes_per_sec else {
        return placeholder(width + UNIT_WIDTH);
    };
    let (value, unit) = scale_bytes(rate);
    let mut num = numeral(value, unit);
    if num.len() > width {
        // Only reachable past the GB range; pin to the widest numeral.
        num = format!("{:.1}", 10f64.powi(width as i32 - 2) - 0.1);
    }
    format!("{:>width$}{:<uw$}", num, unit, width = width, uw = UNIT_WIDTH)
}

/// A missing value, right-aligned to `width`.
pub fn placeholder(width: usize) -> String {
    format!("{:>width$}", PLACEHOLDER, width = width)
}

fn small_int(value: Option<f64>, min: f64, max: f64, suffix: char) -> String {
    match value.filter(|v| v.is_finite()) {
        Some(v) => format!("{:>3}{}", v.round().clamp(min, max) as i64, suffix),
        None => placeholder(SMALL_FIELD),
    }
}

/// `" 23%"`, clamped to 0..=100.
pub fn percent_token(value: Option<f64>) -> String {
    small_int(value, 0.0, 100.0, '%')
}

/// `" 54C"`, clamped to -99..=999.
pub fn temp_token(value: Option<f64>) -> String {
    small_int(value, -99.0, 999.0, 'C')
}

/// `" 35W"`, clamped to 0..=999.
pub fn watts_token(value: Option<f64>) -> String {
    small_int(value, 0.0, 999.0, 'W')
}

/// Width of the memory field.
pub const MEMORY_FIELD: usize = 10;

/// `" 12.3/ 31G"` used/total GiB.
pub fn memory_token(used_gib: Option<f64>, total_gib: Option<f64>) -> String {
    match (used_gib, total_gib) {
        (Some(used), Some(total)) if used.is_finite() && total.is_finite() => format!(
            "{:>5.1}/{:>3.0}G",
            used.clamp(0.0, 999.9),
            total.clamp(0.0, 999.0)
        ),
        _ => placeholder(MEMORY_FIELD),
    }
}
