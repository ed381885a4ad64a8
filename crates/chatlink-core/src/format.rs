//! Human-readable sizes and durations for status text.

const SUFFIXES: [&str; 4] = ["B", "KB", "MB", "GB"];

/// Throughput assumed when estimating how long an upload will take.
pub const ASSUMED_UPLOAD_RATE: u64 = 10 * 1024 * 1024;

/// Format a byte count with one decimal place, e.g. `"1.5 MB"`.
///
/// Steps up a unit as soon as the value rounds (half to even) to at least one
/// of the next unit, so 700 bytes reads as `"0.7 KB"` while 512 stays
/// `"512.0 B"`. Never goes past GB.
pub fn format_file_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut idx = 0;
    while idx < SUFFIXES.len() - 1 && (value / 1024.0).round_ties_even() >= 1.0 {
        value /= 1024.0;
        idx += 1;
    }
    format!("{:.1} {}", value, SUFFIXES[idx])
}

/// Rough upload duration at [`ASSUMED_UPLOAD_RATE`], in seconds below a
/// minute and in minutes above.
pub fn format_upload_estimate(bytes: u64) -> String {
    let secs = bytes as f64 / ASSUMED_UPLOAD_RATE as f64;
    if secs > 60.0 {
        format!("{:.1} min", secs / 60.0)
    } else {
        format!("{:.1} s", secs)
    }
}
