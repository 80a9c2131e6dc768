//! Online CPU queries used to normalise CPU samples

use anyhow::{Context, Result};
use std::fs;

/// Parse a kernel CPU list such as `"0-3"` or `"0-3,8-11"` into CPU ids.
///
/// # Errors
/// Returns an error if a range bound is not a number.
pub fn parse_cpu_list(list: &str) -> Result<Vec<u32>> {
    let mut cpus = Vec::new();

    for range in list.trim().split(',').filter(|r| !r.is_empty()) {
        if let Some((start, end)) = range.split_once('-') {
            let start: u32 = start.parse()?;
            let end: u32 = end.parse()?;
            cpus.extend(start..=end);
        } else {
            cpus.push(range.parse()?);
        }
    }

    Ok(cpus)
}

/// Get list of online CPU IDs from /sys/devices/system/cpu/online
///
/// # Errors
/// Returns an error if the file is missing (non-Linux) or malformed.
pub fn online_cpus() -> Result<Vec<u32>> {
    let content = fs::read_to_string("/sys/devices/system/cpu/online")
        .context("Failed to read /sys/devices/system/cpu/online")?;
    parse_cpu_list(&content)
}

/// Number of CPUs CPU time is spread over; never zero.
#[must_use]
pub fn online_cpu_count() -> usize {
    online_cpus()
        .ok()
        .map(|cpus| cpus.len())
        .filter(|&n| n > 0)
        .or_else(|| std::thread::available_parallelism().ok().map(std::num::NonZeroUsize::get))
        .unwrap_or(1)
}
