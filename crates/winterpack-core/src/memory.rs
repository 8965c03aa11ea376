use tracing::debug;

pub const MIN_MEMORY_MB: u32 = 2048;
pub const MAX_MEMORY_MB: u32 = 16384;

const DETECTION_FAILED_MB: u64 = 8192;
const IMPLAUSIBLE_FALLBACK_MB: u64 = 16384;

/// Clamps a requested allocation into `[MIN_MEMORY_MB, MAX_MEMORY_MB]`.
pub fn clamp_memory_mb(mb: i64) -> u32 {
    mb.clamp(MIN_MEMORY_MB as i64, MAX_MEMORY_MB as i64) as u32
}

/// Half of the installed RAM, clamped.
pub fn auto_memory_mb(total_ram_mb: u64) -> u32 {
    clamp_memory_mb(i64::try_from(total_ram_mb / 2).unwrap_or(i64::MAX))
}

/// Total physical memory in MB, with fallbacks when detection fails or
/// reports something implausible.
pub fn total_ram_mb() -> u64 {
    match detect_total_ram_mb() {
        Some(total) => plausible_or_fallback(total),
        None => {
            debug!("memory detection failed, assuming {DETECTION_FAILED_MB} MB");
            DETECTION_FAILED_MB
        }
    }
}

fn plausible_or_fallback(total_mb: u64) -> u64 {
    if !(1024..=1024 * 1024).contains(&total_mb) {
        debug!(total_mb, "implausible memory size, using fallback");
        return IMPLAUSIBLE_FALLBACK_MB;
    }
    total_mb
}

#[cfg(target_os = "linux")]
fn detect_total_ram_mb() -> Option<u64> {
    let data = std::fs::read_to_string("/proc/meminfo").ok()?;
    parse_meminfo_total_mb(&data)
}

#[cfg(target_os = "macos")]
fn detect_total_ram_mb() -> Option<u64> {
    let output = std::process::Command::new("sysctl")
        .args(["-n", "hw.memsize"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let bytes: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
    Some(bytes / (1024 * 1024))
}

#[cfg(target_os = "windows")]
fn detect_total_ram_mb() -> Option<u64> {
    let output = std::process::Command::new("powershell")
        .args([
            "-NoProfile",
            "-Command",
            "(Get-CimInstance Win32_ComputerSystem).TotalPhysicalMemory",
        ])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let bytes: u64 = String::from_utf8_lossy(&output.stdout).trim().parse().ok()?;
    Some(bytes / (1024 * 1024))
}

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
fn detect_total_ram_mb() -> Option<u64> {
    None
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_meminfo_total_mb(data: &str) -> Option<u64> {
    data.lines()
        .find(|line| line.starts_with("MemTotal:"))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse::<u64>().ok())
        .map(|kb| kb / 1024)
}
