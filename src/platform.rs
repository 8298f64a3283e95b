//! Low-level, OS-specific timestamp primitives underlying the time sources
//! in [`crate::time_source`]. Kept separate the way the platform-specific
//! clock access this crate's ancestry used lives in its own module.

use std::sync::OnceLock;
use std::time::Instant as StdInstant;

/// gettimeofday-equivalent: seconds since the Unix epoch.
#[inline]
pub fn gettimeofday_now() -> f64 {
    use time::{Duration as TimeDuration, OffsetDateTime};
    let delta: TimeDuration = OffsetDateTime::now_utc() - OffsetDateTime::unix_epoch();
    delta.whole_nanoseconds() as f64 / 1_000_000_000.0
}

static MONOTONIC_EPOCH: OnceLock<StdInstant> = OnceLock::new();

/// clock_gettime(CLOCK_MONOTONIC)-equivalent, built on `std::time::Instant`.
#[inline]
pub fn clock_gettime_now() -> f64 {
    let epoch = MONOTONIC_EPOCH.get_or_init(StdInstant::now);
    epoch.elapsed().as_secs_f64()
}

#[cfg(target_os = "windows")]
mod qpc {
    use std::mem;
    use winapi::um::profileapi::{QueryPerformanceCounter, QueryPerformanceFrequency};
    use winapi::um::winnt::LARGE_INTEGER;

    // https://docs.microsoft.com/en-us/windows/win32/sysinfo/acquiring-high-resolution-time-stamps
    pub fn counter() -> i64 {
        unsafe {
            let mut count: LARGE_INTEGER = mem::zeroed();
            QueryPerformanceCounter(&mut count);
            mem::transmute(count)
        }
    }

    pub fn frequency() -> i64 {
        unsafe {
            let mut freq: LARGE_INTEGER = mem::zeroed();
            QueryPerformanceFrequency(&mut freq);
            mem::transmute(freq)
        }
    }
}

#[cfg(target_os = "windows")]
pub fn tsc_init() -> Option<f64> {
    let freq = qpc::frequency();
    if freq > 0 {
        Some(freq as f64)
    } else {
        None
    }
}

/// Raw QPC tick count. Divided by the frequency from [`tsc_init`] in
/// `TimeSourceState::now`.
#[cfg(target_os = "windows")]
#[inline]
pub fn tsc_now_ticks() -> f64 {
    qpc::counter() as f64
}

#[cfg(all(not(target_os = "windows"), target_arch = "x86_64"))]
pub fn tsc_init() -> Option<f64> {
    read_cpuinfo_max_freq_hz().or_else(read_proc_cpuinfo_mhz_hz)
}

#[cfg(all(not(target_os = "windows"), target_arch = "x86_64"))]
#[inline]
pub fn tsc_now_ticks() -> f64 {
    unsafe { core::arch::x86_64::_rdtsc() as f64 }
}

#[cfg(all(not(target_os = "windows"), target_arch = "x86_64"))]
fn read_cpuinfo_max_freq_hz() -> Option<f64> {
    let text = std::fs::read_to_string("/sys/devices/system/cpu/cpu0/cpufreq/cpuinfo_max_freq").ok()?;
    let khz: f64 = text.trim().parse().ok()?;
    if khz > 0.0 {
        Some(khz * 1_000.0)
    } else {
        None
    }
}

#[cfg(all(not(target_os = "windows"), target_arch = "x86_64"))]
fn read_proc_cpuinfo_mhz_hz() -> Option<f64> {
    let text = std::fs::read_to_string("/proc/cpuinfo").ok()?;
    for line in text.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "cpu MHz" {
                if let Ok(mhz) = value.trim().parse::<f64>() {
                    if mhz > 0.0 {
                        return Some(mhz * 1_000_000.0);
                    }
                }
            }
        }
    }
    None
}

#[cfg(not(any(target_os = "windows", target_arch = "x86_64")))]
pub fn tsc_init() -> Option<f64> {
    None
}

#[cfg(not(any(target_os = "windows", target_arch = "x86_64")))]
pub fn tsc_now_ticks() -> f64 {
    unreachable!("tsc_init() always fails on this target, so tsc_now_ticks is never called")
}
