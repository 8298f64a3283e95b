//! Best-effort per-thread user/system CPU time sampling for the `cpu` stat.

/// Returns `(user_seconds, system_seconds)` accumulated so far for the
/// calling thread (Linux) or the calling process (other Unix). Always
/// `(0.0, 0.0)` where no such accounting is available.
#[cfg(target_os = "linux")]
pub fn sample() -> (f64, f64) {
    getrusage(libc::RUSAGE_THREAD)
}

#[cfg(all(unix, not(target_os = "linux")))]
pub fn sample() -> (f64, f64) {
    getrusage(libc::RUSAGE_SELF)
}

#[cfg(unix)]
fn getrusage(who: libc::c_int) -> (f64, f64) {
    use std::mem::MaybeUninit;
    unsafe {
        let mut usage = MaybeUninit::<libc::rusage>::uninit();
        if libc::getrusage(who, usage.as_mut_ptr()) == 0 {
            let usage = usage.assume_init();
            let user = usage.ru_utime.tv_sec as f64 + usage.ru_utime.tv_usec as f64 / 1_000_000.0;
            let sys = usage.ru_stime.tv_sec as f64 + usage.ru_stime.tv_usec as f64 / 1_000_000.0;
            (user, sys)
        } else {
            (0.0, 0.0)
        }
    }
}

#[cfg(not(unix))]
pub fn sample() -> (f64, f64) {
    (0.0, 0.0)
}
