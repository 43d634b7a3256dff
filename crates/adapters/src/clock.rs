//! System time sources.

use callmeter_ports::{Clock, CpuClock};
use std::sync::OnceLock;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall clock in milliseconds since the Unix epoch, 0 if the clock is before
/// the epoch.
pub(crate) fn epoch_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .and_then(|duration| i64::try_from(duration.as_millis()).ok())
        .unwrap_or_default()
}

fn process_anchor() -> Instant {
    static ANCHOR: OnceLock<Instant> = OnceLock::new();
    *ANCHOR.get_or_init(Instant::now)
}

/// `Clock` backed by `SystemTime` and a process-wide monotonic `Instant`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        epoch_millis()
    }

    fn precise_nanos(&self) -> i64 {
        i64::try_from(process_anchor().elapsed().as_nanos()).unwrap_or(i64::MAX)
    }
}

/// `CpuClock` reading the calling thread's CPU time.
///
/// Uses `CLOCK_THREAD_CPUTIME_ID` on Unix; reads 0 elsewhere or when the
/// clock call fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadCpuClock;

impl ThreadCpuClock {
    /// Whether this platform provides a per-thread CPU clock.
    #[must_use]
    pub const fn is_supported() -> bool {
        cfg!(unix)
    }
}

impl CpuClock for ThreadCpuClock {
    fn current_thread_cpu_nanos(&self) -> i64 {
        thread_cpu_nanos()
    }
}

#[cfg(unix)]
#[allow(
    unsafe_code,
    reason = "clock_gettime is the only way to read the per-thread CPU clock"
)]
fn thread_cpu_nanos() -> i64 {
    let mut ts = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    // SAFETY: `ts` is a valid, exclusively borrowed timespec for the duration
    // of the call, and CLOCK_THREAD_CPUTIME_ID has no other preconditions.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_THREAD_CPUTIME_ID, &raw mut ts) };
    if rc != 0 {
        return 0;
    }
    i64::from(ts.tv_sec)
        .saturating_mul(1_000_000_000)
        .saturating_add(i64::from(ts.tv_nsec))
}

#[cfg(not(unix))]
const fn thread_cpu_nanos() -> i64 {
    0
}

/// `CpuClock` for platforms or tests where CPU time is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroCpuClock;

impl CpuClock for ZeroCpuClock {
    fn current_thread_cpu_nanos(&self) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_is_monotonic_for_precise_reads() {
        let clock = SystemClock;
        let first = clock.precise_nanos();
        let second = clock.precise_nanos();
        assert!(second >= first);
        assert!(clock.now_millis() > 0);
    }

    #[test]
    fn thread_cpu_clock_advances_under_load() {
        let clock = ThreadCpuClock;
        let before = clock.current_thread_cpu_nanos();
        let mut acc = 0_u64;
        for value in 0..2_000_000_u64 {
            acc = acc.wrapping_add(value.wrapping_mul(31));
        }
        std::hint::black_box(acc);
        let after = clock.current_thread_cpu_nanos();

        if ThreadCpuClock::is_supported() {
            assert!(after >= before);
            assert!(after > 0);
        } else {
            assert_eq!((before, after), (0, 0));
        }
    }

    #[test]
    fn zero_clock_reads_zero() {
        assert_eq!(ZeroCpuClock.current_thread_cpu_nanos(), 0);
    }
}
