//! Time sources.

/// Wall and monotonic time.
pub trait Clock: Send + Sync {
    /// Wall clock in milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64;

    /// Monotonic high-resolution reading in nanoseconds.
    ///
    /// Only differences between two readings are meaningful.
    fn precise_nanos(&self) -> i64;
}

/// CPU time consumed by the calling thread.
pub trait CpuClock: Send + Sync {
    /// CPU nanoseconds used by the current thread, or 0 when the platform has
    /// no per-thread CPU clock.
    fn current_thread_cpu_nanos(&self) -> i64;
}
