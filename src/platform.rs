use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// How long a processor-count sample stays valid before it is refreshed.
const REFRESH_INTERVAL: Duration = Duration::from_secs(30);

// The last sample and when it was taken, in milliseconds since the first call.
static PROCESSOR_COUNT: AtomicUsize = AtomicUsize::new(0);
static LAST_REFRESH_MS: AtomicU64 = AtomicU64::new(0);

fn monotonic_ms() -> u64 {
    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_millis() as u64
}

/// The number of concurrent writers to optimize for by default.
///
/// Querying the processor count is not free, so the last sample is cached
/// and refreshed at most every [`REFRESH_INTERVAL`]. Constructors read this
/// once; an already-built set never changes its stripe count because the
/// machine did.
pub(crate) fn default_concurrency_level() -> usize {
    let now = monotonic_ms();
    let cached = PROCESSOR_COUNT.load(Ordering::Relaxed);
    let last = LAST_REFRESH_MS.load(Ordering::Relaxed);

    if cached != 0 && now.saturating_sub(last) < REFRESH_INTERVAL.as_millis() as u64 {
        return cached;
    }

    let fresh = num_cpus::get().max(1);
    PROCESSOR_COUNT.store(fresh, Ordering::Relaxed);
    LAST_REFRESH_MS.store(now, Ordering::Relaxed);
    fresh
}
