// src/engine/pool.rs
//
// Global worker pool for batch fan-out.
//
// One lazily-built rayon pool shared by every batch run. Threads are reused
// across runs, and the count follows available_parallelism() so cgroup CPU
// quotas are respected. Changing the environment after the first batch has
// no effect; the pool is built exactly once.

use rayon::ThreadPool;
use std::sync::OnceLock;

/// Ceiling on worker threads. Past this point batches are disk and memory
/// bound, and more decode workers only add peak memory.
pub const MAX_POOL_THREADS: usize = 32;

const MIN_POOL_THREADS: usize = 1;

static GLOBAL_THREAD_POOL: OnceLock<ThreadPool> = OnceLock::new();

/// The shared batch pool, built on first use.
pub fn get_pool() -> &'static ThreadPool {
    GLOBAL_THREAD_POOL.get_or_init(|| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(default_thread_count())
            .thread_name(|i| format!("listing-image-{i}"))
            .build()
            .unwrap_or_else(|e| {
                // A single-thread build only fails when spawning threads is
                // impossible at all.
                rayon::ThreadPoolBuilder::new()
                    .num_threads(MIN_POOL_THREADS)
                    .build()
                    .unwrap_or_else(|fallback| {
                        panic!("worker pool build failed: {e}; single-thread fallback failed: {fallback}")
                    })
            })
    })
}

/// Worker count the pool uses: detected parallelism clamped to
/// [1, MAX_POOL_THREADS].
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(MIN_POOL_THREADS)
        .clamp(MIN_POOL_THREADS, MAX_POOL_THREADS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_count_is_within_bounds() {
        let n = default_thread_count();
        assert!(n >= MIN_POOL_THREADS);
        assert!(n <= MAX_POOL_THREADS);
    }

    #[test]
    fn pool_initializes_once_and_runs_work() {
        let pool = get_pool();
        let sum: u32 = pool.install(|| (0..100u32).sum());
        assert_eq!(sum, 4950);
        assert!(std::ptr::eq(pool, get_pool()));
    }
}
