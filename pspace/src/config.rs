//! Configuration for bulk parallel evaluation.
//!
//! Settings are read once from the environment, the first time they
//! are needed, and shared by the whole process.

use std::num::NonZeroUsize;
use std::sync::LazyLock;
use std::sync::OnceLock;

/// Overrides the number of worker threads used by
/// [`crate::Function::par_call`].
pub const NUM_THREADS_ENV: &str = "PSPACE_NUM_THREADS";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Number of threads in the shared evaluation pool.
    pub num_threads: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            num_threads: std::thread::available_parallelism()
                .map(NonZeroUsize::get)
                .unwrap_or(1),
        }
    }
}

impl Config {
    /// The default configuration, overridden by environment variables.
    pub fn from_env() -> Self {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(NUM_THREADS_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.num_threads = n,
                _ => tracing::warn!(value = %raw, "ignoring invalid {}", NUM_THREADS_ENV),
            }
        }
        self
    }

    /// Builds a dedicated thread pool sized by this configuration.
    pub fn build_thread_pool(&self) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("pspace-eval-{}", i))
            .build()
    }
}

/// The process-wide configuration.
pub fn global() -> &'static Config {
    static CONFIG: OnceLock<Config> = OnceLock::new();
    CONFIG.get_or_init(Config::from_env)
}

static THREAD_POOL: LazyLock<rayon::ThreadPool> = LazyLock::new(|| {
    let config = global();
    tracing::debug!(num_threads = config.num_threads, "creating evaluation pool");
    config
        .build_thread_pool()
        .expect("failed to create evaluation thread pool")
});

/// The shared pool used for bulk parallel evaluation.
pub fn thread_pool() -> &'static rayon::ThreadPool {
    &THREAD_POOL
}
