//! Threshold-gated parallel loops.
//!
//! Collections longer than the threshold run on a capped rayon pool, shorter
//! ones inline. Results keep input order, so both paths are interchangeable.

use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};

pub const DEFAULT_FANOUT_THRESHOLD: usize = 256;
pub const DEFAULT_MAX_WORKERS: usize = 512;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FanoutConfig {
    /// Collections with more than this many elements go parallel.
    pub threshold: usize,
    /// Upper bound on worker threads; the pool never exceeds the CPU count.
    pub max_workers: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FANOUT_THRESHOLD,
            max_workers: DEFAULT_MAX_WORKERS,
        }
    }
}

impl FanoutConfig {
    /// Runs everything inline.
    pub fn sequential() -> Self {
        Self {
            threshold: usize::MAX,
            max_workers: 1,
        }
    }

    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        cpus.min(self.max_workers).max(1)
    }
}

pub struct Fanout {
    config: FanoutConfig,
    pool: Option<ThreadPool>,
}

impl Default for Fanout {
    fn default() -> Self {
        Self::new(FanoutConfig::default())
    }
}

impl Fanout {
    /// Builds the worker pool. A pool that cannot be created degrades to
    /// inline execution.
    pub fn new(config: FanoutConfig) -> Self {
        if config.threshold == usize::MAX {
            return Self { config, pool: None };
        }
        let workers = config.worker_count();
        let pool = match ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|idx| format!("posd-fanout-{idx}"))
            .build()
        {
            Ok(pool) => Some(pool),
            Err(err) => {
                posd_log::log_warn!("fan-out pool unavailable, running inline: {err}");
                None
            }
        };
        Self { config, pool }
    }

    pub fn config(&self) -> FanoutConfig {
        self.config
    }

    pub fn is_parallel(&self, len: usize) -> bool {
        self.pool.is_some() && len > self.config.threshold
    }

    /// Maps every element with its index, preserving order.
    pub fn map_indexed<T, R, F>(&self, items: &[T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(usize, &T) -> R + Sync + Send,
    {
        match self.pool.as_ref().filter(|_| items.len() > self.config.threshold) {
            Some(pool) => pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .map(|(idx, item)| f(idx, item))
                    .collect()
            }),
            None => items
                .iter()
                .enumerate()
                .map(|(idx, item)| f(idx, item))
                .collect(),
        }
    }

    pub fn for_each_indexed<T, F>(&self, items: &[T], f: F)
    where
        T: Sync,
        F: Fn(usize, &T) + Sync + Send,
    {
        match self.pool.as_ref().filter(|_| items.len() > self.config.threshold) {
            Some(pool) => pool.install(|| {
                items
                    .par_iter()
                    .enumerate()
                    .for_each(|(idx, item)| f(idx, item))
            }),
            None => items.iter().enumerate().for_each(|(idx, item)| f(idx, item)),
        }
    }

    /// True when `f` holds for every element. Short-circuits either way.
    pub fn all<T, F>(&self, items: &[T], f: F) -> bool
    where
        T: Sync,
        F: Fn(&T) -> bool + Sync + Send,
    {
        match self.pool.as_ref().filter(|_| items.len() > self.config.threshold) {
            Some(pool) => pool.install(|| items.par_iter().all(|item| f(item))),
            None => items.iter().all(f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn worker_count_is_capped() {
        let config = FanoutConfig {
            threshold: 0,
            max_workers: 1,
        };
        assert_eq!(config.worker_count(), 1);
        assert!(FanoutConfig::default().worker_count() <= DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn parallel_and_inline_maps_agree() {
        let items: Vec<u64> = (0..2_000).collect();
        let parallel = Fanout::new(FanoutConfig {
            threshold: 0,
            max_workers: 4,
        });
        let inline = Fanout::new(FanoutConfig::sequential());
        assert!(parallel.is_parallel(items.len()) || parallel.pool.is_none());
        assert!(!inline.is_parallel(items.len()));

        let square = |idx: usize, v: &u64| (idx as u64) * v;
        assert_eq!(
            parallel.map_indexed(&items, square),
            inline.map_indexed(&items, square)
        );
        assert_eq!(
            parallel.all(&items, |v| *v < 2_000),
            inline.all(&items, |v| *v < 2_000)
        );
    }

    #[test]
    fn for_each_visits_every_element_once() {
        let fanout = Fanout::new(FanoutConfig {
            threshold: 8,
            max_workers: 4,
        });
        let hits = AtomicUsize::new(0);
        let items = vec![1usize; 100];
        fanout.for_each_indexed(&items, |_, v| {
            hits.fetch_add(*v, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 100);
    }
}
