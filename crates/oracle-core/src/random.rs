//! Injectable source of uniform random draws.
//!
//! Both the decision policy and the catalog consume randomness through
//! [`RandomSource`], so tests can replace it with a [`ScriptedRandom`] and
//! count how many draws a request performed.

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

/// A source of uniform samples in `[0, 1)`.
pub trait RandomSource: Send + Sync {
    /// Draw one sample from the unit interval.
    fn next_unit(&self) -> f64;

    /// Draw a uniform index in `0..len`.  `len` must be non-zero.
    fn next_index(&self, len: usize) -> usize {
        let idx = (self.next_unit() * len as f64) as usize;
        idx.min(len.saturating_sub(1))
    }
}

/// Production source backed by the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::thread_rng().gen_range(0.0..1.0)
    }
}

/// Deterministic source that cycles through a fixed sequence of samples.
///
/// Counts every draw, which lets tests assert that a code path did or did
/// not consume randomness.
#[derive(Debug, Default)]
pub struct ScriptedRandom {
    values: Vec<f64>,
    cursor: AtomicUsize,
}

impl ScriptedRandom {
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self {
            values: values.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of samples drawn so far.
    pub fn draws(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl RandomSource for ScriptedRandom {
    fn next_unit(&self) -> f64 {
        let n = self.cursor.fetch_add(1, Ordering::SeqCst);
        if self.values.is_empty() {
            return 0.0;
        }
        self.values[n % self.values.len()]
    }
}
