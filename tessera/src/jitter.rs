//! Utilities for adding a bit of jitter to reduce stampeding

use std::time::Duration;

/// A type that provides some jittering of wait intervals
pub trait JitterSource: Send + Sync {
    /// Jitters a given wait interval
    fn jitter(&self, wait: Duration) -> Duration;
}

/// A jitter source that does not do any jittering
#[derive(Clone, Copy, Debug, Default)]
pub struct NullJitter;

impl JitterSource for NullJitter {
    #[inline]
    fn jitter(&self, wait: Duration) -> Duration {
        wait
    }
}

/// Jitters a wait symmetrically around its nominal value
///
/// Waits jittered by this type have a uniform distribution in the interval
/// `[wait * (1 - ratio), wait * (1 + ratio))`, so processes that collided on
/// one attempt are unlikely to collide again on the next.
#[derive(Clone, Copy, Debug)]
pub struct SymmetricJitter {
    ratio: f64,
}

impl Default for SymmetricJitter {
    /// Jitters by ±20 %
    fn default() -> Self {
        Self { ratio: 0.2 }
    }
}

impl SymmetricJitter {
    /// Constructs a jitter source spreading waits by `ratio` in either direction
    ///
    /// `ratio` is clamped to `[0, 1]`.
    pub fn new(ratio: f64) -> Self {
        Self {
            ratio: ratio.clamp(0.0, 1.0),
        }
    }
}

impl JitterSource for SymmetricJitter {
    fn jitter(&self, wait: Duration) -> Duration {
        if wait.is_zero() || self.ratio <= 0.0 {
            return wait;
        }

        let low = wait.mul_f64(1.0 - self.ratio);
        let high = wait.mul_f64(1.0 + self.ratio);
        if low >= high {
            return wait;
        }

        use rand::Rng;
        rand::thread_rng().gen_range(low..high)
    }
}
