//! I/O provider traits
//!
//! TigerStyle: Non-deterministic inputs go through abstraction traits.
//!
//! The workload manager needs two sources of non-determinism: wall-clock
//! time (handshake stamps, deploy times, uptime) and randomness (the
//! uniform pick from the pending pool). Both are injected so tests can pin
//! them down.

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

// ============================================================================
// Time Provider
// ============================================================================

/// Time provider abstraction
///
/// All code that needs current time or sleep MUST use this trait rather
/// than reading the system clock directly.
#[async_trait]
pub trait TimeProvider: Send + Sync + std::fmt::Debug {
    /// Get current time in milliseconds since epoch
    fn now_ms(&self) -> u64;

    /// Sleep for the specified duration
    async fn sleep_ms(&self, ms: u64);

    /// Current UTC time formatted as RFC3339
    fn now_rfc3339(&self) -> String {
        let secs = (self.now_ms() / 1000) as i64;
        let nanos = ((self.now_ms() % 1000) * 1_000_000) as u32;
        chrono::DateTime::from_timestamp(secs, nanos)
            .unwrap_or_default()
            .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
    }
}

/// Production time provider using the wall clock
#[derive(Debug, Clone, Default)]
pub struct WallClockTime;

impl WallClockTime {
    /// Create a new wall clock time provider
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl TimeProvider for WallClockTime {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }

    async fn sleep_ms(&self, ms: u64) {
        tokio::time::sleep(tokio::time::Duration::from_millis(ms)).await;
    }
}

// ============================================================================
// RNG Provider
// ============================================================================

/// Random number generator abstraction
///
/// Not cryptographically secure. Used for the uniform-random pick from the
/// pending agent pool, where Rust's per-instance-fixed HashMap iteration
/// order would otherwise bias selection.
pub trait RngProvider: Send + Sync + std::fmt::Debug {
    /// Generate a random u64
    fn next_u64(&self) -> u64;

    /// Generate a random index in `[0, len)`
    fn gen_index(&self, len: usize) -> usize {
        assert!(len > 0, "len must be greater than 0");
        (self.next_u64() % len as u64) as usize
    }
}

/// Thread-safe xorshift64* RNG
#[derive(Debug)]
pub struct XorShiftRng {
    state: AtomicU64,
}

impl Default for XorShiftRng {
    fn default() -> Self {
        Self::new()
    }
}

impl XorShiftRng {
    /// Create a new RNG seeded from the system clock
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0)
            | 1;

        Self {
            state: AtomicU64::new(seed),
        }
    }

    /// Create with a specific seed (for testing)
    pub fn with_seed(seed: u64) -> Self {
        Self {
            state: AtomicU64::new(seed | 1),
        }
    }
}

impl RngProvider for XorShiftRng {
    fn next_u64(&self) -> u64 {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            let mut x = state;
            x ^= x >> 12;
            x ^= x << 25;
            x ^= x >> 27;

            match self
                .state
                .compare_exchange_weak(state, x, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => return x.wrapping_mul(0x2545F4914F6CDD1D),
                Err(s) => state = s,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_advances() {
        let time = WallClockTime::new();
        assert!(time.now_ms() > 0);
    }

    #[test]
    fn test_rfc3339_format() {
        let time = WallClockTime::new();
        let stamp = time.now_rfc3339();
        assert!(stamp.ends_with('Z'));
        assert!(stamp.contains('T'));
    }

    #[test]
    fn test_rng_seeded_is_deterministic() {
        let a = XorShiftRng::with_seed(42);
        let b = XorShiftRng::with_seed(42);
        assert_eq!(a.next_u64(), b.next_u64());
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_gen_index_in_bounds() {
        let rng = XorShiftRng::with_seed(7);
        for _ in 0..1000 {
            assert!(rng.gen_index(5) < 5);
        }
    }

    #[test]
    #[should_panic(expected = "len must be greater than 0")]
    fn test_gen_index_zero_len_panics() {
        XorShiftRng::with_seed(7).gen_index(0);
    }
}
