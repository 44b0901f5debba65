//! Environment abstraction for deterministic testing.
//!
//! Decouples engine logic from system resources (time, randomness). The
//! simulation harness supplies a manually advanced clock and a seeded RNG;
//! production uses the system clock and OS entropy.

use std::time::Duration;

/// Abstract environment providing time, randomness, and async sleep.
///
/// Implementations MUST guarantee that `now()` never goes backwards.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type.
    ///
    /// Production uses `std::time::Instant`; simulation uses virtual time.
    type Instant: Copy + Ord + Send + Sync + std::fmt::Debug + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`. Only driver code awaits this.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes.
    ///
    /// Given the same seed, simulation implementations produce the same
    /// sequence.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Wall-clock time in Unix milliseconds (UTC).
    ///
    /// Used only to timestamp optimistic messages before the server assigns
    /// the authoritative `created_at`. Never used for timeouts.
    fn wall_clock_millis(&self) -> u64;

    /// Random `u64`.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}
