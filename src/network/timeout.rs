use std::time::Duration;

use crate::service::TimeoutConfig;

/// Sentinel meaning "no response is expected; close after sending".
pub const IMMEDIATE_TIMEOUT: Duration = Duration::ZERO;

/// Deadline arithmetic for the connection engine.
///
/// One deadline guards each pending operation: the initial deadline covers
/// connecting (and a responder's first receive), the scaled deadline covers
/// a write, and the caller-supplied response timeout covers a receive.
/// Arming a deadline for the next operation replaces the previous one, and
/// completing an operation drops its deadline, so a deadline that lost the
/// race can never fire afterwards.
#[derive(Debug, Clone)]
pub(crate) struct TimeoutPolicy {
    initial: Duration,
    min: Duration,
    per_byte: Duration,
}

impl TimeoutPolicy {
    pub(crate) fn new(config: &TimeoutConfig) -> TimeoutPolicy {
        TimeoutPolicy {
            initial: Duration::from_millis(config.initial_ms),
            min: Duration::from_millis(config.min_ms),
            per_byte: Duration::from_micros(config.per_byte_us),
        }
    }

    /// Deadline for connecting and for a responder's first receive.
    pub(crate) fn initial(&self) -> Duration {
        self.initial
    }

    /// Write deadline: scales with the payload size, with a fixed floor.
    pub(crate) fn scaled(&self, payload_len: usize) -> Duration {
        self.per_byte
            .saturating_mul(payload_len.min(u32::MAX as usize) as u32)
            .max(self.min)
    }
}

pub(crate) fn is_immediate(timeout: Duration) -> bool {
    timeout == IMMEDIATE_TIMEOUT
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> TimeoutPolicy {
        TimeoutPolicy::new(&TimeoutConfig {
            initial_ms: 10_000,
            min_ms: 500,
            per_byte_us: 50,
        })
    }

    #[test]
    fn small_payloads_hit_the_floor() {
        // 4 bytes * 50us is far below the 500ms floor
        assert_eq!(policy().scaled(4), Duration::from_millis(500));
    }

    #[test]
    fn large_payloads_scale_per_byte() {
        // 1 MiB * 50us/byte > the floor
        let expected = Duration::from_micros(50) * (1024 * 1024);
        assert_eq!(policy().scaled(1024 * 1024), expected);
    }

    #[test]
    fn zero_duration_is_the_immediate_sentinel() {
        assert!(is_immediate(IMMEDIATE_TIMEOUT));
        assert!(!is_immediate(Duration::from_millis(1)));
    }
}
