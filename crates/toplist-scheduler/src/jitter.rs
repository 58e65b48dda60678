//! Random start delay for scheduled ticks.

use std::time::Duration;

use rand::Rng;

/// Upper bound of the random delay applied before a tick runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterConfig {
    /// Maximum jitter in seconds (0 = no jitter).
    pub max_jitter_secs: u64,
}

impl JitterConfig {
    pub fn new(max_jitter_secs: u64) -> Self {
        Self { max_jitter_secs }
    }

    /// A delay in `[0, max_jitter_secs)`, or zero when disabled.
    pub fn generate_jitter(&self) -> Duration {
        if self.max_jitter_secs == 0 {
            return Duration::ZERO;
        }
        let jitter_ms = rand::thread_rng().gen_range(0..self.max_jitter_secs * 1000);
        Duration::from_millis(jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_jitter() {
        assert_eq!(JitterConfig::default().generate_jitter(), Duration::ZERO);
    }

    #[test]
    fn test_jitter_within_bounds() {
        let config = JitterConfig::new(2);
        for _ in 0..50 {
            assert!(config.generate_jitter() < Duration::from_secs(2));
        }
    }
}
