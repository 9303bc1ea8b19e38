//! Bucket expiry values
//!
//! A store expiry is a single number whose meaning depends on its
//! magnitude: 0 never expires, values up to thirty days are seconds from
//! now, larger values are absolute Unix timestamps.

use std::sync::Arc;

/// Largest expiry interpreted as relative seconds (30 days)
pub const RELATIVE_EXPIRY_LIMIT: u64 = 2_592_000;

/// Source of the current Unix time in seconds
pub type Clock = Arc<dyn Fn() -> u64 + Send + Sync>;

/// Wall clock backed by chrono
pub fn system_clock() -> Clock {
    Arc::new(unix_now)
}

pub fn unix_now() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or(0)
}

/// Decoded store expiry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Never,
    /// Seconds from now
    After(u64),
    /// Unix timestamp in seconds
    At(u64),
}

impl Expiry {
    pub fn from_store_value(value: u64) -> Self {
        match value {
            0 => Expiry::Never,
            v if v <= RELATIVE_EXPIRY_LIMIT => Expiry::After(v),
            v => Expiry::At(v),
        }
    }

    /// Absolute deadline given the current time
    pub fn deadline(self, now: u64) -> Option<u64> {
        match self {
            Expiry::Never => None,
            Expiry::After(seconds) => Some(now.saturating_add(seconds)),
            Expiry::At(timestamp) => Some(timestamp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_store_value() {
        assert_eq!(Expiry::from_store_value(0), Expiry::Never);
        assert_eq!(Expiry::from_store_value(1), Expiry::After(1));
        assert_eq!(
            Expiry::from_store_value(RELATIVE_EXPIRY_LIMIT),
            Expiry::After(RELATIVE_EXPIRY_LIMIT)
        );
        assert_eq!(
            Expiry::from_store_value(RELATIVE_EXPIRY_LIMIT + 1),
            Expiry::At(RELATIVE_EXPIRY_LIMIT + 1)
        );
    }

    #[test]
    fn test_deadline() {
        assert_eq!(Expiry::Never.deadline(100), None);
        assert_eq!(Expiry::After(60).deadline(100), Some(160));
        assert_eq!(Expiry::At(5_000_000).deadline(100), Some(5_000_000));
        assert_eq!(Expiry::After(10).deadline(u64::MAX), Some(u64::MAX));
    }

    #[test]
    fn test_system_clock_is_past_2020() {
        assert!(system_clock()() > 1_577_836_800);
    }
}
