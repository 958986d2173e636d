//! Network time.
//!
//! Message timestamps are seconds since the network epoch, stored as `u32`.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CoreError, Result};

/// The network epoch (2021-01-01T00:00:00Z) in Unix milliseconds.
pub const NETWORK_EPOCH_MS: i64 = 1_609_459_200_000;

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Convert Unix milliseconds to network seconds.
pub fn to_network_time(unix_ms: i64) -> Result<u32> {
    let since_epoch = unix_ms - NETWORK_EPOCH_MS;
    if since_epoch < 0 {
        return Err(CoreError::TimestampOutOfRange(unix_ms));
    }
    u32::try_from(since_epoch / 1000).map_err(|_| CoreError::TimestampOutOfRange(unix_ms))
}

/// Convert network seconds back to Unix milliseconds.
pub fn from_network_time(network_secs: u32) -> i64 {
    NETWORK_EPOCH_MS + i64::from(network_secs) * 1000
}

/// Current network time in seconds.
pub fn network_now() -> Result<u32> {
    to_network_time(now_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_epoch_is_zero() {
        assert_eq!(to_network_time(NETWORK_EPOCH_MS).unwrap(), 0);
        assert_eq!(from_network_time(0), NETWORK_EPOCH_MS);
    }

    #[test]
    fn test_before_epoch_rejected() {
        assert!(to_network_time(NETWORK_EPOCH_MS - 1).is_err());
    }

    #[test]
    fn test_roundtrip_truncates_to_seconds() {
        let ms = NETWORK_EPOCH_MS + 12_345;
        assert_eq!(to_network_time(ms).unwrap(), 12);
        assert_eq!(from_network_time(12), NETWORK_EPOCH_MS + 12_000);
    }
}
