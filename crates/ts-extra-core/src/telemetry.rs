//! Trailer connectivity as reported by the host's telemetry channels
//!
//! This table is the authoritative answer to "is trailer i attached". It is
//! written from the telemetry callback and read from the render thread, so it
//! uses plain atomics; a reader may see a count that is one update behind.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::info;

use crate::error::{Error, Result};
use crate::memory::layout::MAX_TRAILERS;

const CHANNEL_PREFIX: &str = "trailer.";
const CHANNEL_SUFFIX: &str = ".connected";

/// Telemetry channel carrying the connected flag of trailer `index`
pub fn channel_name(index: usize) -> String {
    format!("{}{}{}", CHANNEL_PREFIX, index, CHANNEL_SUFFIX)
}

/// Parse `trailer.N.connected` into `N`
pub fn parse_channel(name: &str) -> Result<usize> {
    let index = name
        .strip_prefix(CHANNEL_PREFIX)
        .and_then(|rest| rest.strip_suffix(CHANNEL_SUFFIX))
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse::<usize>().ok())
        .ok_or_else(|| Error::InvalidChannel(name.to_string()))?;

    if index >= MAX_TRAILERS {
        return Err(Error::TrailerIndexOutOfRange {
            index,
            max: MAX_TRAILERS,
        });
    }
    Ok(index)
}

#[derive(Debug, Default)]
pub struct TrailerConnectivity {
    connected: [AtomicBool; MAX_TRAILERS],
    count: AtomicUsize,
}

impl TrailerConnectivity {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the connected flag of one trailer and recompute the count.
    ///
    /// Returns whether the flag changed.
    pub fn set_connected(&self, index: usize, connected: bool) -> Result<bool> {
        let slot = self
            .connected
            .get(index)
            .ok_or(Error::TrailerIndexOutOfRange {
                index,
                max: MAX_TRAILERS,
            })?;
        let was_connected = slot.swap(connected, Ordering::AcqRel);

        let count = self
            .connected
            .iter()
            .filter(|flag| flag.load(Ordering::Acquire))
            .count();
        self.count.store(count, Ordering::Release);

        Ok(was_connected != connected)
    }

    /// Apply one telemetry update. A missing or non-boolean value counts as
    /// "not connected".
    pub fn apply_channel(&self, name: &str, value: Option<bool>) -> Result<()> {
        let index = parse_channel(name)?;
        let connected = value.unwrap_or(false);

        if self.set_connected(index, connected)? {
            let state = if connected { "CONNECTED" } else { "DISCONNECTED" };
            info!(
                "TRAILER {}: trailer.{} (total: {} trailers)",
                state,
                index,
                self.connected_count()
            );
        }
        Ok(())
    }

    pub fn is_connected(&self, index: usize) -> bool {
        self.connected
            .get(index)
            .is_some_and(|flag| flag.load(Ordering::Acquire))
    }

    pub fn connected_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> [bool; MAX_TRAILERS] {
        std::array::from_fn(|i| self.connected[i].load(Ordering::Acquire))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_names_round_trip() {
        assert_eq!(channel_name(3), "trailer.3.connected");
        assert_eq!(parse_channel("trailer.9.connected").unwrap(), 9);
    }

    #[test]
    fn test_parse_channel_rejects_malformed_names() {
        for name in [
            "trailer..connected",
            "trailer.x.connected",
            "trailer.-1.connected",
            "trailer.1.attached",
            "truck.1.connected",
        ] {
            assert!(
                matches!(parse_channel(name), Err(Error::InvalidChannel(_))),
                "{}",
                name
            );
        }
        assert!(matches!(
            parse_channel("trailer.10.connected"),
            Err(Error::TrailerIndexOutOfRange { index: 10, .. })
        ));
    }

    #[test]
    fn test_count_follows_connect_and_disconnect() {
        let table = TrailerConnectivity::new();
        for i in [0, 2, 5] {
            table.apply_channel(&channel_name(i), Some(true)).unwrap();
        }
        assert_eq!(table.connected_count(), 3);

        table.apply_channel("trailer.2.connected", Some(false)).unwrap();
        assert_eq!(table.connected_count(), 2);
        assert!(table.is_connected(0));
        assert!(!table.is_connected(2));
        assert!(table.is_connected(5));

        let snapshot = table.snapshot();
        assert_eq!(
            snapshot.iter().filter(|c| **c).count(),
            table.connected_count()
        );
    }

    #[test]
    fn test_repeated_update_is_not_a_change() {
        let table = TrailerConnectivity::new();
        assert!(table.set_connected(1, true).unwrap());
        assert!(!table.set_connected(1, true).unwrap());
        assert_eq!(table.connected_count(), 1);
    }

    #[test]
    fn test_non_boolean_value_means_disconnected() {
        let table = TrailerConnectivity::new();
        table.set_connected(4, true).unwrap();
        table.apply_channel("trailer.4.connected", None).unwrap();
        assert!(!table.is_connected(4));
        assert_eq!(table.connected_count(), 0);
    }

    #[test]
    fn test_out_of_range_index() {
        let table = TrailerConnectivity::new();
        assert!(table.set_connected(MAX_TRAILERS, true).is_err());
        assert!(!table.is_connected(MAX_TRAILERS));
        assert_eq!(table.connected_count(), 0);
    }
}
