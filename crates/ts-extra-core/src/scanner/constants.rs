//! Bounds for the fallback searches.
//!
//! Scans run synchronously on the host's render thread, so every search is
//! limited to a fixed window and step count.

/// Distance searched on each side of a known function (1MB)
pub const PROXIMITY_SEARCH_RANGE: u64 = 0x10_0000;
/// Tile size of the proximity search (one page)
pub const PROXIMITY_STEP: u64 = 0x1000;

/// Distance analyzed on each side of a known function (1MB)
pub const ANALYSIS_WINDOW: u64 = 0x10_0000;
/// Granularity of candidate function starts during structural analysis
pub const ANALYSIS_STEP: u64 = 0x10;
