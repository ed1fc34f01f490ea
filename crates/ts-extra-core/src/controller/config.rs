use crate::memory::layout::game_actor;
use crate::scanner::ScanLimits;

/// Configuration for the core controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Game-actor field offsets probed when the decoded one stops validating,
    /// in probe order
    pub actor_offsets: Vec<u32>,
    /// Bytes that must be readable at a game-actor pointer before it is trusted
    pub min_actor_readable: usize,
    /// Bounds for the scanner's fallback searches
    pub scan_limits: ScanLimits,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            actor_offsets: game_actor::ACTOR_OFFSET_CANDIDATES.to_vec(),
            min_actor_readable: game_actor::MIN_READABLE_SIZE,
            scan_limits: ScanLimits::default(),
        }
    }
}

impl ControllerConfig {
    /// Create a new configuration builder
    pub fn builder() -> ControllerConfigBuilder {
        ControllerConfigBuilder::default()
    }
}

/// Builder for ControllerConfig
#[derive(Debug, Clone, Default)]
pub struct ControllerConfigBuilder {
    actor_offsets: Option<Vec<u32>>,
    min_actor_readable: Option<usize>,
    scan_limits: Option<ScanLimits>,
}

impl ControllerConfigBuilder {
    /// Replace the game-actor offset probe table
    pub fn actor_offsets<I: IntoIterator<Item = u32>>(mut self, offsets: I) -> Self {
        self.actor_offsets = Some(offsets.into_iter().collect());
        self
    }

    pub fn min_actor_readable(mut self, size: usize) -> Self {
        self.min_actor_readable = Some(size);
        self
    }

    pub fn scan_limits(mut self, limits: ScanLimits) -> Self {
        self.scan_limits = Some(limits);
        self
    }

    /// Build the configuration
    pub fn build(self) -> ControllerConfig {
        let default = ControllerConfig::default();
        ControllerConfig {
            actor_offsets: self.actor_offsets.unwrap_or(default.actor_offsets),
            min_actor_readable: self.min_actor_readable.unwrap_or(default.min_actor_readable),
            scan_limits: self.scan_limits.unwrap_or(default.scan_limits),
        }
    }
}
