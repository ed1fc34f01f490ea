use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid signature pattern: {0}")]
    InvalidPattern(String),

    #[error("Pattern not found for {target}: all {tried} candidates failed")]
    PatternNotFound { target: String, tried: usize },

    #[error("Candidate at {address:#x} rejected by validator")]
    ValidationRejected { address: u64 },

    #[error("Cached address {address:#x} no longer dereferences to a live value")]
    StaleCache { address: u64 },

    #[error("Unsafe memory access at {address:#x} ({size} bytes)")]
    UnsafeMemoryAccess { address: u64, size: usize },

    #[error("Feature unavailable: {0}")]
    FeatureUnavailable(String),

    #[error("Steering for trailer {0} is not locked")]
    SteeringNotLocked(usize),

    #[error("Hook '{name}' failed: {message}")]
    HookFailed { name: String, message: String },

    #[error("Invalid telemetry channel: {0}")]
    InvalidChannel(String),

    #[error("Trailer index {index} out of range (max {max})")]
    TrailerIndexOutOfRange { index: usize, max: usize },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this error means "nothing usable was found" rather than a fault
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::PatternNotFound { .. } | Error::ValidationRejected { .. }
        )
    }
}
