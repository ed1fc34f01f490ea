use crate::memory::ReadMemory;

/// Predicate deciding whether a matched (and offset-adjusted) address is the
/// real target. Must never fault: reads go through the guarded reader.
pub type Validator = fn(&dyn ReadMemory, u64) -> bool;

/// One prioritized attempt at locating a logical target
#[derive(Debug, Clone, Copy)]
pub struct PatternCandidate {
    /// Hex bytes and `?`/`??` wildcards separated by whitespace
    pub pattern: &'static str,
    pub description: &'static str,
    /// Added to the raw match address
    pub offset: i64,
    pub validator: Option<Validator>,
}

impl PatternCandidate {
    pub const fn new(pattern: &'static str, description: &'static str) -> Self {
        Self {
            pattern,
            description,
            offset: 0,
            validator: None,
        }
    }

    pub const fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub const fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = Some(validator);
        self
    }
}

/// Address produced by a successful scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanHit {
    /// Match address plus the candidate's offset
    pub address: u64,
    /// Raw start of the matched bytes
    pub match_address: u64,
    /// Position of the winning candidate in its table
    pub candidate_index: usize,
    pub description: &'static str,
}
