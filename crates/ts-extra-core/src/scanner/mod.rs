//! Multi-candidate signature resolution for host code and data
//!
//! A logical target (the base-controller global, the steering setter, ...) is
//! described by an ordered table of [`PatternCandidate`]s. The scanner tries
//! them in order and returns the first match that its validator accepts.
//! When every signature fails, two bounded fallbacks exist:
//!
//! - [`RobustPatternScanner::find_function_near_address`] re-runs the table in
//!   page-sized windows around an already-resolved function.
//! - [`RobustPatternScanner::analyze_binary_around_function`] guesses a
//!   function from code shape alone. Its result is never validated.

mod candidate;
mod constants;
mod heuristics;
mod tables;
mod validators;

use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};
use crate::memory::{PAGE_SIZE, ReadMemory, as_module_offset};
use crate::pattern::{Pattern, ScanRange, scan_first};

pub use candidate::*;
pub use constants::*;
pub use heuristics::{BODY_WINDOW, FIELD_OFFSET_RANGE, FunctionShape, analyze_function_shape};
pub use tables::*;
pub use validators::*;

/// Search bounds for the fallback paths
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanLimits {
    pub proximity_range: u64,
    pub proximity_step: u64,
    pub analysis_window: u64,
    pub analysis_step: u64,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            proximity_range: PROXIMITY_SEARCH_RANGE,
            proximity_step: PROXIMITY_STEP,
            analysis_window: ANALYSIS_WINDOW,
            analysis_step: ANALYSIS_STEP,
        }
    }
}

/// Outcome of running one candidate against one range
enum Attempt {
    Hit(ScanHit),
    NoMatch,
    Rejected(u64),
}

pub struct RobustPatternScanner<'a, R: ReadMemory> {
    reader: &'a R,
    range: ScanRange,
    limits: ScanLimits,
}

impl<'a, R: ReadMemory> RobustPatternScanner<'a, R> {
    /// Scanner over the host's whole module image
    pub fn new(reader: &'a R) -> Self {
        Self {
            reader,
            range: ScanRange::module(reader),
            limits: ScanLimits::default(),
        }
    }

    pub fn with_range(mut self, range: ScanRange) -> Self {
        self.range = range;
        self
    }

    pub fn with_limits(mut self, limits: ScanLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn reader(&self) -> &'a R {
        self.reader
    }

    pub fn limits(&self) -> &ScanLimits {
        &self.limits
    }

    /// Resolve `target` with the first candidate that matches and validates.
    ///
    /// Candidates are tried strictly in table order. The call has no side
    /// effects besides logging, so repeating it against an unchanged host
    /// yields the same hit.
    pub fn find_with_fallbacks(
        &self,
        target: &str,
        candidates: &[PatternCandidate],
    ) -> Result<ScanHit> {
        debug!(
            "Scanning for {} with {} candidates",
            target,
            candidates.len()
        );

        for (index, candidate) in candidates.iter().enumerate() {
            debug!(
                "  Trying pattern {}: {} ({})",
                index + 1,
                candidate.description,
                candidate.pattern
            );

            match self.try_candidate(index, candidate, self.range) {
                Ok(Attempt::Hit(hit)) => {
                    info!(
                        "Found {} using pattern {}: {} at +0x{:X}",
                        target,
                        index + 1,
                        candidate.description,
                        as_module_offset(self.reader, hit.address)
                    );
                    return Ok(hit);
                }
                Ok(Attempt::NoMatch) => {
                    debug!("  Pattern {} failed - no match found", index + 1);
                }
                Ok(Attempt::Rejected(address)) => {
                    debug!(
                        "  Pattern {} matched at +0x{:X} but failed validation",
                        index + 1,
                        as_module_offset(self.reader, address)
                    );
                }
                Err(e) => {
                    warn!("  Pattern {} skipped: {}", index + 1, e);
                }
            }
        }

        error!(
            "Failed to find {} - all {} patterns failed",
            target,
            candidates.len()
        );
        Err(Error::PatternNotFound {
            target: target.to_string(),
            tried: candidates.len(),
        })
    }

    /// Re-run `candidates` in page-sized windows moving outward from `known`.
    ///
    /// Windows are visited nearest first, forward before backward at equal
    /// distance. Windows that would cross either end of the address space are
    /// skipped.
    pub fn find_function_near_address(
        &self,
        known: u64,
        candidates: &[PatternCandidate],
        search_range: u64,
    ) -> Result<ScanHit> {
        let step = self.limits.proximity_step.max(1);
        // Windows overlap by one pattern length so tile edges are not blind spots.
        let overlap = candidates
            .iter()
            .filter_map(|c| Pattern::parse(c.pattern).ok())
            .map(|p| p.len().saturating_sub(1) as u64)
            .max()
            .unwrap_or(0);

        debug!(
            "Proximity search around +0x{:X} (range 0x{:X}, step 0x{:X})",
            as_module_offset(self.reader, known),
            search_range,
            step
        );

        let mut delta = 0u64;
        while delta < search_range {
            let forward = known
                .checked_add(delta)
                .map(|start| ScanRange::new(start, step + overlap));
            let backward = known.checked_sub(delta).and_then(|end| {
                let start = end.saturating_sub(step);
                (end > start).then(|| ScanRange::new(start, end - start + overlap))
            });

            for window in [forward, backward].into_iter().flatten() {
                if let Some(hit) = self.first_hit_in(candidates, window) {
                    info!(
                        "Proximity search found {} at +0x{:X} ({} bytes from known function)",
                        hit.description,
                        as_module_offset(self.reader, hit.address),
                        hit.address.abs_diff(known)
                    );
                    return Ok(hit);
                }
            }

            delta = match delta.checked_add(step) {
                Some(next) => next,
                None => break,
            };
        }

        warn!(
            "Proximity search around +0x{:X} found nothing",
            as_module_offset(self.reader, known)
        );
        Err(Error::PatternNotFound {
            target: format!("function near 0x{:X}", known),
            tried: candidates.len(),
        })
    }

    /// Guess the start of an unsigned function near `known` from code shape.
    ///
    /// Only committed executable pages inside the analysis window are
    /// inspected. Every aligned prologue whose body passes all structural
    /// heuristics is collected and the first is returned. The heuristics are
    /// approximate; callers must not enable a feature on this result alone.
    pub fn analyze_binary_around_function(&self, known: u64, target: &str) -> Result<u64> {
        let window = self.limits.analysis_window;
        let step = self.limits.analysis_step.max(1) as usize;
        let start = known.saturating_sub(window);
        let end = known.saturating_add(window);

        debug!(
            "Structural analysis for {} around +0x{:X} (window 0x{:X})",
            target,
            as_module_offset(self.reader, known),
            window
        );

        let mut found = Vec::new();
        let mut examined = 0usize;
        let mut page = start & !(PAGE_SIZE - 1);

        while page < end {
            if let Some(region) = self.reader.region(page) {
                if region.is_executable() && region.is_readable() {
                    let want = (PAGE_SIZE + BODY_WINDOW as u64).min(region.end() - page);
                    if let Ok(bytes) = self.reader.read_bytes(page, want as usize) {
                        let page_len = (PAGE_SIZE as usize).min(bytes.len());
                        for offset in (0..page_len).step_by(step) {
                            let address = page + offset as u64;
                            if address < start || address >= end || address == known {
                                continue;
                            }
                            let body = &bytes[offset..];
                            if !looks_like_prologue(body) {
                                continue;
                            }
                            examined += 1;
                            if analyze_function_shape(body).is_candidate() {
                                found.push(address);
                            }
                        }
                    }
                }
            }

            page = match page.checked_add(PAGE_SIZE) {
                Some(next) => next,
                None => break,
            };
        }

        match found.first() {
            Some(&address) => {
                warn!(
                    "Structural analysis guessed {} at +0x{:X} ({} of {} prologues matched); result is unvalidated",
                    target,
                    as_module_offset(self.reader, address),
                    found.len(),
                    examined
                );
                Ok(address)
            }
            None => {
                debug!(
                    "Structural analysis for {} examined {} prologues without a match",
                    target, examined
                );
                Err(Error::PatternNotFound {
                    target: target.to_string(),
                    tried: examined,
                })
            }
        }
    }

    fn first_hit_in(&self, candidates: &[PatternCandidate], range: ScanRange) -> Option<ScanHit> {
        candidates
            .iter()
            .enumerate()
            .find_map(|(index, candidate)| match self.try_candidate(index, candidate, range) {
                Ok(Attempt::Hit(hit)) => Some(hit),
                _ => None,
            })
    }

    fn try_candidate(
        &self,
        index: usize,
        candidate: &PatternCandidate,
        range: ScanRange,
    ) -> Result<Attempt> {
        let pattern = Pattern::parse(candidate.pattern)?;
        let Some(match_address) = scan_first(self.reader, range, &pattern) else {
            return Ok(Attempt::NoMatch);
        };

        let address = match_address.wrapping_add_signed(candidate.offset);
        if let Some(validator) = candidate.validator {
            if !validator(self.reader, address) {
                return Ok(Attempt::Rejected(address));
            }
        }

        Ok(Attempt::Hit(ScanHit {
            address,
            match_address,
            candidate_index: index,
            description: candidate.description,
        }))
    }
}
