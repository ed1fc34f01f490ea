//! Candidate tables per logical target.
//!
//! Order is priority: the most version-specific, best-validated signature
//! comes first. New host builds are handled by appending entries here.

use super::candidate::PatternCandidate;
use super::validators::{
    validate_base_ctrl_pattern, validate_function_pattern, validate_null_guarded_entry,
};

pub const BASE_CTRL_TARGET: &str = "base_ctrl_instance";
pub const SET_INDIVIDUAL_STEERING_TARGET: &str = "set_individual_steering";
pub const CRASH_GUARD_TARGET: &str = "crashes_when_disconnected";
pub const CONNECT_SLAVE_TARGET: &str = "connect_slave";

pub const BASE_CTRL_PATTERNS: &[PatternCandidate] = &[
    PatternCandidate::new(
        "48 8b 05 ? ? ? ? 48 8b 4b ? 48 8b 80 ? ? ? ? 48 8b b9",
        "Original pattern (pre-1.14)",
    )
    .with_validator(validate_base_ctrl_pattern),
    PatternCandidate::new(
        "48 8b 05 ? ? ? ? 48 8b 4f ? 48 8b 80 ? ? ? ? 48 8b b8",
        "Pattern variant 1 (potential 1.14)",
    )
    .with_validator(validate_base_ctrl_pattern),
    PatternCandidate::new(
        "48 8b 0d ? ? ? ? 48 8b 4b ? 48 8b 81 ? ? ? ? 48 8b b8",
        "Pattern variant 2 (MOV RCX instead of RAX)",
    )
    .with_validator(validate_base_ctrl_pattern),
    PatternCandidate::new(
        "48 8b ? ? ? ? ? 48 8b ? ? 48 8b 80 ? ? ? ? 48 8b",
        "Relaxed pattern (more wildcards)",
    )
    .with_validator(validate_base_ctrl_pattern),
];

pub const SET_INDIVIDUAL_STEERING_PATTERNS: &[PatternCandidate] = &[
    PatternCandidate::new(
        "48 89 5c 24 08 48 89 74 24 10 57 48 83 ec ? 8b 41 ? 48 8b d9 0f 29 74",
        "Original pattern (pre-1.14)",
    )
    .with_validator(validate_function_pattern),
    PatternCandidate::new(
        "48 89 5c 24 08 48 89 74 24 10 57 48 83 ec ? 8b 41 ? 48 8b da 0f 29 74",
        "Pattern variant 1 (RBX->RDX change)",
    )
    .with_validator(validate_function_pattern),
    PatternCandidate::new(
        "48 89 5c 24 08 48 89 74 24 10 48 89 7c 24 18 41 56 48 83 ec ? 8b 41",
        "Pattern variant 2 (additional register save)",
    )
    .with_validator(validate_function_pattern),
];

pub const CRASH_FUNCTION_PATTERNS: &[PatternCandidate] = &[
    PatternCandidate::new(
        "48 85 d2 0f 84 ? ? ? ? 48 89 74 24 18 57 48 83 ec 40",
        "Original pattern (pre-1.14)",
    )
    .with_validator(validate_null_guarded_entry),
    PatternCandidate::new(
        "48 85 d2 0f 84 ? ? ? ? 48 89 74 24 10 57 48 83 ec 30",
        "Pattern variant 1 (different stack allocation)",
    )
    .with_validator(validate_null_guarded_entry),
    PatternCandidate::new(
        "48 85 d2 0f 84 ? ? ? ? 48 89 6c 24 18 48 89 74 24 20",
        "Pattern variant 2 (different register saves)",
    )
    .with_validator(validate_null_guarded_entry),
];

pub const CONNECT_SLAVE_PATTERNS: &[PatternCandidate] = &[
    PatternCandidate::new(
        "40 53 48 83 ec 60 48 83 b9 ? ? ? ? 00 48 8b d9 0f 84 ? ? ? ? 48 8d 54 24 ? e8",
        "Original pattern (pre-1.14)",
    )
    .with_validator(validate_function_pattern),
    PatternCandidate::new(
        "40 53 48 83 ec 50 48 83 b9 ? ? ? ? 00 48 8b d9 0f 84 ? ? ? ? 48 8d 54 24 ? e8",
        "Pattern variant 1 (different stack allocation)",
    )
    .with_validator(validate_function_pattern),
    PatternCandidate::new(
        "48 89 5c 24 08 48 83 ec 60 48 83 b9 ? ? ? ? 00 48 8b d9 0f 84 ? ? ? ?",
        "Pattern variant 2 (different prologue)",
    )
    .with_validator(validate_function_pattern),
];
