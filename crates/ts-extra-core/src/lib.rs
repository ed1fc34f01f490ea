//! # ts-extra-core
//!
//! Core library of the trailer utilities plugin.
//!
//! This crate provides:
//! - Guarded reads of host memory and typed field descriptors
//! - Wildcard byte-signature matching
//! - Multi-candidate signature resolution with validators and fallbacks
//! - The self-healing base-controller / game-actor cache
//! - Telemetry-driven trailer connectivity
//! - Trailer steering, joint and connection control
//! - Overlay input state
//!
//! Nothing here is Windows specific except [`memory::ProcessMemory`]; the rest
//! runs against any [`memory::ReadMemory`] implementation.

pub mod controller;
pub mod error;
pub mod input;
pub mod memory;
pub mod pattern;
pub mod scanner;
pub mod telemetry;
pub mod trailer;

pub use controller::{ControllerConfig, ControllerConfigBuilder, CoreController, ResolvedOffsets};
pub use error::{Error, Result};
pub use input::{InputState, MouseAxis};
pub use memory::{ReadMemory, WriteMemory};
pub use scanner::{PatternCandidate, RobustPatternScanner, ScanLimits};
pub use telemetry::TrailerConnectivity;
pub use trailer::{
    HookSwitch, JointMotion, JointState, SteeringLocks, TrailerFunctions, TrailerHandle,
    TrailerHost, TrailerManipulation,
};
