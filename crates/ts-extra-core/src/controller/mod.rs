//! Self-healing resolution of the base controller and the game actor
//!
//! The base-controller global is found once by signature and then re-checked
//! on every access. A cached location that dereferences to null is dropped and
//! resolved again, at most once per access. The game-actor field offset is
//! decoded from the same instruction sequence; when it stops validating, a
//! fixed table of plausible offsets is probed.

mod config;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::memory::layout::base_ctrl;
use crate::memory::{FieldDescriptor, FieldShape, ReadMemory, as_module_offset, rip_relative_target};
use crate::scanner::{BASE_CTRL_PATTERNS, BASE_CTRL_TARGET, RobustPatternScanner};

pub use config::{ControllerConfig, ControllerConfigBuilder};

/// Qwords of the base controller logged after a fresh resolution
const PREVIEW_QWORDS: u64 = 8;

/// Serializable snapshot of what the controller has resolved so far
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedOffsets {
    /// Base-controller global, relative to the module base
    pub base_ctrl: Option<u64>,
    /// Game-actor field inside the base controller
    pub game_actor: Option<u32>,
    /// Signature scans run so far
    pub scans: usize,
}

impl ResolvedOffsets {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

pub struct CoreController<R: ReadMemory> {
    reader: R,
    config: ControllerConfig,
    /// Address of the global holding the base-controller pointer
    base_ctrl_location: Option<u64>,
    actor_offset: Option<u32>,
    scans: usize,
    /// Last `game_actor` lookup failed; repeats are logged at debug level
    actor_missing: bool,
}

impl<R: ReadMemory> CoreController<R> {
    pub fn new(reader: R) -> Self {
        Self::with_config(reader, ControllerConfig::default())
    }

    pub fn with_config(reader: R, config: ControllerConfig) -> Self {
        Self {
            reader,
            config,
            base_ctrl_location: None,
            actor_offset: None,
            scans: 0,
            actor_missing: false,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Scanner over the module image using the configured limits
    pub fn scanner(&self) -> RobustPatternScanner<'_, R> {
        RobustPatternScanner::new(&self.reader).with_limits(self.config.scan_limits)
    }

    /// Number of base-controller signature scans run so far
    pub fn scan_count(&self) -> usize {
        self.scans
    }

    /// Game-actor field offset currently trusted, if any
    pub fn actor_offset(&self) -> Option<u32> {
        self.actor_offset
    }

    /// `true` while the last game-actor lookup came back empty
    pub fn is_actor_missing(&self) -> bool {
        self.actor_missing
    }

    /// Forget every resolved address
    pub fn invalidate(&mut self) {
        self.base_ctrl_location = None;
        self.actor_offset = None;
    }

    pub fn resolved_offsets(&self) -> ResolvedOffsets {
        ResolvedOffsets {
            base_ctrl: self
                .base_ctrl_location
                .map(|location| as_module_offset(&self.reader, location)),
            game_actor: self.actor_offset,
            scans: self.scans,
        }
    }

    /// Live base-controller instance, or `None` while it cannot be resolved.
    ///
    /// A cached location is dereferenced without rescanning. If it has gone
    /// null the cache is cleared and one fresh resolution is attempted.
    pub fn base_ctrl_instance(&mut self) -> Option<u64> {
        if let Some(location) = self.base_ctrl_location {
            match self.base_ctrl_field(location).resolve(&self.reader) {
                Ok(instance) => return Some(instance),
                Err(e) => {
                    warn!(
                        "Cached base_ctrl at +0x{:X} is stale ({}), rescanning...",
                        as_module_offset(&self.reader, location),
                        e
                    );
                    self.invalidate();
                }
            }
        }

        let location = self.resolve_base_ctrl()?;
        match self.base_ctrl_field(location).resolve(&self.reader) {
            Ok(instance) => Some(instance),
            Err(e) => {
                warn!("Freshly resolved base_ctrl is not live: {}", e);
                None
            }
        }
    }

    /// Live game actor, or `None` while it cannot be resolved.
    ///
    /// Menus and loading screens have no actor for many frames in a row, so
    /// only the transition into and out of that state is logged above debug.
    pub fn game_actor(&mut self) -> Option<u64> {
        let actor = self.lookup_game_actor();
        match (actor, self.actor_missing) {
            (Some(_), true) => info!("Game actor available again"),
            (None, false) => warn!("Game actor is unavailable"),
            _ => {}
        }
        self.actor_missing = actor.is_none();
        actor
    }

    fn lookup_game_actor(&mut self) -> Option<u64> {
        let Some(base) = self.base_ctrl_instance() else {
            debug!("Base controller is null, cannot get game actor");
            return None;
        };

        if let Some(offset) = self.actor_offset {
            match self.actor_field(base, offset).resolve(&self.reader) {
                Ok(actor) => return Some(actor),
                Err(e) => {
                    warn!(
                        "Cached game actor offset 0x{:X} is invalid ({}), probing alternatives...",
                        offset, e
                    );
                    self.actor_offset = None;
                }
            }
        }

        for (index, &offset) in self.config.actor_offsets.iter().enumerate() {
            debug!(
                "  Trying actor offset {}/{}: +0x{:X}",
                index + 1,
                self.config.actor_offsets.len(),
                offset
            );
            match self.actor_field(base, offset).resolve(&self.reader) {
                Ok(actor) => {
                    info!(
                        "Found valid game actor at offset +0x{:X}: 0x{:016X}",
                        offset, actor
                    );
                    self.actor_offset = Some(offset);
                    return Some(actor);
                }
                Err(e) => debug!("  Offset +0x{:X} rejected: {}", offset, e),
            }
        }

        if self.actor_missing {
            debug!(
                "Still no valid game actor after {} offsets",
                self.config.actor_offsets.len()
            );
        } else {
            warn!(
                "Could not find a valid game actor in the base controller after {} offsets",
                self.config.actor_offsets.len()
            );
        }
        None
    }

    /// `true` when the host runs the PhysX backend (joint locking needs it)
    pub fn is_physx(&mut self) -> bool {
        let Some(base) = self.base_ctrl_instance() else {
            return false;
        };
        self.reader
            .read_u32(base.wrapping_add(base_ctrl::SELECTED_PHYSICS_ENGINE))
            .is_ok_and(|engine| engine == base_ctrl::PHYSICS_ENGINE_PHYSX)
    }

    fn base_ctrl_field(&self, location: u64) -> FieldDescriptor {
        FieldDescriptor::new(location, 0, FieldShape::Pointer)
    }

    fn actor_field(&self, base: u64, offset: u32) -> FieldDescriptor {
        FieldDescriptor::new(
            base,
            offset as u64,
            FieldShape::Object {
                min_readable: self.config.min_actor_readable,
            },
        )
    }

    /// Scan for the base-controller global and decode the actor offset
    fn resolve_base_ctrl(&mut self) -> Option<u64> {
        self.scans += 1;
        let hit = match self
            .scanner()
            .find_with_fallbacks(BASE_CTRL_TARGET, BASE_CTRL_PATTERNS)
        {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Could not find base_ctrl_instance - game may have updated ({})", e);
                return None;
            }
        };

        let location = match rip_relative_target(
            &self.reader,
            hit.address,
            base_ctrl::DISP_OFFSET,
            base_ctrl::INSTR_LEN,
        ) {
            Ok(location) => location,
            Err(e) => {
                error!("Could not decode base_ctrl displacement: {}", e);
                return None;
            }
        };

        self.actor_offset = self
            .reader
            .read_i32(hit.address.wrapping_add(base_ctrl::ACTOR_OFFSET_DISP))
            .ok()
            .and_then(|raw| u32::try_from(raw).ok())
            .filter(|&offset| offset != 0);
        self.base_ctrl_location = Some(location);

        info!(
            "Found base_ctrl @ +0x{:X}, game_actor_offset: {}",
            as_module_offset(&self.reader, location),
            self.actor_offset
                .map(|offset| format!("+0x{:X}", offset))
                .unwrap_or_else(|| "unknown".to_string())
        );
        self.log_preview(location);

        Some(location)
    }

    fn log_preview(&self, location: u64) {
        let Ok(instance) = self.reader.read_u64(location) else {
            return;
        };
        debug!("Base controller pointer: 0x{:016X}", instance);

        let Ok(bytes) = self
            .reader
            .read_bytes(instance, (PREVIEW_QWORDS * 8) as usize)
        else {
            return;
        };
        for (i, qword) in bytes.chunks_exact(8).enumerate() {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(qword);
            debug!("  +0x{:03X}: 0x{:016X}", i * 8, u64::from_le_bytes(raw));
        }
    }
}
