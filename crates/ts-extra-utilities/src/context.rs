//! The one piece of process-wide state.
//!
//! Hook detours are called by the host with fixed signatures and cannot be
//! handed a context, so they reach plugin state through [`current`]. The
//! context is installed by `scs_telemetry_init` and released by
//! `scs_telemetry_shutdown`; everything else receives it explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
#[cfg(target_os = "windows")]
use std::sync::OnceLock;

use ts_extra_core::{InputState, SteeringLocks, TrailerConnectivity};

#[cfg(target_os = "windows")]
use crate::platform::PlatformState;

static CONTEXT: Mutex<Option<Arc<PluginContext>>> = Mutex::new(None);

#[derive(Default)]
pub struct PluginContext {
    connectivity: TrailerConnectivity,
    steering_locks: Arc<SteeringLocks>,
    input: Mutex<InputState>,
    /// Game actor seen by the last rendered frame, 0 if none
    game_actor: AtomicU64,
    #[cfg(target_os = "windows")]
    platform: OnceLock<PlatformState>,
}

impl PluginContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connectivity(&self) -> &TrailerConnectivity {
        &self.connectivity
    }

    pub fn steering_locks(&self) -> Arc<SteeringLocks> {
        self.steering_locks.clone()
    }

    /// Input state, or `None` if a panicking holder poisoned it
    pub fn input(&self) -> Option<MutexGuard<'_, InputState>> {
        self.input.lock().ok()
    }

    pub fn game_actor(&self) -> Option<u64> {
        match self.game_actor.load(Ordering::Acquire) {
            0 => None,
            actor => Some(actor),
        }
    }

    pub fn set_game_actor(&self, actor: Option<u64>) {
        self.game_actor.store(actor.unwrap_or(0), Ordering::Release);
    }

    #[cfg(target_os = "windows")]
    pub(crate) fn platform(&self) -> Option<&PlatformState> {
        self.platform.get()
    }

    #[cfg(target_os = "windows")]
    pub(crate) fn set_platform(&self, state: PlatformState) -> bool {
        self.platform.set(state).is_ok()
    }
}

pub fn install(context: Arc<PluginContext>) {
    if let Ok(mut slot) = CONTEXT.lock() {
        *slot = Some(context);
    }
}

pub fn current() -> Option<Arc<PluginContext>> {
    CONTEXT.lock().ok().and_then(|slot| slot.clone())
}

/// Remove the installed context; detours see `None` afterwards
pub fn release() -> Option<Arc<PluginContext>> {
    CONTEXT.lock().ok().and_then(|mut slot| slot.take())
}
