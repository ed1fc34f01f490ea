//! Everything that touches the live host process: hooks, host calls, the
//! DirectInput interception and the overlay.

mod dinput;
mod hooks;
mod host;
mod overlay;

use std::ffi::c_void;
use std::mem::transmute;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context as _, Result, anyhow};
use hudhook::Hooks;
use hudhook::hooks::dx11::ImguiDx11Hooks;
use hudhook::mh::{MH_ApplyQueued, MH_STATUS};
use tracing::{error, info, warn};

use ts_extra_core::memory::ProcessMemory;
use ts_extra_core::memory::layout::trailer;
use ts_extra_core::trailer::{TRUCKERSMP_MODULES, index_of, walk_trailer_chain};
use ts_extra_core::{CoreController, HookSwitch, TrailerFunctions, TrailerManipulation};

use crate::context::{self, PluginContext};
use hooks::{FunctionHook, Trampoline, VtableHook};
use overlay::Overlay;

type SteeringAdvanceFn = unsafe extern "system" fn(*mut c_void) -> u64;

static STEERING_ADVANCE_ORIGINAL: Trampoline = Trampoline::new();

/// DirectX 11 present hooks driving the overlay.
///
/// Kept here instead of in hudhook's own registry so that shutdown can remove
/// them on the calling thread before the host unloads the library.
struct OverlayHooks(Box<ImguiDx11Hooks>);

// Only touched at install and at shutdown, under the hook table lock.
unsafe impl Send for OverlayHooks {}

impl OverlayHooks {
    fn apply(overlay: Overlay) -> Result<Self> {
        let hooks = ImguiDx11Hooks::from_render_loop(overlay);
        for hook in hooks.hooks() {
            unsafe { hook.queue_enable() }
                .map_err(|status| anyhow!("Failed to queue DirectX11 hook: {:?}", status))?;
        }
        match unsafe { MH_ApplyQueued() } {
            MH_STATUS::MH_OK => Ok(Self(hooks)),
            status => Err(anyhow!("Failed to hook DirectX11 present function: {:?}", status)),
        }
    }

    /// Disable the present hooks and free the renderer before returning
    fn remove(mut self) {
        for hook in self.0.hooks() {
            if let Err(status) = unsafe { hook.queue_disable() } {
                warn!("Could not queue removal of a DirectX11 hook: {:?}", status);
            }
        }
        let status = unsafe { MH_ApplyQueued() };
        if status != MH_STATUS::MH_OK {
            warn!("Could not remove DirectX11 hooks: {:?}", status);
        }
        unsafe { self.0.unhook() };
    }
}

#[derive(Default)]
pub struct InstalledHooks {
    crash_guard: Option<FunctionHook>,
    connect_slave: Option<FunctionHook>,
    steering_advance: Option<VtableHook>,
    mouse: Option<FunctionHook>,
    overlay: Option<OverlayHooks>,
}

impl InstalledHooks {
    /// Hook that keeps the host from reconnecting slave trailers by itself
    pub fn connect_slave(&mut self) -> Option<&mut FunctionHook> {
        self.connect_slave.as_mut()
    }
}

pub struct PlatformState {
    memory: ProcessMemory,
    hooks: Mutex<InstalledHooks>,
}

impl PlatformState {
    pub fn memory(&self) -> &ProcessMemory {
        &self.memory
    }

    pub fn hooks(&self) -> Option<MutexGuard<'_, InstalledHooks>> {
        self.hooks.lock().ok()
    }

    /// Hook `steering_advance` through the vtable of a live trailer object
    pub fn hook_steering_advance(&self, trailer_object: u64) -> Result<()> {
        let mut hook = VtableHook::new(
            &self.memory,
            "physics_trailer_u::steering_advance",
            trailer_object,
            trailer::STEERING_ADVANCE_SLOT,
            steering_advance_detour as *const c_void,
        )?;
        STEERING_ADVANCE_ORIGINAL.set(hook.original());
        hook.enable()?;

        let mut hooks = self
            .hooks()
            .ok_or_else(|| anyhow!("hook table is poisoned"))?;
        hooks.steering_advance = Some(hook);
        Ok(())
    }
}

/// Replaces a host function that dereferences the physics joint of slave
/// trailers; with a disconnected trailer that joint is gone.
unsafe extern "system" fn crash_guard_detour(_trailer: *mut c_void, _actor: *mut c_void) {}

/// Swallows the host's automatic reconnection of slave trailers
unsafe extern "system" fn connect_slave_detour(_trailer: *mut c_void) {}

fn game_steers(trailer_object: u64) -> bool {
    let Some(context) = context::current() else {
        return true;
    };
    let (Some(platform), Some(actor)) = (context.platform(), context.game_actor()) else {
        return true;
    };
    let chain = walk_trailer_chain(&platform.memory, actor);
    context
        .steering_locks()
        .allows_game_steering(index_of(&chain, trailer_object))
}

unsafe extern "system" fn steering_advance_detour(trailer_object: *mut c_void) -> u64 {
    let allowed = std::panic::catch_unwind(|| game_steers(trailer_object as u64)).unwrap_or(true);
    match STEERING_ADVANCE_ORIGINAL.get() {
        Some(original) if allowed => unsafe {
            transmute::<u64, SteeringAdvanceFn>(original)(trailer_object)
        },
        _ => 0,
    }
}

fn install_function_hook(
    name: &'static str,
    target: Option<u64>,
    detour: *const c_void,
    enable: bool,
) -> Option<FunctionHook> {
    let target = target?;
    let hook = FunctionHook::create(name, target, detour).and_then(|mut hook| {
        if enable {
            hook.enable()?;
        }
        Ok(hook)
    });
    match hook {
        Ok(hook) => Some(hook),
        Err(e) => {
            error!("Could not hook '{}': {:#}", name, e);
            None
        }
    }
}

/// Locate host functions, install hooks and start the overlay
pub fn start(context: &Arc<PluginContext>) -> Result<()> {
    let memory = ProcessMemory::current().context("attaching to the host module")?;
    let truckersmp = TRUCKERSMP_MODULES
        .iter()
        .any(|module| ProcessMemory::is_module_loaded(module));
    if truckersmp {
        info!("TruckersMP detected; trailer connection controls are disabled");
    }

    hooks::init_minhook()?;
    info!("MinHook initialized");

    let controller = CoreController::new(memory);
    let mut manipulation = TrailerManipulation::init(&controller.scanner(), truckersmp);

    let mut installed = InstalledHooks::default();
    if manipulation.should_install_guard_hooks() {
        let functions = *manipulation.functions();
        installed.crash_guard = install_function_hook(
            "crashes_when_disconnected",
            functions.crash_guard,
            crash_guard_detour as *const c_void,
            true,
        );
        installed.connect_slave = install_function_hook(
            "prism::physics_trailer_u::connect_slave",
            functions.connect_slave,
            connect_slave_detour as *const c_void,
            false,
        );

        // Without its hook a located function is as good as missing.
        let functions = TrailerFunctions {
            crash_guard: functions.crash_guard.filter(|_| installed.crash_guard.is_some()),
            connect_slave: functions
                .connect_slave
                .filter(|_| installed.connect_slave.is_some()),
            ..functions
        };
        manipulation = TrailerManipulation::with_functions(functions, truckersmp);
    }
    let manipulation = manipulation.with_steering_locks(context.steering_locks());

    installed.mouse = Some(dinput::hook_mouse_input().context("Failed to hook DirectInput8")?);
    info!("DirectInput8 hooked successfully");

    // The overlay finds no platform state until `set_platform` below and
    // draws nothing before that.
    let overlay = Overlay::new(context.clone(), controller, manipulation);
    installed.overlay = Some(OverlayHooks::apply(overlay)?);
    info!("DirectX11 hooked successfully");

    info!(
        "Hooks installed: crash guard={}, connect slave={}, mouse={}",
        installed.crash_guard.is_some(),
        installed.connect_slave.is_some(),
        installed.mouse.is_some()
    );
    if !context.set_platform(PlatformState {
        memory,
        hooks: Mutex::new(installed),
    }) {
        warn!("Platform state was already set");
    }
    Ok(())
}

/// Remove every hook and free the overlay renderer.
///
/// Everything happens on the calling thread: once this returns no hook leads
/// into the library and the host may unload it.
pub fn stop(context: &PluginContext) {
    let installed = context
        .platform()
        .and_then(PlatformState::hooks)
        .map(|mut hooks| std::mem::take(&mut *hooks));
    if let Some(mut installed) = installed {
        if let Some(overlay) = installed.overlay.take() {
            overlay.remove();
        }
        // Dropping the rest disables the function hooks and restores the
        // steering vtable slot.
        drop(installed);
    }

    hooks::uninit_minhook();
    STEERING_ADVANCE_ORIGINAL.clear();
    dinput::GET_DEVICE_DATA_ORIGINAL.clear();
}
