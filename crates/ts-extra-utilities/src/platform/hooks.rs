//! Function hooks (MinHook trampolines) and virtual-table slot hooks

use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context as _, Result, anyhow};
use hudhook::mh::{
    MH_CreateHook, MH_DisableHook, MH_EnableHook, MH_Initialize, MH_STATUS, MH_Uninitialize,
};
use tracing::{debug, warn};
use windows::Win32::System::Memory::{PAGE_PROTECTION_FLAGS, PAGE_READWRITE, VirtualProtect};

use ts_extra_core::{Error, HookSwitch, ReadMemory};

/// Initialize MinHook; an earlier initialization (by the overlay) is fine
pub fn init_minhook() -> Result<()> {
    match unsafe { MH_Initialize() } {
        MH_STATUS::MH_OK | MH_STATUS::MH_ERROR_ALREADY_INITIALIZED => Ok(()),
        status => Err(anyhow!("MH_Initialize failed: {:?}", status)),
    }
}

/// Release MinHook once every hook object has been dropped
pub fn uninit_minhook() {
    match unsafe { MH_Uninitialize() } {
        MH_STATUS::MH_OK | MH_STATUS::MH_ERROR_NOT_INITIALIZED => {}
        status => warn!("MH_Uninitialize failed: {:?}", status),
    }
}

/// Address a detour calls to run the unhooked code.
///
/// Detours are entered by the host with fixed signatures and no context, and
/// they must keep forwarding while the plugin context is already released
/// during shutdown, so each hook keeps its original in a static of this type.
/// `stop` clears every one of them after the hooks are gone.
pub struct Trampoline(AtomicU64);

impl Trampoline {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn set(&self, address: u64) {
        self.0.store(address, Ordering::Release);
    }

    pub fn get(&self) -> Option<u64> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            address => Some(address),
        }
    }

    pub fn clear(&self) {
        self.set(0);
    }
}

fn hook_error(name: &str, status: MH_STATUS) -> Error {
    Error::HookFailed {
        name: name.to_string(),
        message: format!("{:?}", status),
    }
}

/// Trampoline hook on a host function; created disabled
#[derive(Debug)]
pub struct FunctionHook {
    name: &'static str,
    target: u64,
    original: u64,
    enabled: bool,
}

impl FunctionHook {
    pub fn create(name: &'static str, target: u64, detour: *const c_void) -> Result<Self> {
        let mut original: *mut c_void = std::ptr::null_mut();
        let status =
            unsafe { MH_CreateHook(target as *mut c_void, detour as *mut c_void, &mut original) };
        if status != MH_STATUS::MH_OK {
            return Err(hook_error(name, status))
                .with_context(|| format!("creating hook on {:#x}", target));
        }
        debug!("Created hook '{}' @ {:#x}", name, target);

        Ok(Self {
            name,
            target,
            original: original as u64,
            enabled: false,
        })
    }

    /// Entry of the trampoline that runs the unhooked function
    pub fn original(&self) -> u64 {
        self.original
    }
}

impl HookSwitch for FunctionHook {
    fn enable(&mut self) -> ts_extra_core::Result<()> {
        if self.enabled {
            return Ok(());
        }
        match unsafe { MH_EnableHook(self.target as *mut c_void) } {
            MH_STATUS::MH_OK | MH_STATUS::MH_ERROR_ENABLED => {
                self.enabled = true;
                Ok(())
            }
            status => Err(hook_error(self.name, status)),
        }
    }

    fn disable(&mut self) -> ts_extra_core::Result<()> {
        if !self.enabled {
            return Ok(());
        }
        match unsafe { MH_DisableHook(self.target as *mut c_void) } {
            MH_STATUS::MH_OK | MH_STATUS::MH_ERROR_DISABLED => {
                self.enabled = false;
                Ok(())
            }
            status => Err(hook_error(self.name, status)),
        }
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for FunctionHook {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("{}", e);
        }
    }
}

/// Replaces one entry of a virtual-function table
#[derive(Debug)]
pub struct VtableHook {
    name: &'static str,
    slot: u64,
    original: u64,
    detour: u64,
    enabled: bool,
}

impl VtableHook {
    /// Hook the table entry at `slot` of `object`'s vtable
    pub fn new<R: ReadMemory>(
        reader: &R,
        name: &'static str,
        object: u64,
        slot: u64,
        detour: *const c_void,
    ) -> Result<Self> {
        let vtable = reader
            .read_pointer(object)
            .with_context(|| format!("reading vtable of {:#x}", object))?;
        let slot = vtable + slot * std::mem::size_of::<u64>() as u64;
        let original = reader
            .read_pointer(slot)
            .with_context(|| format!("reading '{}' vtable entry", name))?;
        Ok(Self {
            name,
            slot,
            original,
            detour: detour as u64,
            enabled: false,
        })
    }

    pub fn original(&self) -> u64 {
        self.original
    }

    fn write_slot(&self, value: u64) -> ts_extra_core::Result<()> {
        let address = self.slot as *const c_void;
        let size = std::mem::size_of::<u64>();
        let mut previous = PAGE_PROTECTION_FLAGS::default();

        unsafe { VirtualProtect(address, size, PAGE_READWRITE, &mut previous) }.map_err(|e| {
            Error::HookFailed {
                name: self.name.to_string(),
                message: format!("VirtualProtect: {e}"),
            }
        })?;
        unsafe { std::ptr::write_volatile(self.slot as *mut u64, value) };

        let mut ignored = PAGE_PROTECTION_FLAGS::default();
        if let Err(e) = unsafe { VirtualProtect(address, size, previous, &mut ignored) } {
            warn!("Could not restore protection of '{}' slot: {}", self.name, e);
        }
        Ok(())
    }
}

impl HookSwitch for VtableHook {
    fn enable(&mut self) -> ts_extra_core::Result<()> {
        if !self.enabled {
            self.write_slot(self.detour)?;
            self.enabled = true;
        }
        Ok(())
    }

    fn disable(&mut self) -> ts_extra_core::Result<()> {
        if self.enabled {
            self.write_slot(self.original)?;
            self.enabled = false;
        }
        Ok(())
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Drop for VtableHook {
    fn drop(&mut self) {
        if let Err(e) = self.disable() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trampoline_starts_empty_and_clears() {
        static ORIGINAL: Trampoline = Trampoline::new();
        assert_eq!(ORIGINAL.get(), None);

        ORIGINAL.set(0x1_4000_1000);
        assert_eq!(ORIGINAL.get(), Some(0x1_4000_1000));

        ORIGINAL.clear();
        assert_eq!(ORIGINAL.get(), None);
    }
}
