//! Guarded reads and writes inside the current (host) process.

use std::ffi::c_void;
use std::mem::size_of;

use tracing::debug;
use windows::Win32::System::LibraryLoader::GetModuleHandleW;
use windows::Win32::System::Memory::{MEM_COMMIT, MEMORY_BASIC_INFORMATION, VirtualQuery};
use windows::Win32::System::ProcessStatus::{GetModuleInformation, MODULEINFO};
use windows::Win32::System::Threading::GetCurrentProcess;
use windows::core::PCWSTR;

use crate::error::{Error, Result};

use super::reader::{ReadMemory, WriteMemory};
use super::region::{MemoryRegion, Protection};

/// The host's main module, read in-process.
///
/// Every access is preceded by a `VirtualQuery` probe of the covered pages, so
/// an unmapped or protected range is refused instead of faulting.
#[derive(Debug, Clone, Copy)]
pub struct ProcessMemory {
    base: u64,
    image_size: u64,
}

impl ProcessMemory {
    /// Attach to the executable module of the current process
    pub fn current() -> Result<Self> {
        let module = unsafe { GetModuleHandleW(PCWSTR::null()) }.map_err(|e| {
            Error::FeatureUnavailable(format!("GetModuleHandleW failed: {e}"))
        })?;

        let mut info = MODULEINFO::default();
        unsafe {
            GetModuleInformation(
                GetCurrentProcess(),
                module,
                &mut info,
                size_of::<MODULEINFO>() as u32,
            )
        }
        .map_err(|e| Error::FeatureUnavailable(format!("GetModuleInformation failed: {e}")))?;

        let memory = Self {
            base: info.lpBaseOfDll as u64,
            image_size: info.SizeOfImage as u64,
        };
        debug!(
            "Host module: base={:#x}, size={:#x}",
            memory.base, memory.image_size
        );
        Ok(memory)
    }

    /// Check whether a module with the given name is loaded in the process
    pub fn is_module_loaded(name: &str) -> bool {
        let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
        unsafe { GetModuleHandleW(PCWSTR::from_raw(wide.as_ptr())) }.is_ok()
    }

    fn is_writable(&self, address: u64, size: usize) -> bool {
        let Some(end) = address.checked_add(size as u64) else {
            return false;
        };
        let mut cursor = address;
        while cursor < end {
            match self.region(cursor) {
                Some(region) if region.is_writable() && region.end() > cursor => {
                    cursor = region.end();
                }
                _ => return false,
            }
        }
        true
    }
}

impl ReadMemory for ProcessMemory {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn image_size(&self) -> u64 {
        self.image_size
    }

    fn region(&self, address: u64) -> Option<MemoryRegion> {
        let mut mbi = MEMORY_BASIC_INFORMATION::default();
        let written = unsafe {
            VirtualQuery(
                Some(address as *const c_void),
                &mut mbi,
                size_of::<MEMORY_BASIC_INFORMATION>(),
            )
        };
        if written == 0 {
            return None;
        }

        Some(MemoryRegion {
            base: mbi.BaseAddress as u64,
            size: mbi.RegionSize as u64,
            committed: mbi.State == MEM_COMMIT,
            protection: Protection::from_page_flags(mbi.Protect.0),
        })
    }

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        if !self.is_readable(address, size) {
            return Err(Error::UnsafeMemoryAccess { address, size });
        }

        let mut buffer = vec![0u8; size];
        // The whole range was probed as committed and readable above.
        unsafe {
            std::ptr::copy_nonoverlapping(address as *const u8, buffer.as_mut_ptr(), size);
        }
        Ok(buffer)
    }
}

impl WriteMemory for ProcessMemory {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        if !self.is_writable(address, bytes.len()) {
            return Err(Error::UnsafeMemoryAccess {
                address,
                size: bytes.len(),
            });
        }

        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), address as *mut u8, bytes.len());
        }
        Ok(())
    }
}
