//! Guarded access to host memory.
//!
//! Every read of foreign memory goes through [`ReadMemory`]. Implementations
//! must check the target range before touching it and report a bad range as
//! [`Error::UnsafeMemoryAccess`] instead of faulting.

use crate::error::{Error, Result};

use super::region::{MemoryRegion, PAGE_SIZE, is_plausible_pointer};

pub trait ReadMemory {
    /// Load address of the host's main module image
    fn base_address(&self) -> u64;

    /// Size in bytes of the host's main module image
    fn image_size(&self) -> u64;

    /// Region containing `address`, or `None` if nothing is mapped there
    fn region(&self, address: u64) -> Option<MemoryRegion>;

    /// Copy `size` bytes out of host memory after checking the whole range
    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>>;

    /// Check that every page in `[address, address + size)` is committed and readable
    fn is_readable(&self, address: u64, size: usize) -> bool {
        if size == 0 {
            return true;
        }
        let Some(end) = address.checked_add(size as u64) else {
            return false;
        };

        let mut cursor = address;
        while cursor < end {
            match self.region(cursor) {
                Some(region) if region.is_readable() && region.end() > cursor => {
                    cursor = region.end();
                }
                _ => return false,
            }
        }
        true
    }

    fn read_u8(&self, address: u64) -> Result<u8> {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_i32(&self, address: u64) -> Result<i32> {
        let bytes = self.read_bytes(address, 4)?;
        Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u32(&self, address: u64) -> Result<u32> {
        Ok(self.read_i32(address)? as u32)
    }

    fn read_f32(&self, address: u64) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(address)?))
    }

    fn read_u64(&self, address: u64) -> Result<u64> {
        let bytes = self.read_bytes(address, 8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(raw))
    }

    /// Read a pointer and reject null or implausible values
    fn read_pointer(&self, address: u64) -> Result<u64> {
        let value = self.read_u64(address)?;
        if !is_plausible_pointer(value) {
            return Err(Error::UnsafeMemoryAccess {
                address: value,
                size: 0,
            });
        }
        Ok(value)
    }

    /// Read as much of `[address, address + size)` as possible, page by page.
    ///
    /// Unreadable pages are left out of the result so callers can skip them
    /// without losing the readable remainder.
    fn read_pages(&self, address: u64, size: usize) -> Vec<(u64, Vec<u8>)> {
        let mut pages = Vec::new();
        let Some(end) = address.checked_add(size as u64) else {
            return pages;
        };

        let mut cursor = address;
        while cursor < end {
            let page_end = ((cursor / PAGE_SIZE) + 1)
                .saturating_mul(PAGE_SIZE)
                .min(end);
            let len = (page_end - cursor) as usize;
            if let Ok(bytes) = self.read_bytes(cursor, len) {
                pages.push((cursor, bytes));
            }
            if page_end <= cursor {
                break;
            }
            cursor = page_end;
        }
        pages
    }
}

pub trait WriteMemory: ReadMemory {
    /// Write `bytes` into host memory after checking the range is writable
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()>;

    fn write_f32(&self, address: u64, value: f32) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }

    fn write_u64(&self, address: u64, value: u64) -> Result<()> {
        self.write_bytes(address, &value.to_le_bytes())
    }
}

/// Resolve a RIP-relative operand: `instr_addr + instr_len + disp32`.
///
/// `disp_offset` is the position of the 32-bit displacement inside the
/// instruction starting at `instr_addr`.
pub fn rip_relative_target<R: ReadMemory + ?Sized>(
    reader: &R,
    instr_addr: u64,
    disp_offset: u64,
    instr_len: u64,
) -> Result<u64> {
    let disp_addr = instr_addr
        .checked_add(disp_offset)
        .ok_or(Error::UnsafeMemoryAccess {
            address: instr_addr,
            size: 4,
        })?;
    let disp = reader.read_i32(disp_addr)?;
    Ok(instr_addr
        .wrapping_add(instr_len)
        .wrapping_add_signed(disp as i64))
}

/// Express an absolute address as an offset from the module base, for logs
pub fn as_module_offset<R: ReadMemory + ?Sized>(reader: &R, address: u64) -> u64 {
    address.wrapping_sub(reader.base_address())
}
