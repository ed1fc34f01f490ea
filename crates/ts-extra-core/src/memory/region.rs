//! Page-level description of host memory, as reported by the OS.

/// Lowest value treated as a plausible user-mode pointer
pub const MIN_PLAUSIBLE_POINTER: u64 = 0x10000;
/// Highest value treated as a plausible user-mode pointer (x64 user space)
pub const MAX_PLAUSIBLE_POINTER: u64 = 0x7FFF_FFFF_FFFF;

/// Page size used for page-wise probing
pub const PAGE_SIZE: u64 = 0x1000;

/// Check if a raw qword looks like a user-mode pointer
pub fn is_plausible_pointer(value: u64) -> bool {
    (MIN_PLAUSIBLE_POINTER..=MAX_PLAUSIBLE_POINTER).contains(&value)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Protection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
    pub guard: bool,
}

impl Protection {
    pub const NO_ACCESS: Self = Self {
        read: false,
        write: false,
        execute: false,
        guard: false,
    };
    pub const READ_ONLY: Self = Self {
        read: true,
        ..Self::NO_ACCESS
    };
    pub const READ_WRITE: Self = Self {
        read: true,
        write: true,
        ..Self::NO_ACCESS
    };
    pub const EXECUTE_READ: Self = Self {
        read: true,
        execute: true,
        ..Self::NO_ACCESS
    };

    /// Decode Win32 `PAGE_*` protection flags.
    ///
    /// Write-copy pages count as writable; `PAGE_GUARD` pages are never readable
    /// because touching them raises a one-shot exception.
    pub fn from_page_flags(flags: u32) -> Self {
        let guard = flags & 0x100 != 0;
        let (read, write, execute) = match flags & 0xFF {
            0x02 => (true, false, false),          // PAGE_READONLY
            0x04 | 0x08 => (true, true, false),    // PAGE_READWRITE, PAGE_WRITECOPY
            0x10 => (false, false, true),          // PAGE_EXECUTE
            0x20 => (true, false, true),           // PAGE_EXECUTE_READ
            0x40 | 0x80 => (true, true, true),     // PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY
            _ => (false, false, false),            // PAGE_NOACCESS and unknown
        };

        Self {
            read: read && !guard,
            write: write && !guard,
            execute,
            guard,
        }
    }
}

/// One contiguous range of pages sharing state and protection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion {
    pub base: u64,
    pub size: u64,
    pub committed: bool,
    pub protection: Protection,
}

impl MemoryRegion {
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    pub fn is_readable(&self) -> bool {
        self.committed && self.protection.read
    }

    pub fn is_writable(&self) -> bool {
        self.committed && self.protection.write
    }

    pub fn is_executable(&self) -> bool {
        self.committed && self.protection.execute
    }
}
