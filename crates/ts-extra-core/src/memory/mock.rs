//! In-memory stand-in for host memory used by unit tests.

use std::cell::{Cell, RefCell};

use crate::error::{Error, Result};

use super::reader::{ReadMemory, WriteMemory};
use super::region::{MemoryRegion, Protection};

struct MockRegion {
    base: u64,
    data: RefCell<Vec<u8>>,
    committed: bool,
    protection: Protection,
}

impl MockRegion {
    fn end(&self) -> u64 {
        self.base + self.data.borrow().len() as u64
    }

    fn info(&self) -> MemoryRegion {
        MemoryRegion {
            base: self.base,
            size: self.data.borrow().len() as u64,
            committed: self.committed,
            protection: self.protection,
        }
    }
}

pub struct MockMemory {
    base: u64,
    image_size: u64,
    regions: Vec<MockRegion>,
    reads: Cell<usize>,
}

impl MockMemory {
    /// Number of successful `read_bytes` calls so far
    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    /// Overwrite bytes regardless of protection (test setup only)
    pub fn poke(&self, address: u64, bytes: &[u8]) {
        let region = self
            .regions
            .iter()
            .find(|r| r.base <= address && address < r.end())
            .expect("poke outside mock regions");
        let start = (address - region.base) as usize;
        region.data.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn poke_u64(&self, address: u64, value: u64) {
        self.poke(address, &value.to_le_bytes());
    }

    fn find(&self, address: u64) -> Option<&MockRegion> {
        self.regions
            .iter()
            .find(|r| r.base <= address && address < r.end())
    }
}

impl ReadMemory for MockMemory {
    fn base_address(&self) -> u64 {
        self.base
    }

    fn image_size(&self) -> u64 {
        self.image_size
    }

    fn region(&self, address: u64) -> Option<MemoryRegion> {
        self.find(address).map(MockRegion::info)
    }

    fn read_bytes(&self, address: u64, size: usize) -> Result<Vec<u8>> {
        if !self.is_readable(address, size) {
            return Err(Error::UnsafeMemoryAccess { address, size });
        }

        let mut out = Vec::with_capacity(size);
        let mut cursor = address;
        while out.len() < size {
            let region = self
                .find(cursor)
                .ok_or(Error::UnsafeMemoryAccess { address, size })?;
            let data = region.data.borrow();
            let start = (cursor - region.base) as usize;
            let take = (size - out.len()).min(data.len() - start);
            out.extend_from_slice(&data[start..start + take]);
            cursor += take as u64;
        }

        self.reads.set(self.reads.get() + 1);
        Ok(out)
    }
}

impl WriteMemory for MockMemory {
    fn write_bytes(&self, address: u64, bytes: &[u8]) -> Result<()> {
        let fault = Error::UnsafeMemoryAccess {
            address,
            size: bytes.len(),
        };
        let region = self.find(address).ok_or(Error::UnsafeMemoryAccess {
            address,
            size: bytes.len(),
        })?;
        if !region.info().is_writable() || address + bytes.len() as u64 > region.end() {
            return Err(fault);
        }
        let start = (address - region.base) as usize;
        region.data.borrow_mut()[start..start + bytes.len()].copy_from_slice(bytes);
        Ok(())
    }
}

/// Builder for [`MockMemory`]
///
/// The first `image` call defines the module image used as the default scan range.
#[derive(Default)]
pub struct MockMemoryBuilder {
    base: Option<u64>,
    image_size: u64,
    regions: Vec<MockRegion>,
}

impl MockMemoryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Executable, readable module image at `base`
    pub fn image(mut self, base: u64, data: Vec<u8>) -> Self {
        if self.base.is_none() {
            self.base = Some(base);
            self.image_size = data.len() as u64;
        }
        self.region(base, data, Protection::EXECUTE_READ)
    }

    /// Committed region with the given protection
    pub fn region(mut self, base: u64, data: Vec<u8>, protection: Protection) -> Self {
        self.regions.push(MockRegion {
            base,
            data: RefCell::new(data),
            committed: true,
            protection,
        });
        self
    }

    /// Read-write data region
    pub fn data(self, base: u64, data: Vec<u8>) -> Self {
        self.region(base, data, Protection::READ_WRITE)
    }

    /// Reserved but uncommitted pages; any read must be refused
    pub fn reserved(mut self, base: u64, size: usize) -> Self {
        self.regions.push(MockRegion {
            base,
            data: RefCell::new(vec![0; size]),
            committed: false,
            protection: Protection::NO_ACCESS,
        });
        self
    }

    pub fn build(mut self) -> MockMemory {
        self.regions.sort_by_key(|r| r.base);
        MockMemory {
            base: self.base.unwrap_or(0),
            image_size: self.image_size,
            regions: self.regions,
            reads: Cell::new(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_reads_across_adjacent_regions() {
        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![0xAA; 0x1000])
            .data(0x2000, vec![0xBB; 0x1000])
            .build();

        let bytes = memory.read_bytes(0x1FFE, 4).unwrap();
        assert_eq!(bytes, vec![0xAA, 0xAA, 0xBB, 0xBB]);
    }

    #[test]
    fn test_mock_refuses_reserved_pages() {
        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![0; 0x1000])
            .reserved(0x2000, 0x1000)
            .build();

        assert!(memory.read_bytes(0x1FF0, 0x20).is_err());
        assert!(memory.read_u64(0x2000).is_err());
        assert!(!memory.is_readable(0x2000, 1));
    }

    #[test]
    fn test_mock_write_respects_protection() {
        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![0; 0x1000])
            .data(0x4000, vec![0; 0x100])
            .build();

        assert!(memory.write_f32(0x1000, 1.0).is_err());
        memory.write_f32(0x4010, 0.5).unwrap();
        assert_eq!(memory.read_f32(0x4010).unwrap(), 0.5);
    }

    #[test]
    fn test_read_pages_skips_unreadable() {
        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![1; 0x1000])
            .reserved(0x2000, 0x1000)
            .data(0x3000, vec![3; 0x1000])
            .build();

        let pages = memory.read_pages(0x1000, 0x3000);
        let bases: Vec<u64> = pages.iter().map(|(b, _)| *b).collect();
        assert_eq!(bases, vec![0x1000, 0x3000]);
    }
}
