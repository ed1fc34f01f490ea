//! Typed access to fields of host objects whose layout is discovered at runtime.

use crate::error::{Error, Result};

use super::reader::ReadMemory;
use super::region::is_plausible_pointer;

/// What the value stored at a field must look like before it is trusted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldShape {
    /// Any non-null pointer
    Pointer,
    /// Pointer to an object with `min_readable` readable bytes whose first qword
    /// (vtable or similar) is itself a plausible pointer
    Object { min_readable: usize },
}

/// `{base, offset, expected shape}` of one pointer field inside a host object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub base: u64,
    pub offset: u64,
    pub shape: FieldShape,
}

impl FieldDescriptor {
    pub fn new(base: u64, offset: u64, shape: FieldShape) -> Self {
        Self {
            base,
            offset,
            shape,
        }
    }

    pub fn location(&self) -> u64 {
        self.base.wrapping_add(self.offset)
    }

    /// Read the field and check it against the expected shape
    pub fn resolve<R: ReadMemory + ?Sized>(&self, reader: &R) -> Result<u64> {
        let location = self.location();
        let value = reader.read_u64(location)?;
        if value == 0 {
            return Err(Error::StaleCache { address: location });
        }

        match self.shape {
            FieldShape::Pointer => Ok(value),
            FieldShape::Object { min_readable } => {
                if !reader.is_readable(value, min_readable) {
                    return Err(Error::UnsafeMemoryAccess {
                        address: value,
                        size: min_readable,
                    });
                }
                let first = reader.read_u64(value)?;
                if !is_plausible_pointer(first) {
                    return Err(Error::ValidationRejected { address: value });
                }
                Ok(value)
            }
        }
    }

    /// Like [`resolve`](Self::resolve), treating any failure as "absent"
    pub fn get<R: ReadMemory + ?Sized>(&self, reader: &R) -> Option<u64> {
        self.resolve(reader).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MockMemoryBuilder;

    #[test]
    fn test_object_field_requires_plausible_header() {
        let mut object = vec![0u8; 0x100];
        object[..8].copy_from_slice(&0x1_4000_1000u64.to_le_bytes());

        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![0; 0x100])
            .data(0x10_0000, vec![0; 0x400])
            .data(0x20_0000, object)
            .data(0x30_0000, vec![0; 0x100])
            .build();
        memory.poke_u64(0x10_0010, 0x20_0000);
        memory.poke_u64(0x10_0018, 0x30_0000);

        let shape = FieldShape::Object { min_readable: 0x100 };
        let good = FieldDescriptor::new(0x10_0000, 0x10, shape);
        assert_eq!(good.get(&memory), Some(0x20_0000));

        // Object exists but its first qword is zero.
        let bad_header = FieldDescriptor::new(0x10_0000, 0x18, shape);
        assert!(matches!(
            bad_header.resolve(&memory),
            Err(Error::ValidationRejected { .. })
        ));

        // Null field.
        let null = FieldDescriptor::new(0x10_0000, 0x20, shape);
        assert!(matches!(null.resolve(&memory), Err(Error::StaleCache { .. })));
    }

    #[test]
    fn test_field_outside_mapped_memory() {
        let memory = MockMemoryBuilder::new()
            .image(0x1000, vec![0; 0x100])
            .build();
        let field = FieldDescriptor::new(0xdead_0000, 0x8, FieldShape::Pointer);
        assert!(field.get(&memory).is_none());
    }
}
