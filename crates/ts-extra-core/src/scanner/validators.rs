//! Semantic checks applied to signature matches.
//!
//! Every validator reads through the guarded reader, so a probe of unmapped
//! memory turns into a rejection rather than a fault.

use crate::memory::layout::base_ctrl;
use crate::memory::{ReadMemory, is_plausible_pointer, rip_relative_target};

/// Bytes inspected by the entry-shape validators
const ENTRY_BYTES: usize = 5;

/// Accept a `mov reg, [rip+disp32]` match whose global holds a live pointer.
///
/// The displacement is decoded, the global is dereferenced, and the stored
/// value must be a plausible pointer into committed, readable memory.
pub fn validate_base_ctrl_pattern(reader: &dyn ReadMemory, address: u64) -> bool {
    let Ok(global) = rip_relative_target(
        reader,
        address,
        base_ctrl::DISP_OFFSET,
        base_ctrl::INSTR_LEN,
    ) else {
        return false;
    };

    let Ok(instance) = reader.read_u64(global) else {
        return false;
    };
    if !is_plausible_pointer(instance) {
        return false;
    }

    reader
        .region(instance)
        .is_some_and(|region| region.is_readable())
}

/// Accept addresses that start with a recognizable x64 function prologue
pub fn validate_function_pattern(reader: &dyn ReadMemory, address: u64) -> bool {
    match reader.read_bytes(address, ENTRY_BYTES) {
        Ok(bytes) => looks_like_prologue(&bytes),
        Err(_) => false,
    }
}

/// Accept functions that open with a parameter null test and a conditional
/// jump (`test rdx, rdx; je ...`), as used by small guard functions that
/// have no frame setup before the test.
pub fn validate_null_guarded_entry(reader: &dyn ReadMemory, address: u64) -> bool {
    match reader.read_bytes(address, ENTRY_BYTES) {
        Ok(bytes) => looks_like_null_guarded_entry(&bytes),
        Err(_) => false,
    }
}

/// Stack-frame push or stack-pointer adjustment at the first 1-3 bytes
pub fn looks_like_prologue(bytes: &[u8]) -> bool {
    matches!(
        bytes,
        [0x55, ..]                          // push rbp
            | [0x40 | 0x41, 0x50..=0x57, ..] // push rbx/rsi/rdi/r1x (REX form)
            | [0x48, 0x89, ..]               // mov [rsp+x], reg (home space save)
            | [0x48, 0x83, 0xEC, ..]         // sub rsp, imm8
            | [0x48, 0x81, 0xEC, ..]         // sub rsp, imm32
    )
}

/// `test reg, reg` on a parameter register followed by `je`/`jz`
pub fn looks_like_null_guarded_entry(bytes: &[u8]) -> bool {
    match bytes {
        [0x48, 0x85, modrm, rest @ ..] if is_self_test(*modrm) => {
            matches!(rest, [0x0F, 0x84, ..] | [0x74, ..])
        }
        _ => false,
    }
}

/// ModRM of `test r, r` with both operands the same register
pub(crate) fn is_self_test(modrm: u8) -> bool {
    modrm & 0xC0 == 0xC0 && (modrm >> 3) & 0x7 == modrm & 0x7
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MockMemoryBuilder, Protection};

    #[test]
    fn test_prologue_shapes() {
        assert!(looks_like_prologue(&[0x55, 0x48, 0x8B, 0xEC]));
        assert!(looks_like_prologue(&[0x40, 0x53, 0x48, 0x83, 0xEC]));
        assert!(looks_like_prologue(&[0x48, 0x89, 0x5C, 0x24, 0x08]));
        assert!(looks_like_prologue(&[0x48, 0x83, 0xEC, 0x28]));
        assert!(!looks_like_prologue(&[0x48, 0x85, 0xD2, 0x0F, 0x84]));
        assert!(!looks_like_prologue(&[0xCC, 0xCC]));
        assert!(!looks_like_prologue(&[]));
    }

    #[test]
    fn test_null_guarded_entry() {
        assert!(looks_like_null_guarded_entry(&[0x48, 0x85, 0xD2, 0x0F, 0x84]));
        assert!(looks_like_null_guarded_entry(&[0x48, 0x85, 0xC9, 0x74, 0x10]));
        // test rcx, rdx is not a null test
        assert!(!looks_like_null_guarded_entry(&[0x48, 0x85, 0xD1, 0x74, 0x10]));
        assert!(!looks_like_null_guarded_entry(&[0x48, 0x85, 0xD2, 0x90, 0x90]));
    }

    #[test]
    fn test_function_validator_rejects_unmapped() {
        let memory = MockMemoryBuilder::new()
            .image(0x40_0000, vec![0x55; 0x100])
            .build();
        assert!(validate_function_pattern(&memory, 0x40_0000));
        assert!(!validate_function_pattern(&memory, 0x50_0000));
        // Straddles the end of the image.
        assert!(!validate_function_pattern(&memory, 0x40_00FE));
    }

    fn base_ctrl_memory(instance: u64, instance_protection: Protection) -> crate::memory::MockMemory {
        // mov rax, [rip+0x1000] at 0x40_0000 -> global at 0x40_1007
        let mut image = vec![0u8; 0x2000];
        image[..7].copy_from_slice(&[0x48, 0x8B, 0x05, 0x00, 0x10, 0x00, 0x00]);
        image[0x1007..0x100F].copy_from_slice(&instance.to_le_bytes());

        MockMemoryBuilder::new()
            .image(0x40_0000, image)
            .region(0x7000_0000, vec![0; 0x1000], instance_protection)
            .build()
    }

    #[test]
    fn test_base_ctrl_validator_accepts_live_pointer() {
        let memory = base_ctrl_memory(0x7000_0000, Protection::READ_WRITE);
        assert!(validate_base_ctrl_pattern(&memory, 0x40_0000));
    }

    #[test]
    fn test_base_ctrl_validator_rejects_bad_targets() {
        let null = base_ctrl_memory(0, Protection::READ_WRITE);
        assert!(!validate_base_ctrl_pattern(&null, 0x40_0000));

        let unmapped = base_ctrl_memory(0x6000_0000, Protection::READ_WRITE);
        assert!(!validate_base_ctrl_pattern(&unmapped, 0x40_0000));

        let no_access = base_ctrl_memory(0x7000_0000, Protection::NO_ACCESS);
        assert!(!validate_base_ctrl_pattern(&no_access, 0x40_0000));

        let kernel = base_ctrl_memory(0xFFFF_8000_0000_0000, Protection::READ_WRITE);
        assert!(!validate_base_ctrl_pattern(&kernel, 0x40_0000));
    }
}
