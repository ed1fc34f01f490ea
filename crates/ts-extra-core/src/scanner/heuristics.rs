//! Structural code-shape heuristics for the last-resort binary analysis.
//!
//! These checks are approximate and produce false positives. A function that
//! passes them is a guess, not a validated target.

use std::ops::RangeInclusive;

use super::validators::is_self_test;

/// Bytes of a candidate function body inspected by the heuristics
pub const BODY_WINDOW: usize = 0x80;

/// Struct-field displacements considered plausible for member access
pub const FIELD_OFFSET_RANGE: RangeInclusive<u32> = 0x8..=0x1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionShape {
    /// `test reg, reg` somewhere in the body
    pub null_check: bool,
    /// `[reg + disp]` memory operand with a displacement in [`FIELD_OFFSET_RANGE`]
    pub field_access: bool,
    /// Conditional jump followed later by a `ret`
    pub early_return: bool,
}

impl FunctionShape {
    /// All heuristics hold
    pub fn is_candidate(&self) -> bool {
        self.null_check && self.field_access && self.early_return
    }
}

pub fn analyze_function_shape(body: &[u8]) -> FunctionShape {
    let body = &body[..body.len().min(BODY_WINDOW)];
    let mut shape = FunctionShape::default();
    let mut conditional_jump_at: Option<usize> = None;

    for i in 0..body.len() {
        let rest = &body[i..];

        if !shape.null_check && is_null_test(rest) {
            shape.null_check = true;
        }
        if !shape.field_access && is_field_access(rest) {
            shape.field_access = true;
        }
        if conditional_jump_at.is_none() && is_conditional_jump(rest) {
            conditional_jump_at = Some(i);
        }
        if let Some(jump) = conditional_jump_at {
            if i > jump && rest.first() == Some(&0xC3) {
                shape.early_return = true;
            }
        }
    }

    shape
}

fn is_rex_w(byte: u8) -> bool {
    (0x48..=0x4F).contains(&byte)
}

fn is_null_test(bytes: &[u8]) -> bool {
    matches!(bytes, [rex, 0x85, modrm, ..] if is_rex_w(*rex) && is_self_test(*modrm))
}

/// `mov`/`lea`/`cmp` family with a base+displacement memory operand
fn is_field_access(bytes: &[u8]) -> bool {
    let [rex, opcode, modrm, rest @ ..] = bytes else {
        return false;
    };
    if !is_rex_w(*rex) || !matches!(opcode, 0x8B | 0x89 | 0x8D | 0x83 | 0x39 | 0x3B) {
        return false;
    }
    // rm == 100 needs a SIB byte; skip those encodings.
    if modrm & 0x7 == 0x4 {
        return false;
    }

    let displacement = match (modrm & 0xC0, rest) {
        (0x40, [disp8, ..]) => *disp8 as i8 as i64,
        (0x80, [a, b, c, d, ..]) => i32::from_le_bytes([*a, *b, *c, *d]) as i64,
        _ => return false,
    };

    u32::try_from(displacement).is_ok_and(|disp| FIELD_OFFSET_RANGE.contains(&disp))
}

fn is_conditional_jump(bytes: &[u8]) -> bool {
    matches!(bytes, [0x74 | 0x75, ..] | [0x0F, 0x84 | 0x85, ..])
}
