//! Loop-shape recognizer (C3).
//!
//! Inspects sanitized source starting at a `[` and tries, in priority
//! order, to match a clear-loop, a scan-loop, or a copy/multiply-loop.
//! Grounded on `original_source/interp.py`'s `_is_clearloop` /
//! `_is_scanloop` / `_is_copyloop`, reworked to drop an off-by-one
//! end-of-source quirk in the Python original, which spuriously rejects a
//! copy-loop that ends exactly at the last byte of the source.

use super::instruction::{CopyTable, Instruction};

/// A recognized loop shape: the instruction(s) to emit and how many source
/// bytes (including the brackets) were consumed.
pub struct Recognized {
    pub instructions: Vec<Instruction>,
    pub consumed: usize,
}

/// Tries each loop-shape recognizer in priority order. `code[start]` must be
/// `[`. `ptr_drift` is the pending pointer offset accumulated by the
/// assembler, folded into the emitted instruction(s).
pub fn recognize(code: &[u8], start: usize, ptr_drift: i32) -> Option<Recognized> {
    debug_assert_eq!(code.get(start), Some(&b'['));

    try_clear_loop(code, start, ptr_drift)
        .or_else(|| try_scan_loop(code, start, ptr_drift))
        .or_else(|| try_copy_loop(code, start, ptr_drift))
}

fn window3(code: &[u8], start: usize) -> Option<[u8; 3]> {
    if start + 3 > code.len() {
        return None;
    }
    Some([code[start], code[start + 1], code[start + 2]])
}

fn try_clear_loop(code: &[u8], start: usize, ptr_drift: i32) -> Option<Recognized> {
    match window3(code, start)? {
        [b'[', b'-', b']'] | [b'[', b'+', b']'] => Some(Recognized {
            instructions: vec![Instruction::clear(ptr_drift)],
            consumed: 3,
        }),
        _ => None,
    }
}

fn try_scan_loop(code: &[u8], start: usize, ptr_drift: i32) -> Option<Recognized> {
    match window3(code, start)? {
        [b'[', b'>', b']'] => Some(Recognized {
            instructions: vec![Instruction::scan_r(ptr_drift)],
            consumed: 3,
        }),
        [b'[', b'<', b']'] => Some(Recognized {
            instructions: vec![Instruction::scan_l(ptr_drift)],
            consumed: 3,
        }),
        _ => None,
    }
}

/// Matches `[ - (>+...+)+ (<)+ ]`.
fn try_copy_loop(code: &[u8], start: usize, ptr_drift: i32) -> Option<Recognized> {
    if code.get(start + 1) != Some(&b'-') {
        return None;
    }

    let mut i = start + 2;
    let mut depth: i32 = 0;
    let mut mult: u32 = 0;
    let mut table: CopyTable = CopyTable::new();

    loop {
        match code.get(i)? {
            b'>' => {
                if mult > 0 {
                    table.push((depth, mult as u8));
                    mult = 0;
                }
                depth += 1;
                i += 1;
            }
            b'<' => {
                if mult > 0 {
                    table.push((depth, mult as u8));
                    mult = 0;
                }
                break;
            }
            b'+' => {
                mult += 1;
                i += 1;
            }
            _ => return None,
        }
    }

    if table.is_empty() || depth == 0 {
        return None;
    }

    // The return path must be exactly `depth` lefts bringing us back to
    // the anchor, immediately followed by `]`.
    let mut remaining = depth;
    while remaining > 0 {
        if code.get(i) != Some(&b'<') {
            return None;
        }
        remaining -= 1;
        i += 1;
    }

    if code.get(i) != Some(&b']') {
        return None;
    }
    i += 1;

    Some(Recognized {
        instructions: vec![Instruction::copy(ptr_drift, table)],
        consumed: i - start,
    })
}
