//! Source sanitizer (C1).
//!
//! Strips anything that isn't one of the eight instruction bytes. Comments,
//! whitespace, and any embedded commentary are just noise to the rest of
//! the pipeline.

const INSTRUCTION_BYTES: &[u8] = b"+-<>.,[]";

/// Returns true if `byte` is one of the eight Brainfuck instruction bytes.
#[inline]
pub fn is_instruction_byte(byte: u8) -> bool {
    INSTRUCTION_BYTES.contains(&byte)
}

/// Strips all non-instruction bytes from `source`, preserving order.
pub fn sanitize(source: &str) -> String {
    source.bytes().filter(|b| is_instruction_byte(*b)).map(|b| b as char).collect()
}
