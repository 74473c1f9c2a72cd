//! Bare leaf parsers: the primitives that actually consume bits or bytes,
//! per spec.md §4.10. Every decoder in [`crate::parser::decode`] is built by
//! layering a `translate` on top of one of these.

use super::{Kind, Parser};

/// Reads exactly one byte.
pub fn byte() -> Parser {
    Parser::from_kind(Kind::Byte)
}

/// Reads `n` bytes.
pub fn bytes(n: u64) -> Parser {
    Parser::from_kind(Kind::Bytes(n))
}

/// Reads a byte count resolved from a previously-stored context key — the
/// usual way to parse a length-prefixed payload.
pub fn var_bytes(length_key: impl Into<String>) -> Parser {
    Parser::from_kind(Kind::VarBytes(length_key.into()))
}

/// Reads and discards bytes up to `addr`, storing them as a spacer entry.
/// Identical to the implicit spacer synthesized by `P @ addr`, but usable
/// as a standalone parser in its own right.
pub fn pad_to_address(addr: u64) -> Parser {
    Parser::from_kind(Kind::PadToAddress(addr))
}

/// Reads everything remaining in the current scope.
pub fn remnant() -> Parser {
    Parser::from_kind(Kind::Remnant)
}

/// Reads a single bit as a `bool`.
pub fn bit() -> Parser {
    Parser::from_kind(Kind::Bit)
}

/// Reads `n` bits as a raw [`crate::bitbuffer::BitBuffer`].
pub fn bit_word(n: u64) -> Parser {
    Parser::from_kind(Kind::BitWord(n))
}

/// Always fails with a recoverable mismatch, consuming nothing. Useful as
/// the body of an `Optional` that should never actually match, or as a
/// placeholder while a parser tree is under construction.
pub fn failure() -> Parser {
    Parser::from_kind(Kind::Failure)
}
