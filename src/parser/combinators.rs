//! Structural combinators: `Block`, `Section`/`Optional`, `Repeat`, `Array`.
//! See spec.md §4.7–§4.9 for their evaluation semantics; the actual
//! recursion lives in [`super::Parser::read`] since every combinator is a
//! variant of the same `Kind` sum type.

use super::{Kind, Parser};
use crate::manager::AddrType;

/// A sequence of child parsers evaluated against a fresh, relative child
/// scope and a fresh child `Context`: its result is a `Map` keyed by each
/// child's effective label.
pub fn block(children: Vec<Parser>) -> Parser {
    block_with_mode(children, AddrType::Parent)
}

/// Like [`block`], but the child scope uses `mode` instead of inheriting
/// the parent's addressing mode — the only way to enter `AddrType::Bit`
/// addressing from a byte-mode parent.
pub fn block_with_mode(children: Vec<Parser>, mode: AddrType) -> Parser {
    Parser::from_kind(Kind::Block { children, mode })
}

/// Like [`block`], but merges its results into the *enclosing* context
/// instead of producing a nested map, and its scope is not revertible: a
/// failing child still propagates.
pub fn section(body: Vec<Parser>) -> Parser {
    section_with_mode(body, AddrType::Parent, false)
}

pub fn section_with_mode(body: Vec<Parser>, mode: AddrType) -> Parser {
    Parser::from_kind(Kind::Section {
        body,
        mode,
        optional: false,
    })
}

/// Sugar for `Section` with a revertible scope: if any child recoverably
/// fails, the whole body's reads and context writes are discarded and the
/// combinator produces no keys at all, instead of propagating the failure.
pub fn optional(body: Vec<Parser>) -> Parser {
    optional_with_mode(body, AddrType::Parent)
}

pub fn optional_with_mode(body: Vec<Parser>, mode: AddrType) -> Parser {
    Parser::from_kind(Kind::Section {
        body,
        mode,
        optional: true,
    })
}
