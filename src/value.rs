//! The decoded result tree: an ordered, string-keyed map of [`Value`]s.
//!
//! `Map` preserves insertion order (the same guarantee CPython's `dict` gives
//! the original parser this engine is modeled on), so that repeated parses of
//! the same input always print their spacer and field keys in the same,
//! readable, left-to-right order.

use std::fmt;

use crate::bitbuffer::BitBuffer;

/// A 16-byte UUID, stored in its canonical (big-endian / RFC 4122 textual)
/// byte order regardless of which word order it was read from the wire in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Uuid([u8; 16]);

impl Uuid {
    /// Interprets 16 bytes already in canonical (big-endian word) order.
    pub fn from_bytes_be(bytes: [u8; 16]) -> Self {
        Uuid(bytes)
    }

    /// Interprets 16 bytes whose first three RFC 4122 fields
    /// (`time_low`, `time_mid`, `time_hi_and_version`) were written in
    /// little-endian word order, as `UuidL` requires.
    pub fn from_bytes_le(bytes: [u8; 16]) -> Self {
        let mut out = bytes;
        out[0..4].reverse();
        out[4..6].reverse();
        out[6..8].reverse();
        Uuid(out)
    }

    /// The canonical big-endian byte representation.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.0;
        write!(
            f,
            "{:02x}{:02x}{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7], b[8], b[9], b[10], b[11], b[12], b[13], b[14], b[15]
        )
    }
}

/// A decoded value stored in the result tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Raw bytes, as produced by `Byte`, `Bytes(n)`, `Remnant`, spacers, etc.
    Bytes(Vec<u8>),
    /// A raw bit-string, as produced by `BitWord(n)` before translation.
    Bits(BitBuffer),
    /// A single bit, as produced by `Bit`.
    Bool(bool),
    /// A decoded sequence of bits, as produced by `BitFlags`.
    Bools(Vec<bool>),
    /// An unsigned integer, any width up to 64 bits.
    UInt(u64),
    /// A signed integer, any width up to 64 bits.
    SInt(i64),
    /// An IEEE-754 binary32 value.
    Float32(f32),
    /// An IEEE-754 binary64 value.
    Float64(f64),
    /// An RFC 4122 UUID.
    Uuid(Uuid),
    /// The output of a `Block` or `Section`.
    Map(Map),
    /// The output of an `Array`.
    List(Vec<Value>),
}

impl Value {
    /// Returns the inner map if this value is a `Map`.
    pub fn as_map(&self) -> Option<&Map> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Returns the inner `u64` for integer-shaped values, widening as needed.
    /// Used by `VarBytes` and `Repeat`/`Array` counts resolved from context.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::SInt(v) if *v >= 0 => Some(*v as u64),
            Value::Bits(b) => b.to_uint().ok().map(|v| v as u64),
            _ => None,
        }
    }
}

/// An ordered, string-keyed map with "first available `" N"` suffix"
/// deduplication on insert, per the dedup rule in spec.md §4.4.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Map {
    entries: Vec<(String, Value)>,
}

impl Map {
    /// An empty map.
    pub fn new() -> Self {
        Map {
            entries: Vec::new(),
        }
    }

    /// The number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether this map has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up a value by exact key (no dedup-suffix guessing).
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn contains(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Inserts `value` under a key derived from `name`, deduplicated against
    /// keys already present: if `name` collides, appends `" N"` for the
    /// lowest `N` that is free. Returns the key actually used.
    ///
    /// If the last whitespace-separated token of `name` already parses as an
    /// integer, `name` is treated as pre-suffixed: the numeric tail is taken
    /// as the starting `N` and the search continues from there, per spec.md
    /// §4.4.
    pub fn insert_deduped(&mut self, name: &str, value: Value) -> String {
        let (base, mut n) = match name.rsplit_once(' ') {
            Some((base, tail)) if tail.parse::<u64>().is_ok() => {
                (base.to_string(), tail.parse::<u64>().unwrap())
            }
            _ => (name.to_string(), 1),
        };

        let mut candidate = if n == 1 && !self.contains(name) {
            name.to_string()
        } else {
            format!("{} {}", base, n)
        };

        while self.contains(&candidate) {
            n += 1;
            candidate = format!("{} {}", base, n);
        }

        self.entries.push((candidate.clone(), value));
        candidate
    }

    /// Merges `other` into `self`, applying [`Map::insert_deduped`] per key
    /// in `other`'s insertion order.
    pub fn merge_deduped(&mut self, other: Map) {
        for (k, v) in other.entries {
            self.insert_deduped(&k, v);
        }
    }
}
