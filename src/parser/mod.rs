//! Parser core: the sum-type parser value, its evaluation model, and the
//! combinator/leaf/decoder constructors built on top of it.
//!
//! Per spec.md §9's redesign note, parsers are represented as a sum type
//! over concrete variants rather than a class hierarchy with runtime
//! `isinstance` checks. A [`Parser`] is an immutable, cheaply-cloned value
//! (an `Rc`-shared [`Kind`] plus its own label/address), and evaluating a
//! parser tree is a single recursive match over `Kind` — directly
//! analogous to how `h263-rs` walks its own (much smaller) fixed parser
//! grammar, but data-driven instead of hand-coded per bitstream element.

mod combinators;
mod decode;
mod leaf;

pub use combinators::*;
pub use decode::*;
pub use leaf::*;

use std::io::Read;
use std::rc::Rc;

use log::trace;

use crate::context::ContextStack;
use crate::error::{Error, ErrorKind, Result};
use crate::manager::{AddrMode, AddrType, DataManager};
use crate::value::{Map, Value};

/// The structural payload of a [`Parser`]. Never constructed directly by
/// callers — use the constructor functions in [`leaf`], [`combinators`],
/// and [`decode`].
pub(crate) enum Kind {
    Byte,
    Bytes(u64),
    VarBytes(String),
    PadToAddress(u64),
    Remnant,
    Bit,
    BitWord(u64),
    Failure,
    Block {
        children: Vec<Parser>,
        mode: AddrType,
    },
    Section {
        body: Vec<Parser>,
        mode: AddrType,
        optional: bool,
    },
    Translator {
        inner: Parser,
        f: Rc<dyn Fn(Value) -> Result<Value>>,
        /// Overrides the backup label used when the translator itself (not
        /// its inner parser) is left unlabeled — the Rust realization of
        /// spec.md §4.9's Modifier "backup-label override."
        backup_label: Option<String>,
    },
    Const {
        inner: Parser,
        expected: Value,
    },
    Repeat {
        inner: Parser,
        count: Count,
    },
    Array {
        inner: Parser,
        count: Count,
    },
}

impl Kind {
    fn backup_label(&self) -> &str {
        match self {
            Kind::Byte => "Byte",
            Kind::Bytes(_) => "Bytes",
            Kind::VarBytes(_) => "VarBytes",
            Kind::PadToAddress(_) => "PadToAddress",
            Kind::Remnant => "Remnant",
            Kind::Bit => "Bit",
            Kind::BitWord(_) => "BitWord",
            Kind::Failure => "Failure",
            Kind::Block { .. } => "Block",
            Kind::Section { optional: true, .. } => "Optional",
            Kind::Section { .. } => "Section",
            Kind::Translator { backup_label, .. } => backup_label.as_deref().unwrap_or("Translator"),
            Kind::Const { .. } => "Const",
            Kind::Repeat { .. } => "Repeat",
            Kind::Array { .. } => "Array",
        }
    }
}

/// How many times a [`Repeat`]/[`Array`] runs its inner parser.
pub(crate) enum Count {
    Fixed(u64),
    FromContext(String),
}

/// What a parser's raw `read` produced, before the generic evaluation step
/// decides whether (and under what key) to store it.
enum ReadOutcome {
    /// A value to be stored under the parser's effective label.
    Value(Value),
    /// Already handled (e.g. a merged `Section`, or a no-op `PadToAddress`);
    /// nothing further to store.
    Success,
    /// An enclosing revertible scope swallowed a recoverable failure from
    /// this subtree; nothing was stored and nothing should be.
    Reverted,
}

/// An immutable node in a parser tree: a structural [`Kind`] plus an
/// optional output label and an optional target address. Cloning a
/// `Parser` is an `Rc` bump, not a deep copy, so `at`/`labeled`/etc. can
/// return modified copies cheaply.
#[derive(Clone)]
pub struct Parser {
    kind: Rc<Kind>,
    label: Option<String>,
    address: Option<u64>,
}

impl Parser {
    fn from_kind(kind: Kind) -> Parser {
        Parser {
            kind: Rc::new(kind),
            label: None,
            address: None,
        }
    }

    /// `P @ n`: a copy of `P` targeting absolute address `n`.
    pub fn at(&self, addr: u64) -> Parser {
        Parser {
            kind: self.kind.clone(),
            label: self.label.clone(),
            address: Some(addr),
        }
    }

    /// `P >> "k"`: a copy of `P` labeled `"k"`.
    pub fn labeled(&self, name: impl Into<String>) -> Parser {
        Parser {
            kind: self.kind.clone(),
            label: Some(name.into()),
            address: self.address,
        }
    }

    /// `P[n]`: an `Array` of `n` iterations of `P`.
    pub fn array(&self, n: u64) -> Parser {
        Parser::from_kind(Kind::Array {
            inner: self.clone(),
            count: Count::Fixed(n),
        })
    }

    /// An `Array` whose count is resolved from a context key at parse time.
    pub fn array_from(&self, key: impl Into<String>) -> Parser {
        Parser::from_kind(Kind::Array {
            inner: self.clone(),
            count: Count::FromContext(key.into()),
        })
    }

    /// `P * n`: a `Repeat` of `n` iterations of `P`.
    pub fn repeat(&self, n: u64) -> Parser {
        Parser::from_kind(Kind::Repeat {
            inner: self.clone(),
            count: Count::Fixed(n),
        })
    }

    /// A `Repeat` whose count is resolved from a context key at parse time.
    pub fn repeat_from(&self, key: impl Into<String>) -> Parser {
        Parser::from_kind(Kind::Repeat {
            inner: self.clone(),
            count: Count::FromContext(key.into()),
        })
    }

    /// Wraps `self` with a post-read pure function.
    pub fn translate(&self, f: impl Fn(Value) -> Result<Value> + 'static) -> Parser {
        Parser::from_kind(Kind::Translator {
            inner: self.clone(),
            f: Rc::new(f),
            backup_label: None,
        })
    }

    /// Like [`Parser::translate`], but also overrides the backup label used
    /// when the resulting parser is itself left unlabeled.
    pub fn named_translate(&self, backup_label: impl Into<String>, f: impl Fn(Value) -> Result<Value> + 'static) -> Parser {
        Parser::from_kind(Kind::Translator {
            inner: self.clone(),
            f: Rc::new(f),
            backup_label: Some(backup_label.into()),
        })
    }

    /// Runs `self`, failing *mismatch* unless the translated value equals
    /// `expected`.
    pub fn constant(&self, expected: Value) -> Parser {
        Parser::from_kind(Kind::Const {
            inner: self.clone(),
            expected,
        })
    }

    /// Applies this parser tree to a fully-buffered byte source.
    pub fn parse_bytes(&self, data: Vec<u8>, mode: AddrMode) -> Result<Map> {
        let dm = DataManager::from_bytes(data, mode);
        let mut stack = ContextStack::new();
        self.run_as_root(&dm, &mut stack)
    }

    /// Applies this parser tree to a streaming byte source.
    pub fn parse_reader(&self, source: impl Read + 'static, mode: AddrMode) -> Result<Map> {
        let dm = DataManager::from_reader(source, mode);
        let mut stack = ContextStack::new();
        self.run_as_root(&dm, &mut stack)
    }

    /// The root evaluation: a `Block`/`Section` result is returned as the
    /// top-level map directly (no extra wrapper key); any other value is
    /// stored once under this parser's effective label, matching how the
    /// same parser would be stored as a field inside an enclosing `Block`.
    fn run_as_root(&self, dm: &DataManager, stack: &mut ContextStack) -> Result<Map> {
        if let Some(addr) = self.address {
            emit_spacer(dm, stack, addr)?;
        }
        let pre_addr = dm.address();
        match self.read(dm, stack)? {
            ReadOutcome::Value(Value::Map(m)) => Ok(m),
            ReadOutcome::Value(v) => {
                let mut m = Map::new();
                m.insert_deduped(&self.effective_label(pre_addr), v);
                Ok(m)
            }
            ReadOutcome::Success | ReadOutcome::Reverted => Ok(Map::new()),
        }
    }

    /// The generic evaluation step (`goto_addr_and_read`): synthesizes a
    /// spacer if a target address is set, delegates to `read`, then stores
    /// the result under this parser's effective label.
    fn goto_addr_and_read(&self, dm: &DataManager, stack: &mut ContextStack) -> Result<()> {
        if let Some(addr) = self.address {
            emit_spacer(dm, stack, addr)?;
        }
        let pre_addr = dm.address();
        match self.read(dm, stack)? {
            ReadOutcome::Success | ReadOutcome::Reverted => Ok(()),
            ReadOutcome::Value(v) => {
                let key = self.effective_label(pre_addr);
                stack.current_mut().set(&key, v);
                Ok(())
            }
        }
    }

    fn effective_label(&self, addr: u64) -> String {
        match &self.label {
            Some(l) => l.clone(),
            None => format!("{}_{:#x}", self.kind.backup_label(), addr),
        }
    }

    /// The raw read: produces a value (or sentinel) without storing it.
    /// Combinators call this directly on their children when they intend to
    /// handle storage themselves (`Const`, `Translator`, `Array`); plain
    /// sequencing (`Block`, `Section`, `Repeat`) instead calls
    /// `goto_addr_and_read` on each child so spacers/labels apply normally.
    fn read(&self, dm: &DataManager, stack: &mut ContextStack) -> Result<ReadOutcome> {
        self.read_impl(dm, stack)
            .map_err(|e| e.annotate_if_empty(self.label.as_deref(), self.address, dm.cursor()))
    }

    fn read_impl(&self, dm: &DataManager, stack: &mut ContextStack) -> Result<ReadOutcome> {
        match &*self.kind {
            Kind::Byte => Ok(ReadOutcome::Value(Value::Bytes(dm.read_bytes(Some(1))?))),
            Kind::Bytes(n) => Ok(ReadOutcome::Value(Value::Bytes(dm.read_bytes(Some(*n))?))),
            Kind::VarBytes(key) => {
                let n = stack
                    .lookup(key)
                    .and_then(Value::as_u64)
                    .ok_or_else(|| Error::new(ErrorKind::State))?;
                Ok(ReadOutcome::Value(Value::Bytes(dm.read_bytes(Some(n))?)))
            }
            Kind::PadToAddress(target) => {
                emit_spacer(dm, stack, *target)?;
                Ok(ReadOutcome::Success)
            }
            Kind::Remnant => {
                let bytes = match dm.mode() {
                    AddrMode::Bit => dm.read_bits(None)?.to_bytes(),
                    AddrMode::Byte | AddrMode::ByteStrict => dm.read_bytes(None)?,
                };
                Ok(ReadOutcome::Value(Value::Bytes(bytes)))
            }
            Kind::Bit => {
                let bits = dm.read_bits(Some(1))?;
                Ok(ReadOutcome::Value(Value::Bool(bits.get(0)?)))
            }
            Kind::BitWord(n) => Ok(ReadOutcome::Value(Value::Bits(dm.read_bits(Some(*n))?))),
            Kind::Failure => Err(Error::new(ErrorKind::Mismatch)),
            Kind::Block { children, mode } => self.read_block(dm, stack, children, *mode),
            Kind::Section { body, mode, optional } => self.read_section(dm, stack, body, *mode, *optional),
            Kind::Translator { inner, f, .. } => match inner.read(dm, stack)? {
                ReadOutcome::Value(v) => Ok(ReadOutcome::Value(f(v)?)),
                other => Ok(other),
            },
            Kind::Const { inner, expected } => match inner.read(dm, stack)? {
                ReadOutcome::Value(v) => {
                    if &v == expected {
                        Ok(ReadOutcome::Value(v))
                    } else {
                        Err(Error::new(ErrorKind::Mismatch))
                    }
                }
                other => Ok(other),
            },
            Kind::Repeat { inner, count } => {
                let n = resolve_count(count, stack)?;
                stack.current_mut().new_child();
                let mut failure = None;
                for _ in 0..n {
                    if let Err(e) = inner.goto_addr_and_read(dm, stack) {
                        failure = Some(e);
                        break;
                    }
                }
                match failure {
                    None => {
                        stack.current_mut().update_ext()?;
                        Ok(ReadOutcome::Success)
                    }
                    Some(e) => {
                        stack.current_mut().discard_child();
                        Err(e)
                    }
                }
            }
            Kind::Array { inner, count } => {
                let n = resolve_count(count, stack)?;
                let mut items = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    match try_revertible(dm, |child_dm| inner.read(child_dm, stack))? {
                        Some(ReadOutcome::Value(v)) => items.push(v),
                        Some(_) | None => items.push(Value::Map(Map::new())),
                    }
                }
                Ok(ReadOutcome::Value(Value::List(items)))
            }
        }
    }

    fn read_block(&self, dm: &DataManager, stack: &mut ContextStack, children: &[Parser], mode: AddrType) -> Result<ReadOutcome> {
        let scope = dm.make_child(true, mode, false)?;
        let mut block_stack = stack.enter_block();
        let mut failure = None;
        for child in children {
            if let Err(e) = child.goto_addr_and_read(scope.manager(), &mut block_stack) {
                failure = Some(e);
                break;
            }
        }
        scope.finish(match &failure {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        })?;
        Ok(ReadOutcome::Value(Value::Map(block_stack.into_current().dict())))
    }

    fn read_section(
        &self,
        dm: &DataManager,
        stack: &mut ContextStack,
        body: &[Parser],
        mode: AddrType,
        optional: bool,
    ) -> Result<ReadOutcome> {
        let scope = dm.make_child(true, mode, optional)?;
        stack.current_mut().new_child();
        let mut failure = None;
        for child in body {
            if let Err(e) = child.goto_addr_and_read(scope.manager(), stack) {
                failure = Some(e);
                break;
            }
        }
        let outcome = match &failure {
            None => Ok(()),
            Some(e) => Err(e.clone()),
        };
        match scope.finish(outcome) {
            Ok(()) => {
                if failure.is_some() {
                    trace!("section reverted, discarding scratch context layer");
                    stack.current_mut().discard_child();
                    Ok(ReadOutcome::Reverted)
                } else {
                    stack.current_mut().update_ext()?;
                    Ok(ReadOutcome::Success)
                }
            }
            Err(e) => {
                stack.current_mut().discard_child();
                Err(e)
            }
        }
    }
}

fn resolve_count(count: &Count, stack: &ContextStack) -> Result<u64> {
    match count {
        Count::Fixed(n) => Ok(*n),
        Count::FromContext(key) => stack
            .lookup(key)
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::new(ErrorKind::State)),
    }
}

/// Runs `f` inside a fresh revertible child scope of `dm`: a recoverable
/// failure is suppressed (returning `Ok(None)`) and the cursor reverts; any
/// other outcome propagates, or is returned as `Ok(Some(_))` on success.
fn try_revertible<T>(dm: &DataManager, f: impl FnOnce(&DataManager) -> Result<T>) -> Result<Option<T>> {
    let scope = dm.make_child(true, AddrType::Parent, true)?;
    let result = f(scope.manager());
    let to_finish = match &result {
        Ok(_) => Ok(()),
        Err(e) => Err(e.clone()),
    };
    scope.finish(to_finish)?;
    Ok(result.ok())
}

/// Synthesizes a spacer from the current cursor to `target`, storing it
/// under `"spacer_<hex(c)>"` (single unit) or `"spacer_<hex(c)>-<hex(t-1)>"`
/// (multiple units). A zero-length spacer is a no-op.
fn emit_spacer(dm: &DataManager, stack: &mut ContextStack, target: u64) -> Result<()> {
    let c = dm.address();
    if c > target {
        return Err(Error::new(ErrorKind::AddressOverrun));
    }
    let units = target - c;
    if units == 0 {
        return Ok(());
    }

    let value = match dm.mode() {
        AddrMode::Bit => Value::Bits(dm.read_bits(Some(units))?),
        AddrMode::Byte | AddrMode::ByteStrict => Value::Bytes(dm.read_bytes(Some(units))?),
    };
    let label = if units == 1 {
        format!("spacer_{:#x}", c)
    } else {
        format!("spacer_{:#x}-{:#x}", c, target - 1)
    };
    stack.current_mut().set(&label, value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeat_sequences_inner_and_merges_labels_with_dedup() {
        let format = block(vec![byte().labeled("rep").repeat(3)]);
        let result = format.parse_bytes(vec![0x01, 0x02, 0x03], AddrMode::Byte).unwrap();
        assert_eq!(result.get("rep"), Some(&Value::Bytes(vec![0x01])));
        assert_eq!(result.get("rep 1"), Some(&Value::Bytes(vec![0x02])));
        assert_eq!(result.get("rep 2"), Some(&Value::Bytes(vec![0x03])));
    }

    #[test]
    fn array_collects_raw_values_as_a_list() {
        let format = block(vec![byte().array(3).labeled("items")]);
        let result = format.parse_bytes(vec![0x01, 0x02, 0x03], AddrMode::Byte).unwrap();
        match result.get("items").unwrap() {
            Value::List(items) => {
                assert_eq!(items.len(), 3);
                assert_eq!(items[0], Value::Bytes(vec![0x01]));
                assert_eq!(items[2], Value::Bytes(vec![0x03]));
            }
            other => panic!("unexpected value: {:?}", other),
        }
    }

    #[test]
    fn const_succeeds_on_match_and_fails_mismatch() {
        let ok = byte().constant(Value::Bytes(vec![0x2A]));
        let result = ok.parse_bytes(vec![0x2A], AddrMode::Byte).unwrap();
        assert_eq!(result.get("Const_0x0"), Some(&Value::Bytes(vec![0x2A])));

        let bad = byte().constant(Value::Bytes(vec![0x2A]));
        let err = bad.parse_bytes(vec![0x00], AddrMode::Byte).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Mismatch);
    }

    #[test]
    fn repeat_inside_optional_revert_leaves_no_residue() {
        // Reproduces the scratch-layer leak: the Section's own layer holds
        // "pre" when its nested Repeat fails partway through, orphaning the
        // Repeat's own layer on top of it. Reverting the Section must leave
        // the output map exactly as it was before entry — empty here.
        let format = optional(vec![byte().labeled("pre"), byte().labeled("rep").repeat(5)]);
        let result = format.parse_bytes(vec![1, 2, 3], AddrMode::Byte).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn array_of_repeat_reverts_without_leaking_context_layer() {
        // A single Array iteration whose inner Repeat fails partway must not
        // leave its scratch context layer (holding the partial reads)
        // behind in the enclosing Block's context once the iteration
        // reverts to an empty placeholder entry.
        let inner = byte().labeled("v").repeat(5);
        let format = block(vec![inner.array(1).labeled("items")]);
        let result = format.parse_bytes(vec![0x01, 0x02], AddrMode::Byte).unwrap();

        match result.get("items").unwrap() {
            Value::List(items) => {
                assert_eq!(items.len(), 1);
                assert_eq!(items[0], Value::Map(Map::new()));
            }
            other => panic!("unexpected value: {:?}", other),
        }
        assert_eq!(
            result.len(),
            1,
            "no orphaned Repeat keys should leak into the block's context"
        );
    }
}
