//! The parser-facing cursor over a shared [`DataBuffer`].
//!
//! `DataManager` generalizes `h263-rs`'s `H263Reader::checkpoint`/`rollback`/
//! `with_transaction` trio from a single linear bitstream position into a
//! tree of nested scopes: each scope owns its own cursor and base, shares
//! the root's buffer through an `Rc<RefCell<_>>`, and either commits its
//! cursor upward or reverts without disturbing its parent, exactly the way
//! `with_transaction` snapshots a checkpoint and rolls back on `Err`.
//!
//! Only one scope in a branch of the tree is usable at a time: creating a
//! child sets the parent's has-child guard, and `Scope::finish` clears it
//! again on the way out. Rust's ownership of the returned [`Scope`] already
//! prevents using a manager whose own scope has ended, so that half of
//! spec.md's guard rule ("used outside its scope") falls out of the type
//! system for free; the has-child half still needs an explicit runtime
//! check, since siblings and parent share the same `&DataManager`.

use std::cell::{Cell, RefCell};
use std::io::Read;
use std::rc::Rc;

use crate::bitbuffer::BitBuffer;
use crate::buffer::DataBuffer;
use crate::error::{Error, ErrorKind, Result};

/// How a manager's cursor/base pair is exposed as an address, and how reads
/// without an explicit bit/byte count are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrMode {
    Bit,
    Byte,
    /// Behaves like [`AddrMode::Byte`], but additionally asserts that the
    /// cursor is 8-aligned at scope entry.
    ByteStrict,
}

/// The addressing mode requested when creating a child scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddrType {
    Bit,
    Byte,
    ByteStrict,
    /// Inherit the parent's mode unchanged.
    Parent,
}

/// What a `read` call returns, dispatched on the manager's [`AddrMode`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Bits(BitBuffer),
    Bytes(Vec<u8>),
}

/// A node in the tree of nested parsing scopes.
pub struct DataManager {
    buffer: Rc<RefCell<DataBuffer>>,
    cursor: Cell<u64>,
    base: u64,
    mode: AddrMode,
    revertible: bool,
    trim_safe: bool,
    has_child: Cell<bool>,
}

impl DataManager {
    /// A root manager over a fully-buffered byte source.
    pub fn from_bytes(data: Vec<u8>, mode: AddrMode) -> Self {
        DataManager {
            buffer: Rc::new(RefCell::new(DataBuffer::from_bytes(data))),
            cursor: Cell::new(0),
            base: 0,
            mode,
            revertible: false,
            trim_safe: true,
            has_child: Cell::new(false),
        }
    }

    /// A root manager over a streaming byte source.
    pub fn from_reader(source: impl Read + 'static, mode: AddrMode) -> Self {
        DataManager {
            buffer: Rc::new(RefCell::new(DataBuffer::from_reader(source))),
            cursor: Cell::new(0),
            base: 0,
            mode,
            revertible: false,
            trim_safe: true,
            has_child: Cell::new(false),
        }
    }

    /// The address exposed to the parser currently holding this manager:
    /// `cursor - base`, in bits or bytes per [`AddrMode`].
    pub fn address(&self) -> u64 {
        let delta = self.cursor.get() - self.base;
        match self.mode {
            AddrMode::Bit => delta,
            AddrMode::Byte | AddrMode::ByteStrict => delta / 8,
        }
    }

    /// The manager's addressing mode.
    pub fn mode(&self) -> AddrMode {
        self.mode
    }

    /// The manager's absolute cursor position, in bits.
    pub fn cursor(&self) -> u64 {
        self.cursor.get()
    }

    /// Reads `n` bits (or, if `None`, everything through the current upper
    /// bound) and advances the cursor.
    pub fn read_bits(&self, n: Option<u64>) -> Result<BitBuffer> {
        self.guard()?;
        let start = self.cursor.get();
        let (view, next) = self.buffer.borrow_mut().get_data(start, n)?;
        self.cursor.set(next);
        if self.trim_safe {
            self.buffer.borrow_mut().trim(next);
        }
        Ok(view)
    }

    /// Reads `n` bytes (or, if `None`, everything remaining) and advances
    /// the cursor.
    pub fn read_bytes(&self, n: Option<u64>) -> Result<Vec<u8>> {
        let view = self.read_bits(n.map(|b| b * 8))?;
        Ok(view.to_bytes())
    }

    /// Dispatches to [`DataManager::read_bits`] or [`DataManager::read_bytes`]
    /// per [`AddrMode`].
    pub fn read(&self, n: Option<u64>) -> Result<ReadResult> {
        match self.mode {
            AddrMode::Bit => Ok(ReadResult::Bits(self.read_bits(n)?)),
            AddrMode::Byte | AddrMode::ByteStrict => Ok(ReadResult::Bytes(self.read_bytes(n)?)),
        }
    }

    /// Creates a child scope. See spec.md §4.3 for the full construction
    /// rules this enforces.
    pub fn make_child(&self, relative: bool, addr_type: AddrType, revertible: bool) -> Result<Scope<'_>> {
        self.guard()?;

        let mode = match addr_type {
            AddrType::Parent => self.mode,
            AddrType::Bit | AddrType::Byte | AddrType::ByteStrict if relative => match addr_type {
                AddrType::Bit => AddrMode::Bit,
                AddrType::Byte => AddrMode::Byte,
                AddrType::ByteStrict => AddrMode::ByteStrict,
                AddrType::Parent => unreachable!(),
            },
            _ => return Err(Error::new(ErrorKind::State)),
        };

        if mode == AddrMode::ByteStrict && self.cursor.get() % 8 != 0 {
            return Err(Error::new(ErrorKind::State));
        }

        let base = if relative { self.cursor.get() } else { self.base };
        let child = DataManager {
            buffer: self.buffer.clone(),
            cursor: Cell::new(self.cursor.get()),
            base,
            mode,
            revertible,
            trim_safe: self.trim_safe && !revertible,
            has_child: Cell::new(false),
        };

        self.has_child.set(true);
        Ok(Scope {
            parent: self,
            child: Some(child),
        })
    }

    fn guard(&self) -> Result<()> {
        if self.has_child.get() {
            return Err(Error::new(ErrorKind::State));
        }
        Ok(())
    }
}

/// An open child scope. Holds the child manager until [`Scope::finish`]
/// commits or reverts it into the parent.
pub struct Scope<'a> {
    parent: &'a DataManager,
    child: Option<DataManager>,
}

impl<'a> Scope<'a> {
    /// The child manager, for reads while the scope is open.
    pub fn manager(&self) -> &DataManager {
        self.child.as_ref().expect("scope already finished")
    }

    /// Closes the scope. `outcome` carries the result of the work done
    /// inside it: `Ok(())` commits the child's cursor up to the parent (and
    /// trims the buffer, if the parent is trim-safe); an `Err` either
    /// suppresses the failure and reverts (when the child is revertible and
    /// the error is recoverable) or re-propagates it.
    pub fn finish(mut self, outcome: std::result::Result<(), Error>) -> Result<()> {
        let child = self.child.take().expect("scope already finished");

        match outcome {
            Ok(()) => {
                let consumed = child.cursor.get() - child.base;
                let byte_checked = matches!(self.parent.mode, AddrMode::Byte | AddrMode::ByteStrict);
                if byte_checked && consumed % 8 != 0 {
                    self.parent.has_child.set(false);
                    return Err(Error::new(ErrorKind::State));
                }
                self.parent.cursor.set(child.cursor.get());
                self.parent.has_child.set(false);
                if self.parent.trim_safe {
                    self.parent.buffer.borrow_mut().trim(self.parent.cursor.get());
                }
                Ok(())
            }
            Err(e) => {
                self.parent.has_child.set(false);
                if e.is_recoverable() && child.revertible {
                    Ok(())
                } else {
                    Err(e)
                }
            }
        }
    }
}

impl<'a> Drop for Scope<'a> {
    fn drop(&mut self) {
        // A scope dropped without `finish` (e.g. an early `?` return out of
        // the caller) must not leave the parent permanently locked out.
        if self.child.is_some() {
            self.parent.has_child.set(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_mode_address_and_read() {
        let m = DataManager::from_bytes(vec![0x01, 0x02, 0x03], AddrMode::Byte);
        assert_eq!(m.address(), 0);
        assert_eq!(m.read_bytes(Some(2)).unwrap(), vec![0x01, 0x02]);
        assert_eq!(m.address(), 2);
    }

    #[test]
    fn child_commits_cursor_to_parent_on_success() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB, 0xCC], AddrMode::Byte);
        let scope = m.make_child(true, AddrType::Parent, false).unwrap();
        scope.manager().read_bytes(Some(2)).unwrap();
        scope.finish(Ok(())).unwrap();
        assert_eq!(m.address(), 2);
    }

    #[test]
    fn revertible_child_suppresses_recoverable_failure() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB, 0xCC], AddrMode::Byte);
        let scope = m.make_child(true, AddrType::Parent, true).unwrap();
        scope.manager().read_bytes(Some(2)).unwrap();
        scope
            .finish(Err(Error::new(ErrorKind::NoData)))
            .unwrap();
        // parent cursor is untouched
        assert_eq!(m.address(), 0);
    }

    #[test]
    fn non_revertible_child_propagates_failure() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB, 0xCC], AddrMode::Byte);
        let scope = m.make_child(true, AddrType::Parent, false).unwrap();
        let err = scope.finish(Err(Error::new(ErrorKind::NoData))).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NoData);
    }

    #[test]
    fn has_child_guard_blocks_parent_use() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB], AddrMode::Byte);
        let scope = m.make_child(true, AddrType::Parent, false).unwrap();
        assert_eq!(m.read_bytes(Some(1)).unwrap_err().kind, ErrorKind::State);
        drop(scope);
        assert!(m.read_bytes(Some(1)).is_ok());
    }

    #[test]
    fn mode_change_without_relative_is_rejected() {
        let m = DataManager::from_bytes(vec![0xAA], AddrMode::Byte);
        let err = m
            .make_child(false, AddrType::Bit, false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[test]
    fn byte_strict_requires_alignment_at_entry() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB], AddrMode::Bit);
        m.read_bits(Some(1)).unwrap();
        let err = m
            .make_child(true, AddrType::ByteStrict, false)
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }

    #[test]
    fn commit_requires_byte_alignment_when_parent_is_byte_mode() {
        let m = DataManager::from_bytes(vec![0xAA, 0xBB], AddrMode::Byte);
        let scope = m.make_child(true, AddrType::Bit, false).unwrap();
        scope.manager().read_bits(Some(3)).unwrap();
        let err = scope.finish(Ok(())).unwrap_err();
        assert_eq!(err.kind, ErrorKind::State);
    }
}
