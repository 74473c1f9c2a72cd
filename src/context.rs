//! Hierarchical, deduplicating result store.
//!
//! A [`Context`] is a stack of [`Map`] layers: `set` always writes the top
//! layer, `get` reads newest-first through every layer, and `new_child`/
//! `update_ext` let a combinator open a scratch layer and flatten it back
//! into its parent once the scratch work succeeds. [`ContextStack`] is the
//! wider structure combinators actually pass down the parser tree: per
//! spec.md §9's redesign note, it is a flat, cheap-to-clone vector of whole
//! `Context` handles rather than a linked chain, so a `Block` can publish an
//! entirely fresh `Context` as "current" while still letting its children
//! look up keys in enclosing scopes.

use crate::error::{Error, ErrorKind, Result};
use crate::value::{Map, Value};

/// A single hierarchical key→value store: a stack of deduplicating layers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Context {
    layers: Vec<Map>,
}

impl Context {
    /// A context with a single empty layer.
    pub fn new() -> Self {
        Context {
            layers: vec![Map::new()],
        }
    }

    /// Reads a key, searching layers newest-first.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.layers.iter().rev().find_map(|l| l.get(key))
    }

    /// Writes into the top layer, deduplicating against that layer's keys.
    /// Returns the key actually used.
    pub fn set(&mut self, key: &str, value: Value) -> String {
        self.layers
            .last_mut()
            .expect("Context always has at least one layer")
            .insert_deduped(key, value)
    }

    /// Pushes a fresh, empty top layer. The layers beneath remain readable
    /// via `get` but are not written to until the new top is merged away.
    pub fn new_child(&mut self) {
        self.layers.push(Map::new());
    }

    /// Merges the top layer into the layer beneath it, deduplicating each
    /// key against the destination layer's existing keys, then drops the
    /// (now-empty) top. Requires at least two layers.
    pub fn update_ext(&mut self) -> Result<()> {
        if self.layers.len() < 2 {
            return Err(Error::new(ErrorKind::State));
        }
        let top = self.layers.pop().unwrap();
        self.layers
            .last_mut()
            .expect("checked len >= 2 above")
            .merge_deduped(top);
        Ok(())
    }

    /// Drops the top layer without merging it into its parent — the
    /// counterpart to `update_ext` used when a revertible scope's work is
    /// suppressed and its scratch layer must simply disappear. Requires at
    /// least two layers.
    pub fn discard_child(&mut self) {
        if self.layers.len() >= 2 {
            self.layers.pop();
        }
    }

    /// Flattens every layer, oldest first, into a single plain map.
    pub fn dict(&self) -> Map {
        let mut out = Map::new();
        for layer in &self.layers {
            out.merge_deduped(layer.clone());
        }
        out
    }
}

/// The tuple of contexts combinators thread through a parse: index 0 is the
/// "current" context a parser writes into, the rest are ancestor contexts
/// from enclosing `Block` scopes, searched in nearest-first order so a leaf
/// like `VarBytes` can resolve a key written by an outer block.
#[derive(Debug, Clone, Default)]
pub struct ContextStack {
    frames: Vec<Context>,
}

impl ContextStack {
    /// A stack with a single fresh current context and no ancestors.
    pub fn new() -> Self {
        ContextStack {
            frames: vec![Context::new()],
        }
    }

    /// The current (writable) context.
    pub fn current(&self) -> &Context {
        &self.frames[0]
    }

    /// A mutable handle to the current context.
    pub fn current_mut(&mut self) -> &mut Context {
        &mut self.frames[0]
    }

    /// Looks a key up across the whole stack, current context first.
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        self.frames.iter().find_map(|c| c.get(key))
    }

    /// Derives the stack a `Block`'s children see: a brand-new current
    /// context, with `self`'s current context demoted to nearest ancestor.
    pub fn enter_block(&self) -> ContextStack {
        let mut frames = Vec::with_capacity(self.frames.len() + 1);
        frames.push(Context::new());
        frames.extend(self.frames.iter().cloned());
        ContextStack { frames }
    }

    /// Consumes the stack, returning its current context — used once a
    /// `Block`'s children have all run and the fresh context is ready to be
    /// stored as the block's value.
    pub fn into_current(mut self) -> Context {
        self.frames.remove(0)
    }
}
