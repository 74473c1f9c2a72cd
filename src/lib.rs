//! A declarative binary-format parser engine.
//!
//! Compose parser trees from primitive readers and combinators, apply them
//! to a byte source, and get back a nested [`value::Map`] of decoded
//! fields. Built around a bitwise/bytewise-addressable [`manager::DataManager`]
//! over a streaming-aware [`buffer::DataBuffer`], a hierarchical
//! deduplicating [`context::Context`], and a sum-type [`parser::Parser`]
//! evaluated by [`parser::Parser::parse_bytes`]/[`parser::Parser::parse_reader`].
//!
//! ```no_run
//! use binform::manager::AddrMode;
//! use binform::parser::{block, float64_l};
//!
//! let format = block(vec![
//!     float64_l().labeled("fnum"),
//! ]);
//! let result = format.parse_bytes(vec![0u8; 8], AddrMode::Byte).unwrap();
//! assert!(result.get("fnum").is_some());
//! ```

pub mod bitbuffer;
pub mod buffer;
pub mod context;
pub mod error;
pub mod manager;
pub mod parser;
pub mod value;

pub use bitbuffer::BitBuffer;
pub use context::{Context, ContextStack};
pub use error::{Error, ErrorKind, Result};
pub use manager::{AddrMode, AddrType, DataManager};
pub use parser::Parser;
pub use value::{Map, Uuid, Value};
