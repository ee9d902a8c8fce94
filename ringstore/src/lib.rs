//! `ringstore` layers a keyed blob store, time-ordered ring buffers, a
//! schema-evolving table view and an unbounded version history over a
//! single append-only container file.
//!
//! ## Getting started
//!
//! ```rust
//! use ringstore::container::{Container, MemoryEngine, TxMode};
//!
//! fn main() -> ringstore::error::CResult<()> {
//!     let container = Container::new(MemoryEngine::new());
//!
//!     container.with_transaction(TxMode::ReadWrite, |tx| {
//!         tx.put(b"a".to_vec(), b"1".to_vec())?;
//!         tx.put(b"b".to_vec(), b"2".to_vec())
//!     })?;
//!
//!     let value = container.with_transaction(TxMode::ReadOnly, |tx| tx.get(b"a"))?;
//!     assert_eq!(value, Some(b"1".to_vec()));
//!
//!     Ok(())
//! }
//! ```

pub mod container;
pub mod error;
pub mod holstore;
pub mod route;
pub mod spanstore;
pub mod tablestore;
pub mod timestore;
pub mod versionstore;
