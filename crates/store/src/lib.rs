//! Disk-backed history tree storage for tracegraph
//!
//! This crate persists edge intervals in an append-mostly tree of
//! fixed-size nodes:
//! - [`GraphTree`]: insertion, point-in-time queries, file lifecycle
//! - [`Node`]: one block of the file, intervals plus child table
//! - [`TreeIo`]: block reads and writes through a shared [`NodeCache`]
//!
//! Writers feed intervals in roughly chronological order; once written, a
//! node is immutable. Queries may run while the tree is still being built.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod error;
pub mod io;
pub mod node;
pub mod range;
pub mod tree;

pub use cache::{NodeCache, DEFAULT_CACHE_CAPACITY};
pub use error::TreeError;
pub use io::{FileHeader, TreeIo, FORMAT_VERSION, HEADER_SIZE, MAGIC};
pub use node::{Node, NodeType};
pub use range::TimeRange;
pub use tree::{GraphTree, TreeConfig};
