//! # Tracegraph
//!
//! Disk-backed history tree for execution-graph edge intervals.
//!
//! Trace analyses model the execution of a system as a graph: workers
//! (threads, processes, interrupt contexts) have timelines, and edges
//! record what happened between two points on those timelines. Tracegraph
//! persists those edges as time intervals in an append-mostly paged tree,
//! so a full trace's graph can be queried point-in-time without holding it
//! in memory.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracegraph::prelude::*;
//!
//! let cache = Arc::new(NodeCache::default());
//! let tree = GraphTree::new(
//!     path,
//!     TreeConfig {
//!         block_size: 64 * 1024,
//!         max_children: 50,
//!         provider_version: 1,
//!         tree_start: 0,
//!     },
//!     Arc::clone(&cache),
//! )?;
//!
//! // One worker runs from t=0 to t=100, then wakes another up.
//! tree.insert(EdgeInterval::horizontal_edge(
//!     Vertex::new(0, 1),
//!     Vertex::new(100, 1),
//!     RUNNING,
//!     None,
//! ))?;
//! tree.insert(EdgeInterval::vertical_edge(
//!     Vertex::new(100, 1),
//!     Vertex::new(110, 2),
//!     WAKEUP,
//!     None,
//! ))?;
//! tree.close_tree(110)?;
//!
//! // What left worker 1 at t=100?
//! let edge = tree.query_edge_from(Vertex::new(100, 1), false)?;
//! ```
//!
//! ## Crates
//!
//! - `tracegraph-core`: vertices, edges, interval records and their codec
//! - `tracegraph-store`: nodes, file IO, node cache and the tree itself
//!
//! The id mapping from domain entities to integer worker ids, and the
//! choice of which interval kind to emit per transition, belong to the
//! producing analysis layer, not to this crate.

#![warn(missing_docs)]

pub mod prelude;

// Entity model
pub use tracegraph_core::{
    CodecError, ContextStateFactory, Edge, EdgeInterval, EdgeKind, EdgePayload, RawStateFactory,
    Timestamp, Vertex, WorkerId,
};

// Storage
pub use tracegraph_store::{
    FileHeader, GraphTree, Node, NodeCache, NodeType, TimeRange, TreeConfig, TreeError, TreeIo,
    DEFAULT_CACHE_CAPACITY, FORMAT_VERSION, HEADER_SIZE, MAGIC,
};
