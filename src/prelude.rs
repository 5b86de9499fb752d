//! Convenient imports for tracegraph.
//!
//! Re-exports the types most programs need:
//!
//! ```ignore
//! use tracegraph::prelude::*;
//!
//! let tree = GraphTree::new(path, config, cache)?;
//! tree.insert(EdgeInterval::null_edge(from, to))?;
//! ```

// Tree entry points
pub use tracegraph_store::{GraphTree, NodeCache, TreeConfig, TreeError};

// Interval model
pub use tracegraph_core::{Edge, EdgeInterval, EdgeKind, EdgePayload, Vertex};

// State resolution
pub use tracegraph_core::{ContextStateFactory, RawStateFactory};

// Scalar aliases
pub use tracegraph_core::{Timestamp, WorkerId};
