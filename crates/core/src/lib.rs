//! Entity model for tracegraph
//!
//! This crate defines the types that the history tree stores and queries:
//! - `Vertex`: a point on a worker's timeline
//! - `EdgeInterval`: the on-disk edge record and its binary codec
//! - `Edge`: the domain edge object produced from context-bearing intervals
//! - `ContextStateFactory`: hook mapping raw state codes to a domain
//!   vocabulary, keeping the codec domain-independent

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod edge;
pub mod error;
pub mod interval;
pub mod vertex;

pub use edge::{ContextStateFactory, Edge, RawStateFactory};
pub use error::CodecError;
pub use interval::{EdgeInterval, EdgeKind, EdgePayload};
pub use vertex::{Timestamp, Vertex, WorkerId};
