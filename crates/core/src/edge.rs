//! Domain edge objects
//!
//! An [`Edge`] is what the graph layer works with: two vertices, a context
//! state and an optional qualifier. The tree itself never manufactures
//! edges; it stores [`crate::EdgeInterval`] records and lets the caller
//! resolve the numeric state code through a [`ContextStateFactory`], so the
//! storage layer stays independent of any specific domain's edge-state
//! vocabulary.

use crate::vertex::Vertex;

/// Maps raw context-state codes to a domain vocabulary.
///
/// Each analysis domain (OS critical path, user-space instrumentation, ...)
/// defines its own set of edge context states. The tree serializes them as
/// plain `i32` codes; this factory turns a code back into the domain type
/// when an interval is converted to an edge.
pub trait ContextStateFactory {
    /// The domain's context-state type.
    type State;

    /// Build the domain state for a raw serialized code.
    fn create(&self, code: i32) -> Self::State;
}

/// Factory that keeps state codes as raw integers.
///
/// Useful for tests and for tools that inspect a history file without
/// knowing the producing domain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawStateFactory;

impl ContextStateFactory for RawStateFactory {
    type State = i32;

    fn create(&self, code: i32) -> i32 {
        code
    }
}

/// A transition between two vertices of the execution graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge<S> {
    from: Vertex,
    to: Vertex,
    state: S,
    qualifier: Option<String>,
}

impl<S> Edge<S> {
    /// Create a new edge.
    pub fn new(from: Vertex, to: Vertex, state: S, qualifier: Option<String>) -> Self {
        Self {
            from,
            to,
            state,
            qualifier,
        }
    }

    /// The vertex this edge starts from.
    pub fn from_vertex(&self) -> Vertex {
        self.from
    }

    /// The vertex this edge ends at.
    pub fn to_vertex(&self) -> Vertex {
        self.to
    }

    /// The context state of this transition.
    pub fn state(&self) -> &S {
        &self.state
    }

    /// The qualifier of this edge, if any.
    pub fn qualifier(&self) -> Option<&str> {
        self.qualifier.as_deref()
    }

    /// Duration covered by this edge.
    pub fn duration(&self) -> i64 {
        self.to.timestamp() - self.from.timestamp()
    }
}
