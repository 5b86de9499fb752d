//! Vertex type for execution graphs
//!
//! A vertex is a point on the timeline of one worker. Edges connect two
//! vertices; the pair (end time, destination worker) of one edge is
//! expected to match the pair (start time, origin worker) of the next.

/// Timestamp in nanoseconds since the trace origin.
pub type Timestamp = i64;

/// Integer identifier of a timelined participant.
///
/// The mapping from domain identities (threads, processes, ...) to worker
/// ids is owned by the graph layer and persisted separately; the tree only
/// ever sees the small integers.
pub type WorkerId = i32;

/// A point on a worker's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Vertex {
    timestamp: Timestamp,
    worker: WorkerId,
}

impl Vertex {
    /// Create a vertex at `timestamp` on the timeline of `worker`.
    pub fn new(timestamp: Timestamp, worker: WorkerId) -> Self {
        Self { timestamp, worker }
    }

    /// The time of this vertex.
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    /// The worker this vertex belongs to.
    pub fn worker(&self) -> WorkerId {
        self.worker
    }
}

impl std::fmt::Display for Vertex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}/{}]", self.timestamp, self.worker)
    }
}
