//! Edge interval records and their binary codec
//!
//! An [`EdgeInterval`] is the unit the history tree stores on disk. The
//! start/end times and origin/destination worker ids together represent the
//! from/to vertices of an edge. Null and filler intervals carry no
//! transition; they only assert that the worker's timeline was covered, so
//! point-in-time queries can tell "no edge here" apart from "not in the
//! graph at all".
//!
//! # Wire format
//!
//! Little-endian, one discriminator byte followed by the common fields and
//! the variant payload:
//!
//! ```text
//! tag:u8  start:i64  end:i64  from_worker:i32
//!   tag 0 (null), tag 3 (filler): nothing more
//!   tag 1 (horizontal):           state:i32  qualifier
//!   tag 2 (vertical):             to_worker:i32  state:i32  qualifier
//! qualifier = len:u16 + UTF-8 bytes (len 0 when absent)
//! ```
//!
//! [`EdgeInterval::size_on_disk`] must exactly equal the bytes written by
//! [`EdgeInterval::write_to`]; the node layer trusts it for free-space
//! accounting.

use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::edge::{ContextStateFactory, Edge};
use crate::error::CodecError;
use crate::vertex::{Timestamp, Vertex, WorkerId};

const TAG_NULL: u8 = 0;
const TAG_HORIZONTAL: u8 = 1;
const TAG_VERTICAL: u8 = 2;
const TAG_FILLER: u8 = 3;

/// The kind of edge interval, used to route queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EdgeKind {
    /// No transition between two vertices of the same worker.
    Null,
    /// Same-worker transition carrying a context state.
    Horizontal,
    /// Cross-worker transition carrying a context state.
    Vertical,
    /// Boundary placeholder at the start or end of a worker's lifetime.
    Filler,
}

/// Variant-specific payload of an interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgePayload {
    /// No transition; the worker was active nevertheless.
    Null,
    /// Same-worker transition.
    Horizontal {
        /// Raw context-state code, interpreted by the domain.
        state: i32,
        /// Optional qualifier, e.g. a resource name.
        qualifier: Option<String>,
    },
    /// Transition to another worker's timeline.
    Vertical {
        /// Destination worker.
        to_worker: WorkerId,
        /// Raw context-state code, interpreted by the domain.
        state: i32,
        /// Optional qualifier, e.g. a resource name.
        qualifier: Option<String>,
    },
    /// Lifetime boundary placeholder.
    Filler,
}

/// A time-stamped edge (or edge-absence) record tied to one or two workers.
///
/// Immutable once created. Ordering inside a node is by (end, start).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeInterval {
    start: Timestamp,
    end: Timestamp,
    from_worker: WorkerId,
    payload: EdgePayload,
}

fn normalize_qualifier(qualifier: Option<String>) -> Option<String> {
    qualifier.filter(|q| !q.is_empty())
}

impl EdgeInterval {
    /// Create a null edge between two vertices of the same worker.
    ///
    /// A null edge means there is no transition between the two vertices,
    /// but the worker was active during that time.
    pub fn null_edge(from: Vertex, to: Vertex) -> Self {
        Self {
            start: from.timestamp(),
            end: to.timestamp(),
            from_worker: from.worker(),
            payload: EdgePayload::Null,
        }
    }

    /// Create a horizontal edge between two vertices of the same worker.
    pub fn horizontal_edge(
        from: Vertex,
        to: Vertex,
        state: i32,
        qualifier: Option<String>,
    ) -> Self {
        Self {
            start: from.timestamp(),
            end: to.timestamp(),
            from_worker: from.worker(),
            payload: EdgePayload::Horizontal {
                state,
                qualifier: normalize_qualifier(qualifier),
            },
        }
    }

    /// Create a vertical edge between two vertices, possibly of different
    /// workers.
    pub fn vertical_edge(from: Vertex, to: Vertex, state: i32, qualifier: Option<String>) -> Self {
        Self {
            start: from.timestamp(),
            end: to.timestamp(),
            from_worker: from.worker(),
            payload: EdgePayload::Vertical {
                to_worker: to.worker(),
                state,
                qualifier: normalize_qualifier(qualifier),
            },
        }
    }

    /// Create a filler interval between a vertex and a timestamp, typically
    /// covering the beginning or end of a worker's life cycle.
    ///
    /// The two times are normalized so the interval always runs from the
    /// earlier to the later one.
    pub fn filler_edge(vertex: Vertex, other_time: Timestamp) -> Self {
        Self {
            start: vertex.timestamp().min(other_time),
            end: vertex.timestamp().max(other_time),
            from_worker: vertex.worker(),
            payload: EdgePayload::Filler,
        }
    }

    /// Start time of this interval.
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// End time of this interval.
    pub fn end(&self) -> Timestamp {
        self.end
    }

    /// The kind of this interval.
    pub fn kind(&self) -> EdgeKind {
        match self.payload {
            EdgePayload::Null => EdgeKind::Null,
            EdgePayload::Horizontal { .. } => EdgeKind::Horizontal,
            EdgePayload::Vertical { .. } => EdgeKind::Vertical,
            EdgePayload::Filler => EdgeKind::Filler,
        }
    }

    /// The variant payload.
    pub fn payload(&self) -> &EdgePayload {
        &self.payload
    }

    /// The worker this interval starts from.
    pub fn from_worker(&self) -> WorkerId {
        self.from_worker
    }

    /// The worker this interval goes to. Same as the origin for every kind
    /// except vertical.
    pub fn to_worker(&self) -> WorkerId {
        match self.payload {
            EdgePayload::Vertical { to_worker, .. } => to_worker,
            _ => self.from_worker,
        }
    }

    /// The vertex this interval starts from.
    pub fn from_vertex(&self) -> Vertex {
        Vertex::new(self.start, self.from_worker())
    }

    /// The vertex this interval ends at.
    pub fn to_vertex(&self) -> Vertex {
        Vertex::new(self.end, self.to_worker())
    }

    /// The raw context-state code, for context-bearing kinds.
    pub fn state(&self) -> Option<i32> {
        match self.payload {
            EdgePayload::Horizontal { state, .. } | EdgePayload::Vertical { state, .. } => {
                Some(state)
            }
            _ => None,
        }
    }

    /// The edge qualifier, for context-bearing kinds.
    pub fn qualifier(&self) -> Option<&str> {
        match &self.payload {
            EdgePayload::Horizontal { qualifier, .. } | EdgePayload::Vertical { qualifier, .. } => {
                qualifier.as_deref()
            }
            _ => None,
        }
    }

    /// Build the domain edge for this interval, resolving the state code
    /// through `factory`.
    ///
    /// Returns `None` for null and filler intervals, which represent the
    /// absence of a transition.
    pub fn edge<F: ContextStateFactory>(&self, factory: &F) -> Option<Edge<F::State>> {
        match &self.payload {
            EdgePayload::Null | EdgePayload::Filler => None,
            EdgePayload::Horizontal { state, qualifier }
            | EdgePayload::Vertical {
                state, qualifier, ..
            } => Some(Edge::new(
                self.from_vertex(),
                self.to_vertex(),
                factory.create(*state),
                qualifier.clone(),
            )),
        }
    }

    /// Exact number of bytes [`Self::write_to`] produces for this interval.
    pub fn size_on_disk(&self) -> usize {
        // tag + start + end + from_worker
        let common = 1 + 8 + 8 + 4;
        match &self.payload {
            EdgePayload::Null | EdgePayload::Filler => common,
            EdgePayload::Horizontal { qualifier, .. } => {
                common + 4 + qualifier_size(qualifier)
            }
            EdgePayload::Vertical { qualifier, .. } => {
                common + 4 + 4 + qualifier_size(qualifier)
            }
        }
    }

    /// Serialize this interval.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        match &self.payload {
            EdgePayload::Null => {
                writer.write_u8(TAG_NULL)?;
                self.write_common(writer)?;
            }
            EdgePayload::Horizontal { state, qualifier } => {
                writer.write_u8(TAG_HORIZONTAL)?;
                self.write_common(writer)?;
                writer.write_i32::<LittleEndian>(*state)?;
                write_qualifier(writer, qualifier)?;
            }
            EdgePayload::Vertical {
                to_worker,
                state,
                qualifier,
            } => {
                writer.write_u8(TAG_VERTICAL)?;
                self.write_common(writer)?;
                writer.write_i32::<LittleEndian>(*to_worker)?;
                writer.write_i32::<LittleEndian>(*state)?;
                write_qualifier(writer, qualifier)?;
            }
            EdgePayload::Filler => {
                writer.write_u8(TAG_FILLER)?;
                self.write_common(writer)?;
            }
        }
        Ok(())
    }

    fn write_common<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_i64::<LittleEndian>(self.start)?;
        writer.write_i64::<LittleEndian>(self.end)?;
        writer.write_i32::<LittleEndian>(self.from_worker)?;
        Ok(())
    }

    /// Deserialize one interval, dispatching on the tag byte.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, CodecError> {
        let tag = reader.read_u8()?;
        let start = reader.read_i64::<LittleEndian>()?;
        let end = reader.read_i64::<LittleEndian>()?;
        let from_worker = reader.read_i32::<LittleEndian>()?;

        let payload = match tag {
            TAG_NULL => EdgePayload::Null,
            TAG_HORIZONTAL => {
                let state = reader.read_i32::<LittleEndian>()?;
                let qualifier = read_qualifier(reader)?;
                EdgePayload::Horizontal { state, qualifier }
            }
            TAG_VERTICAL => {
                let to_worker = reader.read_i32::<LittleEndian>()?;
                let state = reader.read_i32::<LittleEndian>()?;
                let qualifier = read_qualifier(reader)?;
                EdgePayload::Vertical {
                    to_worker,
                    state,
                    qualifier,
                }
            }
            TAG_FILLER => EdgePayload::Filler,
            other => return Err(CodecError::UnknownTag(other)),
        };

        Ok(Self {
            start,
            end,
            from_worker,
            payload,
        })
    }
}

fn qualifier_size(qualifier: &Option<String>) -> usize {
    2 + qualifier.as_deref().map_or(0, str::len)
}

fn write_qualifier<W: Write>(writer: &mut W, qualifier: &Option<String>) -> std::io::Result<()> {
    let bytes = qualifier.as_deref().unwrap_or("").as_bytes();
    writer.write_u16::<LittleEndian>(bytes.len() as u16)?;
    writer.write_all(bytes)
}

fn read_qualifier<R: Read>(reader: &mut R) -> Result<Option<String>, CodecError> {
    let len = reader.read_u16::<LittleEndian>()? as usize;
    if len == 0 {
        return Ok(None);
    }
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(Some(String::from_utf8(buf)?))
}

impl std::fmt::Display for EdgeInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.payload {
            EdgePayload::Null => write!(
                f,
                "Null edge [{},{}] for {}",
                self.start, self.end, self.from_worker
            ),
            EdgePayload::Horizontal { state, qualifier } => write!(
                f,
                "Horizontal edge [{},{}] from {}: {}{}",
                self.start,
                self.end,
                self.from_worker,
                state,
                qualifier
                    .as_deref()
                    .map(|q| format!(" ({q})"))
                    .unwrap_or_default()
            ),
            EdgePayload::Vertical {
                to_worker,
                state,
                qualifier,
            } => write!(
                f,
                "Vertical edge [{},{}] from {} to {}: {}{}",
                self.start,
                self.end,
                self.from_worker,
                to_worker,
                state,
                qualifier
                    .as_deref()
                    .map(|q| format!(" ({q})"))
                    .unwrap_or_default()
            ),
            EdgePayload::Filler => write!(
                f,
                "Filler edge [{},{}] for {}",
                self.start, self.end, self.from_worker
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::RawStateFactory;
    use proptest::prelude::*;

    fn roundtrip(interval: &EdgeInterval) -> EdgeInterval {
        let mut buf = Vec::new();
        interval.write_to(&mut buf).unwrap();
        assert_eq!(
            buf.len(),
            interval.size_on_disk(),
            "size_on_disk must match the encoded length"
        );
        EdgeInterval::read_from(&mut buf.as_slice()).unwrap()
    }

    #[test]
    fn test_null_edge_roundtrip() {
        let interval = EdgeInterval::null_edge(Vertex::new(10, 3), Vertex::new(20, 3));
        assert_eq!(roundtrip(&interval), interval);
        assert_eq!(interval.size_on_disk(), 21);
    }

    #[test]
    fn test_filler_edge_roundtrip() {
        let interval = EdgeInterval::filler_edge(Vertex::new(50, 2), 0);
        assert_eq!(roundtrip(&interval), interval);
        assert_eq!(interval.start(), 0);
        assert_eq!(interval.end(), 50);
    }

    #[test]
    fn test_filler_edge_normalizes_order() {
        let forward = EdgeInterval::filler_edge(Vertex::new(5, 1), 100);
        assert_eq!(forward.start(), 5);
        assert_eq!(forward.end(), 100);

        let backward = EdgeInterval::filler_edge(Vertex::new(100, 1), 5);
        assert_eq!(backward.start(), 5);
        assert_eq!(backward.end(), 100);
    }

    #[test]
    fn test_horizontal_edge_roundtrip() {
        let interval = EdgeInterval::horizontal_edge(
            Vertex::new(0, 1),
            Vertex::new(100, 1),
            4,
            Some("eth0".to_string()),
        );
        assert_eq!(roundtrip(&interval), interval);
        assert_eq!(interval.kind(), EdgeKind::Horizontal);
        assert_eq!(interval.state(), Some(4));
        assert_eq!(interval.qualifier(), Some("eth0"));
    }

    #[test]
    fn test_horizontal_edge_without_qualifier() {
        let interval =
            EdgeInterval::horizontal_edge(Vertex::new(0, 1), Vertex::new(100, 1), 4, None);
        assert_eq!(roundtrip(&interval), interval);
        assert_eq!(interval.qualifier(), None);
    }

    #[test]
    fn test_empty_qualifier_normalizes_to_none() {
        let interval = EdgeInterval::horizontal_edge(
            Vertex::new(0, 1),
            Vertex::new(100, 1),
            4,
            Some(String::new()),
        );
        assert_eq!(interval.qualifier(), None);
        assert_eq!(roundtrip(&interval), interval);
    }

    #[test]
    fn test_vertical_edge_roundtrip() {
        let interval = EdgeInterval::vertical_edge(
            Vertex::new(100, 1),
            Vertex::new(110, 2),
            7,
            Some("wakeup".to_string()),
        );
        assert_eq!(roundtrip(&interval), interval);
        assert_eq!(interval.from_worker(), 1);
        assert_eq!(interval.to_worker(), 2);
        assert_eq!(interval.to_vertex(), Vertex::new(110, 2));
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        let mut buf = Vec::new();
        EdgeInterval::null_edge(Vertex::new(0, 0), Vertex::new(1, 0))
            .write_to(&mut buf)
            .unwrap();
        buf[0] = 9;
        let err = EdgeInterval::read_from(&mut buf.as_slice()).unwrap_err();
        assert!(matches!(err, CodecError::UnknownTag(9)));
    }

    #[test]
    fn test_truncated_record_is_an_error() {
        let mut buf = Vec::new();
        EdgeInterval::vertical_edge(Vertex::new(0, 1), Vertex::new(5, 2), 3, None)
            .write_to(&mut buf)
            .unwrap();
        buf.truncate(buf.len() - 3);
        assert!(EdgeInterval::read_from(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn test_null_and_filler_yield_no_edge() {
        let factory = RawStateFactory;
        let null = EdgeInterval::null_edge(Vertex::new(0, 1), Vertex::new(5, 1));
        let filler = EdgeInterval::filler_edge(Vertex::new(5, 1), 0);
        assert!(null.edge(&factory).is_none());
        assert!(filler.edge(&factory).is_none());
    }

    #[test]
    fn test_context_edges_yield_domain_edge() {
        let factory = RawStateFactory;
        let interval = EdgeInterval::vertical_edge(
            Vertex::new(100, 1),
            Vertex::new(110, 2),
            7,
            Some("wakeup".to_string()),
        );
        let edge = interval.edge(&factory).unwrap();
        assert_eq!(edge.from_vertex(), Vertex::new(100, 1));
        assert_eq!(edge.to_vertex(), Vertex::new(110, 2));
        assert_eq!(*edge.state(), 7);
        assert_eq!(edge.qualifier(), Some("wakeup"));
    }

    fn arb_qualifier() -> impl Strategy<Value = Option<String>> {
        proptest::option::of("[a-z0-9_]{0,24}").prop_map(|q| q.filter(|s| !s.is_empty()))
    }

    proptest! {
        #[test]
        fn prop_roundtrip_identity(
            start in -1_000_000i64..1_000_000,
            len in 0i64..1_000_000,
            from in 0i32..10_000,
            to in 0i32..10_000,
            state in any::<i32>(),
            qualifier in arb_qualifier(),
            kind in 0u8..4,
        ) {
            let a = Vertex::new(start, from);
            let b = Vertex::new(start + len, if kind == 2 { to } else { from });
            let interval = match kind {
                0 => EdgeInterval::null_edge(a, b),
                1 => EdgeInterval::horizontal_edge(a, b, state, qualifier),
                2 => EdgeInterval::vertical_edge(a, b, state, qualifier),
                _ => EdgeInterval::filler_edge(a, start + len),
            };
            let mut buf = Vec::new();
            interval.write_to(&mut buf).unwrap();
            prop_assert_eq!(buf.len(), interval.size_on_disk());
            let decoded = EdgeInterval::read_from(&mut buf.as_slice()).unwrap();
            prop_assert_eq!(decoded, interval);
        }
    }
}
