//! Fixed-size tree nodes
//!
//! Every node occupies exactly one block in the history file. A node holds
//! a sorted list of edge intervals; core nodes additionally keep a child
//! table with the sequence number and cached time span of each child, so
//! traversals can prune subtrees without reading them.
//!
//! Intervals are ordered by (end time, start time). Nodes are filled
//! append-mostly while they sit on the latest branch, then closed and
//! written once the branch moves past them. A written node is immutable.
//!
//! # Block layout
//!
//! ```text
//! common header (30 bytes):
//!   type:u8  start:i64  end:i64  seq:i32  parent_seq:i32
//!   interval_count:i32  reserved:u8
//! core nodes only:
//!   child_count:i32
//!   max_children x child_seq:i32
//!   max_children x (child_start:i64, child_end:i64)
//! interval records, packed, then zero padding to the block size
//! ```

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::RwLock;
use smallvec::SmallVec;
use tracegraph_core::{EdgeInterval, Timestamp};

use crate::error::TreeError;
use crate::range::TimeRange;

/// Size of the header every node carries.
pub(crate) const COMMON_HEADER_SIZE: usize = 30;

const TYPE_CORE: u8 = 1;
const TYPE_LEAF: u8 = 2;

/// Bytes the child table of a core node occupies for `max_children` slots.
pub(crate) fn core_header_size(max_children: usize) -> usize {
    4 + max_children * (4 + 8 + 8)
}

/// Whether a node is an interior node or a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    /// Interior node with a child table.
    Core,
    /// Bottom-level node, intervals only.
    Leaf,
}

/// Cached child information kept by core nodes.
///
/// The end of a still-open child is provisional (`i64::MAX`) and gets
/// pinned down when the child is closed.
#[derive(Debug)]
struct ChildTable {
    seqs: Vec<i32>,
    starts: Vec<Timestamp>,
    ends: Vec<Timestamp>,
}

#[derive(Debug)]
struct NodeInner {
    end: Timestamp,
    parent_seq: i32,
    interval_bytes: usize,
    intervals: Vec<EdgeInterval>,
    children: Option<ChildTable>,
}

/// One block of the history tree.
///
/// The immutable identity of the node (type, sequence number, start time)
/// lives outside the lock; everything that changes while the node sits on
/// the latest branch is guarded by a read-write lock so queries can scan a
/// node that is still being filled.
#[derive(Debug)]
pub struct Node {
    node_type: NodeType,
    block_size: usize,
    max_children: usize,
    seq: i32,
    start: Timestamp,
    on_disk: AtomicBool,
    inner: RwLock<NodeInner>,
}

impl Node {
    /// Create an empty leaf node starting at `start`.
    pub fn new_leaf(
        block_size: usize,
        max_children: usize,
        seq: i32,
        parent_seq: i32,
        start: Timestamp,
    ) -> Self {
        Self {
            node_type: NodeType::Leaf,
            block_size,
            max_children,
            seq,
            start,
            on_disk: AtomicBool::new(false),
            inner: RwLock::new(NodeInner {
                end: start,
                parent_seq,
                interval_bytes: 0,
                intervals: Vec::new(),
                children: None,
            }),
        }
    }

    /// Create an empty core node starting at `start`.
    pub fn new_core(
        block_size: usize,
        max_children: usize,
        seq: i32,
        parent_seq: i32,
        start: Timestamp,
    ) -> Self {
        Self {
            node_type: NodeType::Core,
            block_size,
            max_children,
            seq,
            start,
            on_disk: AtomicBool::new(false),
            inner: RwLock::new(NodeInner {
                end: start,
                parent_seq,
                interval_bytes: 0,
                intervals: Vec::new(),
                children: Some(ChildTable {
                    seqs: Vec::with_capacity(max_children),
                    starts: Vec::with_capacity(max_children),
                    ends: Vec::with_capacity(max_children),
                }),
            }),
        }
    }

    /// The type of this node.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Sequence number of this node in the file.
    pub fn seq(&self) -> i32 {
        self.seq
    }

    /// Start time of this node.
    pub fn start(&self) -> Timestamp {
        self.start
    }

    /// End time of this node. Provisional until the node is closed.
    pub fn end(&self) -> Timestamp {
        self.inner.read().end
    }

    /// Sequence number of the parent node, -1 for the root.
    pub fn parent_seq(&self) -> i32 {
        self.inner.read().parent_seq
    }

    /// Change the parent of this node. Used when a new root is grown above
    /// the current one.
    pub fn set_parent_seq(&self, parent_seq: i32) {
        self.inner.write().parent_seq = parent_seq;
    }

    /// Whether this node has been written to the file.
    pub fn is_on_disk(&self) -> bool {
        self.on_disk.load(Ordering::Acquire)
    }

    pub(crate) fn mark_on_disk(&self) {
        self.on_disk.store(true, Ordering::Release);
    }

    /// Number of intervals stored in this node.
    pub fn interval_count(&self) -> usize {
        self.inner.read().intervals.len()
    }

    fn specific_header_size(&self) -> usize {
        match self.node_type {
            NodeType::Core => core_header_size(self.max_children),
            NodeType::Leaf => 0,
        }
    }

    /// Bytes still available for interval records.
    pub fn free_space(&self) -> usize {
        self.block_size
            - COMMON_HEADER_SIZE
            - self.specific_header_size()
            - self.inner.read().interval_bytes
    }

    /// Add an interval to this node, keeping the list sorted by
    /// (end, start).
    ///
    /// # Panics
    ///
    /// If the interval does not fit in the remaining free space. Callers
    /// must check [`Self::free_space`] first.
    pub fn add_interval(&self, interval: EdgeInterval) {
        let size = interval.size_on_disk();
        let mut inner = self.inner.write();
        let free = self.block_size
            - COMMON_HEADER_SIZE
            - self.specific_header_size()
            - inner.interval_bytes;
        assert!(
            size <= free,
            "interval of {} bytes does not fit in node {} with {} bytes free",
            size,
            self.seq,
            free
        );
        let key = (interval.end(), interval.start());
        let idx = inner
            .intervals
            .partition_point(|i| (i.end(), i.start()) <= key);
        inner.intervals.insert(idx, interval);
        inner.interval_bytes += size;
    }

    /// Close this node at `end`. After this the node's time span is final.
    ///
    /// # Panics
    ///
    /// If `end` is before the end of the last interval in the node.
    pub fn close(&self, end: Timestamp) {
        let mut inner = self.inner.write();
        if let Some(last) = inner.intervals.last() {
            assert!(
                end >= last.end(),
                "cannot close node {} at {} before its last interval end {}",
                self.seq,
                end,
                last.end()
            );
        }
        inner.end = end;
    }

    /// Number of children linked under this core node.
    pub fn child_count(&self) -> usize {
        self.inner
            .read()
            .children
            .as_ref()
            .map_or(0, |c| c.seqs.len())
    }

    /// Sequence number of the most recently linked child.
    pub fn latest_child_seq(&self) -> Option<i32> {
        self.inner
            .read()
            .children
            .as_ref()
            .and_then(|c| c.seqs.last().copied())
    }

    /// Link `child` as the next child of this core node.
    ///
    /// The cached end is provisional unless the child is already on disk.
    ///
    /// # Panics
    ///
    /// If this is a leaf node or the child table is full.
    pub fn link_new_child(&self, child: &Node) {
        let child_end = if child.is_on_disk() {
            child.end()
        } else {
            i64::MAX
        };
        let mut inner = self.inner.write();
        let table = inner
            .children
            .as_mut()
            .expect("cannot link a child under a leaf node");
        assert!(
            table.seqs.len() < self.max_children,
            "node {} already has {} children",
            self.seq,
            self.max_children
        );
        table.seqs.push(child.seq());
        table.starts.push(child.start());
        table.ends.push(child_end);
    }

    /// Pin down the cached end time of a child that was just closed.
    pub fn record_child_closed(&self, child_seq: i32, end: Timestamp) {
        let mut inner = self.inner.write();
        if let Some(table) = inner.children.as_mut() {
            if let Some(pos) = table.seqs.iter().position(|&s| s == child_seq) {
                table.ends[pos] = end;
            }
        }
    }

    /// Sequence numbers of the children whose span intersects `range`.
    pub fn select_next_children(&self, range: TimeRange) -> SmallVec<[i32; 8]> {
        let inner = self.inner.read();
        let mut out = SmallVec::new();
        // The whole node misses the range; the end only counts once the
        // node is on disk and its span is final.
        if range.max() < self.start || (self.is_on_disk() && range.min() > inner.end) {
            return out;
        }
        if let Some(table) = inner.children.as_ref() {
            for i in 0..table.seqs.len() {
                if range.intersects(table.starts[i], table.ends[i]) {
                    out.push(table.seqs[i]);
                }
            }
        }
        out
    }

    /// First interval in this node intersecting `range` and accepted by
    /// `pred`, in (end, start) order.
    ///
    /// When `ts_is_exact_end` is set the caller promises it only accepts
    /// intervals ending exactly at `range.max()`, which lets the scan stop
    /// as soon as the ends move past the range.
    pub fn first_matching<P>(
        &self,
        range: TimeRange,
        ts_is_exact_end: bool,
        pred: P,
    ) -> Option<EdgeInterval>
    where
        P: Fn(&EdgeInterval) -> bool,
    {
        let inner = self.inner.read();
        // Sorted by end, so everything before this index ends too early.
        let from = inner
            .intervals
            .partition_point(|i| i.end() < range.min());
        for interval in &inner.intervals[from..] {
            if ts_is_exact_end && interval.end() > range.max() {
                break;
            }
            if interval.start() <= range.max() && pred(interval) {
                return Some(interval.clone());
            }
        }
        None
    }

    /// Serialize this node into a full block.
    ///
    /// # Panics
    ///
    /// If the serialized size disagrees with the free-space accounting.
    pub fn write_block(&self) -> std::io::Result<Vec<u8>> {
        let inner = self.inner.read();
        let mut buf = Cursor::new(Vec::with_capacity(self.block_size));

        buf.write_u8(match self.node_type {
            NodeType::Core => TYPE_CORE,
            NodeType::Leaf => TYPE_LEAF,
        })?;
        buf.write_i64::<LittleEndian>(self.start)?;
        buf.write_i64::<LittleEndian>(inner.end)?;
        buf.write_i32::<LittleEndian>(self.seq)?;
        buf.write_i32::<LittleEndian>(inner.parent_seq)?;
        buf.write_i32::<LittleEndian>(inner.intervals.len() as i32)?;
        buf.write_u8(0)?;

        if let Some(table) = inner.children.as_ref() {
            buf.write_i32::<LittleEndian>(table.seqs.len() as i32)?;
            for i in 0..self.max_children {
                buf.write_i32::<LittleEndian>(table.seqs.get(i).copied().unwrap_or(-1))?;
            }
            for i in 0..self.max_children {
                buf.write_i64::<LittleEndian>(table.starts.get(i).copied().unwrap_or(0))?;
                buf.write_i64::<LittleEndian>(table.ends.get(i).copied().unwrap_or(0))?;
            }
        }

        for interval in &inner.intervals {
            interval.write_to(&mut buf)?;
        }

        let expected = COMMON_HEADER_SIZE + self.specific_header_size() + inner.interval_bytes;
        let mut bytes = buf.into_inner();
        assert_eq!(
            bytes.len(),
            expected,
            "node {} serialized to {} bytes but accounted for {}",
            self.seq,
            bytes.len(),
            expected
        );
        bytes.resize(self.block_size, 0);
        Ok(bytes)
    }

    /// Parse a node back from a full block.
    pub fn read_block(
        block_size: usize,
        max_children: usize,
        block: &[u8],
    ) -> Result<Self, TreeError> {
        let mut buf = Cursor::new(block);

        let type_byte = buf.read_u8()?;
        let node_type = match type_byte {
            TYPE_CORE => NodeType::Core,
            TYPE_LEAF => NodeType::Leaf,
            other => {
                return Err(TreeError::Corrupt(format!(
                    "unknown node type byte {other:#04x}"
                )))
            }
        };
        let start = buf.read_i64::<LittleEndian>()?;
        let end = buf.read_i64::<LittleEndian>()?;
        let seq = buf.read_i32::<LittleEndian>()?;
        let parent_seq = buf.read_i32::<LittleEndian>()?;
        let interval_count = buf.read_i32::<LittleEndian>()?;
        let _reserved = buf.read_u8()?;
        if interval_count < 0 {
            return Err(TreeError::Corrupt(format!(
                "node {seq} has negative interval count {interval_count}"
            )));
        }

        let children = match node_type {
            NodeType::Leaf => None,
            NodeType::Core => {
                let child_count = buf.read_i32::<LittleEndian>()?;
                if child_count < 0 || child_count as usize > max_children {
                    return Err(TreeError::Corrupt(format!(
                        "node {seq} claims {child_count} children, maximum is {max_children}"
                    )));
                }
                let child_count = child_count as usize;
                let mut seqs = Vec::with_capacity(max_children);
                for i in 0..max_children {
                    let s = buf.read_i32::<LittleEndian>()?;
                    if i < child_count {
                        seqs.push(s);
                    }
                }
                let mut starts = Vec::with_capacity(max_children);
                let mut ends = Vec::with_capacity(max_children);
                for i in 0..max_children {
                    let s = buf.read_i64::<LittleEndian>()?;
                    let e = buf.read_i64::<LittleEndian>()?;
                    if i < child_count {
                        starts.push(s);
                        ends.push(e);
                    }
                }
                Some(ChildTable { seqs, starts, ends })
            }
        };

        let mut intervals = Vec::with_capacity(interval_count as usize);
        let mut interval_bytes = 0;
        for _ in 0..interval_count {
            let interval = EdgeInterval::read_from(&mut buf)?;
            interval_bytes += interval.size_on_disk();
            intervals.push(interval);
        }

        let node = Self {
            node_type,
            block_size,
            max_children,
            seq,
            start,
            on_disk: AtomicBool::new(true),
            inner: RwLock::new(NodeInner {
                end,
                parent_seq,
                interval_bytes,
                intervals,
                children,
            }),
        };
        Ok(node)
    }
}
