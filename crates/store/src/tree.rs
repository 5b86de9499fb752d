//! The graph history tree
//!
//! An append-mostly tree of fixed-size nodes storing edge intervals. New
//! intervals always land on the rightmost path from root to leaf, the
//! "latest branch". When a node on the branch fills up it is closed at the
//! current tree end, written out, and replaced by a fresh sibling; when the
//! root itself fills up a new root is grown above it and the whole branch
//! is rebuilt one level deeper.
//!
//! Queries are point-in-time lookups. They breadth-first walk the tree,
//! pruning subtrees whose cached child spans do not cover the timestamp,
//! and return the first interval accepted by the query predicate.
//!
//! Insertions are serialized through the branch mutex. Queries run
//! concurrently with insertions; they take the branch lock only long
//! enough to look up in-memory nodes.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicI64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;
use tracegraph_core::{EdgeInterval, EdgeKind, Timestamp, Vertex};

use crate::cache::NodeCache;
use crate::error::TreeError;
use crate::io::{FileHeader, TreeIo, HEADER_SIZE};
use crate::node::{core_header_size, Node, NodeType, COMMON_HEADER_SIZE};
use crate::range::TimeRange;

/// Construction parameters for a new history tree.
#[derive(Debug, Clone, Copy)]
pub struct TreeConfig {
    /// Size of each node block, in bytes.
    pub block_size: usize,
    /// Maximum number of children per core node.
    pub max_children: usize,
    /// Version of the edge provider producing the intervals. Recorded in
    /// the header and checked when the file is reopened.
    pub provider_version: i32,
    /// Start time of the tree. No interval may start earlier.
    pub tree_start: Timestamp,
}

/// A disk-backed history tree of edge intervals.
#[derive(Debug)]
pub struct GraphTree {
    config: TreeConfig,
    io: TreeIo,
    node_count: AtomicI32,
    tree_end: AtomicI64,
    /// Root-to-leaf path currently receiving insertions.
    branch: Mutex<Vec<Arc<Node>>>,
}

impl GraphTree {
    /// Create a new, empty tree backed by a fresh file at `path`.
    pub fn new(path: &Path, config: TreeConfig, cache: Arc<NodeCache>) -> Result<Self, TreeError> {
        // A block must hold the node headers plus some interval payload.
        let minimum = COMMON_HEADER_SIZE + core_header_size(config.max_children) + 64;
        if config.block_size < minimum {
            return Err(TreeError::BlockSizeTooSmall {
                block_size: config.block_size,
                minimum,
            });
        }

        let io = TreeIo::create(path, config.block_size, config.max_children, cache)?;
        let root = Arc::new(Node::new_leaf(
            config.block_size,
            config.max_children,
            0,
            -1,
            config.tree_start,
        ));
        Ok(Self {
            io,
            node_count: AtomicI32::new(1),
            tree_end: AtomicI64::new(config.tree_start),
            branch: Mutex::new(vec![root]),
            config,
        })
    }

    /// Reopen an existing history file for querying.
    ///
    /// Fails if the file is not a graph history file, was written by a
    /// different format revision, or records a provider version other than
    /// `provider_version`.
    pub fn open(
        path: &Path,
        provider_version: i32,
        cache: Arc<NodeCache>,
    ) -> Result<Self, TreeError> {
        let (io, header) = TreeIo::open(path, cache)?;
        if header.provider_version != provider_version {
            return Err(TreeError::ProviderVersionMismatch {
                found: header.provider_version,
                expected: provider_version,
            });
        }

        let config = TreeConfig {
            block_size: header.block_size,
            max_children: header.max_children,
            provider_version: header.provider_version,
            tree_start: header.tree_start,
        };

        // Rebuild the latest branch by following the newest child at each
        // level.
        let root = io.read_node(header.root_seq)?;
        if root.start() != header.tree_start {
            return Err(TreeError::Corrupt(format!(
                "root node starts at {} but the header says {}",
                root.start(),
                header.tree_start
            )));
        }
        let mut branch = vec![Arc::clone(&root)];
        let mut node = root;
        while node.node_type() == NodeType::Core {
            let child_seq = node.latest_child_seq().ok_or_else(|| {
                TreeError::Corrupt(format!("core node {} has no children", node.seq()))
            })?;
            node = io.read_node(child_seq)?;
            branch.push(Arc::clone(&node));
        }

        let tree_end = branch[0].end();
        Ok(Self {
            io,
            node_count: AtomicI32::new(header.node_count as i32),
            tree_end: AtomicI64::new(tree_end),
            branch: Mutex::new(branch),
            config,
        })
    }

    /// Start time of the tree.
    pub fn tree_start(&self) -> Timestamp {
        self.config.tree_start
    }

    /// End time of the latest interval inserted so far.
    pub fn tree_end(&self) -> Timestamp {
        self.tree_end.load(Ordering::Acquire)
    }

    /// Number of nodes in the tree, in memory or on disk.
    pub fn node_count(&self) -> usize {
        self.node_count.load(Ordering::Acquire) as usize
    }

    /// Current depth of the tree.
    pub fn depth(&self) -> usize {
        self.branch.lock().len()
    }

    /// Point-in-time snapshot of the latest branch, root first.
    ///
    /// The returned nodes are shared with the writer; the snapshot itself
    /// does not change if the branch is split afterwards.
    pub fn latest_branch(&self) -> Vec<Arc<Node>> {
        self.branch.lock().clone()
    }

    /// Size of the header plus every node block. This is also the offset
    /// where the producing layer appends its own sections (worker tables
    /// and such).
    pub fn file_size(&self) -> u64 {
        HEADER_SIZE as u64 + self.node_count() as u64 * self.config.block_size as u64
    }

    /// Total number of intervals stored, scanning every node.
    pub fn interval_count(&self) -> Result<usize, TreeError> {
        let mut total = 0;
        for seq in 0..self.node_count() as i32 {
            total += self.read_node(seq)?.interval_count();
        }
        Ok(total)
    }

    fn next_seq(&self) -> i32 {
        self.node_count.fetch_add(1, Ordering::AcqRel)
    }

    /// Insert an interval into the tree.
    pub fn insert(&self, interval: EdgeInterval) -> Result<(), TreeError> {
        if interval.start() < self.config.tree_start {
            return Err(TreeError::IntervalBeforeTreeStart {
                start: interval.start(),
                tree_start: self.config.tree_start,
            });
        }
        // Must fit a core node too, whose child table eats into the block.
        // An oversized interval would split forever without reclaiming
        // enough room, so this is a producer logic defect.
        let maximum = self.config.block_size
            - COMMON_HEADER_SIZE
            - core_header_size(self.config.max_children);
        assert!(
            interval.size_on_disk() <= maximum,
            "interval of {} bytes exceeds the node capacity of {}",
            interval.size_on_disk(),
            maximum
        );

        let mut branch = self.branch.lock();
        let depth = branch.len() - 1;
        self.insert_at(&mut branch, depth, interval);
        Ok(())
    }

    fn insert_at(&self, branch: &mut Vec<Arc<Node>>, depth: usize, interval: EdgeInterval) {
        let node = Arc::clone(&branch[depth]);

        if interval.size_on_disk() > node.free_space() {
            // No room here. Split the branch and retry at the new leaf.
            self.add_sibling_node(branch, depth, interval.start().max(node.start()));
            let leaf = branch.len() - 1;
            return self.insert_at(branch, leaf, interval);
        }
        if interval.start() < node.start() {
            // Started before this node did; it belongs higher up.
            return self.insert_at(branch, depth - 1, interval);
        }

        let end = interval.end();
        node.add_interval(interval);
        self.tree_end.fetch_max(end, Ordering::AcqRel);
    }

    /// Close the branch from the leaf up to `depth` at the current tree
    /// end, then regrow it with fresh nodes starting at `new_node_start`.
    fn add_sibling_node(&self, branch: &mut Vec<Arc<Node>>, depth: usize, new_node_start: Timestamp) {
        if depth == 0 {
            self.add_new_root_node(branch, new_node_start);
            return;
        }

        // The parent needs a free child slot, and its span must reach back
        // to the new start. Otherwise the split happens one level higher
        // and rebuilds this level along the way.
        let parent = Arc::clone(&branch[depth - 1]);
        if parent.child_count() == self.config.max_children || new_node_start < parent.start() {
            self.add_sibling_node(branch, depth - 1, new_node_start);
            return;
        }

        let split_time = self.tree_end.load(Ordering::Acquire);
        for i in (depth..branch.len()).rev() {
            let node = &branch[i];
            node.close(split_time);
            branch[i - 1].record_child_closed(node.seq(), split_time);
            self.io.write_node(node);
        }

        for i in depth..branch.len() {
            let parent = Arc::clone(&branch[i - 1]);
            let node = match branch[i].node_type() {
                NodeType::Core => Arc::new(Node::new_core(
                    self.config.block_size,
                    self.config.max_children,
                    self.next_seq(),
                    parent.seq(),
                    new_node_start,
                )),
                NodeType::Leaf => Arc::new(Node::new_leaf(
                    self.config.block_size,
                    self.config.max_children,
                    self.next_seq(),
                    parent.seq(),
                    new_node_start,
                )),
            };
            parent.link_new_child(&node);
            branch[i] = node;
        }
        debug!(
            split_time,
            new_node_start,
            depth,
            "split latest branch"
        );
    }

    /// Grow a new root above the current one, closing the whole branch and
    /// rebuilding it one level deeper.
    fn add_new_root_node(&self, branch: &mut Vec<Arc<Node>>, new_node_start: Timestamp) {
        let split_time = self.tree_end.load(Ordering::Acquire);
        let depth = branch.len();
        let old_root = Arc::clone(&branch[0]);

        let new_root = Arc::new(Node::new_core(
            self.config.block_size,
            self.config.max_children,
            self.next_seq(),
            -1,
            self.config.tree_start,
        ));
        old_root.set_parent_seq(new_root.seq());

        for i in (0..branch.len()).rev() {
            let node = &branch[i];
            node.close(split_time);
            if i > 0 {
                branch[i - 1].record_child_closed(node.seq(), split_time);
            }
            self.io.write_node(node);
        }

        // The old root is on disk at this point, so its cached span under
        // the new root is final.
        new_root.link_new_child(&old_root);

        branch.clear();
        branch.push(new_root);
        for i in 1..depth {
            let parent = Arc::clone(&branch[i - 1]);
            let node = Arc::new(Node::new_core(
                self.config.block_size,
                self.config.max_children,
                self.next_seq(),
                parent.seq(),
                new_node_start,
            ));
            parent.link_new_child(&node);
            branch.push(node);
        }
        let parent = Arc::clone(&branch[depth - 1]);
        let leaf = Arc::new(Node::new_leaf(
            self.config.block_size,
            self.config.max_children,
            self.next_seq(),
            parent.seq(),
            new_node_start,
        ));
        parent.link_new_child(&leaf);
        branch.push(leaf);
        debug!(split_time, new_node_start, depth = depth + 1, "grew new root");
    }

    /// Close the tree at `requested_end`, which becomes the authoritative
    /// end time, then write out the latest branch and the file header.
    ///
    /// The tree stays queryable afterwards.
    ///
    /// # Panics
    ///
    /// If `requested_end` is earlier than the end of an interval stored on
    /// the latest branch. Producers must close at or after the last end
    /// time they emitted.
    pub fn close_tree(&self, requested_end: Timestamp) -> Result<(), TreeError> {
        let branch = self.branch.lock();
        let end = requested_end;
        self.tree_end.store(end, Ordering::Release);

        for i in (0..branch.len()).rev() {
            let node = &branch[i];
            node.close(end);
            if i > 0 {
                branch[i - 1].record_child_closed(node.seq(), end);
            }
            self.io.write_node(node);
        }

        let header = FileHeader {
            provider_version: self.config.provider_version,
            block_size: self.config.block_size,
            max_children: self.config.max_children,
            node_count: self.node_count(),
            root_seq: branch[0].seq(),
            tree_start: self.config.tree_start,
        };
        self.io.write_header(&header)
    }

    /// Close the backing file. Queries needing a disk read fail with
    /// [`TreeError::Unavailable`] afterwards.
    pub fn close_file(&self) -> Result<(), TreeError> {
        self.io.close_file()
    }

    /// Close and delete the backing file.
    pub fn delete_file(&self) -> Result<(), TreeError> {
        self.io.delete_file()
    }

    fn read_node(&self, seq: i32) -> Result<Arc<Node>, TreeError> {
        {
            let branch = self.branch.lock();
            if let Some(node) = branch.iter().find(|n| n.seq() == seq) {
                return Ok(Arc::clone(node));
            }
        }
        self.io.read_node(seq)
    }

    /// Breadth-first search for the first interval intersecting `range`
    /// and accepted by `pred`.
    fn query_first<P>(
        &self,
        range: TimeRange,
        ts_is_exact_end: bool,
        pred: P,
    ) -> Result<Option<EdgeInterval>, TreeError>
    where
        P: Fn(&EdgeInterval) -> bool,
    {
        let root_seq = self.branch.lock()[0].seq();
        let mut queue = VecDeque::from([root_seq]);
        while let Some(seq) = queue.pop_front() {
            let node = self.read_node(seq)?;
            if let Some(found) = node.first_matching(range, ts_is_exact_end, &pred) {
                return Ok(Some(found));
            }
            if node.node_type() == NodeType::Core {
                queue.extend(node.select_next_children(range));
            }
        }
        Ok(None)
    }

    /// Find the interval leaving the vertex `from`.
    ///
    /// With `horizontal` set the search matches intervals staying on the
    /// worker's own timeline (including null and filler records);
    /// otherwise it matches vertical edges only. The producing layer
    /// guarantees at most one of each per vertex, so the first match is
    /// the answer.
    pub fn query_edge_from(
        &self,
        from: Vertex,
        horizontal: bool,
    ) -> Result<Option<EdgeInterval>, TreeError> {
        let ts = from.timestamp();
        self.query_first(TimeRange::singleton(ts), false, move |i| {
            let is_vertical = i.kind() == EdgeKind::Vertical;
            i.start() == ts
                && i.from_worker() == from.worker()
                && if horizontal { !is_vertical } else { is_vertical }
        })
    }

    /// Find the interval arriving at the vertex `to`.
    ///
    /// Kind selection works as in [`Self::query_edge_from`]. Since the
    /// matching interval must end exactly at the vertex timestamp, the
    /// node scans stop as soon as the interval ends move past it.
    pub fn query_edge_to(
        &self,
        to: Vertex,
        horizontal: bool,
    ) -> Result<Option<EdgeInterval>, TreeError> {
        let ts = to.timestamp();
        self.query_first(TimeRange::singleton(ts), true, move |i| {
            let is_vertical = i.kind() == EdgeKind::Vertical;
            i.end() == ts
                && i.to_worker() == to.worker()
                && if horizontal { !is_vertical } else { is_vertical }
        })
    }

    /// Find any interval with `vertex` as one of its endpoints, of any
    /// kind. Used to check whether a vertex exists in the graph at all.
    pub fn query_vertex(&self, vertex: Vertex) -> Result<Option<EdgeInterval>, TreeError> {
        let ts = vertex.timestamp();
        let worker = vertex.worker();
        self.query_first(TimeRange::singleton(ts), false, move |i| {
            (i.start() == ts && i.from_worker() == worker)
                || (i.end() == ts && i.to_worker() == worker)
        })
    }
}
