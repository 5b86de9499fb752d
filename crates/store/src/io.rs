//! File access for the history tree
//!
//! The file starts with a fixed 4 KiB header, followed by the node blocks
//! at `HEADER_SIZE + seq * block_size`. Anything the producing layer
//! appends after the last block (worker tables and the like) is outside
//! this module's concern; [`crate::tree::GraphTree::file_size`] tells
//! callers where that region begins.
//!
//! Reads go through the shared [`NodeCache`]. Node writes are best effort:
//! a failed block write is logged and dropped, since the in-memory branch
//! still holds the data and the header is only written once the tree is
//! closed. Header writes do propagate errors, because a missing header
//! makes the whole file unreadable.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use tracing::{debug, error};
use tracegraph_core::Timestamp;

use crate::cache::NodeCache;
use crate::error::TreeError;
use crate::node::Node;

/// Size of the file header, in bytes.
pub const HEADER_SIZE: usize = 4096;

/// Magic number identifying a graph history file.
pub const MAGIC: i32 = 0x05ED_6E01;

/// Revision of the on-disk layout this build reads and writes.
pub const FORMAT_VERSION: i32 = 1;

static NEXT_FILE_ID: AtomicU64 = AtomicU64::new(0);

/// Decoded contents of the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    /// Version of the edge provider that produced the file.
    pub provider_version: i32,
    /// Size of each node block.
    pub block_size: usize,
    /// Maximum number of children per core node.
    pub max_children: usize,
    /// Total number of nodes in the file.
    pub node_count: usize,
    /// Sequence number of the root node.
    pub root_seq: i32,
    /// Start time of the tree.
    pub tree_start: Timestamp,
}

impl FileHeader {
    /// Serialize into a full header block.
    pub fn serialize(&self) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(HEADER_SIZE);
        buf.write_i32::<LittleEndian>(MAGIC)?;
        buf.write_i32::<LittleEndian>(FORMAT_VERSION)?;
        buf.write_i32::<LittleEndian>(self.provider_version)?;
        buf.write_i32::<LittleEndian>(self.block_size as i32)?;
        buf.write_i32::<LittleEndian>(self.max_children as i32)?;
        buf.write_i32::<LittleEndian>(self.node_count as i32)?;
        buf.write_i32::<LittleEndian>(self.root_seq)?;
        buf.write_i64::<LittleEndian>(self.tree_start)?;
        buf.resize(HEADER_SIZE, 0);
        Ok(buf)
    }

    /// Parse a header block, checking the magic number and format version.
    pub fn parse(block: &[u8]) -> Result<Self, TreeError> {
        let mut buf = std::io::Cursor::new(block);
        let magic = buf.read_i32::<LittleEndian>()?;
        if magic != MAGIC {
            return Err(TreeError::BadMagic { found: magic });
        }
        let format_version = buf.read_i32::<LittleEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(TreeError::FormatVersionMismatch {
                found: format_version,
                expected: FORMAT_VERSION,
            });
        }
        let provider_version = buf.read_i32::<LittleEndian>()?;
        let block_size = buf.read_i32::<LittleEndian>()?;
        let max_children = buf.read_i32::<LittleEndian>()?;
        let node_count = buf.read_i32::<LittleEndian>()?;
        let root_seq = buf.read_i32::<LittleEndian>()?;
        let tree_start = buf.read_i64::<LittleEndian>()?;
        if block_size <= 0 || max_children <= 0 || node_count < 0 {
            return Err(TreeError::Corrupt(format!(
                "implausible header: block_size {block_size}, max_children {max_children}, node_count {node_count}"
            )));
        }
        Ok(Self {
            provider_version,
            block_size: block_size as usize,
            max_children: max_children as usize,
            node_count: node_count as usize,
            root_seq,
            tree_start,
        })
    }
}

/// Block-level reader/writer for one history file.
///
/// All file access goes through a single mutex-guarded handle. Closing the
/// file drops the handle; later reads fail with [`TreeError::Unavailable`].
#[derive(Debug)]
pub struct TreeIo {
    file_id: u64,
    path: PathBuf,
    block_size: usize,
    max_children: usize,
    file: Mutex<Option<File>>,
    cache: Arc<NodeCache>,
}

impl TreeIo {
    /// Create a fresh, truncated history file.
    pub fn create(
        path: &Path,
        block_size: usize,
        max_children: usize,
        cache: Arc<NodeCache>,
    ) -> Result<Self, TreeError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(Self {
            file_id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            block_size,
            max_children,
            file: Mutex::new(Some(file)),
            cache,
        })
    }

    /// Open an existing history file and read its header.
    pub fn open(path: &Path, cache: Arc<NodeCache>) -> Result<(Self, FileHeader), TreeError> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        let mut block = vec![0u8; HEADER_SIZE];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut block)?;
        let header = FileHeader::parse(&block)?;
        let io = Self {
            file_id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            path: path.to_path_buf(),
            block_size: header.block_size,
            max_children: header.max_children,
            file: Mutex::new(Some(file)),
            cache,
        };
        Ok((io, header))
    }

    /// Identifier of this file within the shared node cache.
    pub fn file_id(&self) -> u64 {
        self.file_id
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn node_offset(&self, seq: i32) -> u64 {
        HEADER_SIZE as u64 + seq as u64 * self.block_size as u64
    }

    /// Read the node with the given sequence number, through the cache.
    pub fn read_node(&self, seq: i32) -> Result<Arc<Node>, TreeError> {
        if seq < 0 {
            return Err(TreeError::Corrupt(format!(
                "node sequence number {seq} is negative"
            )));
        }
        if let Some(node) = self.cache.get(self.file_id, seq) {
            return Ok(node);
        }

        let mut block = vec![0u8; self.block_size];
        {
            let mut guard = self.file.lock();
            let file = guard.as_mut().ok_or(TreeError::Unavailable)?;
            file.seek(SeekFrom::Start(self.node_offset(seq)))?;
            file.read_exact(&mut block)?;
        }
        let node = Arc::new(Node::read_block(self.block_size, self.max_children, &block)?);
        debug!(seq, file = %self.path.display(), "node read from disk");
        self.cache.insert(self.file_id, seq, Arc::clone(&node));
        Ok(node)
    }

    /// Write a node block to the file, best effort.
    ///
    /// The node stays available through the cache even when the write
    /// fails; the failure is logged and otherwise swallowed.
    pub fn write_node(&self, node: &Arc<Node>) {
        self.cache
            .insert(self.file_id, node.seq(), Arc::clone(node));
        if let Err(e) = self.write_node_block(node) {
            error!(
                seq = node.seq(),
                file = %self.path.display(),
                error = %e,
                "failed to write node block"
            );
            return;
        }
        node.mark_on_disk();
    }

    fn write_node_block(&self, node: &Arc<Node>) -> Result<(), TreeError> {
        let block = node.write_block()?;
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(TreeError::Unavailable)?;
        file.seek(SeekFrom::Start(self.node_offset(node.seq())))?;
        file.write_all(&block)?;
        Ok(())
    }

    /// Write the file header.
    pub fn write_header(&self, header: &FileHeader) -> Result<(), TreeError> {
        let block = header.serialize()?;
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(TreeError::Unavailable)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&block)?;
        file.sync_data()?;
        Ok(())
    }

    /// Close the backing file. Later reads and writes fail with
    /// [`TreeError::Unavailable`]. Closing twice is a no-op.
    pub fn close_file(&self) -> Result<(), TreeError> {
        let mut guard = self.file.lock();
        if let Some(file) = guard.take() {
            file.sync_all()?;
        }
        Ok(())
    }

    /// Close and delete the backing file, purging its cached nodes.
    pub fn delete_file(&self) -> Result<(), TreeError> {
        {
            let mut guard = self.file.lock();
            guard.take();
        }
        self.cache.purge_file(self.file_id);
        std::fs::remove_file(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracegraph_core::{EdgeInterval, Vertex};

    const BLOCK: usize = 512;
    const MAX_CHILDREN: usize = 4;

    fn new_io(dir: &tempfile::TempDir, name: &str) -> TreeIo {
        TreeIo::create(
            &dir.path().join(name),
            BLOCK,
            MAX_CHILDREN,
            Arc::new(NodeCache::default()),
        )
        .unwrap()
    }

    fn leaf_with_interval(seq: i32) -> Arc<Node> {
        let node = Node::new_leaf(BLOCK, MAX_CHILDREN, seq, -1, 0);
        node.add_interval(EdgeInterval::null_edge(
            Vertex::new(0, seq),
            Vertex::new(10, seq),
        ));
        node.close(10);
        Arc::new(node)
    }

    #[test]
    fn test_header_roundtrip() {
        let header = FileHeader {
            provider_version: 3,
            block_size: BLOCK,
            max_children: MAX_CHILDREN,
            node_count: 17,
            root_seq: 16,
            tree_start: 1000,
        };
        let block = header.serialize().unwrap();
        assert_eq!(block.len(), HEADER_SIZE);
        assert_eq!(FileHeader::parse(&block).unwrap(), header);
    }

    #[test]
    fn test_header_rejects_wrong_magic() {
        let mut block = FileHeader {
            provider_version: 0,
            block_size: BLOCK,
            max_children: MAX_CHILDREN,
            node_count: 1,
            root_seq: 0,
            tree_start: 0,
        }
        .serialize()
        .unwrap();
        block[0] ^= 0xFF;
        assert!(matches!(
            FileHeader::parse(&block),
            Err(TreeError::BadMagic { .. })
        ));
    }

    #[test]
    fn test_write_then_read_node() {
        let dir = tempfile::tempdir().unwrap();
        let io = new_io(&dir, "t.ht");
        let node = leaf_with_interval(2);
        io.write_node(&node);
        assert!(node.is_on_disk());

        // Cache hit returns the same allocation.
        let cached = io.read_node(2).unwrap();
        assert!(Arc::ptr_eq(&cached, &node));

        // Cold read parses the block back.
        io.cache.purge_file(io.file_id());
        let cold = io.read_node(2).unwrap();
        assert!(!Arc::ptr_eq(&cold, &node));
        assert_eq!(cold.seq(), 2);
        assert_eq!(cold.end(), 10);
        assert_eq!(cold.interval_count(), 1);
    }

    #[test]
    fn test_reads_fail_after_close() {
        let dir = tempfile::tempdir().unwrap();
        let io = new_io(&dir, "t.ht");
        io.write_node(&leaf_with_interval(0));
        io.cache.purge_file(io.file_id());
        io.close_file().unwrap();
        assert!(matches!(io.read_node(0), Err(TreeError::Unavailable)));
        // Closing again is harmless.
        io.close_file().unwrap();
    }

    #[test]
    fn test_delete_removes_file_and_cache_entries() {
        let dir = tempfile::tempdir().unwrap();
        let io = new_io(&dir, "t.ht");
        io.write_node(&leaf_with_interval(0));
        let path = io.path().to_path_buf();
        assert!(path.exists());
        io.delete_file().unwrap();
        assert!(!path.exists());
        assert!(io.cache.get(io.file_id(), 0).is_none());
    }

    #[test]
    fn test_open_checks_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.ht");
        let cache = Arc::new(NodeCache::default());
        {
            let io = TreeIo::create(&path, BLOCK, MAX_CHILDREN, Arc::clone(&cache)).unwrap();
            io.write_node(&leaf_with_interval(0));
            io.write_header(&FileHeader {
                provider_version: 9,
                block_size: BLOCK,
                max_children: MAX_CHILDREN,
                node_count: 1,
                root_seq: 0,
                tree_start: 0,
            })
            .unwrap();
            io.close_file().unwrap();
        }
        let (io, header) = TreeIo::open(&path, cache).unwrap();
        assert_eq!(header.provider_version, 9);
        assert_eq!(header.node_count, 1);
        let node = io.read_node(0).unwrap();
        assert_eq!(node.interval_count(), 1);
    }
}
