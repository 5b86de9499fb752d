//! Error types for the history tree storage layer

use thiserror::Error;
use tracegraph_core::{CodecError, Timestamp};

/// Errors surfaced by tree construction, insertion and queries.
///
/// These cover recoverable conditions such as opening the wrong file or
/// querying after the backing file was closed. Violations of internal
/// invariants (overfilling a node, closing a node before its last interval
/// ends) are programming errors and panic instead.
#[derive(Debug, Error)]
pub enum TreeError {
    /// The configured block size cannot hold the node headers.
    #[error("block size {block_size} is too small, minimum is {minimum}")]
    BlockSizeTooSmall {
        /// The requested block size.
        block_size: usize,
        /// The smallest size that can hold a node.
        minimum: usize,
    },

    /// The file does not start with the history tree magic number.
    #[error("bad magic number {found:#010x}, not a graph history file")]
    BadMagic {
        /// The value found at the start of the file.
        found: i32,
    },

    /// The file was written by an incompatible format revision.
    #[error("file format version {found}, expected {expected}")]
    FormatVersionMismatch {
        /// The version recorded in the file.
        found: i32,
        /// The version this build understands.
        expected: i32,
    },

    /// The file was produced by a different version of the edge provider.
    #[error("provider version {found}, expected {expected}")]
    ProviderVersionMismatch {
        /// The version recorded in the file.
        found: i32,
        /// The version the caller asked for.
        expected: i32,
    },

    /// The backing file was closed or deleted.
    #[error("the history file is no longer available")]
    Unavailable,

    /// An interval starts before the configured start of the tree.
    #[error("interval start {start} is before the tree start {tree_start}")]
    IntervalBeforeTreeStart {
        /// Start time of the rejected interval.
        start: Timestamp,
        /// Start time of the tree.
        tree_start: Timestamp,
    },

    /// A node block or the file header is structurally invalid.
    #[error("corrupt history file: {0}")]
    Corrupt(String),

    /// An interval record failed to decode.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// An underlying file operation failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
