use std::{io, result};

use thiserror::Error;

use crate::relation::RelationError;

pub type Result<T, E = Error> = result::Result<T, E>;

/// Error taxonomy for the sliding-window cache.
///
/// `IndexIntegrity` should never be observable outside of a bug: the
/// `Relation` index it wraps is transactional, so the index itself is left
/// unchanged whenever one of these is raised.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("offset {offset} is out of range for a file of size {file_size}")]
    OutOfRange { offset: u64, file_size: u64 },

    #[error("index {index} is out of range for a buffer of size {size}")]
    IndexOutOfRange { index: i64, size: u64 },

    #[error("{0}")]
    Unsupported(&'static str),

    #[error("internal index integrity violation: {0}")]
    IndexIntegrity(#[from] RelationError),

    #[error("failed to {action} file after one retry following eviction: {source}")]
    Resource {
        action: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("close() left {} region(s) still mapped (held by active cursors)", regions.len())]
    CloseWithActive { regions: Vec<String> },

    #[error("cursor or buffer was already released")]
    AlreadyReleased,

    #[error("path queried on a cursor/file opened from a raw file descriptor")]
    NotAPath,

    #[error("file descriptor queried on a cursor/file opened from a path")]
    NotAFd,
}
