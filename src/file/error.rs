use super::PageId;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid page id: {0}")]
    InvalidPageId(PageId),

    #[error("no space left: reached dm_maxfilecount ({0})")]
    NoSpace(usize),

    #[error("page buffer size mismatch: expected {expected}, got {actual}")]
    PageSizeMismatch { expected: usize, actual: usize },

    #[error("page not resident in buffer pool: {0}")]
    PageNotResident(PageId),

    #[error("all frames pinned")]
    AllFramesPinned,

    #[error("cannot flush: frames still pinned")]
    FramesPinned,
}

pub type FileResult<T> = Result<T, FileError>;
