use crate::file::{FileError, PageId};
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("file error: {0}")]
    File(#[from] FileError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("record arity mismatch: expected {expected} values, got {actual}")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("buffer too small for record at offset {offset}")]
    BadBuffer { offset: usize },

    #[error("column {column}: invalid int value {value:?}")]
    BadInt { column: String, value: String },

    #[error("column {column}: invalid float value {value:?}")]
    BadFloat { column: String, value: String },

    #[error("invalid slot {slot} in page {page}")]
    InvalidSlot { page: PageId, slot: usize },

    #[error("slot {slot} in page {page} is already free")]
    SlotAlreadyFree { page: PageId, slot: usize },

    #[error("relation header page not initialized")]
    HeaderMissing,

    #[error("page too small to hold a record of {record_size} bytes")]
    PageTooSmall { record_size: usize },

    #[error("invalid header metadata file for relation {0}")]
    BadHeaderFile(String),

    #[error("could not insert record")]
    InsertFailed,
}

pub type RecordResult<T> = Result<T, RecordError>;
