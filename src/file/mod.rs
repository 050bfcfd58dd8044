mod buffer_manager;
mod disk_manager;
mod error;

pub use buffer_manager::{BufferManager, Frame, FrameRef};
pub use disk_manager::DiskManager;
pub use error::{FileError, FileResult};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies a page inside a segment file: `file_idx` is the x in
/// `Datax.bin`, `page_idx` the 0-based page number within that file.
/// The pair (-1, -1) is the "no page" sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId {
    #[serde(rename = "fileidx")]
    pub file_idx: i32,
    #[serde(rename = "pageidx")]
    pub page_idx: i32,
}

impl PageId {
    pub const INVALID: PageId = PageId {
        file_idx: -1,
        page_idx: -1,
    };

    pub fn new(file_idx: i32, page_idx: i32) -> Self {
        Self { file_idx, page_idx }
    }

    pub fn is_valid(&self) -> bool {
        self.file_idx >= 0 && self.page_idx >= 0
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.file_idx, self.page_idx)
    }
}
