mod error;
mod heap_file;
mod record;
mod schema;
mod value;

pub use error::{RecordError, RecordResult};
pub use heap_file::HeapFile;
pub use record::{Record, RecordId, SlotId};
pub use schema::{ColumnInfo, Relation};
pub use value::ColumnKind;
