use crate::file::PageId;

/// Slot index within a data page.
pub type SlotId = usize;

/// Physical identifier of a record: page plus slot. Only stable
/// while the slot stays occupied; deletion invalidates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: PageId,
    pub slot_idx: SlotId,
}

impl RecordId {
    pub fn new(page_id: PageId, slot_idx: SlotId) -> Self {
        Self { page_id, slot_idx }
    }
}

/// A tuple held as decoded string values; the schema codec performs
/// all numeric parsing and formatting at the page boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    values: Vec<String>,
}

impl Record {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }

    pub fn from_strs(values: &[&str]) -> Self {
        Self {
            values: values.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
