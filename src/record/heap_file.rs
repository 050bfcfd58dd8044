use log::debug;
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use super::error::{RecordError, RecordResult};
use super::record::{Record, RecordId, SlotId};
use super::schema::Relation;
use crate::file::{BufferManager, DiskManager, PageId};

// Data-page layout: prev pointer (8 bytes), next pointer (8 bytes),
// slot count S (4 bytes), S-byte occupancy map, then S fixed-size
// record slots. Header page: full-list head at 0, free-list head at 8.
const PREV_OFFSET: usize = 0;
const NEXT_OFFSET: usize = 8;
const SLOT_COUNT_OFFSET: usize = 16;
const BYTEMAP_OFFSET: usize = 20;

const FULL_HEAD_OFFSET: usize = 0;
const FREE_HEAD_OFFSET: usize = 8;

fn read_pid(data: &[u8], off: usize) -> PageId {
    let mut a = [0u8; 4];
    let mut b = [0u8; 4];
    a.copy_from_slice(&data[off..off + 4]);
    b.copy_from_slice(&data[off + 4..off + 8]);
    PageId::new(i32::from_le_bytes(a), i32::from_le_bytes(b))
}

fn write_pid(data: &mut [u8], off: usize, pid: PageId) {
    data[off..off + 4].copy_from_slice(&pid.file_idx.to_le_bytes());
    data[off + 4..off + 8].copy_from_slice(&pid.page_idx.to_le_bytes());
}

fn read_slot_count(data: &[u8]) -> usize {
    let mut b = [0u8; 4];
    b.copy_from_slice(&data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 4]);
    i32::from_le_bytes(b) as usize
}

/// Slots that fit one page: each slot costs one bytemap byte plus
/// the record payload, after the 20-byte page header.
fn slots_per_page(page_size: usize, record_size: usize) -> usize {
    (page_size - BYTEMAP_OFFSET) / (1 + record_size)
}

/// The two singly-linked page lists owned by a relation's header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PageList {
    Free,
    Full,
}

impl PageList {
    fn head_offset(&self) -> usize {
        match self {
            PageList::Full => FULL_HEAD_OFFSET,
            PageList::Free => FREE_HEAD_OFFSET,
        }
    }
}

/// Heap file of one relation: a header page pointing at the
/// "has free slots" and "full" page lists, with records stored in
/// fixed-size slots. The header location is persisted out-of-band in
/// `BinData/<name>.hdr`.
pub struct HeapFile {
    rel: Relation,
    header_page_id: PageId,
    slots_per_page: usize,
    dm: Arc<DiskManager>,
    bm: Arc<BufferManager>,
}

impl HeapFile {
    /// Open the heap file for `rel`, picking up a previously
    /// persisted header location when the `.hdr` file exists.
    pub fn new(rel: Relation, dm: Arc<DiskManager>, bm: Arc<BufferManager>) -> RecordResult<Self> {
        let slots = slots_per_page(dm.page_size(), rel.record_size());
        let mut heap = Self {
            rel,
            header_page_id: PageId::INVALID,
            slots_per_page: slots,
            dm,
            bm,
        };
        heap.load_header_location()?;
        Ok(heap)
    }

    pub fn relation(&self) -> &Relation {
        &self.rel
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    fn header_file_path(&self) -> PathBuf {
        self.dm.bin_dir().join(format!("{}.hdr", self.rel.name()))
    }

    fn load_header_location(&mut self) -> RecordResult<()> {
        let path = self.header_file_path();
        if !path.exists() {
            return Ok(());
        }
        let data = fs::read(&path)?;
        if data.len() < 8 {
            return Err(RecordError::BadHeaderFile(self.rel.name().to_string()));
        }
        self.header_page_id = read_pid(&data, 0);
        Ok(())
    }

    /// Persist the header location to `BinData/<name>.hdr`.
    pub fn save_header_location(&self) -> RecordResult<()> {
        let mut buf = [0u8; 8];
        write_pid(&mut buf, 0, self.header_page_id);
        fs::write(self.header_file_path(), buf)?;
        Ok(())
    }

    /// Pin a page, run `f` over its bytes read-only, unpin.
    fn with_page<T>(
        &self,
        pid: PageId,
        f: impl FnOnce(&[u8]) -> RecordResult<T>,
    ) -> RecordResult<T> {
        let frame = self.bm.get_page(pid)?;
        let result = {
            let guard = frame.lock().unwrap();
            f(&guard.data)
        };
        let freed = self.bm.free_page(pid, false);
        let value = result?;
        freed?;
        Ok(value)
    }

    /// Pin a page, run `f` over its bytes mutably, unpin dirty.
    fn with_page_mut<T>(
        &self,
        pid: PageId,
        f: impl FnOnce(&mut [u8]) -> RecordResult<T>,
    ) -> RecordResult<T> {
        let frame = self.bm.get_page(pid)?;
        let result = {
            let mut guard = frame.lock().unwrap();
            f(&mut guard.data)
        };
        let freed = self.bm.free_page(pid, true);
        let value = result?;
        freed?;
        Ok(value)
    }

    fn list_head(&self, list: PageList) -> RecordResult<PageId> {
        if !self.header_page_id.is_valid() {
            return Ok(PageId::INVALID);
        }
        self.with_page(self.header_page_id, |data| {
            Ok(read_pid(data, list.head_offset()))
        })
    }

    fn set_list_head(&self, list: PageList, pid: PageId) -> RecordResult<()> {
        if !self.header_page_id.is_valid() {
            return Err(RecordError::HeaderMissing);
        }
        self.with_page_mut(self.header_page_id, |data| {
            write_pid(data, list.head_offset(), pid);
            Ok(())
        })
    }

    fn page_next(&self, pid: PageId) -> RecordResult<PageId> {
        self.with_page(pid, |data| Ok(read_pid(data, NEXT_OFFSET)))
    }

    fn set_page_next(&self, pid: PageId, next: PageId) -> RecordResult<()> {
        self.with_page_mut(pid, |data| {
            write_pid(data, NEXT_OFFSET, next);
            Ok(())
        })
    }

    fn first_free_slot(&self, pid: PageId) -> RecordResult<Option<SlotId>> {
        self.with_page(pid, |data| {
            let slots = read_slot_count(data);
            Ok((0..slots).find(|&i| data[BYTEMAP_OFFSET + i] == 0))
        })
    }

    /// Allocate and initialise a fresh data page and link it at the
    /// head of the free list, creating the header page first when
    /// the relation does not have one yet.
    fn add_data_page(&mut self) -> RecordResult<PageId> {
        let slots = self.slots_per_page;
        if slots == 0 {
            return Err(RecordError::PageTooSmall {
                record_size: self.rel.record_size(),
            });
        }
        let pid = self.dm.allocate_page()?;
        debug!("relation {}: new data page {pid}", self.rel.name());
        self.with_page_mut(pid, |data| {
            data.fill(0);
            write_pid(data, PREV_OFFSET, PageId::INVALID);
            write_pid(data, NEXT_OFFSET, PageId::INVALID);
            data[SLOT_COUNT_OFFSET..SLOT_COUNT_OFFSET + 4]
                .copy_from_slice(&(slots as i32).to_le_bytes());
            Ok(())
        })?;

        if !self.header_page_id.is_valid() {
            let hpid = self.dm.allocate_page()?;
            self.with_page_mut(hpid, |data| {
                data.fill(0);
                write_pid(data, FULL_HEAD_OFFSET, PageId::INVALID);
                write_pid(data, FREE_HEAD_OFFSET, pid);
                Ok(())
            })?;
            self.header_page_id = hpid;
            self.save_header_location()?;
            debug!("relation {}: header page {hpid}", self.rel.name());
        } else {
            let old_head = self.list_head(PageList::Free)?;
            self.set_page_next(pid, old_head)?;
            self.set_list_head(PageList::Free, pid)?;
        }
        Ok(pid)
    }

    /// Create the header (and first data page) if absent. Idempotent.
    pub fn ensure_header(&mut self) -> RecordResult<()> {
        if self.header_page_id.is_valid() {
            return Ok(());
        }
        self.add_data_page().map(|_| ())
    }

    /// Insert a record into the first free slot found on the free
    /// list, allocating a page when the list is exhausted. Moves the
    /// page onto the full list when the insert fills it.
    pub fn insert_record(&mut self, rec: &Record) -> RecordResult<RecordId> {
        if !self.header_page_id.is_valid() {
            self.add_data_page()?;
        }
        let mut cur = self.list_head(PageList::Free)?;
        if !cur.is_valid() {
            cur = self.add_data_page()?;
        }

        let mut visited: HashSet<PageId> = HashSet::new();
        while cur.is_valid() {
            if !visited.insert(cur) {
                // corrupted (cyclic) free list: fall back to a fresh page
                cur = self.add_data_page()?;
                continue;
            }
            if let Some(slot) = self.first_free_slot(cur)? {
                let became_full = self.with_page_mut(cur, |data| {
                    let slots = read_slot_count(data);
                    let payload_start = BYTEMAP_OFFSET + slots;
                    let pos = payload_start + slot * self.rel.record_size();
                    self.rel.write_record(rec, data, pos)?;
                    data[BYTEMAP_OFFSET + slot] = 1;
                    Ok(data[BYTEMAP_OFFSET..BYTEMAP_OFFSET + slots]
                        .iter()
                        .all(|&b| b == 1))
                })?;
                if became_full {
                    self.unlink_from(PageList::Free, cur)?;
                    self.prepend_to(PageList::Full, cur)?;
                }
                return Ok(RecordId::new(cur, slot));
            }
            let next = self.page_next(cur)?;
            cur = if next.is_valid() {
                next
            } else {
                self.add_data_page()?
            };
        }
        Err(RecordError::InsertFailed)
    }

    /// Free a slot and zero its payload. A page that was full moves
    /// back to the free list; a page already on the free list keeps
    /// its linkage untouched.
    pub fn delete_record(&mut self, rid: RecordId) -> RecordResult<()> {
        let pid = rid.page_id;
        let was_full = self.with_page_mut(pid, |data| {
            let slots = read_slot_count(data);
            if rid.slot_idx >= slots {
                return Err(RecordError::InvalidSlot {
                    page: pid,
                    slot: rid.slot_idx,
                });
            }
            if data[BYTEMAP_OFFSET + rid.slot_idx] == 0 {
                return Err(RecordError::SlotAlreadyFree {
                    page: pid,
                    slot: rid.slot_idx,
                });
            }
            let was_full = data[BYTEMAP_OFFSET..BYTEMAP_OFFSET + slots]
                .iter()
                .all(|&b| b == 1);
            data[BYTEMAP_OFFSET + rid.slot_idx] = 0;
            let payload_start = BYTEMAP_OFFSET + slots;
            let pos = payload_start + rid.slot_idx * self.rel.record_size();
            data[pos..pos + self.rel.record_size()].fill(0);
            Ok(was_full)
        })?;

        if was_full {
            self.unlink_from(PageList::Full, pid)?;
            self.prepend_to(PageList::Free, pid)?;
        }
        Ok(())
    }

    /// Visit every live record, free list first, then the full list.
    /// A visitor error aborts the walk; a cycle ends it silently.
    pub fn scan_records(
        &self,
        mut visit: impl FnMut(Record, RecordId) -> RecordResult<()>,
    ) -> RecordResult<()> {
        if !self.header_page_id.is_valid() {
            return Ok(());
        }
        let mut visited: HashSet<PageId> = HashSet::new();
        for list in [PageList::Free, PageList::Full] {
            let mut pid = self.list_head(list)?;
            while pid.is_valid() && visited.insert(pid) {
                pid = self.scan_page(pid, &mut visit)?;
            }
        }
        Ok(())
    }

    fn scan_page(
        &self,
        pid: PageId,
        visit: &mut impl FnMut(Record, RecordId) -> RecordResult<()>,
    ) -> RecordResult<PageId> {
        self.with_page(pid, |data| {
            let slots = read_slot_count(data);
            let payload_start = BYTEMAP_OFFSET + slots;
            for slot in 0..slots {
                if data[BYTEMAP_OFFSET + slot] == 1 {
                    let rec = self
                        .rel
                        .read_record(data, payload_start + slot * self.rel.record_size())?;
                    visit(rec, RecordId::new(pid, slot))?;
                }
            }
            Ok(read_pid(data, NEXT_OFFSET))
        })
    }

    /// All data pages of the relation, both lists, cycle-tolerant.
    pub fn all_page_ids(&self) -> RecordResult<Vec<PageId>> {
        let mut out = Vec::new();
        if !self.header_page_id.is_valid() {
            return Ok(out);
        }
        let mut visited: HashSet<PageId> = HashSet::new();
        for list in [PageList::Free, PageList::Full] {
            let mut pid = self.list_head(list)?;
            while pid.is_valid() && visited.insert(pid) {
                out.push(pid);
                pid = self.page_next(pid)?;
            }
        }
        Ok(out)
    }

    /// Detach `target` from `list`, stitching its predecessor to its
    /// successor. Unknown targets and empty lists are no-ops.
    fn unlink_from(&self, list: PageList, target: PageId) -> RecordResult<()> {
        let head = self.list_head(list)?;
        if !head.is_valid() {
            return Ok(());
        }
        if head == target {
            let next = self.page_next(target)?;
            return self.set_list_head(list, next);
        }
        let mut visited: HashSet<PageId> = HashSet::new();
        let mut prev = head;
        while prev.is_valid() && visited.insert(prev) {
            let next = self.page_next(prev)?;
            if next == target {
                let after = self.page_next(target)?;
                return self.set_page_next(prev, after);
            }
            prev = next;
        }
        Ok(())
    }

    /// Make `target` the new head of `list`. Prepending the current
    /// head again is a no-op so a page can never point at itself.
    fn prepend_to(&self, list: PageList, target: PageId) -> RecordResult<()> {
        let head = self.list_head(list)?;
        if head == target {
            return Ok(());
        }
        self.set_page_next(target, head)?;
        self.set_list_head(list, target)
    }
}
