use log::debug;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use super::error::{FileError, FileResult};
use super::{DiskManager, PageId};
use crate::config::{DbConfig, ReplacementPolicy};

/// In-memory image of one page. Handed out pinned by
/// [`BufferManager::get_page`]; the caller must release it through
/// [`BufferManager::free_page`] on every path, including errors.
pub struct Frame {
    pub page_id: PageId,
    pub data: Vec<u8>,
}

pub type FrameRef = Arc<Mutex<Frame>>;

/// Pin count and dirty state live in the pool, outside the frame
/// lock, so victim selection never has to take a caller-held lock.
struct FrameMeta {
    page_id: PageId,
    pin_count: u32,
    dirty: bool,
}

impl FrameMeta {
    fn is_free(&self) -> bool {
        self.pin_count == 0 && !self.page_id.is_valid()
    }
}

struct BufferPool {
    frames: Vec<FrameRef>,
    meta: Vec<FrameMeta>,
    lookup: HashMap<PageId, usize>,
    // access order over resident frames, most recently used at the back
    order: VecDeque<usize>,
    policy: ReplacementPolicy,
}

impl BufferPool {
    fn touch(&mut self, idx: usize) {
        self.order.retain(|&i| i != idx);
        self.order.push_back(idx);
    }

    fn free_frame(&self) -> Option<usize> {
        (0..self.meta.len()).find(|&i| self.meta[i].is_free())
    }
}

/// Fixed pool of `bm_buffercount` frames caching pages by id, with
/// pin counts, sticky dirty bits and LRU/MRU victim selection.
pub struct BufferManager {
    dm: Arc<DiskManager>,
    pool: Mutex<BufferPool>,
}

impl BufferManager {
    pub fn new(cfg: &DbConfig, dm: Arc<DiskManager>) -> Self {
        let page_size = dm.page_size();
        let frames = (0..cfg.buffer_count)
            .map(|_| {
                Arc::new(Mutex::new(Frame {
                    page_id: PageId::INVALID,
                    data: vec![0u8; page_size],
                }))
            })
            .collect();
        let meta = (0..cfg.buffer_count)
            .map(|_| FrameMeta {
                page_id: PageId::INVALID,
                pin_count: 0,
                dirty: false,
            })
            .collect();
        Self {
            dm,
            pool: Mutex::new(BufferPool {
                frames,
                meta,
                lookup: HashMap::new(),
                order: VecDeque::new(),
                policy: cfg.policy,
            }),
        }
    }

    /// Pin the frame holding `pid`, loading the page on a miss. A
    /// miss prefers an unused frame (lowest index first); otherwise
    /// the frame at the eviction end of the access order is reused,
    /// writing its contents back first when dirty.
    pub fn get_page(&self, pid: PageId) -> FileResult<FrameRef> {
        if !pid.is_valid() {
            return Err(FileError::InvalidPageId(pid));
        }
        let mut pool = self.pool.lock().unwrap();

        if let Some(&idx) = pool.lookup.get(&pid) {
            pool.touch(idx);
            pool.meta[idx].pin_count += 1;
            return Ok(pool.frames[idx].clone());
        }

        let idx = match pool.free_frame() {
            Some(idx) => idx,
            None => self.evict(&mut pool)?,
        };

        let bytes = self.dm.read_page(pid)?;
        {
            let mut frame = pool.frames[idx].lock().unwrap();
            frame.page_id = pid;
            frame.data.copy_from_slice(&bytes);
        }
        let meta = &mut pool.meta[idx];
        meta.page_id = pid;
        meta.pin_count = 1;
        meta.dirty = false;
        pool.lookup.insert(pid, idx);
        pool.order.push_back(idx);
        Ok(pool.frames[idx].clone())
    }

    /// Choose and clear a victim frame, returning its index. The
    /// victim is the frame at the policy end of the access order; a
    /// pinned victim fails rather than searching further.
    fn evict(&self, pool: &mut BufferPool) -> FileResult<usize> {
        let victim = match pool.policy {
            ReplacementPolicy::Lru => pool.order.front().copied(),
            ReplacementPolicy::Mru => pool.order.back().copied(),
        }
        .ok_or(FileError::AllFramesPinned)?;

        if pool.meta[victim].pin_count > 0 {
            return Err(FileError::AllFramesPinned);
        }
        if pool.meta[victim].dirty {
            let frame = pool.frames[victim].lock().unwrap();
            self.dm.write_page(pool.meta[victim].page_id, &frame.data)?;
        }
        debug!(
            "evicting page {} from frame {victim}",
            pool.meta[victim].page_id
        );
        let old = pool.meta[victim].page_id;
        pool.lookup.remove(&old);
        let _ = match pool.policy {
            ReplacementPolicy::Lru => pool.order.pop_front(),
            ReplacementPolicy::Mru => pool.order.pop_back(),
        };
        pool.meta[victim].page_id = PageId::INVALID;
        pool.meta[victim].dirty = false;
        Ok(victim)
    }

    /// Unpin `pid`, optionally marking it dirty. The dirty bit is
    /// sticky until the next successful write-back.
    pub fn free_page(&self, pid: PageId, mark_dirty: bool) -> FileResult<()> {
        let mut pool = self.pool.lock().unwrap();
        let idx = *pool
            .lookup
            .get(&pid)
            .ok_or(FileError::PageNotResident(pid))?;
        let meta = &mut pool.meta[idx];
        meta.pin_count = meta.pin_count.saturating_sub(1);
        if mark_dirty {
            meta.dirty = true;
        }
        Ok(())
    }

    /// Swap the replacement policy. The access order is kept as-is;
    /// only the end chosen on the next miss changes.
    pub fn set_policy(&self, policy: ReplacementPolicy) {
        self.pool.lock().unwrap().policy = policy;
    }

    /// Write back every dirty frame and reset the pool to empty.
    /// Fails without touching anything while a frame is pinned.
    pub fn flush_all(&self) -> FileResult<()> {
        let mut pool = self.pool.lock().unwrap();
        if pool.meta.iter().any(|m| m.pin_count > 0) {
            return Err(FileError::FramesPinned);
        }
        for idx in 0..pool.meta.len() {
            if pool.meta[idx].page_id.is_valid() && pool.meta[idx].dirty {
                let frame = pool.frames[idx].lock().unwrap();
                self.dm.write_page(pool.meta[idx].page_id, &frame.data)?;
                drop(frame);
                pool.meta[idx].dirty = false;
            }
        }
        for idx in 0..pool.meta.len() {
            let mut frame = pool.frames[idx].lock().unwrap();
            frame.page_id = PageId::INVALID;
            frame.data.fill(0);
            drop(frame);
            pool.meta[idx] = FrameMeta {
                page_id: PageId::INVALID,
                pin_count: 0,
                dirty: false,
            };
        }
        pool.lookup.clear();
        pool.order.clear();
        Ok(())
    }

    pub fn is_resident(&self, pid: PageId) -> bool {
        self.pool.lock().unwrap().lookup.contains_key(&pid)
    }

    pub fn pin_count_of(&self, pid: PageId) -> Option<u32> {
        let pool = self.pool.lock().unwrap();
        pool.lookup.get(&pid).map(|&idx| pool.meta[idx].pin_count)
    }

    pub fn dirty_frame_count(&self) -> usize {
        let pool = self.pool.lock().unwrap();
        pool.meta.iter().filter(|m| m.dirty).count()
    }
}
