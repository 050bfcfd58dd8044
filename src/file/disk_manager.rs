use log::debug;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use super::error::{FileError, FileResult};
use super::PageId;
use crate::config::DbConfig;

/// Page allocation and I/O over the `Data<i>.bin` segment files kept
/// under `<dbpath>/BinData`.
///
/// Allocation state for segment `i` lives in `Data<i>.bitmap`, one
/// byte per page (0 = free, 1 = used). All operations serialise on a
/// single internal mutex; the manager is safe to share behind `Arc`
/// but offers no read/write parallelism.
pub struct DiskManager {
    page_size: usize,
    max_file_count: usize,
    bin_dir: PathBuf,
    state: Mutex<DiskState>,
}

#[derive(Default)]
struct DiskState {
    // bitmaps[file_idx] = one byte per page, loaded lazily
    bitmaps: HashMap<usize, Vec<u8>>,
}

impl DiskManager {
    pub fn new(cfg: &DbConfig) -> Self {
        Self {
            page_size: cfg.page_size,
            max_file_count: cfg.max_file_count,
            bin_dir: cfg.db_path.join("BinData"),
            state: Mutex::new(DiskState::default()),
        }
    }

    /// Create the `BinData` directory, ensure `Data0.bin` exists and
    /// load its bitmap.
    pub fn init(&self) -> FileResult<()> {
        fs::create_dir_all(&self.bin_dir)?;
        let data0 = self.data_path(0);
        if !data0.exists() {
            File::create(&data0)?;
        }
        let mut state = self.state.lock().unwrap();
        self.load_bitmap(&mut state, 0)?;
        Ok(())
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Directory holding the segment files and per-relation metadata.
    pub fn bin_dir(&self) -> &PathBuf {
        &self.bin_dir
    }

    fn data_path(&self, idx: usize) -> PathBuf {
        self.bin_dir.join(format!("Data{}.bin", idx))
    }

    fn bitmap_path(&self, idx: usize) -> PathBuf {
        self.bin_dir.join(format!("Data{}.bitmap", idx))
    }

    fn load_bitmap(&self, state: &mut DiskState, idx: usize) -> FileResult<()> {
        if state.bitmaps.contains_key(&idx) {
            return Ok(());
        }
        let path = self.bitmap_path(idx);
        let bitmap = if path.exists() {
            fs::read(&path)?
        } else {
            File::create(&path)?;
            Vec::new()
        };
        state.bitmaps.insert(idx, bitmap);
        Ok(())
    }

    fn persist_bitmap(&self, state: &DiskState, idx: usize) -> FileResult<()> {
        fs::write(self.bitmap_path(idx), &state.bitmaps[&idx])?;
        Ok(())
    }

    /// Validate a page id against the loaded bitmap of its segment.
    fn check_page(&self, state: &mut DiskState, pid: PageId) -> FileResult<()> {
        if pid.file_idx < 0 || pid.file_idx as usize >= self.max_file_count {
            return Err(FileError::InvalidPageId(pid));
        }
        self.load_bitmap(state, pid.file_idx as usize)?;
        let len = state.bitmaps[&(pid.file_idx as usize)].len();
        if pid.page_idx < 0 || pid.page_idx as usize >= len {
            return Err(FileError::InvalidPageId(pid));
        }
        Ok(())
    }

    /// First-fit allocation: claim the first free slot of the lowest
    /// segment, growing the segment by one zero-filled page when its
    /// bitmap holds no free slot.
    pub fn allocate_page(&self) -> FileResult<PageId> {
        let mut state = self.state.lock().unwrap();
        for idx in 0..self.max_file_count {
            self.load_bitmap(&mut state, idx)?;
            let bitmap = state.bitmaps.get_mut(&idx).unwrap();
            if let Some(slot) = bitmap.iter().position(|&b| b == 0) {
                bitmap[slot] = 1;
                self.persist_bitmap(&state, idx)?;
                let pid = PageId::new(idx as i32, slot as i32);
                debug!("allocated page {pid} (reused slot)");
                return Ok(pid);
            }
            // segment exhausted: append one zero-filled page
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(self.data_path(idx))?;
            file.write_all(&vec![0u8; self.page_size])?;
            let bitmap = state.bitmaps.get_mut(&idx).unwrap();
            bitmap.push(1);
            let pid = PageId::new(idx as i32, (bitmap.len() - 1) as i32);
            self.persist_bitmap(&state, idx)?;
            debug!("allocated page {pid} (segment grown)");
            return Ok(pid);
        }
        Err(FileError::NoSpace(self.max_file_count))
    }

    /// Mark a page free. Freeing an already-free slot is a no-op.
    pub fn free_page(&self, pid: PageId) -> FileResult<()> {
        let mut state = self.state.lock().unwrap();
        self.check_page(&mut state, pid)?;
        let bitmap = state.bitmaps.get_mut(&(pid.file_idx as usize)).unwrap();
        bitmap[pid.page_idx as usize] = 0;
        self.persist_bitmap(&state, pid.file_idx as usize)?;
        debug!("freed page {pid}");
        Ok(())
    }

    /// Read one page. A page that was allocated but never written
    /// reads back as zeroes.
    pub fn read_page(&self, pid: PageId) -> FileResult<Vec<u8>> {
        let mut state = self.state.lock().unwrap();
        self.check_page(&mut state, pid)?;
        let mut buf = vec![0u8; self.page_size];
        let mut file = File::open(self.data_path(pid.file_idx as usize))?;
        file.seek(SeekFrom::Start(
            pid.page_idx as u64 * self.page_size as u64,
        ))?;
        let mut filled = 0;
        while filled < self.page_size {
            let n = file.read(&mut buf[filled..])?;
            if n == 0 {
                break; // short file: the tail stays zeroed
            }
            filled += n;
        }
        Ok(buf)
    }

    /// Write one full page and fsync it.
    pub fn write_page(&self, pid: PageId, data: &[u8]) -> FileResult<()> {
        if data.len() != self.page_size {
            return Err(FileError::PageSizeMismatch {
                expected: self.page_size,
                actual: data.len(),
            });
        }
        let mut state = self.state.lock().unwrap();
        self.check_page(&mut state, pid)?;
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(self.data_path(pid.file_idx as usize))?;
        let offset = pid.page_idx as u64 * self.page_size as u64;
        let required = offset + self.page_size as u64;
        if file.metadata()?.len() < required {
            file.set_len(required)?;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        file.sync_data()?;
        Ok(())
    }

    /// Persist every loaded bitmap. Called once at shutdown.
    pub fn finish(&self) -> FileResult<()> {
        let state = self.state.lock().unwrap();
        for &idx in state.bitmaps.keys() {
            self.persist_bitmap(&state, idx)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DbConfig;
    use tempfile::TempDir;

    fn setup(page_size: usize) -> (TempDir, DiskManager) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DbConfig::new(dir.path());
        cfg.page_size = page_size;
        let dm = DiskManager::new(&cfg);
        dm.init().unwrap();
        (dir, dm)
    }

    #[test]
    fn test_allocate_grows_first_segment() {
        let (_dir, dm) = setup(128);
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0, 0));
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0, 1));
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(0, 2));
    }

    #[test]
    fn test_free_then_allocate_reuses_slot() {
        let (_dir, dm) = setup(128);
        let a = dm.allocate_page().unwrap();
        let b = dm.allocate_page().unwrap();
        dm.free_page(a).unwrap();
        // first-fit picks the freed slot before growing the file
        assert_eq!(dm.allocate_page().unwrap(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_free_is_idempotent() {
        let (_dir, dm) = setup(128);
        let pid = dm.allocate_page().unwrap();
        dm.free_page(pid).unwrap();
        dm.free_page(pid).unwrap();
    }

    #[test]
    fn test_free_invalid_page() {
        let (_dir, dm) = setup(128);
        let result = dm.free_page(PageId::new(0, 5));
        assert!(matches!(result, Err(FileError::InvalidPageId(_))));
        let result = dm.free_page(PageId::new(99, 0));
        assert!(matches!(result, Err(FileError::InvalidPageId(_))));
    }

    #[test]
    fn test_write_read_round_trip() {
        let (_dir, dm) = setup(128);
        let pid = dm.allocate_page().unwrap();
        let mut page = vec![0u8; 128];
        page[0] = 42;
        page[127] = 7;
        dm.write_page(pid, &page).unwrap();
        assert_eq!(dm.read_page(pid).unwrap(), page);
    }

    #[test]
    fn test_read_never_written_page_is_zeroed() {
        let (_dir, dm) = setup(128);
        let a = dm.allocate_page().unwrap();
        let b = dm.allocate_page().unwrap();
        let mut page = vec![0u8; 128];
        page[3] = 9;
        dm.write_page(a, &page).unwrap();
        assert!(dm.read_page(b).unwrap().iter().all(|&x| x == 0));
    }

    #[test]
    fn test_write_wrong_size_rejected() {
        let (_dir, dm) = setup(128);
        let pid = dm.allocate_page().unwrap();
        let result = dm.write_page(pid, &[0u8; 64]);
        assert!(matches!(result, Err(FileError::PageSizeMismatch { .. })));
    }

    #[test]
    fn test_bitmap_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DbConfig::new(dir.path());
        cfg.page_size = 128;

        let dm = DiskManager::new(&cfg);
        dm.init().unwrap();
        let a = dm.allocate_page().unwrap();
        let mut page = vec![0u8; 128];
        page[0] = 1;
        dm.write_page(a, &page).unwrap();
        dm.finish().unwrap();

        let dm2 = DiskManager::new(&cfg);
        dm2.init().unwrap();
        // the slot claimed by the first manager is still taken
        assert_eq!(dm2.allocate_page().unwrap(), PageId::new(0, 1));
        assert_eq!(dm2.read_page(a).unwrap()[0], 1);
    }
}
