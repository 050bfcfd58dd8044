use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::config::DbConfig;
use crate::file::{BufferManager, DiskManager, PageId};
use crate::record::{ColumnInfo, ColumnKind, HeapFile, RecordError, Relation};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("table {0} already exists")]
    TableExists(String),

    #[error("table {0} not found")]
    TableNotFound(String),

    #[error("unknown column kind {0} in saved catalog")]
    UnknownColumnKind(u8),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("file error: {0}")]
    File(#[from] crate::file::FileError),
}

pub type CatalogResult<T> = Result<T, CatalogError>;

/// On-disk shape of one column in `database.save`. The kind encodes
/// as 0=INT, 1=FLOAT, 2=CHAR, 3=VARCHAR with `Size` carrying the
/// text width.
#[derive(Debug, Serialize, Deserialize)]
struct ColumnSave {
    #[serde(rename = "Name")]
    name: String,
    #[serde(rename = "Kind")]
    kind: u8,
    #[serde(rename = "Size")]
    size: usize,
}

impl ColumnSave {
    fn from_column(col: &ColumnInfo) -> Self {
        let (kind, size) = match col.kind {
            ColumnKind::Int => (0, 0),
            ColumnKind::Float => (1, 0),
            ColumnKind::Char(n) => (2, n),
            ColumnKind::Varchar(n) => (3, n),
        };
        Self {
            name: col.name.clone(),
            kind,
            size,
        }
    }

    fn into_column(self) -> CatalogResult<ColumnInfo> {
        let kind = match self.kind {
            0 => ColumnKind::Int,
            1 => ColumnKind::Float,
            2 => ColumnKind::Char(self.size),
            3 => ColumnKind::Varchar(self.size),
            other => return Err(CatalogError::UnknownColumnKind(other)),
        };
        Ok(ColumnInfo::new(self.name, kind))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TableSave {
    name: String,
    cols: Vec<ColumnSave>,
    header: PageId,
}

/// In-memory registry of relations: name to (schema, heap file).
/// Kept sorted so DESCRIBE TABLES output is deterministic.
pub struct Catalog {
    cfg: DbConfig,
    dm: Arc<DiskManager>,
    bm: Arc<BufferManager>,
    tables: BTreeMap<String, HeapFile>,
}

impl Catalog {
    pub fn new(cfg: DbConfig, dm: Arc<DiskManager>, bm: Arc<BufferManager>) -> Self {
        Self {
            cfg,
            dm,
            bm,
            tables: BTreeMap::new(),
        }
    }

    fn save_path(&self) -> PathBuf {
        self.cfg.db_path.join("database.save")
    }

    /// Register a relation, creating its heap header right away.
    pub fn add_table(&mut self, rel: Relation) -> CatalogResult<()> {
        let name = rel.name().to_string();
        if self.tables.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }
        let mut heap = HeapFile::new(rel, self.dm.clone(), self.bm.clone())?;
        heap.ensure_header()?;
        self.tables.insert(name, heap);
        Ok(())
    }

    pub fn table(&self, name: &str) -> CatalogResult<&HeapFile> {
        self.tables
            .get(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    pub fn table_mut(&mut self, name: &str) -> CatalogResult<&mut HeapFile> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))
    }

    /// Drop a relation: release every page it owns (data pages and
    /// the header page) back to the disk manager and remove its
    /// header metadata file.
    pub fn remove_table(&mut self, name: &str) -> CatalogResult<()> {
        let heap = self
            .tables
            .remove(name)
            .ok_or_else(|| CatalogError::TableNotFound(name.to_string()))?;
        for pid in heap.all_page_ids()? {
            self.dm.free_page(pid)?;
        }
        let header = heap.header_page_id();
        if header.is_valid() {
            self.dm.free_page(header)?;
        }
        let hdr_path = self.dm.bin_dir().join(format!("{name}.hdr"));
        match fs::remove_file(&hdr_path) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        debug!("dropped table {name}");
        Ok(())
    }

    pub fn remove_all_tables(&mut self) -> CatalogResult<()> {
        let names: Vec<String> = self.tables.keys().cloned().collect();
        for name in names {
            self.remove_table(&name)?;
        }
        Ok(())
    }

    pub fn describe(&self, name: &str) -> CatalogResult<String> {
        Ok(self.table(name)?.relation().describe())
    }

    /// Schema lines for every relation, lexicographic by name.
    pub fn describe_all(&self) -> Vec<String> {
        self.tables
            .values()
            .map(|heap| heap.relation().describe())
            .collect()
    }

    /// Write `database.save` plus a redundant `.hdr` file for every
    /// relation that has a header page. The `.hdr` files, not the
    /// JSON header field, are authoritative on load.
    pub fn save_state(&self) -> CatalogResult<()> {
        fs::create_dir_all(&self.cfg.db_path)?;
        let mut entries = Vec::with_capacity(self.tables.len());
        for heap in self.tables.values() {
            let rel = heap.relation();
            entries.push(TableSave {
                name: rel.name().to_string(),
                cols: rel.columns().iter().map(ColumnSave::from_column).collect(),
                header: heap.header_page_id(),
            });
            if heap.header_page_id().is_valid() {
                heap.save_header_location()?;
            }
        }
        let json = serde_json::to_string_pretty(&entries)?;
        fs::write(self.save_path(), json)?;
        debug!("saved catalog with {} tables", self.tables.len());
        Ok(())
    }

    /// Load `database.save` and re-register every relation. Header
    /// locations are picked up from the `.hdr` files written at save
    /// time. A missing save file simply leaves the catalog empty.
    pub fn load_state(&mut self) -> CatalogResult<()> {
        let text = match fs::read_to_string(self.save_path()) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let entries: Vec<TableSave> = serde_json::from_str(&text)?;
        for entry in entries {
            let mut cols = Vec::with_capacity(entry.cols.len());
            for col in entry.cols {
                cols.push(col.into_column()?);
            }
            self.add_table(Relation::new(entry.name, cols))?;
        }
        debug!("loaded catalog with {} tables", self.tables.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DbConfig, Catalog) {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DbConfig::new(dir.path());
        cfg.page_size = 512;
        cfg.buffer_count = 8;
        let dm = Arc::new(DiskManager::new(&cfg));
        dm.init().unwrap();
        let bm = Arc::new(BufferManager::new(&cfg, dm.clone()));
        let catalog = Catalog::new(cfg.clone(), dm, bm);
        (dir, cfg, catalog)
    }

    fn fruit_schema() -> Relation {
        Relation::new(
            "Fruit",
            vec![
                ColumnInfo::new("id", ColumnKind::Int),
                ColumnInfo::new("name", ColumnKind::Varchar(20)),
                ColumnInfo::new("price", ColumnKind::Float),
            ],
        )
    }

    #[test]
    fn test_add_and_describe() {
        let (_dir, _cfg, mut catalog) = setup();
        catalog.add_table(fruit_schema()).unwrap();
        assert_eq!(
            catalog.describe("Fruit").unwrap(),
            "Fruit (id:INT,name:VARCHAR(20),price:FLOAT)"
        );
    }

    #[test]
    fn test_duplicate_table_rejected() {
        let (_dir, _cfg, mut catalog) = setup();
        catalog.add_table(fruit_schema()).unwrap();
        assert!(matches!(
            catalog.add_table(fruit_schema()),
            Err(CatalogError::TableExists(_))
        ));
    }

    #[test]
    fn test_unknown_table() {
        let (_dir, _cfg, catalog) = setup();
        assert!(matches!(
            catalog.table("Nope"),
            Err(CatalogError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_describe_all_is_sorted() {
        let (_dir, _cfg, mut catalog) = setup();
        catalog
            .add_table(Relation::new(
                "Zoo",
                vec![ColumnInfo::new("id", ColumnKind::Int)],
            ))
            .unwrap();
        catalog
            .add_table(Relation::new(
                "Ant",
                vec![ColumnInfo::new("id", ColumnKind::Int)],
            ))
            .unwrap();
        let lines = catalog.describe_all();
        assert_eq!(lines, vec!["Ant (id:INT)", "Zoo (id:INT)"]);
    }

    #[test]
    fn test_remove_table_releases_pages() {
        let (_dir, cfg, mut catalog) = setup();
        catalog.add_table(fruit_schema()).unwrap();
        let first_data_page = {
            let heap = catalog.table("Fruit").unwrap();
            heap.all_page_ids().unwrap()[0]
        };
        catalog.remove_table("Fruit").unwrap();
        assert!(matches!(
            catalog.table("Fruit"),
            Err(CatalogError::TableNotFound(_))
        ));
        assert!(!cfg.db_path.join("BinData").join("Fruit.hdr").exists());

        // the released pages are available to the next relation
        catalog
            .add_table(Relation::new(
                "Veg",
                vec![ColumnInfo::new("id", ColumnKind::Int)],
            ))
            .unwrap();
        let veg_pages = catalog.table("Veg").unwrap().all_page_ids().unwrap();
        assert!(veg_pages.contains(&first_data_page));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = DbConfig::new(dir.path());
        cfg.page_size = 512;
        cfg.buffer_count = 8;

        let dm = Arc::new(DiskManager::new(&cfg));
        dm.init().unwrap();
        let bm = Arc::new(BufferManager::new(&cfg, dm.clone()));
        let mut catalog = Catalog::new(cfg.clone(), dm.clone(), bm.clone());
        catalog.add_table(fruit_schema()).unwrap();
        catalog
            .table_mut("Fruit")
            .unwrap()
            .insert_record(&Record::from_strs(&["1", "Pomme", "1.2"]))
            .unwrap();
        catalog.save_state().unwrap();
        bm.flush_all().unwrap();
        dm.finish().unwrap();

        let dm2 = Arc::new(DiskManager::new(&cfg));
        dm2.init().unwrap();
        let bm2 = Arc::new(BufferManager::new(&cfg, dm2.clone()));
        let mut catalog2 = Catalog::new(cfg, dm2, bm2);
        catalog2.load_state().unwrap();

        assert_eq!(
            catalog2.describe("Fruit").unwrap(),
            "Fruit (id:INT,name:VARCHAR(20),price:FLOAT)"
        );
        let mut rows = Vec::new();
        catalog2
            .table("Fruit")
            .unwrap()
            .scan_records(|rec, _| {
                rows.push(rec);
                Ok(())
            })
            .unwrap();
        assert_eq!(rows, vec![Record::from_strs(&["1", "Pomme", "1.2"])]);
    }

    #[test]
    fn test_load_missing_save_file_is_fine() {
        let (_dir, _cfg, mut catalog) = setup();
        catalog.load_state().unwrap();
        assert!(catalog.describe_all().is_empty());
    }

    #[test]
    fn test_saved_json_shape() {
        let (_dir, cfg, mut catalog) = setup();
        catalog.add_table(fruit_schema()).unwrap();
        catalog.save_state().unwrap();

        let text = fs::read_to_string(cfg.db_path.join("database.save")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&text).unwrap();
        let entry = &parsed[0];
        assert_eq!(entry["name"], "Fruit");
        assert_eq!(entry["cols"][0]["Name"], "id");
        assert_eq!(entry["cols"][0]["Kind"], 0);
        assert_eq!(entry["cols"][1]["Kind"], 3);
        assert_eq!(entry["cols"][1]["Size"], 20);
        assert!(entry["header"]["fileidx"].is_number());
        assert!(entry["header"]["pageidx"].is_number());
    }
}
