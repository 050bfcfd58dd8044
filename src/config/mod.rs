use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config file is empty")]
    Empty,

    #[error("dbpath not found in config")]
    MissingDbPath,
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default page size in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;
/// Default maximum number of segment files.
pub const DEFAULT_MAX_FILE_COUNT: usize = 8;
/// Default number of buffer frames.
pub const DEFAULT_BUFFER_COUNT: usize = 16;

/// Victim selection policy of the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplacementPolicy {
    Lru,
    Mru,
}

impl ReplacementPolicy {
    /// Parse a policy name; anything unrecognised falls back to LRU.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "MRU" => ReplacementPolicy::Mru,
            _ => ReplacementPolicy::Lru,
        }
    }
}

/// Immutable engine parameters, fixed for the lifetime of a process.
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub db_path: PathBuf,
    pub page_size: usize,
    pub max_file_count: usize,
    pub buffer_count: usize,
    pub policy: ReplacementPolicy,
}

/// Raw shape of the JSON config variant; every field except `dbpath`
/// is optional and defaulted.
#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dbpath: String,
    pagesize: Option<usize>,
    dm_maxfilecount: Option<usize>,
    bm_buffercount: Option<usize>,
    bm_policy: Option<String>,
}

impl DbConfig {
    /// Build a config pointing at `db_path` with default parameters.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
            page_size: DEFAULT_PAGE_SIZE,
            max_file_count: DEFAULT_MAX_FILE_COUNT,
            buffer_count: DEFAULT_BUFFER_COUNT,
            policy: ReplacementPolicy::Lru,
        }
    }

    /// Load a config file. Both a JSON object (`{"dbpath": "./DB"}`)
    /// and a line-oriented `key = value` format are accepted; in the
    /// latter, `#` starts a line comment and values may be quoted.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let text = fs::read_to_string(path)?;
        if text.trim().is_empty() {
            return Err(ConfigError::Empty);
        }

        if let Ok(raw) = serde_json::from_str::<RawConfig>(&text) {
            if !raw.dbpath.is_empty() {
                return Ok(Self::from_raw(raw));
            }
        }

        Self::parse_key_values(&text)
    }

    fn from_raw(raw: RawConfig) -> Self {
        Self {
            db_path: PathBuf::from(raw.dbpath),
            page_size: raw.pagesize.unwrap_or(DEFAULT_PAGE_SIZE),
            max_file_count: raw.dm_maxfilecount.unwrap_or(DEFAULT_MAX_FILE_COUNT),
            buffer_count: raw.bm_buffercount.unwrap_or(DEFAULT_BUFFER_COUNT),
            policy: raw
                .bm_policy
                .as_deref()
                .map(ReplacementPolicy::from_name)
                .unwrap_or(ReplacementPolicy::Lru),
        }
    }

    fn parse_key_values(text: &str) -> ConfigResult<Self> {
        let mut dbpath: Option<String> = None;
        let mut page_size = DEFAULT_PAGE_SIZE;
        let mut max_file_count = DEFAULT_MAX_FILE_COUNT;
        let mut buffer_count = DEFAULT_BUFFER_COUNT;
        let mut policy = ReplacementPolicy::Lru;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim();
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            match key {
                "dbpath" => dbpath = Some(value.to_string()),
                "pagesize" => {
                    if let Ok(v) = value.parse() {
                        page_size = v;
                    }
                }
                "dm_maxfilecount" => {
                    if let Ok(v) = value.parse() {
                        max_file_count = v;
                    }
                }
                "bm_buffercount" => {
                    if let Ok(v) = value.parse() {
                        buffer_count = v;
                    }
                }
                "bm_policy" => policy = ReplacementPolicy::from_name(value),
                _ => {}
            }
        }

        let db_path = dbpath.ok_or(ConfigError::MissingDbPath)?;
        Ok(Self {
            db_path: PathBuf::from(db_path),
            page_size,
            max_file_count,
            buffer_count,
            policy,
        })
    }
}
