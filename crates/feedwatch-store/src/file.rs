//! One JSON file per cursor key, replaced atomically via write-temp-then-rename.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use feedwatch_core::ItemKey;

use crate::CursorStore;
use crate::error::StoreError;

const CURSOR_EXT: &str = "json";

/// On-disk record. The key is stored alongside the cursor so a renamed or
/// copied file is detected rather than silently applied to another source.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CursorRecord {
    key: String,
    cursor: ItemKey,
    saved_at: DateTime<Utc>,
}

/// Directory-backed cursor store.
#[derive(Debug)]
pub struct FileCursorStore {
    dir: PathBuf,
    /// Per-key locks. Distinct keys never wait on each other.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FileCursorStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| StoreError::io(&dir, e))?;
        Ok(Self {
            dir,
            locks: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All stored cursors, sorted by key. Unreadable files are reported, not skipped.
    pub fn list(&self) -> Result<Vec<(String, ItemKey)>, StoreError> {
        let entries = fs::read_dir(&self.dir).map_err(|e| StoreError::io(&self.dir, e))?;
        let mut cursors = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| StoreError::io(&self.dir, e))?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CURSOR_EXT) {
                continue;
            }
            let record = read_record(&path)?;
            cursors.push((record.key, record.cursor));
        }
        cursors.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(cursors)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{CURSOR_EXT}", encode_key(key)))
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

impl CursorStore for FileCursorStore {
    fn load(&self, key: &str) -> Result<Option<ItemKey>, StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.path_for(key);
        let record = match read_record(&path) {
            Ok(record) => record,
            Err(StoreError::Io { source, .. }) if source.kind() == IoErrorKind::NotFound => {
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        if record.key != key {
            return Err(StoreError::KeyMismatch {
                path,
                expected: key.to_string(),
                found: record.key,
            });
        }
        Ok(Some(record.cursor))
    }

    fn save(&self, key: &str, cursor: &ItemKey) -> Result<(), StoreError> {
        let lock = self.key_lock(key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let path = self.path_for(key);
        let record = CursorRecord {
            key: key.to_string(),
            cursor: cursor.clone(),
            saved_at: Utc::now(),
        };
        let mut bytes = serde_json::to_vec_pretty(&record).map_err(|e| StoreError::Corrupt {
            path: path.clone(),
            detail: e.to_string(),
        })?;
        bytes.push(b'\n');

        write_atomic(&self.dir, &path, &bytes)?;
        tracing::debug!(key, cursor = %cursor, "cursor saved");
        Ok(())
    }
}

fn read_record(path: &Path) -> Result<CursorRecord, StoreError> {
    let content = fs::read_to_string(path).map_err(|e| StoreError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| StoreError::Corrupt {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Write `bytes` to a sibling temp file, fsync it, rename over `path`, then
/// fsync the directory so the rename itself survives a crash.
fn write_atomic(dir: &Path, path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp = path.with_extension(format!("{CURSOR_EXT}.tmp.{}", std::process::id()));

    let written = (|| -> std::io::Result<()> {
        let mut file = File::create(&tmp)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if let Err(e) = written {
        let _ = fs::remove_file(&tmp);
        return Err(StoreError::io(path, e));
    }

    #[cfg(unix)]
    File::open(dir)
        .and_then(|d| d.sync_all())
        .map_err(|e| StoreError::io(dir, e))?;
    #[cfg(not(unix))]
    let _ = dir;

    Ok(())
}

/// Map a cursor key to a file stem. Bytes outside `[A-Za-z0-9._-]` become
/// `%XX`, so distinct keys never share a file.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for byte in key.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
            out.push(char::from(byte));
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}
