//! On-disk layout for tables.
//!
//! ```text
//! <data_dir>/<table>/<s1>/<s2>/<uuid>/row.json
//! ```
//!
//! `s1`/`s2` are the first four hex characters of the row's shard UUID. Each row is written
//! to a temporary sibling and renamed into place, so readers only ever see complete files.

use super::table::Row;
use crate::constants::ROW_FILENAME;
use crate::{CardioError, CardioResult};
use std::fs;
use std::path::{Path, PathBuf};

/// A serialized row waiting to be written.
#[derive(Debug)]
pub(crate) struct PendingWrite {
    path: PathBuf,
    bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub(crate) struct Persistence {
    data_dir: PathBuf,
}

impl Persistence {
    pub(crate) fn open(data_dir: &Path) -> CardioResult<Self> {
        fs::create_dir_all(data_dir).map_err(|e| CardioError::storage(data_dir, e))?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
        })
    }

    pub(crate) fn encode<T: Row>(&self, row: &T) -> CardioResult<PendingWrite> {
        let path = row
            .shard()
            .sharded_dir(&self.data_dir.join(T::TABLE))
            .join(ROW_FILENAME);
        let bytes = serde_json::to_vec_pretty(row)?;
        Ok(PendingWrite { path, bytes })
    }

    /// Writes every pending row.
    ///
    /// All temporary files are written before any is renamed; a failure in the first phase
    /// leaves the existing rows untouched.
    pub(crate) fn write_batch(&self, batch: &[PendingWrite]) -> CardioResult<()> {
        let mut staged = Vec::with_capacity(batch.len());
        for write in batch {
            match write_temp(write) {
                Ok(tmp) => staged.push((tmp, &write.path)),
                Err(e) => {
                    for (tmp, _) in &staged {
                        let _ = fs::remove_file(tmp);
                    }
                    return Err(e);
                }
            }
        }

        for (tmp, path) in staged {
            fs::rename(&tmp, path).map_err(|e| CardioError::storage(path, e))?;
        }
        Ok(())
    }

    /// Reads every row of `T` back.
    ///
    /// Rows that cannot be parsed are logged and skipped so a single damaged file does not
    /// take the service down.
    pub(crate) fn load<T: Row>(&self) -> CardioResult<Vec<T>> {
        let table_dir = self.data_dir.join(T::TABLE);
        if !table_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut rows = Vec::new();
        for s1 in subdirs(&table_dir)? {
            for s2 in subdirs(&s1)? {
                for row_dir in subdirs(&s2)? {
                    let path = row_dir.join(ROW_FILENAME);
                    if !path.is_file() {
                        continue;
                    }
                    let bytes = fs::read(&path).map_err(|e| CardioError::storage(&path, e))?;
                    match serde_json::from_slice::<T>(&bytes) {
                        Ok(row) => rows.push(row),
                        Err(e) => {
                            tracing::warn!(
                                table = T::TABLE,
                                path = %path.display(),
                                error = %e,
                                "skipping unreadable row"
                            );
                        }
                    }
                }
            }
        }

        tracing::debug!(table = T::TABLE, rows = rows.len(), "loaded table");
        Ok(rows)
    }
}

fn write_temp(write: &PendingWrite) -> CardioResult<PathBuf> {
    if let Some(parent) = write.path.parent() {
        fs::create_dir_all(parent).map_err(|e| CardioError::storage(parent, e))?;
    }
    let tmp = write.path.with_extension("json.tmp");
    fs::write(&tmp, &write.bytes).map_err(|e| CardioError::storage(&tmp, e))?;
    Ok(tmp)
}

fn subdirs(dir: &Path) -> CardioResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| CardioError::storage(dir, e))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| CardioError::storage(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}
