//! Package weight cache backends.

use std::{
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;

use crate::domain::{PackageWeightEntry, PackageWeightStore, StoreError};

pub const WEIGHT_CACHE_FILENAME: &str = "package_weights.csv";

#[derive(Debug, Error)]
pub enum CsvStoreError {
    #[error("weight cache io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("weight cache csv error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<CsvStoreError> for StoreError {
    fn from(err: CsvStoreError) -> Self {
        match err {
            CsvStoreError::Io(err) => StoreError::Io(err),
            other => StoreError::Backend(Box::new(other)),
        }
    }
}

/// Package weight cache persisted as a CSV file (`commodity,variety,package,pounds`).
#[derive(Clone, Debug)]
pub struct CsvWeightStore {
    path: PathBuf,
}

impl CsvWeightStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_entries(&self) -> Result<Vec<PackageWeightEntry>, CsvStoreError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let entries = reader
            .deserialize()
            .collect::<Result<Vec<PackageWeightEntry>, _>>()?;
        Ok(entries)
    }

    /// Writes beside the target and renames, so a failed write keeps the old cache.
    fn replace_entries(&self, entries: &[PackageWeightEntry]) -> Result<(), CsvStoreError> {
        let tmp = self.path.with_extension("csv.tmp");
        let written = write_entries(&tmp, entries)
            .and_then(|()| fs::rename(&tmp, &self.path).map_err(CsvStoreError::from));
        if written.is_err() && tmp.exists() {
            if let Err(err) = fs::remove_file(&tmp) {
                tracing::warn!("[weight-cache] Could not remove {}: {err}", tmp.display());
            }
        }
        written
    }
}

fn write_entries(path: &Path, entries: &[PackageWeightEntry]) -> Result<(), CsvStoreError> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(["commodity", "variety", "package", "pounds"])?;
    for entry in entries {
        writer.serialize(entry)?;
    }
    writer.flush()?;
    Ok(())
}

impl PackageWeightStore for CsvWeightStore {
    fn load(&self) -> Result<Vec<PackageWeightEntry>, StoreError> {
        if !self.path.exists() {
            tracing::debug!("[weight-cache] No cache found at {}", self.path.display());
            return Ok(Vec::new());
        }

        let entries = self.read_entries()?;
        tracing::debug!(
            "[weight-cache] Loaded {} entries from {}",
            entries.len(),
            self.path.display()
        );
        Ok(entries)
    }

    fn save_all(&mut self, entries: &[PackageWeightEntry]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        self.replace_entries(entries)?;

        tracing::debug!(
            "[weight-cache] Saved {} entries to {}",
            entries.len(),
            self.path.display()
        );
        Ok(())
    }
}

/// Volatile store for tests and dry runs.
#[derive(Clone, Debug, Default)]
pub struct MemoryWeightStore {
    entries: Vec<PackageWeightEntry>,
    saves: usize,
}

impl MemoryWeightStore {
    pub fn with_entries(entries: Vec<PackageWeightEntry>) -> Self {
        Self { entries, saves: 0 }
    }

    pub fn entries(&self) -> &[PackageWeightEntry] {
        &self.entries
    }

    /// Number of full rewrites performed so far.
    pub fn saves(&self) -> usize {
        self.saves
    }
}

impl PackageWeightStore for MemoryWeightStore {
    fn load(&self) -> Result<Vec<PackageWeightEntry>, StoreError> {
        Ok(self.entries.clone())
    }

    fn save_all(&mut self, entries: &[PackageWeightEntry]) -> Result<(), StoreError> {
        self.entries = entries.to_vec();
        self.saves += 1;
        Ok(())
    }
}
