//! On-disk layout for retrieved data
//!
//! `{records_dir}/{ocn}.xml` holds the raw record and `{holdings_dir}/{ocn}_holdings.json`
//! the holdings summary. Export reconstructs these paths from identifiers alone, so the
//! naming here is a contract.

use crate::config::StorageConfig;
use crate::types::{HoldingsData, Identifier};
use std::io;
use std::path::{Path, PathBuf};

/// Per-identifier file store
#[derive(Clone, Debug)]
pub struct RecordStore {
    records_dir: PathBuf,
    holdings_dir: PathBuf,
}

impl RecordStore {
    /// Store rooted at the configured directories
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            records_dir: config.records_dir.clone(),
            holdings_dir: config.holdings_dir.clone(),
        }
    }

    /// Directory holding `{ocn}.xml` files
    pub fn records_dir(&self) -> &Path {
        &self.records_dir
    }

    /// Directory holding `{ocn}_holdings.json` files
    pub fn holdings_dir(&self) -> &Path {
        &self.holdings_dir
    }

    /// Path of the record file for `id`
    pub fn record_path(&self, id: &Identifier) -> PathBuf {
        self.records_dir.join(format!("{}.xml", id))
    }

    /// Path of the holdings file for `id`
    pub fn holdings_path(&self, id: &Identifier) -> PathBuf {
        self.holdings_dir.join(format!("{}_holdings.json", id))
    }

    /// Create both directories if missing
    pub async fn ensure_dirs(&self) -> io::Result<()> {
        tokio::fs::create_dir_all(&self.records_dir).await?;
        tokio::fs::create_dir_all(&self.holdings_dir).await
    }

    /// Whether a record file for `id` already exists
    pub async fn record_exists(&self, id: &Identifier) -> bool {
        tokio::fs::try_exists(self.record_path(id))
            .await
            .unwrap_or(false)
    }

    /// Persist a raw record, replacing any earlier file
    pub async fn write_record(&self, id: &Identifier, body: &str) -> io::Result<PathBuf> {
        let path = self.record_path(id);
        write_atomic(&path, body.as_bytes()).await?;
        Ok(path)
    }

    /// Persist holdings as pretty-printed JSON, replacing any earlier file
    pub async fn write_holdings(&self, id: &Identifier, data: &HoldingsData) -> io::Result<PathBuf> {
        let json = serde_json::to_vec_pretty(data)?;
        let path = self.holdings_path(id);
        write_atomic(&path, &json).await?;
        Ok(path)
    }
}

/// Write to a sibling temp file, then rename over the target
///
/// Readers never observe a partially written file: they see the old content or the new.
pub(crate) async fn write_atomic(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".part");
    let tmp_path = path.with_file_name(tmp_name);

    if let Err(e) = tokio::fs::write(&tmp_path, contents).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(e);
    }
    tracing::debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}
