//! Export pipeline: persisted per-identifier files to one spreadsheet
//!
//! Runs only after a job reached a terminal state with at least one retrieved record.
//! Record files are flattened with [`marc`], holdings with [`holdings`], and
//! left-joined by identifier into a CSV file. Optionally the raw record files are
//! archived as ZIP.

pub mod holdings;
pub mod marc;


pub use holdings::flatten_holdings;
pub use marc::{MarcRecord, parse_marcxml};

use crate::config::ExportConfig;
use crate::error::ExportError;
use crate::retrieval::{BatchJob, RecordStore};
use crate::types::{ExportArtifact, ExportOptions, HoldingsData, Identifier, ItemResult};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Column holding the normalized identifier, always first
pub const IDENTIFIER_COLUMN: &str = "ocn";

/// Whether `job` can be exported: terminal, with at least one retrieved record
pub fn export_available(job: &BatchJob) -> bool {
    job.status().is_terminal() && job.success_count() > 0
}

/// Builds export artifacts from a finished job
#[derive(Clone, Debug)]
pub struct Exporter {
    store: RecordStore,
    config: ExportConfig,
}

impl Exporter {
    /// Exporter reading from `store` and writing into `config.export_dir`
    pub fn new(store: RecordStore, config: ExportConfig) -> Self {
        Self { store, config }
    }

    /// Where the spreadsheet is written
    pub fn spreadsheet_path(&self) -> PathBuf {
        self.config.export_dir.join(&self.config.spreadsheet_name)
    }

    /// Where the ZIP archive is written
    pub fn archive_path(&self) -> PathBuf {
        self.config.export_dir.join(&self.config.archive_name)
    }

    /// Merge the job's retrieved records (and holdings) into one spreadsheet
    ///
    /// Rows follow processing order, one per retrieved record. Record columns come
    /// sorted after the identifier column, holdings columns sorted after those.
    /// Holdings are taken only where this job's holdings outcome is a success;
    /// other records get empty holdings cells. Running it again on the same job
    /// rewrites identical files.
    ///
    /// # Errors
    /// - [`ExportError::JobNotTerminal`] while the job is idle or running
    /// - [`ExportError::NoSuccesses`] when no record was retrieved
    /// - [`ExportError::Parse`], [`ExportError::Io`] or [`ExportError::Archive`] when
    ///   building the artifacts fails
    pub async fn export(
        &self,
        job: &BatchJob,
        options: &ExportOptions,
    ) -> Result<ExportArtifact, ExportError> {
        if !job.status().is_terminal() {
            return Err(ExportError::JobNotTerminal {
                status: job.status().to_string(),
            });
        }

        let items: Vec<ExportItem> = job
            .outcomes()
            .iter()
            .filter(|o| o.is_success())
            .map(|o| ExportItem {
                record: self.store.record_path(&o.identifier),
                holdings: match &o.holdings {
                    Some(ItemResult::Success { path, .. }) => Some(path.clone()),
                    _ => None,
                },
                identifier: o.identifier.clone(),
            })
            .collect();
        if items.is_empty() {
            return Err(ExportError::NoSuccesses);
        }

        info!(records = items.len(), "export started");
        let plan = ExportPlan {
            items,
            include_holdings: options.include_holdings,
            archive: options.archive.then(|| self.archive_path()),
            spreadsheet: self.spreadsheet_path(),
            export_dir: self.config.export_dir.clone(),
            separator: self.config.multi_value_separator.clone(),
        };
        let spreadsheet = plan.spreadsheet.clone();
        let successes = plan.items.len();

        let artifact = tokio::task::spawn_blocking(move || plan.run())
            .await
            .map_err(|e| ExportError::Io {
                path: spreadsheet,
                reason: format!("export task failed: {}", e),
                successes,
            })??;

        info!(
            spreadsheet = %artifact.spreadsheet.display(),
            rows = artifact.rows,
            columns = artifact.columns,
            rows_with_holdings = artifact.rows_with_holdings,
            "export complete"
        );
        Ok(artifact)
    }
}

struct ExportItem {
    identifier: Identifier,
    record: PathBuf,
    /// Set only when holdings were retrieved in this job
    holdings: Option<PathBuf>,
}

struct ExportPlan {
    items: Vec<ExportItem>,
    include_holdings: bool,
    archive: Option<PathBuf>,
    spreadsheet: PathBuf,
    export_dir: PathBuf,
    separator: String,
}

struct Row<'a> {
    identifier: &'a Identifier,
    record: MarcRecord,
    holdings: Option<BTreeMap<String, String>>,
}

impl ExportPlan {
    fn run(&self) -> Result<ExportArtifact, ExportError> {
        std::fs::create_dir_all(&self.export_dir).map_err(|e| self.io_error(&self.export_dir, e))?;

        let mut record_columns = BTreeSet::new();
        let mut holdings_columns = BTreeSet::new();
        let mut rows = Vec::with_capacity(self.items.len());

        for item in &self.items {
            let xml = std::fs::read_to_string(&item.record)
                .map_err(|e| self.io_error(&item.record, e))?;
            let record = parse_marcxml(&xml).map_err(|reason| ExportError::Parse {
                path: item.record.clone(),
                reason,
                successes: self.items.len(),
            })?;
            record_columns.extend(record.columns().map(str::to_string));

            let holdings = match &item.holdings {
                Some(path) if self.include_holdings => Some(self.read_holdings(path)?),
                _ => None,
            };
            if let Some(columns) = &holdings {
                holdings_columns.extend(columns.keys().cloned());
            }

            rows.push(Row {
                identifier: &item.identifier,
                record,
                holdings,
            });
        }

        let header: Vec<&str> = std::iter::once(IDENTIFIER_COLUMN)
            .chain(record_columns.iter().map(String::as_str))
            .chain(holdings_columns.iter().map(String::as_str))
            .collect();

        let mut writer = csv::Writer::from_writer(Vec::new());
        writer
            .write_record(&header)
            .map_err(|e| self.csv_error(e))?;
        for row in &rows {
            let mut cells = Vec::with_capacity(header.len());
            cells.push(row.identifier.to_string());
            cells.extend(
                record_columns
                    .iter()
                    .map(|c| row.record.cell(c, &self.separator)),
            );
            cells.extend(holdings_columns.iter().map(|c| {
                row.holdings
                    .as_ref()
                    .and_then(|h| h.get(c).cloned())
                    .unwrap_or_default()
            }));
            writer.write_record(&cells).map_err(|e| self.csv_error(e))?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| self.io_error(&self.spreadsheet, std::io::Error::other(e.to_string())))?;
        write_replacing(&self.spreadsheet, &bytes).map_err(|e| self.io_error(&self.spreadsheet, e))?;
        debug!(path = %self.spreadsheet.display(), bytes = bytes.len(), "spreadsheet written");

        let archive = match &self.archive {
            Some(path) => {
                write_archive(path, self.items.iter().map(|i| i.record.as_path()))?;
                Some(path.clone())
            }
            None => None,
        };

        Ok(ExportArtifact {
            spreadsheet: self.spreadsheet.clone(),
            rows: rows.len(),
            columns: header.len(),
            rows_with_holdings: rows.iter().filter(|r| r.holdings.is_some()).count(),
            archive,
        })
    }

    /// Holdings columns for one record
    fn read_holdings(&self, path: &Path) -> Result<BTreeMap<String, String>, ExportError> {
        let json = std::fs::read_to_string(path).map_err(|e| self.io_error(path, e))?;
        let data: HoldingsData = serde_json::from_str(&json).map_err(|e| ExportError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
            successes: self.items.len(),
        })?;
        Ok(flatten_holdings(&data))
    }

    fn io_error(&self, path: &Path, e: std::io::Error) -> ExportError {
        ExportError::Io {
            path: path.to_path_buf(),
            reason: e.to_string(),
            successes: self.items.len(),
        }
    }

    fn csv_error(&self, e: csv::Error) -> ExportError {
        ExportError::Io {
            path: self.spreadsheet.clone(),
            reason: e.to_string(),
            successes: self.items.len(),
        }
    }
}

/// Write via a sibling temp file so an earlier export stays intact on failure
fn write_replacing(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("part");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path).inspect_err(|_| {
        let _ = std::fs::remove_file(&tmp);
    })
}

/// ZIP the given record files flat, under their file names
fn write_archive<'a>(
    archive_path: &Path,
    files: impl Iterator<Item = &'a Path>,
) -> Result<(), ExportError> {
    let archive_error = |reason: String| ExportError::Archive {
        path: archive_path.to_path_buf(),
        reason,
    };

    let tmp = archive_path.with_extension("part");
    let file = std::fs::File::create(&tmp).map_err(|e| archive_error(e.to_string()))?;
    let mut writer = zip::ZipWriter::new(file);
    let options =
        zip::write::FileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    let mut count = 0usize;
    let written: Result<(), String> = (|| {
        for path in files {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| format!("{} has no file name", path.display()))?;
            let bytes = std::fs::read(path).map_err(|e| format!("{}: {}", path.display(), e))?;
            writer.start_file(name, options).map_err(|e| e.to_string())?;
            writer.write_all(&bytes).map_err(|e| e.to_string())?;
            count += 1;
        }
        writer.finish().map_err(|e| e.to_string())?;
        std::fs::rename(&tmp, archive_path).map_err(|e| e.to_string())
    })();

    if let Err(reason) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(archive_error(reason));
    }
    debug!(path = %archive_path.display(), files = count, "archive written");
    Ok(())
}
