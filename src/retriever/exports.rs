//! Export of the current job.

use crate::error::Result;
use crate::export::export_available;
use crate::types::{Event, ExportArtifact, ExportOptions};
use std::path::PathBuf;

use super::Retriever;

impl Retriever {
    /// Whether the current job can be exported
    pub async fn export_available(&self) -> bool {
        match self.current_job().await {
            Some(job) => export_available(&*job.read().await),
            None => false,
        }
    }

    /// Export the current job to the configured spreadsheet (and archive)
    ///
    /// # Errors
    /// - [`Error::NoJob`](crate::error::Error::NoJob) before the first run
    /// - [`Error::Export`](crate::error::Error::Export) when the export is blocked or fails
    pub async fn export(&self, options: ExportOptions) -> Result<ExportArtifact> {
        let job = self.require_job().await?;
        let job = job.read().await;

        self.emit(Event::ExportStarted {
            records: job.success_count(),
        });
        match self.exporter.export(&job, &options).await {
            Ok(artifact) => {
                *self.last_export.write().await = Some(artifact.clone());
                self.emit(Event::ExportComplete {
                    spreadsheet: artifact.spreadsheet.clone(),
                    rows: artifact.rows,
                });
                Ok(artifact)
            }
            Err(e) => {
                tracing::warn!(error = %e, "export failed");
                self.emit(Event::ExportFailed {
                    error: e.to_string(),
                });
                Err(e.into())
            }
        }
    }

    /// Path the spreadsheet is exported to
    pub fn spreadsheet_path(&self) -> PathBuf {
        self.exporter.spreadsheet_path()
    }

    /// Path the ZIP archive is exported to
    pub fn archive_path(&self) -> PathBuf {
        self.exporter.archive_path()
    }
}
