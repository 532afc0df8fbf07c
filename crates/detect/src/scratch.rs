//! Scratch tables: the on-disk CSV the engine reads a batch from.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use gorp_core::config::{ScratchConfig, ScratchRetention, ScratchZone};
use gorp_core::Sample;
use tempfile::TempPath;
use tracing::{debug, info, instrument, warn};

use crate::error::ExportError;

const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Write `samples` as a `date,value` table, sorted ascending by timestamp.
///
/// The input slice is left untouched; equal timestamps keep their input
/// order.
pub fn write_table<W: Write>(
    samples: &[Sample],
    out: &mut W,
    zone: ScratchZone,
) -> Result<(), ExportError> {
    let mut sorted = samples.to_vec();
    sorted.sort_by_key(|s| s.timestamp);

    out.write_all(b"date,value\n")?;
    for sample in &sorted {
        writeln!(out, "{},{}", render_date(sample.timestamp, zone)?, sample.value)?;
    }
    Ok(())
}

fn render_date(timestamp: i64, zone: ScratchZone) -> Result<String, ExportError> {
    let utc = DateTime::from_timestamp(timestamp, 0).ok_or(ExportError::Timestamp(timestamp))?;
    Ok(match zone {
        ScratchZone::Utc => utc.format(DATE_FORMAT).to_string(),
        ScratchZone::Local => utc.with_timezone(&Local).format(DATE_FORMAT).to_string(),
    })
}

/// Creates scratch tables according to a [`ScratchConfig`].
#[derive(Debug, Clone)]
pub struct TableExporter {
    config: ScratchConfig,
}

impl TableExporter {
    pub fn new(config: ScratchConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScratchConfig {
        &self.config
    }

    /// Write `samples` to a fresh `gorp-*.csv` file in the scratch
    /// directory. The file is complete and closed when this returns.
    #[instrument(skip_all, fields(samples = samples.len()))]
    pub fn export(&self, samples: &[Sample]) -> Result<ScratchTable, ExportError> {
        let dir = if self.config.dir.is_absolute() {
            self.config.dir.clone()
        } else {
            std::env::current_dir()?.join(&self.config.dir)
        };

        let file = tempfile::Builder::new()
            .prefix("gorp-")
            .suffix(".csv")
            .tempfile_in(&dir)?;

        {
            let mut writer = BufWriter::new(file.as_file());
            write_table(samples, &mut writer, self.config.zone)?;
            writer.flush()?;
        }
        file.as_file().sync_all()?;

        // Closes the handle; the path alone now owns the file.
        let path = file.into_temp_path();
        debug!(path = %path.display(), "scratch table written");

        match self.config.retention {
            ScratchRetention::Remove => Ok(ScratchTable {
                path: path.to_path_buf(),
                guard: Some(path),
            }),
            ScratchRetention::Keep => {
                let path = path.keep().map_err(std::io::Error::from)?;
                info!(path = %path.display(), "keeping scratch table");
                Ok(ScratchTable { path, guard: None })
            }
        }
    }
}

/// A written scratch table. Unless it was kept, the file is deleted when
/// this is dropped.
#[derive(Debug)]
pub struct ScratchTable {
    path: PathBuf,
    guard: Option<TempPath>,
}

impl ScratchTable {
    /// Absolute path of the table.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_kept(&self) -> bool {
        self.guard.is_none()
    }
}

impl Drop for ScratchTable {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            match guard.close() {
                Ok(()) => debug!(path = %self.path.display(), "scratch table removed"),
                Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove scratch table"),
            }
        }
    }
}
