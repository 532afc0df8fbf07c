use std::path::Path;
use std::sync::Arc;

use gorp_core::{Detection, Method, Sample};
use gorp_rserve::Evaluator;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn, Span};

use crate::error::{AttemptError, ExportError, PipelineError};
use crate::normalize::normalize;
use crate::scratch::{ScratchTable, TableExporter};

/// R call that runs `method` over the table at `path`.
pub fn eval_command(method: Method, path: &Path) -> String {
    let function = match method {
        Method::Ts => "processAnomsTs",
        Method::Vec => "processAnomsVec",
    };
    format!("{function}(\"{}\")", r_string_escape(&path.to_string_lossy()))
}

fn r_string_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '\\' || c == '"' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

async fn attempt(
    method: Method,
    table: &ScratchTable,
    evaluator: &dyn Evaluator,
) -> Result<Detection, AttemptError> {
    let raw = evaluator.evaluate(&eval_command(method, table.path())).await?;
    Ok(normalize(&raw, method)?)
}

/// Run one batch through the engine: `ts` first, then `vec` if that fails.
///
/// The scratch table lives until the last attempt has finished. Writing and
/// removing it happen on the blocking pool.
#[instrument(skip_all, fields(samples = samples.len()))]
pub async fn detect(
    samples: &[Sample],
    exporter: &TableExporter,
    evaluator: &dyn Evaluator,
) -> Result<Detection, PipelineError> {
    let table = export_blocking(samples, exporter).await?;
    let result = run_attempts(&table, evaluator).await;
    release_blocking(table).await;
    result
}

async fn export_blocking(
    samples: &[Sample],
    exporter: &TableExporter,
) -> Result<ScratchTable, ExportError> {
    let batch = samples.to_vec();
    let exporter = exporter.clone();
    let span = Span::current();
    tokio::task::spawn_blocking(move || span.in_scope(|| exporter.export(&batch)))
        .await
        .map_err(|e| ExportError::Io(std::io::Error::other(e)))?
}

async fn release_blocking(table: ScratchTable) {
    let span = Span::current();
    if let Err(e) = tokio::task::spawn_blocking(move || span.in_scope(|| drop(table))).await {
        warn!(error = %e, "scratch table cleanup task failed");
    }
}

async fn run_attempts(
    table: &ScratchTable,
    evaluator: &dyn Evaluator,
) -> Result<Detection, PipelineError> {
    let ts = match attempt(Method::Ts, table, evaluator).await {
        Ok(detection) => {
            info!(method = %Method::Ts, anomalies = detection.anomaly_count(), "detection complete");
            return Ok(detection);
        }
        Err(e) => {
            warn!(error = %e, "ts method failed, falling back to vec");
            e
        }
    };

    match attempt(Method::Vec, table, evaluator).await {
        Ok(detection) => {
            info!(method = %Method::Vec, anomalies = detection.anomaly_count(), "detection complete");
            Ok(detection)
        }
        Err(vec) => {
            warn!(error = %vec, ts_error = %ts, "both detection methods failed");
            Err(PipelineError::Exhausted { vec, ts })
        }
    }
}

/// Admission-controlled front end to [`detect`].
///
/// At most `capacity` batches may be in flight or queued on the evaluator at
/// once; beyond that `run` fails immediately with
/// [`PipelineError::Saturated`].
pub struct Detector {
    exporter: TableExporter,
    evaluator: Arc<dyn Evaluator>,
    permits: Semaphore,
    capacity: usize,
}

impl Detector {
    pub fn new(exporter: TableExporter, evaluator: Arc<dyn Evaluator>, max_pending: usize) -> Self {
        let capacity = max_pending.max(1);
        Self {
            exporter,
            evaluator,
            permits: Semaphore::new(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Batches currently admitted.
    pub fn pending(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub async fn run(&self, samples: &[Sample]) -> Result<Detection, PipelineError> {
        let _permit = self.permits.try_acquire().map_err(|_| PipelineError::Saturated {
            capacity: self.capacity,
        })?;
        detect(samples, &self.exporter, self.evaluator.as_ref()).await
    }
}
