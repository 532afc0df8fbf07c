//! The request-processing pipeline: export a batch to a scratch table, ask
//! the engine to analyse it, and normalize whatever comes back.

pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod scratch;

pub use error::{AttemptError, DecodeError, ExportError, PipelineError};
pub use normalize::{decode, normalize, AnomalyReport, TimeAnomalyResult, VectorAnomalyResult};
pub use pipeline::{detect, eval_command, Detector};
pub use scratch::{write_table, ScratchTable, TableExporter};
