//! Pipeline orchestration: the stage sequencer, the analysis retry
//! engine, and per-job processing logs.

pub mod analyzer;
pub mod joblog;
pub mod orchestrator;

pub use analyzer::{AnalysisEngine, AnalysisError};
pub use joblog::JobLogWriter;
pub use orchestrator::{hash_content, is_job_file, JobOrchestrator, Stage, StageError};
