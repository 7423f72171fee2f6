//! DocuGrade Analysis Orchestration
//!
//! Drives long-running document analysis without blocking request threads:
//! - `JobManager` owns the analysis-job state machine
//! - `DocumentAnalyzer` runs a single document through the external analyzer
//! - `SubmissionAnalyzer` bridges submission analysis to document analysis
//!   with a bounded completion-detection poll loop
//! - `WorkerPool` bounds background concurrency and backlog
//!
//! Orchestration entry points are fire-and-forget: callers get an immediate
//! acknowledgment and poll a status endpoint for the outcome. No error from
//! a background path propagates to the thread that initiated it; terminal
//! failures are recorded on the owning entity, never only logged.

mod document;
mod jobs;
mod submission;
mod worker;

pub use document::DocumentAnalyzer;
pub use jobs::JobManager;
pub use submission::SubmissionAnalyzer;
pub use worker::WorkerPool;
