//! Submission analysis orchestrator
//!
//! A submission is graded by analyzing its underlying document and then
//! reconciling the outcome back onto the submission. `analyze_submission`
//! marks the submission Analyzing and dispatches a background task through
//! the worker pool; the task delegates document analysis and polls the
//! document until it reaches a terminal state or the poll budget runs out.
//! The document is authoritative for analysis results; the submission is a
//! projection updated only here.

use crate::document::DocumentAnalyzer;
use crate::worker::WorkerPool;
use chrono::Utc;
use docugrade_common::analyzer::AnalysisOptions;
use docugrade_common::config::OrchestratorConfig;
use docugrade_common::db::models::{DocumentStatus, Submission, SubmissionStatus};
use docugrade_common::db::EntityStore;
use docugrade_common::errors::{AppError, Result};
use docugrade_common::metrics;
use docugrade_common::storage::FileStorage;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

#[derive(Clone)]
pub struct SubmissionAnalyzer {
    store: Arc<dyn EntityStore>,
    documents: Arc<DocumentAnalyzer>,
    storage: FileStorage,
    pool: Arc<WorkerPool>,
    config: OrchestratorConfig,
    shutdown: watch::Receiver<bool>,
}

impl SubmissionAnalyzer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        documents: Arc<DocumentAnalyzer>,
        storage: FileStorage,
        pool: Arc<WorkerPool>,
        config: OrchestratorConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            documents,
            storage,
            pool,
            config,
            shutdown,
        }
    }

    /// Kick off analysis for a submission and return immediately.
    ///
    /// Submissions already Analyzed or Graded are returned unchanged, with
    /// no analyzer work. Otherwise the submission comes back Analyzing and
    /// a background task owns the rest of its lifecycle.
    #[instrument(skip(self, options), fields(submission_id = %submission_id))]
    pub async fn analyze_submission(
        &self,
        submission_id: Uuid,
        options: AnalysisOptions,
    ) -> Result<Submission> {
        let mut submission = self
            .store
            .find_submission_by_id(submission_id)
            .await?
            .ok_or_else(|| AppError::SubmissionNotFound {
                id: submission_id.to_string(),
            })?;

        match submission.sub_status()? {
            SubmissionStatus::Analyzed | SubmissionStatus::Graded => {
                info!("Submission already analyzed, skipping");
                return Ok(submission);
            }
            _ => {}
        }

        let previous_status = submission.status.clone();
        submission.status = SubmissionStatus::Analyzing.to_string();
        submission.last_modified = Utc::now().into();
        let submission = self.store.update_submission(submission).await?;

        let this = self.clone();
        let id = submission.id;
        if let Err(e) = self.pool.dispatch(async move { this.run(id, options).await }) {
            // Queue full: put the submission back the way we found it
            let mut reverted = submission;
            reverted.status = previous_status;
            reverted.last_modified = Utc::now().into();
            if let Err(revert_err) = self.store.update_submission(reverted).await {
                error!(error = %revert_err, "Failed to revert submission status");
            }
            return Err(e);
        }

        Ok(submission)
    }

    /// Background lifecycle: delegate document analysis, then poll the
    /// document until terminal or the attempt budget is spent
    async fn run(self, submission_id: Uuid, options: AnalysisOptions) {
        let submission = match self.store.find_submission_by_id(submission_id).await {
            Ok(Some(submission)) => submission,
            Ok(None) => {
                warn!(submission_id = %submission_id, "Submission vanished before analysis");
                return;
            }
            Err(e) => {
                error!(submission_id = %submission_id, error = %e, "Failed to load submission");
                return;
            }
        };

        let document_id = submission.document_id;
        let document = match self.store.find_document_by_id(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                self.fail_submission(submission, "Submitted document no longer exists")
                    .await;
                return;
            }
            Err(e) => {
                error!(submission_id = %submission_id, error = %e, "Failed to load document");
                self.fail_submission(submission, "Submitted document could not be loaded")
                    .await;
                return;
            }
        };

        if !self.storage.exists(&document.file_path).await {
            self.fail_submission(submission, "Submitted document file is missing from storage")
                .await;
            return;
        }

        // Spawned directly, not through the pool: this task already holds a
        // worker permit and blocking it on a second permit could wedge the
        // pool under load.
        let documents = self.documents.clone();
        let analysis_options = options.clone();
        tokio::spawn(async move {
            documents.start_analysis(document_id, &analysis_options).await;
        });

        self.poll_document(submission, document_id).await;
    }

    async fn poll_document(&self, submission: Submission, document_id: Uuid) {
        let mut shutdown = self.shutdown.clone();
        let interval = self.config.poll_interval();

        for attempt in 1..=self.config.poll_max_attempts {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(submission_id = %submission.id, "Shutdown during submission poll");
                        return;
                    }
                }
                _ = tokio::time::sleep(interval) => {}
            }

            let document = match self.store.find_document_by_id(document_id).await {
                Ok(Some(document)) => document,
                Ok(None) => {
                    self.fail_submission(submission, "Submitted document no longer exists")
                        .await;
                    return;
                }
                Err(e) => {
                    warn!(attempt, error = %e, "Poll attempt failed to load document");
                    continue;
                }
            };

            let status = match document.doc_status() {
                Ok(status) => status,
                Err(e) => {
                    error!(document_id = %document_id, error = %e, "Document status unreadable");
                    self.fail_submission(submission, "Document entered an unrecognized state")
                        .await;
                    return;
                }
            };

            if status.is_terminal_success() {
                let mut submission = submission;
                submission.status = SubmissionStatus::Analyzed.to_string();
                submission.results = document.results.clone();
                submission.grade = Some(self.config.placeholder_grade);
                submission.last_modified = Utc::now().into();
                match self.store.update_submission(submission).await {
                    Ok(submission) => {
                        info!(submission_id = %submission.id, attempt, "Submission analyzed")
                    }
                    Err(e) => error!(error = %e, "Failed to persist analyzed submission"),
                }
                return;
            }

            if status == DocumentStatus::Failed {
                let feedback = document
                    .results
                    .as_ref()
                    .and_then(|r| r.get("error"))
                    .and_then(|e| e.as_str())
                    .map(|msg| format!("Analysis failed: {}", msg))
                    .unwrap_or_else(|| "Analysis failed".to_string());
                self.fail_submission(submission, &feedback).await;
                return;
            }
        }

        metrics::record_poll_timeout();
        warn!(
            submission_id = %submission.id,
            attempts = self.config.poll_max_attempts,
            "Submission poll budget exhausted"
        );
        self.fail_submission(submission, "Analysis failed or timed out")
            .await;
    }

    async fn fail_submission(&self, mut submission: Submission, feedback: &str) {
        submission.status = SubmissionStatus::Failed.to_string();
        submission.feedback = Some(feedback.to_string());
        submission.results = None;
        submission.last_modified = Utc::now().into();
        if let Err(e) = self.store.update_submission(submission).await {
            error!(error = %e, "Failed to persist submission failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docugrade_common::analyzer::MockAnalyzer;
    use docugrade_common::config::StorageConfig;
    use docugrade_common::db::models::Document;
    use docugrade_common::db::MemoryStore;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        analyzer: Arc<MockAnalyzer>,
        storage: FileStorage,
        orchestrator: SubmissionAnalyzer,
        shutdown_tx: watch::Sender<bool>,
    }

    async fn fixture(analyzer: MockAnalyzer) -> Fixture {
        let dir = std::env::temp_dir().join(format!("docugrade-sub-{}", Uuid::new_v4()));
        let storage = FileStorage::new(&StorageConfig {
            upload_dir: dir.to_string_lossy().to_string(),
        });
        storage.init().await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let analyzer = Arc::new(analyzer);
        let documents = Arc::new(DocumentAnalyzer::new(
            store.clone(),
            analyzer.clone(),
            storage.clone(),
        ));
        let config = OrchestratorConfig::default();
        let pool = Arc::new(WorkerPool::new(config.max_workers, config.queue_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let orchestrator = SubmissionAnalyzer::new(
            store.clone(),
            documents,
            storage.clone(),
            pool,
            config,
            shutdown_rx,
        );

        Fixture {
            store,
            analyzer,
            storage,
            orchestrator,
            shutdown_tx,
        }
    }

    async fn seed(fx: &Fixture) -> (Document, Submission) {
        let (path, size) = fx.storage.save("report.docx", b"body").await.unwrap();
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "report".to_string(),
            original_filename: "report.docx".to_string(),
            file_path: path,
            size_bytes: size,
            status: DocumentStatus::Uploaded.to_string(),
            analyzed: false,
            analysis_progress: 0,
            results: None,
            selected_analyses: serde_json::json!({}),
            uploaded_at: now.into(),
            updated_at: now.into(),
        };
        let document = fx.store.create_document(document).await.unwrap();

        let submission = Submission {
            id: Uuid::new_v4(),
            document_id: document.id,
            submission_slot_id: Uuid::new_v4(),
            user_id: document.owner_id,
            document_name: document.name.clone(),
            submission_type: "essay".to_string(),
            course: "ENG-101".to_string(),
            status: SubmissionStatus::Submitted.to_string(),
            grade: None,
            feedback: None,
            results: None,
            submitted_at: now.into(),
            last_modified: now.into(),
        };
        let submission = fx.store.create_submission(submission).await.unwrap();
        (document, submission)
    }

    fn options() -> AnalysisOptions {
        AnalysisOptions::from([("SpellCheck".to_string(), true)])
    }

    async fn wait_for_status(
        fx: &Fixture,
        submission_id: Uuid,
        target: SubmissionStatus,
        budget: Duration,
    ) -> Submission {
        let start = tokio::time::Instant::now();
        loop {
            let submission = fx
                .store
                .find_submission_by_id(submission_id)
                .await
                .unwrap()
                .unwrap();
            if submission.sub_status().unwrap() == target {
                return submission;
            }
            assert!(
                start.elapsed() < budget,
                "submission never reached {:?}",
                target
            );
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_submission_analyzed_with_placeholder_grade() {
        let fx = fixture(MockAnalyzer::returning(
            serde_json::json!({"spelling_errors": 3}),
        ))
        .await;
        let (_document, submission) = seed(&fx).await;

        let returned = fx
            .orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();
        assert_eq!(returned.sub_status().unwrap(), SubmissionStatus::Analyzing);

        let analyzed = wait_for_status(
            &fx,
            submission.id,
            SubmissionStatus::Analyzed,
            Duration::from_secs(60),
        )
        .await;
        assert_eq!(analyzed.grade, Some(85));
        assert_eq!(analyzed.results.unwrap()["spelling_errors"], 3);
        assert_eq!(fx.analyzer.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_analyzed_submission_is_untouched() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let (_document, mut submission) = seed(&fx).await;
        submission.status = SubmissionStatus::Analyzed.to_string();
        submission.grade = Some(92);
        let submission = fx.store.update_submission(submission).await.unwrap();

        let returned = fx
            .orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();
        assert_eq!(returned.sub_status().unwrap(), SubmissionStatus::Analyzed);
        assert_eq!(returned.grade, Some(92));

        // Give any stray background work a chance to run
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_budget_exhaustion_times_out_after_thirty_attempts() {
        let fx = fixture(MockAnalyzer::pending()).await;
        let (_document, submission) = seed(&fx).await;

        let start = tokio::time::Instant::now();
        fx.orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();

        let failed = wait_for_status(
            &fx,
            submission.id,
            SubmissionStatus::Failed,
            Duration::from_secs(600),
        )
        .await;
        assert_eq!(failed.feedback.as_deref(), Some("Analysis failed or timed out"));

        // 30 attempts at 10 s each; the check loop adds at most 1 s of skew
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(300), "elapsed {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(301), "elapsed {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_failure_surfaces_in_feedback() {
        let fx = fixture(MockAnalyzer::failing("connection refused")).await;
        let (_document, submission) = seed(&fx).await;

        fx.orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();

        let failed = wait_for_status(
            &fx,
            submission.id,
            SubmissionStatus::Failed,
            Duration::from_secs(60),
        )
        .await;
        assert!(failed
            .feedback
            .unwrap()
            .contains("connection refused"));
        assert!(failed.results.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_document_fails_submission() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let (document, submission) = seed(&fx).await;
        fx.store.delete_document(document.id).await.unwrap();

        fx.orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();

        let failed = wait_for_status(
            &fx,
            submission.id,
            SubmissionStatus::Failed,
            Duration::from_secs(60),
        )
        .await;
        assert!(failed.feedback.unwrap().contains("no longer exists"));
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_submission_is_an_error() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let err = fx
            .orchestrator
            .analyze_submission(Uuid::new_v4(), options())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::SubmissionNotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_the_poll_loop() {
        let fx = fixture(MockAnalyzer::pending()).await;
        let (_document, submission) = seed(&fx).await;

        fx.orchestrator
            .analyze_submission(submission.id, options())
            .await
            .unwrap();

        // Let a few poll attempts elapse, then signal shutdown
        tokio::time::sleep(Duration::from_secs(25)).await;
        fx.shutdown_tx.send(true).unwrap();
        tokio::time::sleep(Duration::from_secs(60)).await;

        let submission = fx
            .store
            .find_submission_by_id(submission.id)
            .await
            .unwrap()
            .unwrap();
        // Loop exited without forcing a terminal state
        assert_eq!(submission.sub_status().unwrap(), SubmissionStatus::Analyzing);
    }
}
