//! Analysis job lifecycle manager
//!
//! Owns the AnalysisJob state machine: creates jobs, validates transitions,
//! and propagates completion or failure into the owning Document or
//! Submission. `process` is the asynchronous entry point run on a worker;
//! every error it encounters is converted into a failed terminal state,
//! never propagated to the caller.

use chrono::Utc;
use docugrade_common::analyzer::{AnalysisOptions, Analyzer};
use docugrade_common::config::OrchestratorConfig;
use docugrade_common::db::models::{
    AnalysisJob, DocumentStatus, JobStatus, SubmissionStatus,
};
use docugrade_common::db::EntityStore;
use docugrade_common::errors::{AppError, Result};
use docugrade_common::metrics;
use docugrade_common::storage::FileStorage;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub struct JobManager {
    store: Arc<dyn EntityStore>,
    analyzer: Arc<dyn Analyzer>,
    storage: FileStorage,
    config: OrchestratorConfig,
}

impl JobManager {
    pub fn new(
        store: Arc<dyn EntityStore>,
        analyzer: Arc<dyn Analyzer>,
        storage: FileStorage,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            store,
            analyzer,
            storage,
            config,
        }
    }

    /// Create a new job with status Created
    pub async fn create_job(
        &self,
        document_id: Uuid,
        user_id: Uuid,
        options: &AnalysisOptions,
        is_submission: bool,
    ) -> Result<AnalysisJob> {
        let now = Utc::now();

        let job = AnalysisJob {
            id: Uuid::new_v4(),
            document_id,
            user_id,
            status: JobStatus::Created.to_string(),
            analysis_options: serde_json::to_value(options)?,
            results: None,
            error_message: None,
            is_submission,
            created_at: now.into(),
            updated_at: now.into(),
        };

        let job = self.store.create_job(job).await?;
        metrics::record_job_created();

        info!(job_id = %job.id, document_id = %document_id, "Analysis job created");
        Ok(job)
    }

    /// Transition a job to a new status.
    ///
    /// Returns `Ok(None)` when the job is unknown; an unknown job is a
    /// no-op for callers, not a crash in a background worker.
    pub async fn update_status(
        &self,
        job_id: Uuid,
        status: JobStatus,
    ) -> Result<Option<AnalysisJob>> {
        let Some(mut job) = self.store.find_job_by_id(job_id).await? else {
            return Ok(None);
        };

        let current = job.job_status()?;
        if !current.can_transition_to(status) {
            return Err(AppError::InvalidTransition {
                entity: "job".to_string(),
                from: current.to_string(),
                to: status.to_string(),
            });
        }

        job.status = status.to_string();
        job.updated_at = Utc::now().into();

        let job = self.store.update_job(job).await?;
        Ok(Some(job))
    }

    /// Mark a job completed and reconcile the owning entity.
    ///
    /// Results and error message are mutually exclusive: completing clears
    /// any error, failing clears any results.
    pub async fn complete(
        &self,
        job_id: Uuid,
        results: serde_json::Value,
    ) -> Result<Option<AnalysisJob>> {
        let Some(mut job) = self.store.find_job_by_id(job_id).await? else {
            return Ok(None);
        };

        let current = job.job_status()?;
        if !current.can_transition_to(JobStatus::Completed) {
            return Err(AppError::InvalidTransition {
                entity: "job".to_string(),
                from: current.to_string(),
                to: JobStatus::Completed.to_string(),
            });
        }

        job.status = JobStatus::Completed.to_string();
        job.results = Some(results.clone());
        job.error_message = None;
        job.updated_at = Utc::now().into();

        let job = self.store.update_job(job).await?;
        metrics::record_job_completed();

        if job.is_submission {
            self.reconcile_submissions_success(job.document_id, &results)
                .await;
        } else {
            self.reconcile_document_success(job.document_id, &results)
                .await;
        }

        info!(job_id = %job_id, "Analysis job completed");
        Ok(Some(job))
    }

    /// Mark a job failed and drive the owning entity to Failed
    pub async fn fail(&self, job_id: Uuid, message: &str) -> Result<Option<AnalysisJob>> {
        let Some(mut job) = self.store.find_job_by_id(job_id).await? else {
            return Ok(None);
        };

        let current = job.job_status()?;
        if !current.can_transition_to(JobStatus::Failed) {
            return Err(AppError::InvalidTransition {
                entity: "job".to_string(),
                from: current.to_string(),
                to: JobStatus::Failed.to_string(),
            });
        }

        job.status = JobStatus::Failed.to_string();
        job.error_message = Some(message.to_string());
        job.results = None;
        job.updated_at = Utc::now().into();

        let job = self.store.update_job(job).await?;
        metrics::record_job_failed();

        if job.is_submission {
            self.reconcile_submissions_failure(job.document_id, message)
                .await;
        } else {
            self.reconcile_document_failure(job.document_id, message)
                .await;
        }

        warn!(job_id = %job_id, error = message, "Analysis job failed");
        Ok(Some(job))
    }

    /// Asynchronous entry point, run on a worker.
    ///
    /// Any error along the way is routed to `fail`; nothing propagates to
    /// whoever dispatched the job.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn process(&self, job_id: Uuid) {
        if let Err(e) = self.run(job_id).await {
            error!(error = %e, "Analysis job processing failed");
            if let Err(fail_err) = self.fail(job_id, &e.to_string()).await {
                error!(error = %fail_err, "Could not record job failure");
            }
        }
    }

    async fn run(&self, job_id: Uuid) -> Result<()> {
        let job = self
            .store
            .find_job_by_id(job_id)
            .await?
            .ok_or_else(|| AppError::JobNotFound {
                id: job_id.to_string(),
            })?;

        self.update_status(job_id, JobStatus::Processing).await?;

        let document = self
            .store
            .find_document_by_id(job.document_id)
            .await?
            .ok_or_else(|| AppError::DocumentNotFound {
                id: job.document_id.to_string(),
            })?;

        let options: AnalysisOptions = serde_json::from_value(job.analysis_options.clone())?;
        if !options.values().any(|&enabled| enabled) {
            return Err(AppError::EmptyAnalysisSelection {
                document_id: document.id.to_string(),
            });
        }

        if !self.storage.exists(&document.file_path).await {
            return Err(AppError::FileMissing {
                document_id: document.id.to_string(),
                path: document.file_path.clone(),
            });
        }

        // The document mirrors the job's progress while the analyzer runs
        let mut document = document;
        document.status = DocumentStatus::Analyzing.to_string();
        document.analyzed = false;
        document.analysis_progress = 0;
        document.selected_analyses = job.analysis_options.clone();
        document.updated_at = Utc::now().into();
        let document = self.store.update_document(document).await?;

        let timer = metrics::AnalysisTimer::start();
        let results = self
            .analyzer
            .analyze(&self.storage.resolve(&document.file_path), &options)
            .await?;
        timer.observe();

        self.complete(job_id, results).await?;
        Ok(())
    }

    // ========================================================================
    // Owning-entity reconciliation
    // ========================================================================

    async fn reconcile_document_success(&self, document_id: Uuid, results: &serde_json::Value) {
        match self.store.find_document_by_id(document_id).await {
            Ok(Some(mut document)) => {
                document.status = DocumentStatus::Completed.to_string();
                document.analyzed = true;
                document.analysis_progress = 100;
                document.results = Some(results.clone());
                document.updated_at = Utc::now().into();
                if let Err(e) = self.store.update_document(document).await {
                    error!(document_id = %document_id, error = %e, "Failed to reconcile document");
                }
            }
            Ok(None) => {
                warn!(document_id = %document_id, "Owning document vanished before reconciliation")
            }
            Err(e) => error!(document_id = %document_id, error = %e, "Failed to load document"),
        }
    }

    async fn reconcile_document_failure(&self, document_id: Uuid, message: &str) {
        match self.store.find_document_by_id(document_id).await {
            Ok(Some(mut document)) => {
                document.status = DocumentStatus::Failed.to_string();
                document.analyzed = false;
                document.analysis_progress = 0;
                document.results = Some(serde_json::json!({ "error": message }));
                document.updated_at = Utc::now().into();
                if let Err(e) = self.store.update_document(document).await {
                    error!(document_id = %document_id, error = %e, "Failed to reconcile document");
                }
            }
            Ok(None) => {
                warn!(document_id = %document_id, "Owning document vanished before reconciliation")
            }
            Err(e) => error!(document_id = %document_id, error = %e, "Failed to load document"),
        }
    }

    /// Drive every submission of this document currently being analyzed to
    /// Analyzed, mirroring the results
    async fn reconcile_submissions_success(&self, document_id: Uuid, results: &serde_json::Value) {
        let submissions = match self.store.find_submissions_by_document(document_id).await {
            Ok(submissions) => submissions,
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Failed to load submissions");
                return;
            }
        };

        for mut submission in submissions {
            if !matches!(submission.sub_status(), Ok(SubmissionStatus::Analyzing)) {
                continue;
            }
            submission.status = SubmissionStatus::Analyzed.to_string();
            submission.results = Some(results.clone());
            submission.grade = Some(self.config.placeholder_grade);
            submission.last_modified = Utc::now().into();
            if let Err(e) = self.store.update_submission(submission).await {
                error!(document_id = %document_id, error = %e, "Failed to reconcile submission");
            }
        }
    }

    async fn reconcile_submissions_failure(&self, document_id: Uuid, message: &str) {
        let submissions = match self.store.find_submissions_by_document(document_id).await {
            Ok(submissions) => submissions,
            Err(e) => {
                error!(document_id = %document_id, error = %e, "Failed to load submissions");
                return;
            }
        };

        for mut submission in submissions {
            if !matches!(submission.sub_status(), Ok(SubmissionStatus::Analyzing)) {
                continue;
            }
            submission.status = SubmissionStatus::Failed.to_string();
            submission.feedback = Some(message.to_string());
            submission.results = None;
            submission.last_modified = Utc::now().into();
            if let Err(e) = self.store.update_submission(submission).await {
                error!(document_id = %document_id, error = %e, "Failed to reconcile submission");
            }
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

    struct Fixture {
        store: Arc<MemoryStore>,
        analyzer: Arc<MockAnalyzer>,
        storage: FileStorage,
        manager: Arc<JobManager>,
    }

    async fn fixture(analyzer: MockAnalyzer) -> Fixture {
        let dir = std::env::temp_dir().join(format!("docugrade-jobs-{}", Uuid::new_v4()));
        let storage = FileStorage::new(&StorageConfig {
            upload_dir: dir.to_string_lossy().to_string(),
        });
        storage.init().await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let analyzer = Arc::new(analyzer);
        let manager = Arc::new(JobManager::new(
            store.clone(),
            analyzer.clone(),
            storage.clone(),
            OrchestratorConfig::default(),
        ));

        Fixture {
            store,
            analyzer,
            storage,
            manager,
        }
    }

    async fn seed_document(fx: &Fixture) -> Document {
        let (path, size) = fx.storage.save("essay.docx", b"content").await.unwrap();
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "essay".to_string(),
            original_filename: "essay.docx".to_string(),
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
        fx.store.create_document(document.clone()).await.unwrap()
    }

    fn options() -> AnalysisOptions {
        AnalysisOptions::from([("SpellCheck".to_string(), true)])
    }

    #[tokio::test]
    async fn test_process_completes_job_and_document() {
        let fx = fixture(MockAnalyzer::returning(
            serde_json::json!({"spelling_errors": 3}),
        ))
        .await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();

        fx.manager.process(job.id).await;

        let job = fx.store.find_job_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Completed);
        assert_eq!(job.results.unwrap()["spelling_errors"], 3);
        assert!(job.error_message.is_none());

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Completed);
        assert!(document.analyzed);
        assert_eq!(document.analysis_progress, 100);
        assert_eq!(document.results.unwrap()["spelling_errors"], 3);
    }

    #[tokio::test]
    async fn test_process_routes_analyzer_failure_to_fail() {
        let fx = fixture(MockAnalyzer::failing("connection refused")).await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();

        fx.manager.process(job.id).await;

        let job = fx.store.find_job_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Failed);
        assert!(job.results.is_none());
        assert!(job
            .error_message
            .as_deref()
            .unwrap()
            .contains("connection refused"));

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Failed);
        assert!(!document.analyzed);
        assert!(document.results.unwrap()["error"]
            .as_str()
            .unwrap()
            .contains("connection refused"));
    }

    #[tokio::test]
    async fn test_process_missing_file_fails_job() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let mut document = seed_document(&fx).await;
        document.file_path = "gone.docx".to_string();
        let document = fx.store.update_document(document).await.unwrap();

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();

        fx.manager.process(job.id).await;

        let job = fx.store.find_job_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Failed);
        // The analyzer was never reached
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_selection_fails_job_without_analyzer_call() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({"ok": true}))).await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &AnalysisOptions::new(), false)
            .await
            .unwrap();

        fx.manager.process(job.id).await;

        let job = fx.store.find_job_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Failed);
        assert!(job
            .error_message
            .as_deref()
            .unwrap()
            .contains("No analyses selected"));
        assert_eq!(fx.analyzer.call_count(), 0);

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Failed);
        assert!(!document.analyzed);
    }

    #[tokio::test]
    async fn test_all_false_selection_fails_job() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({"ok": true}))).await;
        let document = seed_document(&fx).await;

        let options = AnalysisOptions::from([
            ("SpellCheck".to_string(), false),
            ("GrammarCheck".to_string(), false),
        ]);
        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options, false)
            .await
            .unwrap();

        fx.manager.process(job.id).await;

        let job = fx.store.find_job_by_id(job.id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Failed);
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_document_reads_analyzing_while_job_runs() {
        let fx = fixture(MockAnalyzer::pending()).await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();

        let manager = fx.manager.clone();
        let job_id = job.id;
        tokio::spawn(async move { manager.process(job_id).await });
        tokio::time::sleep(std::time::Duration::from_secs(1)).await;

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Analyzing);
        assert!(!document.analyzed);
        assert_eq!(document.analysis_progress, 0);

        let job = fx.store.find_job_by_id(job_id).await.unwrap().unwrap();
        assert_eq!(job.job_status().unwrap(), JobStatus::Processing);
    }

    #[tokio::test]
    async fn test_results_and_error_mutually_exclusive() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({"ok": true}))).await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();

        fx.manager
            .update_status(job.id, JobStatus::Processing)
            .await
            .unwrap();
        let completed = fx
            .manager
            .complete(job.id, serde_json::json!({"ok": true}))
            .await
            .unwrap()
            .unwrap();
        assert!(completed.results.is_some());
        assert!(completed.error_message.is_none());
    }

    #[tokio::test]
    async fn test_update_status_unknown_job_is_none() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let result = fx
            .manager
            .update_status(Uuid::new_v4(), JobStatus::Processing)
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_completed_job_never_resurrected() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let document = seed_document(&fx).await;

        let job = fx
            .manager
            .create_job(document.id, document.owner_id, &options(), false)
            .await
            .unwrap();
        fx.manager
            .update_status(job.id, JobStatus::Processing)
            .await
            .unwrap();
        fx.manager
            .complete(job.id, serde_json::json!({}))
            .await
            .unwrap();

        let err = fx
            .manager
            .update_status(job.id, JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidTransition { .. }));
    }
}
