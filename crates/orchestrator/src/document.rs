//! Document analysis orchestrator
//!
//! Drives a single document through Analyzing and into a terminal state.
//! `start_analysis` is fire-and-forget: callers never see an error from it,
//! every failure lands on the document as status Failed with the message in
//! `results.error`. Concurrent invocations for the same document race
//! last-writer-wins; there is no app-level mutual exclusion.

use chrono::Utc;
use docugrade_common::analyzer::{AnalysisOptions, Analyzer};
use docugrade_common::db::models::{Document, DocumentStatus};
use docugrade_common::db::EntityStore;
use docugrade_common::metrics;
use docugrade_common::storage::FileStorage;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub struct DocumentAnalyzer {
    store: Arc<dyn EntityStore>,
    analyzer: Arc<dyn Analyzer>,
    storage: FileStorage,
}

impl DocumentAnalyzer {
    pub fn new(
        store: Arc<dyn EntityStore>,
        analyzer: Arc<dyn Analyzer>,
        storage: FileStorage,
    ) -> Self {
        Self {
            store,
            analyzer,
            storage,
        }
    }

    /// Analyze a document and persist the outcome.
    ///
    /// A missing document is logged and ignored. Everything else ends in a
    /// terminal document state, Completed or Failed.
    #[instrument(skip(self, options), fields(document_id = %document_id))]
    pub async fn start_analysis(&self, document_id: Uuid, options: &AnalysisOptions) {
        let document = match self.store.find_document_by_id(document_id).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                warn!("Document not found, skipping analysis");
                return;
            }
            Err(e) => {
                error!(error = %e, "Failed to load document");
                return;
            }
        };

        if !options.values().any(|&enabled| enabled) {
            info!("No analyses selected");
            self.mark_failed(document, "No analyses selected").await;
            return;
        }

        let mut document = document;
        document.status = DocumentStatus::Analyzing.to_string();
        document.analyzed = false;
        document.analysis_progress = 0;
        document.selected_analyses =
            serde_json::to_value(options).unwrap_or(serde_json::Value::Null);
        document.updated_at = Utc::now().into();

        let document = match self.store.update_document(document).await {
            Ok(document) => document,
            Err(e) => {
                error!(error = %e, "Failed to mark document analyzing");
                return;
            }
        };

        if !self.storage.exists(&document.file_path).await {
            warn!(path = %document.file_path, "Backing file missing");
            self.mark_failed(document, "Document file is missing from storage")
                .await;
            return;
        }

        let timer = metrics::AnalysisTimer::start();
        let outcome = self
            .analyzer
            .analyze(&self.storage.resolve(&document.file_path), options)
            .await;
        timer.observe();

        match outcome {
            Ok(results) => self.mark_completed(document, results).await,
            Err(e) => {
                warn!(error = %e, "Analyzer call failed");
                self.mark_failed(document, &e.to_string()).await;
            }
        }
    }

    async fn mark_completed(&self, mut document: Document, results: serde_json::Value) {
        document.status = DocumentStatus::Completed.to_string();
        document.analyzed = true;
        document.analysis_progress = 100;
        document.results = Some(results);
        document.updated_at = Utc::now().into();

        match self.store.update_document(document).await {
            Ok(document) => info!(document_id = %document.id, "Document analysis completed"),
            Err(e) => error!(error = %e, "Failed to persist completed analysis"),
        }
    }

    async fn mark_failed(&self, mut document: Document, message: &str) {
        document.status = DocumentStatus::Failed.to_string();
        document.analyzed = false;
        document.results = Some(serde_json::json!({ "error": message }));
        document.updated_at = Utc::now().into();

        if let Err(e) = self.store.update_document(document).await {
            error!(error = %e, "Failed to persist analysis failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docugrade_common::analyzer::MockAnalyzer;
    use docugrade_common::config::StorageConfig;
    use docugrade_common::db::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        analyzer: Arc<MockAnalyzer>,
        storage: FileStorage,
        orchestrator: DocumentAnalyzer,
    }

    async fn fixture(analyzer: MockAnalyzer) -> Fixture {
        let dir = std::env::temp_dir().join(format!("docugrade-doc-{}", Uuid::new_v4()));
        let storage = FileStorage::new(&StorageConfig {
            upload_dir: dir.to_string_lossy().to_string(),
        });
        storage.init().await.unwrap();

        let store = Arc::new(MemoryStore::new());
        let analyzer = Arc::new(analyzer);
        let orchestrator =
            DocumentAnalyzer::new(store.clone(), analyzer.clone(), storage.clone());

        Fixture {
            store,
            analyzer,
            storage,
            orchestrator,
        }
    }

    async fn seed_document(fx: &Fixture) -> Document {
        let (path, size) = fx.storage.save("thesis.pdf", b"chapter one").await.unwrap();
        let now = Utc::now();
        let document = Document {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: "thesis".to_string(),
            original_filename: "thesis.pdf".to_string(),
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

    #[tokio::test]
    async fn test_upload_to_completed_end_to_end() {
        let fx = fixture(MockAnalyzer::returning(
            serde_json::json!({"spelling_errors": 3}),
        ))
        .await;
        let document = seed_document(&fx).await;

        let options = AnalysisOptions::from([("SpellCheck".to_string(), true)]);
        fx.orchestrator.start_analysis(document.id, &options).await;

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
        assert_eq!(document.selected_analyses["SpellCheck"], true);
        assert_eq!(fx.analyzer.call_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_selection_fails_without_analyzer_call() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let document = seed_document(&fx).await;

        fx.orchestrator
            .start_analysis(document.id, &AnalysisOptions::new())
            .await;

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Failed);
        assert!(!document.analyzed);
        assert!(document.results.is_some());
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_all_false_selection_counts_as_empty() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let document = seed_document(&fx).await;

        let options = AnalysisOptions::from([
            ("SpellCheck".to_string(), false),
            ("Grammar".to_string(), false),
        ]);
        fx.orchestrator.start_analysis(document.id, &options).await;

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Failed);
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_analyzer_failure_surfaces_in_results() {
        let fx = fixture(MockAnalyzer::failing("connection refused")).await;
        let document = seed_document(&fx).await;

        let options = AnalysisOptions::from([("SpellCheck".to_string(), true)]);
        fx.orchestrator.start_analysis(document.id, &options).await;

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
    async fn test_missing_document_is_a_noop() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let options = AnalysisOptions::from([("SpellCheck".to_string(), true)]);
        fx.orchestrator.start_analysis(Uuid::new_v4(), &options).await;
        assert_eq!(fx.analyzer.call_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_backing_file_fails_fast() {
        let fx = fixture(MockAnalyzer::returning(serde_json::json!({}))).await;
        let mut document = seed_document(&fx).await;
        document.file_path = "vanished.pdf".to_string();
        let document = fx.store.update_document(document).await.unwrap();

        let options = AnalysisOptions::from([("SpellCheck".to_string(), true)]);
        fx.orchestrator.start_analysis(document.id, &options).await;

        let document = fx
            .store
            .find_document_by_id(document.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(document.doc_status().unwrap(), DocumentStatus::Failed);
        assert_eq!(fx.analyzer.call_count(), 0);
    }
}
