//! Analyzer service abstraction
//!
//! Wraps the external document analyzer behind a single `analyze` operation.
//! The service is opaque to this system beyond its request/response contract:
//! a file payload plus a serialized options mapping in, a structured result
//! document out. Connection refusal, non-success status codes, and malformed
//! response bodies all surface as `AppError::AnalyzerError` so callers can
//! route every upstream problem down the same failure path.

use crate::config::AnalyzerConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Named boolean analysis options, e.g. {"SpellCheck": true}
pub type AnalysisOptions = HashMap<String, bool>;

/// Trait for document analysis
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Analyze the file at `path` with the given options, returning the
    /// analyzer's structured result document
    async fn analyze(&self, path: &Path, options: &AnalysisOptions) -> Result<serde_json::Value>;

    /// Block until the analyzer service is reachable, or give up
    async fn wait_until_ready(&self) -> Result<()>;
}

/// HTTP analyzer client
pub struct HttpAnalyzer {
    client: reqwest::Client,
    base_url: String,
    request_timeout_secs: u64,
    health_retry_window: Duration,
}

impl HttpAnalyzer {
    /// Create a new HTTP analyzer client
    pub fn new(config: &AnalyzerConfig) -> Result<Self> {
        // Analysis is CPU-heavy on the far end: timeouts are minutes, not seconds
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration {
                message: format!("Failed to create analyzer HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            request_timeout_secs: config.request_timeout_secs,
            health_retry_window: Duration::from_secs(config.health_retry_window_secs),
        })
    }

    async fn make_request(
        &self,
        path: &Path,
        options: &AnalysisOptions,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/analyze", self.base_url);

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document".to_string());

        let bytes = tokio::fs::read(path).await.map_err(|e| AppError::Storage {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("options", serde_json::to_string(options)?);

        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::AnalyzerTimeout {
                        timeout_secs: self.request_timeout_secs,
                    }
                } else {
                    AppError::AnalyzerError {
                        message: format!("Request failed: {}", e),
                    }
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::AnalyzerError {
                message: format!("Analyzer returned {}: {}", status, body),
            });
        }

        let result: serde_json::Value =
            response.json().await.map_err(|e| AppError::AnalyzerError {
                message: format!("Failed to parse analyzer response: {}", e),
            })?;

        if !result.is_object() {
            return Err(AppError::AnalyzerError {
                message: "Analyzer response is not a JSON object".to_string(),
            });
        }

        Ok(result)
    }
}

#[async_trait]
impl Analyzer for HttpAnalyzer {
    async fn analyze(&self, path: &Path, options: &AnalysisOptions) -> Result<serde_json::Value> {
        self.make_request(path, options).await
    }

    async fn wait_until_ready(&self) -> Result<()> {
        let url = format!("{}/health", self.base_url);
        let client = self.client.clone();

        // The analyzer may not have started yet; retry with backoff
        let backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.health_retry_window),
            ..Default::default()
        };

        backoff::future::retry(backoff, || {
            let client = client.clone();
            let url = url.clone();
            async move {
                let response = client
                    .get(&url)
                    .timeout(Duration::from_secs(5))
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::warn!(error = %e, "Analyzer health check failed, retrying");
                        backoff::Error::transient(AppError::AnalyzerError {
                            message: format!("Health check failed: {}", e),
                        })
                    })?;

                if response.status().is_success() {
                    Ok(())
                } else {
                    Err(backoff::Error::transient(AppError::AnalyzerError {
                        message: format!("Health check returned {}", response.status()),
                    }))
                }
            }
        })
        .await
    }
}

/// Scripted response for the mock analyzer
enum MockOutcome {
    Result(serde_json::Value),
    Failure(String),
    Pending,
}

/// Mock analyzer for testing
///
/// Returns a scripted result (or failure) and counts invocations so tests
/// can assert that a path made zero analyzer calls.
pub struct MockAnalyzer {
    outcome: Mutex<MockOutcome>,
    calls: AtomicUsize,
}

impl MockAnalyzer {
    /// Mock that always succeeds with the given result document
    pub fn returning(result: serde_json::Value) -> Self {
        Self {
            outcome: Mutex::new(MockOutcome::Result(result)),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock that always fails with the given message
    pub fn failing(message: &str) -> Self {
        Self {
            outcome: Mutex::new(MockOutcome::Failure(message.to_string())),
            calls: AtomicUsize::new(0),
        }
    }

    /// Mock whose `analyze` future never resolves, for poll-timeout tests
    pub fn pending() -> Self {
        Self {
            outcome: Mutex::new(MockOutcome::Pending),
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `analyze` invocations so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Replace the scripted outcome
    pub async fn set_result(&self, result: serde_json::Value) {
        *self.outcome.lock().await = MockOutcome::Result(result);
    }
}

#[async_trait]
impl Analyzer for MockAnalyzer {
    async fn analyze(&self, _path: &Path, _options: &AnalysisOptions) -> Result<serde_json::Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // Release the lock before parking so set_result stays usable
        let outcome = match &*self.outcome.lock().await {
            MockOutcome::Result(value) => Some(Ok(value.clone())),
            MockOutcome::Failure(message) => Some(Err(AppError::AnalyzerError {
                message: message.clone(),
            })),
            MockOutcome::Pending => None,
        };
        match outcome {
            Some(result) => result,
            None => {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
    }

    async fn wait_until_ready(&self) -> Result<()> {
        Ok(())
    }
}

/// Create an analyzer based on configuration
pub fn create_analyzer(config: &AnalyzerConfig) -> Result<Arc<dyn Analyzer>> {
    match config.provider.as_str() {
        "http" => Ok(Arc::new(HttpAnalyzer::new(config)?)),
        "mock" => Ok(Arc::new(MockAnalyzer::returning(serde_json::json!({
            "spelling_errors": 0
        })))),
        other => {
            tracing::warn!(provider = other, "Unknown analyzer provider, using mock");
            Ok(Arc::new(MockAnalyzer::returning(serde_json::json!({}))))
        }
    }
}
