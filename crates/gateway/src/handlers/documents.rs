//! Document management handlers

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use docugrade_common::{
    analyzer::AnalysisOptions,
    auth::AuthContext,
    db::models::{Document, DocumentStatus, JobStatus},
    errors::{AppError, Result},
};

/// Response for a stored document
#[derive(Serialize)]
pub struct DocumentResponse {
    pub id: Uuid,
    pub name: String,
    pub original_filename: String,
    pub size_bytes: i64,
    pub status: String,
    pub analyzed: bool,
    pub analysis_progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    pub selected_analyses: serde_json::Value,
    pub uploaded_at: String,
    pub updated_at: String,
}

impl From<Document> for DocumentResponse {
    fn from(document: Document) -> Self {
        Self {
            id: document.id,
            name: document.name,
            original_filename: document.original_filename,
            size_bytes: document.size_bytes,
            status: document.status,
            analyzed: document.analyzed,
            analysis_progress: document.analysis_progress,
            results: document.results,
            selected_analyses: document.selected_analyses,
            uploaded_at: document.uploaded_at.to_rfc3339(),
            updated_at: document.updated_at.to_rfc3339(),
        }
    }
}

/// Request to start analysis on a document
#[derive(Debug, Deserialize)]
pub struct AnalyzeDocumentRequest {
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// Response after queueing an analysis job
#[derive(Debug, Serialize)]
pub struct AnalyzeDocumentResponse {
    pub job_id: Uuid,
    pub status: String,
    pub poll_url: String,
}

/// Upload a new document (multipart: `file` part, optional `name` part)
pub async fn upload_document(
    State(state): State<AppState>,
    auth: AuthContext,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<DocumentResponse>)> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut name: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| AppError::Validation {
        message: format!("Invalid multipart body: {}", e),
        field: None,
    })? {
        match field.name() {
            Some("file") => {
                let filename = field
                    .file_name()
                    .map(|n| n.to_string())
                    .unwrap_or_else(|| "document".to_string());
                let bytes = field.bytes().await.map_err(|e| AppError::Validation {
                    message: format!("Failed to read file part: {}", e),
                    field: Some("file".to_string()),
                })?;
                file = Some((filename, bytes.to_vec()));
            }
            Some("name") => {
                name = field.text().await.ok();
            }
            _ => {}
        }
    }

    let (original_filename, bytes) = file.ok_or_else(|| AppError::MissingField {
        field: "file".to_string(),
    })?;

    if bytes.is_empty() {
        return Err(AppError::Validation {
            message: "Uploaded file is empty".to_string(),
            field: Some("file".to_string()),
        });
    }

    let (file_path, size_bytes) = state.storage.save(&original_filename, &bytes).await?;

    let now = Utc::now();
    let document = Document {
        id: Uuid::new_v4(),
        owner_id: auth.user_id,
        name: name.unwrap_or_else(|| original_filename.clone()),
        original_filename,
        file_path,
        size_bytes,
        status: DocumentStatus::Uploaded.to_string(),
        analyzed: false,
        analysis_progress: 0,
        results: None,
        selected_analyses: serde_json::json!({}),
        uploaded_at: now.into(),
        updated_at: now.into(),
    };

    let document = state.store.create_document(document).await?;

    tracing::info!(
        document_id = %document.id,
        owner_id = %auth.user_id,
        size_bytes = document.size_bytes,
        "Document uploaded"
    );

    Ok((StatusCode::CREATED, Json(document.into())))
}

/// List the caller's documents
pub async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Vec<DocumentResponse>>> {
    let documents = state.store.find_documents_by_owner(auth.user_id).await?;
    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

/// Get a document by ID
pub async fn get_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<Json<DocumentResponse>> {
    let document = find_owned(&state, &auth, document_id).await?;
    Ok(Json(document.into()))
}

/// Delete a document record and its backing file
pub async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
) -> Result<StatusCode> {
    let document = find_owned(&state, &auth, document_id).await?;

    state.store.delete_document(document.id).await?;
    state.storage.delete(&document.file_path).await?;

    tracing::info!(document_id = %document_id, "Document deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Queue an analysis job for a document
pub async fn analyze_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(document_id): Path<Uuid>,
    Json(request): Json<AnalyzeDocumentRequest>,
) -> Result<(StatusCode, Json<AnalyzeDocumentResponse>)> {
    let document = find_owned(&state, &auth, document_id).await?;

    let job = state
        .jobs
        .create_job(document.id, auth.user_id, &request.options, false)
        .await?;

    // Queued before dispatch: a rejected dispatch must leave a terminal job,
    // not one a poller waits on forever
    let job = state
        .jobs
        .update_status(job.id, JobStatus::Queued)
        .await?
        .ok_or_else(|| AppError::JobNotFound {
            id: job.id.to_string(),
        })?;

    let jobs = state.jobs.clone();
    let job_id = job.id;
    if let Err(e) = state.pool.dispatch(async move {
        jobs.process(job_id).await;
    }) {
        state
            .jobs
            .fail(job_id, "Worker queue is full, analysis was not started")
            .await?;
        return Err(e);
    }

    tracing::info!(
        job_id = %job.id,
        document_id = %document.id,
        "Analysis job queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AnalyzeDocumentResponse {
            job_id: job.id,
            status: job.status,
            poll_url: format!("/v1/jobs/{}", job.id),
        }),
    ))
}

/// Load a document the caller may act on (owner, or any professor)
async fn find_owned(state: &AppState, auth: &AuthContext, document_id: Uuid) -> Result<Document> {
    let document = state
        .store
        .find_document_by_id(document_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound {
            id: document_id.to_string(),
        })?;

    if document.owner_id != auth.user_id && auth.role != "professor" {
        return Err(AppError::Forbidden {
            message: "Document belongs to another user".to_string(),
        });
    }

    Ok(document)
}
