//! Analysis job status handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use docugrade_common::{
    auth::AuthContext,
    errors::{AppError, Result},
};

/// Job status response
#[derive(Serialize)]
pub struct JobResponse {
    pub job_id: Uuid,
    pub document_id: Uuid,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Get job status
pub async fn get_job(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(job_id): Path<Uuid>,
) -> Result<Json<JobResponse>> {
    let job = state
        .store
        .find_job_by_id(job_id)
        .await?
        .ok_or_else(|| AppError::JobNotFound {
            id: job_id.to_string(),
        })?;

    if job.user_id != auth.user_id && auth.role != "professor" {
        return Err(AppError::Forbidden {
            message: "Job belongs to another user".to_string(),
        });
    }

    Ok(Json(JobResponse {
        job_id: job.id,
        document_id: job.document_id,
        status: job.status,
        results: job.results,
        error_message: job.error_message,
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
    }))
}
