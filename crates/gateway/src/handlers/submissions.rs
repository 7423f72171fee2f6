//! Submission management handlers

use axum::{
    extract::{Path, Query, State},
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
    db::models::{Submission, SubmissionStatus},
    errors::{AppError, Result},
    metrics,
};

/// Request to submit a document to a slot
#[derive(Debug, Deserialize)]
pub struct CreateSubmissionRequest {
    pub document_id: Uuid,
    pub submission_slot_id: Uuid,
    #[serde(default = "default_submission_type")]
    pub submission_type: String,
}

fn default_submission_type() -> String {
    "document".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ListSubmissionsQuery {
    pub slot_id: Option<Uuid>,
}

/// Request to start analysis on a submission
#[derive(Debug, Deserialize)]
pub struct AnalyzeSubmissionRequest {
    #[serde(default)]
    pub options: AnalysisOptions,
}

/// Response for a submission
#[derive(Serialize)]
pub struct SubmissionResponse {
    pub id: Uuid,
    pub document_id: Uuid,
    pub submission_slot_id: Uuid,
    pub user_id: Uuid,
    pub document_name: String,
    pub submission_type: String,
    pub course: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<serde_json::Value>,
    pub submitted_at: String,
    pub last_modified: String,
}

impl From<Submission> for SubmissionResponse {
    fn from(submission: Submission) -> Self {
        Self {
            id: submission.id,
            document_id: submission.document_id,
            submission_slot_id: submission.submission_slot_id,
            user_id: submission.user_id,
            document_name: submission.document_name,
            submission_type: submission.submission_type,
            course: submission.course,
            status: submission.status,
            grade: submission.grade,
            feedback: submission.feedback,
            results: submission.results,
            submitted_at: submission.submitted_at.to_rfc3339(),
            last_modified: submission.last_modified.to_rfc3339(),
        }
    }
}

/// Submit a document to an open slot
///
/// One submission per (slot, user); a duplicate comes back as 409.
pub async fn create_submission(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>)> {
    let mut slot = state
        .store
        .find_slot_by_id(request.submission_slot_id)
        .await?
        .ok_or_else(|| AppError::SlotNotFound {
            id: request.submission_slot_id.to_string(),
        })?;

    if !slot.is_open() {
        return Err(AppError::SlotClosed {
            id: slot.id.to_string(),
        });
    }

    let document = state
        .store
        .find_document_by_id(request.document_id)
        .await?
        .ok_or_else(|| AppError::DocumentNotFound {
            id: request.document_id.to_string(),
        })?;

    if document.owner_id != auth.user_id {
        return Err(AppError::Forbidden {
            message: "Cannot submit another user's document".to_string(),
        });
    }

    let now = Utc::now();
    let submission = Submission {
        id: Uuid::new_v4(),
        document_id: document.id,
        submission_slot_id: slot.id,
        user_id: auth.user_id,
        document_name: document.name.clone(),
        submission_type: request.submission_type,
        course: slot.course.clone(),
        status: SubmissionStatus::Submitted.to_string(),
        grade: None,
        feedback: None,
        results: None,
        submitted_at: now.into(),
        last_modified: now.into(),
    };

    // Uniqueness of (slot, user) is enforced by the store itself
    let submission = state.store.create_submission(submission).await?;
    metrics::record_submission_created();

    slot.submissions_count += 1;
    state.store.update_slot(slot).await?;

    tracing::info!(
        submission_id = %submission.id,
        slot_id = %submission.submission_slot_id,
        user_id = %auth.user_id,
        "Submission created"
    );

    Ok((StatusCode::CREATED, Json(submission.into())))
}

/// List submissions: the caller's own, or a whole slot for professors
pub async fn list_submissions(
    State(state): State<AppState>,
    auth: AuthContext,
    Query(query): Query<ListSubmissionsQuery>,
) -> Result<Json<Vec<SubmissionResponse>>> {
    let submissions = match query.slot_id {
        Some(slot_id) => {
            auth.require_professor()?;
            state.store.find_submissions_by_slot(slot_id).await?
        }
        None => state.store.find_submissions_by_user(auth.user_id).await?,
    };

    Ok(Json(submissions.into_iter().map(Into::into).collect()))
}

/// Get a submission by ID
pub async fn get_submission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<SubmissionResponse>> {
    let submission = find_visible(&state, &auth, submission_id).await?;
    Ok(Json(submission.into()))
}

/// Delete a submission
pub async fn delete_submission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(submission_id): Path<Uuid>,
) -> Result<StatusCode> {
    let submission = find_visible(&state, &auth, submission_id).await?;

    state.store.delete_submission(submission.id).await?;

    if let Some(mut slot) = state
        .store
        .find_slot_by_id(submission.submission_slot_id)
        .await?
    {
        slot.submissions_count = (slot.submissions_count - 1).max(0);
        state.store.update_slot(slot).await?;
    }

    tracing::info!(submission_id = %submission_id, "Submission deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Start analysis of a submission; returns 202 with the Analyzing record
pub async fn analyze_submission(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(submission_id): Path<Uuid>,
    Json(request): Json<AnalyzeSubmissionRequest>,
) -> Result<(StatusCode, Json<SubmissionResponse>)> {
    find_visible(&state, &auth, submission_id).await?;

    let submission = state
        .submissions
        .analyze_submission(submission_id, request.options)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(submission.into())))
}

/// Load a submission the caller may act on (submitter, or any professor)
async fn find_visible(
    state: &AppState,
    auth: &AuthContext,
    submission_id: Uuid,
) -> Result<Submission> {
    let submission = state
        .store
        .find_submission_by_id(submission_id)
        .await?
        .ok_or_else(|| AppError::SubmissionNotFound {
            id: submission_id.to_string(),
        })?;

    if submission.user_id != auth.user_id && auth.role != "professor" {
        return Err(AppError::Forbidden {
            message: "Submission belongs to another user".to_string(),
        });
    }

    Ok(submission)
}
