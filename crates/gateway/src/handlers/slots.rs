//! Submission slot handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use docugrade_common::{
    auth::AuthContext,
    db::models::{SlotStatus, SubmissionSlot},
    errors::{AppError, Result},
};

/// Request to open a new submission slot
#[derive(Debug, Deserialize, Validate)]
pub struct CreateSlotRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,

    #[validate(length(min = 1, max = 100))]
    pub course: String,

    pub deadline: chrono::DateTime<chrono::Utc>,
}

/// Response for a submission slot
#[derive(Serialize)]
pub struct SlotResponse {
    pub id: Uuid,
    pub name: String,
    pub course: String,
    pub professor_id: Uuid,
    pub status: String,
    pub submissions_count: i32,
    pub deadline: String,
    pub created_at: String,
}

impl From<SubmissionSlot> for SlotResponse {
    fn from(slot: SubmissionSlot) -> Self {
        Self {
            id: slot.id,
            name: slot.name,
            course: slot.course,
            professor_id: slot.professor_id,
            status: slot.status,
            submissions_count: slot.submissions_count,
            deadline: slot.deadline.to_rfc3339(),
            created_at: slot.created_at.to_rfc3339(),
        }
    }
}

/// Open a new submission slot (professors only)
pub async fn create_slot(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateSlotRequest>,
) -> Result<(StatusCode, Json<SlotResponse>)> {
    auth.require_professor()?;

    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let slot = SubmissionSlot {
        id: Uuid::new_v4(),
        name: request.name,
        course: request.course,
        professor_id: auth.user_id,
        status: SlotStatus::Open.to_string(),
        submissions_count: 0,
        deadline: request.deadline.into(),
        created_at: Utc::now().into(),
    };

    let slot = state.store.create_slot(slot).await?;

    tracing::info!(
        slot_id = %slot.id,
        professor_id = %auth.user_id,
        course = %slot.course,
        "Submission slot opened"
    );

    Ok((StatusCode::CREATED, Json(slot.into())))
}

/// List all submission slots
pub async fn list_slots(State(state): State<AppState>) -> Result<Json<Vec<SlotResponse>>> {
    let slots = state.store.list_slots().await?;
    Ok(Json(slots.into_iter().map(Into::into).collect()))
}

/// Get a submission slot by ID
pub async fn get_slot(
    State(state): State<AppState>,
    Path(slot_id): Path<Uuid>,
) -> Result<Json<SlotResponse>> {
    let slot = state
        .store
        .find_slot_by_id(slot_id)
        .await?
        .ok_or_else(|| AppError::SlotNotFound {
            id: slot_id.to_string(),
        })?;

    Ok(Json(slot.into()))
}
