//! Submission entity - a student's act of attaching a document to a slot

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Submission status enum
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmissionStatus {
    Submitted,
    Analyzing,
    Analyzed,
    Failed,
    Graded,
}

impl SubmissionStatus {
    /// Check whether this status is terminal for the orchestrator
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionStatus::Analyzed | SubmissionStatus::Failed | SubmissionStatus::Graded
        )
    }

    /// Check whether the transition to `next` is allowed
    pub fn can_transition_to(&self, next: SubmissionStatus) -> bool {
        use SubmissionStatus::*;
        match (self, next) {
            (Submitted, Analyzing) | (Submitted, Failed) => true,
            (Analyzing, Analyzed) | (Analyzing, Failed) => true,
            // Grading is a separate action, reachable from a successful analysis
            (Analyzed, Graded) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }
}

impl FromStr for SubmissionStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(SubmissionStatus::Submitted),
            "analyzing" => Ok(SubmissionStatus::Analyzing),
            "analyzed" => Ok(SubmissionStatus::Analyzed),
            "failed" => Ok(SubmissionStatus::Failed),
            "graded" => Ok(SubmissionStatus::Graded),
            other => Err(AppError::InvalidStatus {
                entity: "submission".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SubmissionStatus::Submitted => "submitted",
            SubmissionStatus::Analyzing => "analyzing",
            SubmissionStatus::Analyzed => "analyzed",
            SubmissionStatus::Failed => "failed",
            SubmissionStatus::Graded => "graded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submissions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    /// Unique together with user_id (one submission per slot per user)
    pub submission_slot_id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub document_name: String,

    #[sea_orm(column_type = "Text")]
    pub submission_type: String,

    #[sea_orm(column_type = "Text")]
    pub course: String,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(nullable)]
    pub grade: Option<i32>,

    #[sea_orm(column_type = "Text", nullable)]
    pub feedback: Option<String>,

    /// Mirrors the document's results once the poll loop reconciles
    #[sea_orm(nullable)]
    pub results: Option<Json>,

    pub submitted_at: DateTimeWithTimeZone,

    pub last_modified: DateTimeWithTimeZone,
}

impl Model {
    /// Get the submission status as an enum, rejecting unrecognized values
    pub fn sub_status(&self) -> Result<SubmissionStatus, AppError> {
        self.status.parse()
    }

    /// Check if analysis has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.sub_status().map(|s| s.is_terminal()).unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::document::Entity",
        from = "Column::DocumentId",
        to = "super::document::Column::Id"
    )]
    Document,

    #[sea_orm(
        belongs_to = "super::submission_slot::Entity",
        from = "Column::SubmissionSlotId",
        to = "super::submission_slot::Column::Id"
    )]
    SubmissionSlot,
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl Related<super::submission_slot::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::SubmissionSlot.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
