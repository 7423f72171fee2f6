//! Analysis job entity - one tracked unit of asynchronous analysis work

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Job status enum
///
/// Transitions are monotonic and forward-only; Completed and Failed are
/// absorbing. A finished job is never resurrected, a new job is created
/// instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Created,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    /// Check whether this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }

    /// Check whether the transition to `next` is allowed
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        match (self, next) {
            (Created, Queued) | (Created, Processing) | (Created, Failed) => true,
            (Queued, Processing) | (Queued, Failed) => true,
            (Processing, Completed) | (Processing, Failed) => true,
            // Idempotent re-writes of the current status are allowed
            (a, b) if *a == b => true,
            _ => false,
        }
    }
}

impl FromStr for JobStatus {
    type Err = AppError;

    // Unrecognized stored statuses are rejected, never defaulted
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(JobStatus::Created),
            "queued" => Ok(JobStatus::Queued),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(AppError::InvalidStatus {
                entity: "job".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "analysis_jobs")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub document_id: Uuid,

    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    /// Mapping of analysis name -> enabled flag
    pub analysis_options: Json,

    /// Structured analyzer output, present only when completed
    #[sea_orm(nullable)]
    pub results: Option<Json>,

    /// Failure reason, present only when failed
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    /// Whether completion should reconcile a Submission instead of a bare Document
    pub is_submission: bool,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the job status as an enum, rejecting unrecognized values
    pub fn job_status(&self) -> Result<JobStatus, AppError> {
        self.status.parse()
    }

    /// Check if the job is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.job_status().map(|s| s.is_terminal()).unwrap_or(false)
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
}

impl Related<super::document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Document.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions_allowed() {
        assert!(JobStatus::Created.can_transition_to(JobStatus::Queued));
        assert!(JobStatus::Created.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Queued.can_transition_to(JobStatus::Processing));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Completed));
        assert!(JobStatus::Processing.can_transition_to(JobStatus::Failed));
    }

    #[test]
    fn test_terminal_states_absorbing() {
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Processing));
        assert!(!JobStatus::Completed.can_transition_to(JobStatus::Failed));
        assert!(!JobStatus::Failed.can_transition_to(JobStatus::Created));
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!JobStatus::Processing.can_transition_to(JobStatus::Created));
        assert!(!JobStatus::Queued.can_transition_to(JobStatus::Created));
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "bogus".parse::<JobStatus>().unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus { .. }));
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            JobStatus::Created,
            JobStatus::Queued,
            JobStatus::Processing,
            JobStatus::Completed,
            JobStatus::Failed,
        ] {
            assert_eq!(status.to_string().parse::<JobStatus>().unwrap(), status);
        }
    }
}
