//! Document entity - an uploaded file plus its analysis state

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Document status enum
///
/// Uploaded -> Pending -> Analyzing -> {Completed, Failed}; Analyzed and
/// Graded are terminal states reached by reconciliation and grading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Pending,
    Analyzing,
    Completed,
    Failed,
    Analyzed,
    Graded,
}

impl DocumentStatus {
    /// Check whether this status is terminal for the orchestrator
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed
                | DocumentStatus::Failed
                | DocumentStatus::Analyzed
                | DocumentStatus::Graded
        )
    }

    /// Terminal and successful (analysis produced results)
    pub fn is_terminal_success(&self) -> bool {
        matches!(
            self,
            DocumentStatus::Completed | DocumentStatus::Analyzed | DocumentStatus::Graded
        )
    }

    /// Check whether the transition to `next` is allowed
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        use DocumentStatus::*;
        match (self, next) {
            (Uploaded, Pending) | (Uploaded, Analyzing) | (Uploaded, Failed) => true,
            (Pending, Analyzing) | (Pending, Failed) => true,
            (Analyzing, Completed) | (Analyzing, Failed) => true,
            (Completed, Analyzed) | (Completed, Graded) => true,
            (Analyzed, Graded) => true,
            // Re-analysis of a finished document starts the cycle over
            (Completed, Analyzing) | (Failed, Analyzing) | (Analyzed, Analyzing) => true,
            (a, b) if *a == b => true,
            _ => false,
        }
    }
}

impl FromStr for DocumentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uploaded" => Ok(DocumentStatus::Uploaded),
            "pending" => Ok(DocumentStatus::Pending),
            "analyzing" => Ok(DocumentStatus::Analyzing),
            "completed" => Ok(DocumentStatus::Completed),
            "failed" => Ok(DocumentStatus::Failed),
            "analyzed" => Ok(DocumentStatus::Analyzed),
            "graded" => Ok(DocumentStatus::Graded),
            other => Err(AppError::InvalidStatus {
                entity: "document".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DocumentStatus::Uploaded => "uploaded",
            DocumentStatus::Pending => "pending",
            DocumentStatus::Analyzing => "analyzing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
            DocumentStatus::Analyzed => "analyzed",
            DocumentStatus::Graded => "graded",
        };
        f.write_str(s)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub owner_id: Uuid,

    /// Display name
    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub original_filename: String,

    /// Path of the stored file under the upload directory
    #[sea_orm(column_type = "Text")]
    pub file_path: String,

    pub size_bytes: i64,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub analyzed: bool,

    /// Coarse progress signal: 0 or 100
    pub analysis_progress: i32,

    /// Structured analyzer output, or {"error": ...} after a failed run
    #[sea_orm(nullable)]
    pub results: Option<Json>,

    /// Mapping of analysis name -> enabled flag
    pub selected_analyses: Json,

    pub uploaded_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the document status as an enum, rejecting unrecognized values
    pub fn doc_status(&self) -> Result<DocumentStatus, AppError> {
        self.status.parse()
    }

    /// Check if analysis has reached a terminal state
    pub fn is_terminal(&self) -> bool {
        self.doc_status().map(|s| s.is_terminal()).unwrap_or(false)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::submission::Entity")]
    Submission,

    #[sea_orm(has_many = "super::analysis_job::Entity")]
    AnalysisJob,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl Related<super::analysis_job::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AnalysisJob.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_cycle() {
        assert!(DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Analyzing));
        assert!(DocumentStatus::Analyzing.can_transition_to(DocumentStatus::Completed));
        assert!(DocumentStatus::Analyzing.can_transition_to(DocumentStatus::Failed));
        assert!(!DocumentStatus::Uploaded.can_transition_to(DocumentStatus::Completed));
    }

    #[test]
    fn test_reanalysis_restarts_cycle() {
        assert!(DocumentStatus::Completed.can_transition_to(DocumentStatus::Analyzing));
        assert!(DocumentStatus::Failed.can_transition_to(DocumentStatus::Analyzing));
    }

    #[test]
    fn test_terminal_set() {
        assert!(DocumentStatus::Completed.is_terminal());
        assert!(DocumentStatus::Failed.is_terminal());
        assert!(DocumentStatus::Analyzed.is_terminal());
        assert!(DocumentStatus::Graded.is_terminal());
        assert!(!DocumentStatus::Analyzing.is_terminal());
        assert!(!DocumentStatus::Failed.is_terminal_success());
        assert!(DocumentStatus::Graded.is_terminal_success());
    }

    #[test]
    fn test_unknown_status_rejected() {
        let err = "Uploaded".parse::<DocumentStatus>().unwrap_err();
        assert!(matches!(err, AppError::InvalidStatus { .. }));
    }
}
