//! Entity store capability trait
//!
//! The orchestration core treats storage as an injected capability, not an
//! engine: create, get-by-id, update (full overwrite), delete, and a small
//! set of query-by-field lookups. No transactions or joins. Components
//! re-fetch on every read and never cache entities across calls.

use crate::db::models::{AnalysisJob, Document, Submission, SubmissionSlot};
use crate::errors::Result;
use async_trait::async_trait;
use uuid::Uuid;

#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Check store availability
    async fn ping(&self) -> Result<()>;

    // ========================================================================
    // Document operations
    // ========================================================================

    async fn create_document(&self, document: Document) -> Result<Document>;

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>>;

    /// Idempotent full overwrite
    async fn update_document(&self, document: Document) -> Result<Document>;

    async fn delete_document(&self, id: Uuid) -> Result<bool>;

    async fn find_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>>;

    // ========================================================================
    // Submission operations
    // ========================================================================

    /// Create a submission. The (slot, user) uniqueness rule is enforced
    /// here, atomically, and surfaces as `AppError::DuplicateSubmission`.
    async fn create_submission(&self, submission: Submission) -> Result<Submission>;

    async fn find_submission_by_id(&self, id: Uuid) -> Result<Option<Submission>>;

    async fn update_submission(&self, submission: Submission) -> Result<Submission>;

    async fn delete_submission(&self, id: Uuid) -> Result<bool>;

    async fn find_submissions_by_user(&self, user_id: Uuid) -> Result<Vec<Submission>>;

    async fn find_submissions_by_slot(&self, slot_id: Uuid) -> Result<Vec<Submission>>;

    async fn find_submission_by_slot_and_user(
        &self,
        slot_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Submission>>;

    async fn find_submissions_by_document(&self, document_id: Uuid) -> Result<Vec<Submission>>;

    // ========================================================================
    // Submission slot operations
    // ========================================================================

    async fn create_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot>;

    async fn find_slot_by_id(&self, id: Uuid) -> Result<Option<SubmissionSlot>>;

    async fn update_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot>;

    async fn list_slots(&self) -> Result<Vec<SubmissionSlot>>;

    // ========================================================================
    // Analysis job operations
    // ========================================================================

    async fn create_job(&self, job: AnalysisJob) -> Result<AnalysisJob>;

    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>>;

    async fn update_job(&self, job: AnalysisJob) -> Result<AnalysisJob>;

    async fn find_jobs_by_document(&self, document_id: Uuid) -> Result<Vec<AnalysisJob>>;
}
