//! SeaORM-backed entity store
//!
//! Implements `EntityStore` over the connection pool. Updates are full
//! overwrites of the fetched record. The (slot, user) submission uniqueness
//! rule is enforced by a unique index and surfaced as a conflict error
//! rather than checked read-then-write in application code.

use crate::db::models::*;
use crate::db::{DbPool, EntityStore};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder, SqlErr,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }
}

#[async_trait]
impl EntityStore for Repository {
    async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    // ========================================================================
    // Document operations
    // ========================================================================

    async fn create_document(&self, document: Document) -> Result<Document> {
        document
            .into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        DocumentEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_document(&self, document: Document) -> Result<Document> {
        document
            .into_active_model()
            .reset_all()
            .update(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        let result = DocumentEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn find_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        DocumentEntity::find()
            .filter(DocumentColumn::OwnerId.eq(owner_id))
            .order_by_desc(DocumentColumn::UploadedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Submission operations
    // ========================================================================

    async fn create_submission(&self, submission: Submission) -> Result<Submission> {
        let slot_id = submission.submission_slot_id;
        let user_id = submission.user_id;

        match submission
            .into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await
        {
            Ok(created) => Ok(created),
            Err(e) => match e.sql_err() {
                Some(SqlErr::UniqueConstraintViolation(_)) => {
                    Err(AppError::DuplicateSubmission {
                        slot_id: slot_id.to_string(),
                        user_id: user_id.to_string(),
                    })
                }
                _ => Err(e.into()),
            },
        }
    }

    async fn find_submission_by_id(&self, id: Uuid) -> Result<Option<Submission>> {
        SubmissionEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_submission(&self, submission: Submission) -> Result<Submission> {
        submission
            .into_active_model()
            .reset_all()
            .update(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool> {
        let result = SubmissionEntity::delete_by_id(id)
            .exec(self.write_conn())
            .await?;

        Ok(result.rows_affected > 0)
    }

    async fn find_submissions_by_user(&self, user_id: Uuid) -> Result<Vec<Submission>> {
        SubmissionEntity::find()
            .filter(SubmissionColumn::UserId.eq(user_id))
            .order_by_desc(SubmissionColumn::SubmittedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_submissions_by_slot(&self, slot_id: Uuid) -> Result<Vec<Submission>> {
        SubmissionEntity::find()
            .filter(SubmissionColumn::SubmissionSlotId.eq(slot_id))
            .order_by_desc(SubmissionColumn::SubmittedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_submission_by_slot_and_user(
        &self,
        slot_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Submission>> {
        SubmissionEntity::find()
            .filter(SubmissionColumn::SubmissionSlotId.eq(slot_id))
            .filter(SubmissionColumn::UserId.eq(user_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_submissions_by_document(&self, document_id: Uuid) -> Result<Vec<Submission>> {
        SubmissionEntity::find()
            .filter(SubmissionColumn::DocumentId.eq(document_id))
            .order_by_desc(SubmissionColumn::SubmittedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Submission slot operations
    // ========================================================================

    async fn create_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot> {
        slot.into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_slot_by_id(&self, id: Uuid) -> Result<Option<SubmissionSlot>> {
        SubmissionSlotEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot> {
        slot.into_active_model()
            .reset_all()
            .update(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_slots(&self) -> Result<Vec<SubmissionSlot>> {
        SubmissionSlotEntity::find()
            .order_by_desc(SubmissionSlotColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    // ========================================================================
    // Analysis job operations
    // ========================================================================

    async fn create_job(&self, job: AnalysisJob) -> Result<AnalysisJob> {
        job.into_active_model()
            .reset_all()
            .insert(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        AnalysisJobEntity::find_by_id(id)
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn update_job(&self, job: AnalysisJob) -> Result<AnalysisJob> {
        job.into_active_model()
            .reset_all()
            .update(self.write_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_jobs_by_document(&self, document_id: Uuid) -> Result<Vec<AnalysisJob>> {
        AnalysisJobEntity::find()
            .filter(AnalysisJobColumn::DocumentId.eq(document_id))
            .order_by_desc(AnalysisJobColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}
