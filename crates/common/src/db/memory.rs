//! In-memory entity store
//!
//! HashMap-backed `EntityStore` used by orchestrator tests and by the
//! gateway's `store.provider = "memory"` mode. The (slot, user) submission
//! uniqueness check runs under the write lock, so it is atomic within the
//! process just like the Postgres unique index is within the database.

use crate::db::models::*;
use crate::db::EntityStore;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<Uuid, Document>>,
    submissions: RwLock<HashMap<Uuid, Submission>>,
    slots: RwLock<HashMap<Uuid, SubmissionSlot>>,
    jobs: RwLock<HashMap<Uuid, AnalysisJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(resource_type: &str, id: Uuid) -> AppError {
    AppError::NotFound {
        resource_type: resource_type.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn ping(&self) -> Result<()> {
        Ok(())
    }

    // ========================================================================
    // Document operations
    // ========================================================================

    async fn create_document(&self, document: Document) -> Result<Document> {
        self.documents
            .write()
            .await
            .insert(document.id, document.clone());
        Ok(document)
    }

    async fn find_document_by_id(&self, id: Uuid) -> Result<Option<Document>> {
        Ok(self.documents.read().await.get(&id).cloned())
    }

    async fn update_document(&self, document: Document) -> Result<Document> {
        let mut documents = self.documents.write().await;
        if !documents.contains_key(&document.id) {
            return Err(missing("document", document.id));
        }
        documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn delete_document(&self, id: Uuid) -> Result<bool> {
        Ok(self.documents.write().await.remove(&id).is_some())
    }

    async fn find_documents_by_owner(&self, owner_id: Uuid) -> Result<Vec<Document>> {
        let mut docs: Vec<Document> = self
            .documents
            .read()
            .await
            .values()
            .filter(|d| d.owner_id == owner_id)
            .cloned()
            .collect();
        docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
        Ok(docs)
    }

    // ========================================================================
    // Submission operations
    // ========================================================================

    async fn create_submission(&self, submission: Submission) -> Result<Submission> {
        let mut submissions = self.submissions.write().await;

        let duplicate = submissions.values().any(|s| {
            s.submission_slot_id == submission.submission_slot_id
                && s.user_id == submission.user_id
        });
        if duplicate {
            return Err(AppError::DuplicateSubmission {
                slot_id: submission.submission_slot_id.to_string(),
                user_id: submission.user_id.to_string(),
            });
        }

        submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn find_submission_by_id(&self, id: Uuid) -> Result<Option<Submission>> {
        Ok(self.submissions.read().await.get(&id).cloned())
    }

    async fn update_submission(&self, submission: Submission) -> Result<Submission> {
        let mut submissions = self.submissions.write().await;
        if !submissions.contains_key(&submission.id) {
            return Err(missing("submission", submission.id));
        }
        submissions.insert(submission.id, submission.clone());
        Ok(submission)
    }

    async fn delete_submission(&self, id: Uuid) -> Result<bool> {
        Ok(self.submissions.write().await.remove(&id).is_some())
    }

    async fn find_submissions_by_user(&self, user_id: Uuid) -> Result<Vec<Submission>> {
        let mut subs: Vec<Submission> = self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.user_id == user_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(subs)
    }

    async fn find_submissions_by_slot(&self, slot_id: Uuid) -> Result<Vec<Submission>> {
        let mut subs: Vec<Submission> = self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.submission_slot_id == slot_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(subs)
    }

    async fn find_submission_by_slot_and_user(
        &self,
        slot_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<Submission>> {
        Ok(self
            .submissions
            .read()
            .await
            .values()
            .find(|s| s.submission_slot_id == slot_id && s.user_id == user_id)
            .cloned())
    }

    async fn find_submissions_by_document(&self, document_id: Uuid) -> Result<Vec<Submission>> {
        let mut subs: Vec<Submission> = self
            .submissions
            .read()
            .await
            .values()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect();
        subs.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
        Ok(subs)
    }

    // ========================================================================
    // Submission slot operations
    // ========================================================================

    async fn create_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot> {
        self.slots.write().await.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn find_slot_by_id(&self, id: Uuid) -> Result<Option<SubmissionSlot>> {
        Ok(self.slots.read().await.get(&id).cloned())
    }

    async fn update_slot(&self, slot: SubmissionSlot) -> Result<SubmissionSlot> {
        let mut slots = self.slots.write().await;
        if !slots.contains_key(&slot.id) {
            return Err(missing("slot", slot.id));
        }
        slots.insert(slot.id, slot.clone());
        Ok(slot)
    }

    async fn list_slots(&self) -> Result<Vec<SubmissionSlot>> {
        let mut slots: Vec<SubmissionSlot> = self.slots.read().await.values().cloned().collect();
        slots.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(slots)
    }

    // ========================================================================
    // Analysis job operations
    // ========================================================================

    async fn create_job(&self, job: AnalysisJob) -> Result<AnalysisJob> {
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_job_by_id(&self, id: Uuid) -> Result<Option<AnalysisJob>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update_job(&self, job: AnalysisJob) -> Result<AnalysisJob> {
        let mut jobs = self.jobs.write().await;
        if !jobs.contains_key(&job.id) {
            return Err(missing("job", job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn find_jobs_by_document(&self, document_id: Uuid) -> Result<Vec<AnalysisJob>> {
        let mut jobs: Vec<AnalysisJob> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.document_id == document_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }
}
