//! SeaORM entity models
//!
//! Database entities for DocuGrade

mod analysis_job;
mod document;
mod submission;
mod submission_slot;

pub use document::{
    Entity as DocumentEntity,
    Model as Document,
    ActiveModel as DocumentActiveModel,
    Column as DocumentColumn,
    DocumentStatus,
};

pub use submission::{
    Entity as SubmissionEntity,
    Model as Submission,
    ActiveModel as SubmissionActiveModel,
    Column as SubmissionColumn,
    SubmissionStatus,
};

pub use submission_slot::{
    Entity as SubmissionSlotEntity,
    Model as SubmissionSlot,
    ActiveModel as SubmissionSlotActiveModel,
    Column as SubmissionSlotColumn,
    SlotStatus,
};

pub use analysis_job::{
    Entity as AnalysisJobEntity,
    Model as AnalysisJob,
    ActiveModel as AnalysisJobActiveModel,
    Column as AnalysisJobColumn,
    JobStatus,
};
