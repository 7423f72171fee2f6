//! Submission slot entity - an assignment window submissions attach to

use crate::errors::AppError;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    Open,
    Closed,
}

impl FromStr for SlotStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(SlotStatus::Open),
            "closed" => Ok(SlotStatus::Closed),
            other => Err(AppError::InvalidStatus {
                entity: "slot".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SlotStatus::Open => f.write_str("open"),
            SlotStatus::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "submission_slots")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub name: String,

    #[sea_orm(column_type = "Text")]
    pub course: String,

    pub professor_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    pub submissions_count: i32,

    pub deadline: DateTimeWithTimeZone,

    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn slot_status(&self) -> Result<SlotStatus, AppError> {
        self.status.parse()
    }

    pub fn is_open(&self) -> bool {
        matches!(self.slot_status(), Ok(SlotStatus::Open))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::submission::Entity")]
    Submission,
}

impl Related<super::submission::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Submission.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
