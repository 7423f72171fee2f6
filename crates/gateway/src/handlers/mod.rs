//! API handlers module

pub mod documents;
pub mod health;
pub mod jobs;
pub mod slots;
pub mod submissions;
