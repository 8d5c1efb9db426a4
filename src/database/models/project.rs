use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const PROJECT_STATUSES: &[&str] =
    &["planning", "in_progress", "completed", "on_hold", "cancelled"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub project_id: i64,
    pub project_name: String,
    pub client_id: i64,
    pub manager_id: i64,
    pub start_date: NaiveDate,
    pub estimated_end_date: Option<NaiveDate>,
    pub project_description: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A dated progress entry against a project. File/image paths are opaque
/// strings managed by the upload collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectProgress {
    pub progress_id: i64,
    pub project_id: i64,
    pub progress_date: NaiveDate,
    pub progress_description: Option<String>,
    pub image_path: Option<String>,
    pub file_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
