use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectManager {
    pub manager_id: i64,
    pub manager_name: String,
    pub expertise_area: Option<String>,
    pub contact_information: Option<String>,
    pub years_of_experience: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
