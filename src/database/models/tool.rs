use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DevelopmentTool {
    pub tool_id: i64,
    pub tool_name: String,
    pub tool_version: Option<String>,
    pub license_expiry_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TestingTool {
    pub testing_tool_id: i64,
    pub testing_tool_name: String,
    pub testing_team_id: Option<i64>,
    #[serde(skip_serializing)]
    pub license_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
