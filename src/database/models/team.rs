use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One row of `development_teams` or `testing_teams`; the two tables share a
/// shape (queries alias `testing_team_id` to `team_id`).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub team_id: i64,
    pub team_name: String,
    /// Declared capacity: member count must never exceed this.
    pub team_size: i32,
    pub specialization: Option<String>,
    pub manager_id: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The slice of a team row the capacity guard needs while holding the row lock.
#[derive(Debug, Clone, FromRow)]
pub struct TeamSummary {
    pub team_id: i64,
    pub team_name: String,
    pub team_size: i32,
}
