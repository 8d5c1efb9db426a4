use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Accepted account roles. Admin-only routes are gated on the first entry.
pub const ROLES: &[&str] = &["admin", "employee", "engineer", "manager"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub must_change_password: bool,
    pub password_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
