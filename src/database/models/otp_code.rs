use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One outstanding password-recovery code per phone number.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct OtpCode {
    pub phone: String,
    #[serde(skip_serializing)]
    pub otp: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
}
