// OTP-based password recovery codes.
//
// One outstanding code per phone number, stored in `otp_codes`. Codes are
// six digits, expire after the configured TTL, allow a bounded number of
// verification attempts, and are consumed on first successful match.
use chrono::{Duration, Utc};
use rand::Rng;
use sha2::{Digest, Sha256};
use sqlx::PgPool;

use crate::config;
use crate::database::models::OtpCode;

/// Generate and persist a fresh code for the phone, replacing any previous
/// one. Returns the plaintext code for the SMS message.
pub async fn issue(pool: &PgPool, phone: &str) -> Result<String, sqlx::Error> {
    let otp = format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32));
    let expires_at = Utc::now() + Duration::seconds(config::config().otp.ttl_secs);

    sqlx::query(
        "INSERT INTO otp_codes (phone, otp, attempts, expires_at)
         VALUES ($1, $2, 0, $3)
         ON CONFLICT (phone)
         DO UPDATE SET otp = EXCLUDED.otp, attempts = 0, expires_at = EXCLUDED.expires_at",
    )
    .bind(phone)
    .bind(&otp)
    .bind(expires_at)
    .execute(pool)
    .await?;

    Ok(otp)
}

/// Check a submitted code. A match consumes the stored code; a miss burns an
/// attempt. Expired codes and exhausted attempt budgets fail without
/// revealing which condition tripped.
pub async fn verify_and_consume(
    pool: &PgPool,
    phone: &str,
    submitted: &str,
) -> Result<bool, sqlx::Error> {
    let Some(record) = sqlx::query_as::<_, OtpCode>(
        "SELECT phone, otp, attempts, expires_at FROM otp_codes WHERE phone = $1",
    )
    .bind(phone)
    .fetch_optional(pool)
    .await?
    else {
        return Ok(false);
    };

    if record.expires_at <= Utc::now() || record.attempts >= config::config().otp.max_attempts {
        return Ok(false);
    }

    if digest_eq(&record.otp, submitted) {
        sqlx::query("DELETE FROM otp_codes WHERE phone = $1")
            .bind(phone)
            .execute(pool)
            .await?;
        return Ok(true);
    }

    sqlx::query("UPDATE otp_codes SET attempts = attempts + 1 WHERE phone = $1")
        .bind(phone)
        .execute(pool)
        .await?;
    Ok(false)
}

/// Timing-safe comparison: compare fixed-length digests instead of the raw
/// variable-length strings.
fn digest_eq(a: &str, b: &str) -> bool {
    let da = Sha256::digest(a.as_bytes());
    let db = Sha256::digest(b.as_bytes());
    let mut diff = 0u8;
    for (x, y) in da.iter().zip(db.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}
