// Login, password change, and OTP password recovery.
//
// The JWT subject is the user's obfuscated token; the middleware resolves it
// back to the numeric id. Recovery endpoints answer identically for known and
// unknown phones where possible, and OTP failures never say whether the code
// was wrong, expired, or exhausted.
use axum::routing::post;
use axum::{Extension, Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use crate::api;
use crate::auth::{generate_jwt, hash_password, verify_password, Claims};
use crate::database::manager::DatabaseManager;
use crate::database::models::User;
use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::{otp, sms};
use crate::token::{self, EntityKind};
use crate::validate::Validator;

/// Routes reachable without a session.
pub fn public_routes() -> Router {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/forgot/send-otp", post(send_otp))
        .route("/auth/forgot/verify-otp", post(verify_otp))
}

/// Routes that require a valid JWT.
pub fn session_routes() -> Router {
    Router::new().route("/auth/password", post(change_password))
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SendOtpRequest {
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub phone: Option<String>,
    pub otp: Option<String>,
    pub password: Option<String>,
    pub password_confirmation: Option<String>,
}

pub async fn login(Json(req): Json<LoginRequest>) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let email = v.required("email", req.email.as_deref());
    let password = v.required("password", req.password.as_deref());
    v.finish()?;
    let (email, password) = (email.unwrap_or_default(), password.unwrap_or_default());

    let pool = DatabaseManager::pool()?;
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = $1")
        .bind(email)
        .fetch_optional(&pool)
        .await?;

    // One rejection message for both unknown email and bad password.
    let user = match user {
        Some(u) if verify_password(password, &u.password_hash) => u,
        _ => return Err(ApiError::unauthorized("Invalid credentials.")),
    };

    // A temporary password past its expiry forces a rotation just like a
    // fresh one; the gate downstream keys off this claim.
    let password_expired = user
        .password_expires_at
        .map(|at| at <= Utc::now())
        .unwrap_or(false);
    let must_change_password = user.must_change_password || password_expired;

    let sub = token::codec().encode(EntityKind::User, user.id);
    let claims = Claims::new(
        sub.clone(),
        user.name.clone(),
        user.role.clone(),
        must_change_password,
    );
    let jwt = generate_jwt(claims).map_err(|e| ApiError::internal(e.to_string()))?;

    info!(user = %user.email, role = %user.role, "login");

    Ok(api::ok_with(
        json!({
            "token": jwt,
            "user": {
                "id": sub,
                "name": user.name,
                "email": user.email,
                "role": user.role,
                "must_change_password": must_change_password,
            },
        }),
        "Login successful.",
    ))
}

pub async fn change_password(
    Extension(auth): Extension<AuthUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let password = v.required("password", req.password.as_deref());
    v.min_len("password", password, 8);
    v.confirm("password", password, req.password_confirmation.as_deref());
    v.finish()?;

    let hash = hash_password(password.unwrap_or_default())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let pool = DatabaseManager::pool()?;
    sqlx::query(
        "UPDATE users
         SET password_hash = $1, must_change_password = FALSE, password_expires_at = NULL,
             updated_at = now()
         WHERE id = $2",
    )
    .bind(&hash)
    .bind(auth.user_id)
    .execute(&pool)
    .await?;

    Ok(api::ok("Password changed successfully."))
}

pub async fn send_otp(Json(req): Json<SendOtpRequest>) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let phone = v.required("phone", req.phone.as_deref());
    v.finish()?;
    let phone = phone.unwrap_or_default();

    let pool = DatabaseManager::pool()?;
    let known: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE phone = $1)")
        .bind(phone)
        .fetch_one(&pool)
        .await?;

    // Unknown phones get the same response; a code is only actually issued
    // for accounts that exist.
    if known {
        let code = otp::issue(&pool, phone).await?;
        sms::notify(
            phone.to_string(),
            format!("Your password reset code is {}. It expires in 5 minutes.", code),
        );
    }

    Ok(api::ok("If the phone number is registered, a reset code has been sent."))
}

pub async fn verify_otp(Json(req): Json<VerifyOtpRequest>) -> Result<Json<Value>, ApiError> {
    let mut v = Validator::new();
    let phone = v.required("phone", req.phone.as_deref());
    let code = v.required("otp", req.otp.as_deref());
    let password = v.required("password", req.password.as_deref());
    v.min_len("password", password, 8);
    v.confirm("password", password, req.password_confirmation.as_deref());
    v.finish()?;
    let (phone, code) = (phone.unwrap_or_default(), code.unwrap_or_default());

    let pool = DatabaseManager::pool()?;
    if !otp::verify_and_consume(&pool, phone, code).await? {
        return Err(ApiError::bad_request("Invalid or expired code."));
    }

    let hash = hash_password(password.unwrap_or_default())
        .map_err(|e| ApiError::internal(e.to_string()))?;

    let result = sqlx::query(
        "UPDATE users
         SET password_hash = $1, must_change_password = FALSE, password_expires_at = NULL,
             updated_at = now()
         WHERE phone = $2",
    )
    .bind(&hash)
    .bind(phone)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        // Code verified but the account vanished in between.
        return Err(ApiError::not_found("User not found."));
    }

    Ok(api::ok("Password reset successfully."))
}
