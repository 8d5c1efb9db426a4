use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, DecodingKey, Validation};

use crate::auth::Claims;
use crate::config;
use crate::error::ApiError;
use crate::token::{self, EntityKind};

/// Authenticated user context extracted from JWT
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: i64,
    pub name: String,
    pub role: String,
    pub must_change_password: bool,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == "admin"
    }
}

/// JWT authentication middleware that validates tokens and extracts user context
pub async fn jwt_auth_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_jwt_from_headers(&headers)
        .map_err(|msg| ApiError::unauthorized(msg).into_response())?;

    let claims =
        validate_jwt(&token).map_err(|msg| ApiError::unauthorized(msg).into_response())?;

    // The subject carries the obfuscated user token; resolve it back here so
    // handlers only ever see the numeric id.
    let user_id = token::codec()
        .decode(EntityKind::User, &claims.sub)
        .map_err(|_| ApiError::unauthorized("Invalid session subject").into_response())?;

    let auth_user = AuthUser {
        user_id,
        name: claims.name,
        role: claims.role,
        must_change_password: claims.must_change_password,
    };
    request.extensions_mut().insert(auth_user);

    Ok(next.run(request).await)
}

/// Password-rotation gate, layered directly after `jwt_auth_middleware`.
///
/// While an account carries a pending password change (fresh temporary
/// password, or an expired one detected at login), every route except the
/// password-change endpoint is refused.
pub async fn require_password_current(request: Request, next: Next) -> Result<Response, Response> {
    let must_change = request
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.must_change_password)
        .unwrap_or(false);

    if must_change && request.uri().path() != "/auth/password" {
        return Err(ApiError::forbidden(
            "You must change your password before continuing.",
        )
        .into_response());
    }

    Ok(next.run(request).await)
}

/// Admin gate, layered after `jwt_auth_middleware` on back-office routes.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, Response> {
    let is_admin = request
        .extensions()
        .get::<AuthUser>()
        .map(AuthUser::is_admin)
        .unwrap_or(false);

    if !is_admin {
        return Err(
            ApiError::forbidden("You do not have permission to access this resource.")
                .into_response(),
        );
    }

    Ok(next.run(request).await)
}

/// Extract JWT token from Authorization header
fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get("authorization")
        .or_else(|| headers.get("Authorization"))
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}

/// Validate JWT token and extract claims
fn validate_jwt(token: &str) -> Result<Claims, String> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err("JWT secret not configured".to_string());
    }

    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::default();

    let token_data = decode::<Claims>(token, &decoding_key, &validation)
        .map_err(|e| format!("Invalid JWT token: {}", e))?;

    Ok(token_data.claims)
}
