// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::services::assignment::AssignmentError;
use crate::token::TokenError;

/// Per-field validation messages, one list per invalid field.
pub type FieldErrors = HashMap<String, Vec<String>>;

/// HTTP API error with appropriate status codes and client-friendly messages.
///
/// Responses follow the back-office envelope: `{"result": false, "message": …}`
/// with an `errors` map for field-level failures.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 422 Unprocessable Entity
    UnprocessableEntity { message: String, errors: FieldErrors },

    // 500 Internal Server Error
    InternalServerError(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::UnprocessableEntity { .. } => 422,
            ApiError::InternalServerError(_) => 500,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::UnprocessableEntity { message, .. } => message,
            ApiError::InternalServerError(msg) => msg,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ApiError::UnprocessableEntity { message, errors } => json!({
                "result": false,
                "message": message,
                "errors": errors,
            }),
            _ => json!({
                "result": false,
                "message": self.message(),
            }),
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn validation(errors: FieldErrors) -> Self {
        ApiError::UnprocessableEntity {
            message: "The given data was invalid.".to_string(),
            errors,
        }
    }

    /// Token decode failure attributed to the field that carried the token.
    pub fn invalid_token(field: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.insert(
            field.into(),
            vec!["The selected identifier is invalid.".to_string()],
        );
        ApiError::UnprocessableEntity {
            message: "The given data was invalid.".to_string(),
            errors,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }
}

impl From<TokenError> for ApiError {
    fn from(_: TokenError) -> Self {
        ApiError::invalid_token("id")
    }
}

impl From<crate::database::manager::DatabaseError> for ApiError {
    fn from(err: crate::database::manager::DatabaseError) -> Self {
        match err {
            crate::database::manager::DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            other => {
                // Don't expose internal database errors to clients
                tracing::error!("database error: {}", other);
                ApiError::internal("An error occurred while processing your request.")
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => ApiError::not_found("Record not found."),
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation) =>
            {
                unique_violation(db.constraint())
            }
            other => {
                tracing::error!("sqlx error: {}", other);
                ApiError::internal("An error occurred while processing your request.")
            }
        }
    }
}

/// A duplicate that raced past a handler's pre-check and hit the constraint
/// instead. The constraint name carries the column (e.g. `users_email_key`),
/// so the violation can still be attributed to its field.
fn unique_violation(constraint: Option<&str>) -> ApiError {
    let field = constraint
        .and_then(|c| ["email", "phone"].into_iter().find(|f| c.contains(f)))
        .unwrap_or("id");
    let mut errors = FieldErrors::new();
    errors.insert(
        field.to_string(),
        vec![format!("The {} has already been taken.", field)],
    );
    ApiError::UnprocessableEntity {
        message: "The given data was invalid.".to_string(),
        errors,
    }
}

impl From<AssignmentError> for ApiError {
    fn from(err: AssignmentError) -> Self {
        match err {
            AssignmentError::InvalidToken { field } => ApiError::invalid_token(field),
            AssignmentError::TeamNotFound { field, .. } => {
                let mut errors = FieldErrors::new();
                errors.insert(field.to_string(), vec!["The selected team does not exist.".to_string()]);
                ApiError::UnprocessableEntity {
                    message: "The given data was invalid.".to_string(),
                    errors,
                }
            }
            AssignmentError::CapacityExceeded {
                field,
                team_label,
                team_name,
                team_size,
            } => {
                let mut errors = FieldErrors::new();
                errors.insert(
                    field.to_string(),
                    vec![format!(
                        "{} '{}' has reached its maximum size of {} members.",
                        team_label, team_name, team_size
                    )],
                );
                ApiError::UnprocessableEntity {
                    message: "The given data was invalid.".to_string(),
                    errors,
                }
            }
            AssignmentError::Database(e) => {
                tracing::error!("assignment database error: {}", e);
                ApiError::internal("An error occurred while processing your request.")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_error_is_attributed_to_the_team_field() {
        let err: ApiError = AssignmentError::CapacityExceeded {
            field: "development_team_ids",
            team_label: "Development team",
            team_name: "Core Build".to_string(),
            team_size: 4,
        }
        .into();

        assert_eq!(err.status_code(), 422);
        let body = err.to_json();
        let msgs = &body["errors"]["development_team_ids"];
        assert!(msgs[0]
            .as_str()
            .unwrap()
            .contains("has reached its maximum size of 4 members"));
    }

    #[test]
    fn token_errors_never_echo_the_token() {
        let err: ApiError = TokenError::Invalid.into();
        assert_eq!(err.status_code(), 422);
        assert_eq!(err.to_json()["result"], serde_json::json!(false));
    }

    #[test]
    fn duplicate_key_races_surface_as_field_level_422() {
        let err = unique_violation(Some("users_email_key"));
        assert_eq!(err.status_code(), 422);
        let body = err.to_json();
        assert!(body["errors"]["email"][0]
            .as_str()
            .unwrap()
            .contains("already been taken"));

        let err = unique_violation(Some("users_phone_key"));
        assert!(err.to_json()["errors"]["phone"].is_array());

        // Unknown constraint still lands as a 422, not a 500
        let err = unique_violation(None);
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn not_found_envelope() {
        let err = ApiError::not_found("User not found.");
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_json()["message"], "User not found.");
    }
}
