// Back-office landing counts.
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use sqlx::PgPool;

use crate::api;
use crate::database::manager::DatabaseManager;
use crate::error::ApiError;

pub fn routes() -> Router {
    Router::new().route("/api/dashboard", get(summary))
}

pub async fn summary() -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;

    let users = count(&pool, "SELECT COUNT(*) FROM users").await?;
    let clients = count(&pool, "SELECT COUNT(*) FROM clients").await?;
    let projects = count(&pool, "SELECT COUNT(*) FROM projects").await?;
    let active_projects =
        count(&pool, "SELECT COUNT(*) FROM projects WHERE status = 'in_progress'").await?;
    let development_teams = count(&pool, "SELECT COUNT(*) FROM development_teams").await?;
    let testing_teams = count(&pool, "SELECT COUNT(*) FROM testing_teams").await?;

    Ok(api::ok_with(
        json!({
            "users": users,
            "clients": clients,
            "projects": projects,
            "active_projects": active_projects,
            "development_teams": development_teams,
            "testing_teams": testing_teams,
        }),
        "Dashboard retrieved successfully.",
    ))
}

async fn count(pool: &PgPool, sql: &str) -> Result<i64, ApiError> {
    let n: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
    Ok(n)
}
