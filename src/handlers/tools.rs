// Development and testing tool inventories. CRUD-lite: no edit payload or
// select list, the tables are small enough to list outright.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::FromRow;

use crate::api::{self, ListQuery, Pagination};
use crate::database::manager::DatabaseManager;
use crate::database::models::DevelopmentTool;
use crate::error::ApiError;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

pub fn routes() -> Router {
    Router::new()
        .route("/api/development-tools", get(dev_list).post(dev_store))
        .route("/api/development-tools/:id", get(dev_show).put(dev_update).delete(dev_destroy))
        .route("/api/testing-tools", get(testing_list).post(testing_store))
        .route("/api/testing-tools/:id", get(testing_show).put(testing_update).delete(testing_destroy))
}

#[derive(Debug, Deserialize)]
pub struct DevToolRequest {
    pub tool_name: Option<String>,
    pub tool_version: Option<String>,
    pub license_expiry_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct TestingToolRequest {
    pub testing_tool_name: Option<String>,
    /// Owning team token, optional.
    pub testing_team_id: Option<String>,
    pub license_key: Option<String>,
}

pub async fn dev_store(Json(req): Json<DevToolRequest>) -> Result<impl IntoResponse, ApiError> {
    let mut v = Validator::new();
    let name = v.required("tool_name", req.tool_name.as_deref());
    v.max_len("tool_name", name, 255);
    v.finish()?;

    let pool = DatabaseManager::pool()?;
    sqlx::query(
        "INSERT INTO development_tools (tool_name, tool_version, license_expiry_date)
         VALUES ($1, $2, $3)",
    )
    .bind(name.unwrap_or_default())
    .bind(&req.tool_version)
    .bind(req.license_expiry_date)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Development tool created successfully.")))
}

pub async fn dev_list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let total: i64 = match &pattern {
        Some(p) => sqlx::query_scalar("SELECT COUNT(*) FROM development_tools WHERE tool_name ILIKE $1")
            .bind(p)
            .fetch_one(&pool)
            .await?,
        None => sqlx::query_scalar("SELECT COUNT(*) FROM development_tools").fetch_one(&pool).await?,
    };

    let tools: Vec<DevelopmentTool> = match &pattern {
        Some(p) => sqlx::query_as(
            "SELECT * FROM development_tools WHERE tool_name ILIKE $1
             ORDER BY tool_id DESC LIMIT $2 OFFSET $3",
        )
        .bind(p)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
        None => sqlx::query_as("SELECT * FROM development_tools ORDER BY tool_id DESC LIMIT $1 OFFSET $2")
            .bind(query.per_page())
            .bind(query.offset())
            .fetch_all(&pool)
            .await?,
    };

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "tool_id": cache.encode(EntityKind::DevelopmentTool, t.tool_id),
                "tool_name": t.tool_name,
                "tool_version": t.tool_version,
                "license_expiry_date": t.license_expiry_date,
            })
        })
        .collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Development tools retrieved successfully.",
    ))
}

pub async fn dev_show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::DevelopmentTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let tool: DevelopmentTool = sqlx::query_as("SELECT * FROM development_tools WHERE tool_id = $1")
        .bind(tool_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Development tool not found."))?;

    Ok(api::ok_with(
        json!({
            "tool_id": token::codec().encode(EntityKind::DevelopmentTool, tool.tool_id),
            "tool_name": tool.tool_name,
            "tool_version": tool.tool_version,
            "license_expiry_date": tool.license_expiry_date,
        }),
        "Development tool retrieved successfully.",
    ))
}

pub async fn dev_update(
    Path(id): Path<String>,
    Json(req): Json<DevToolRequest>,
) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::DevelopmentTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;

    let mut v = Validator::new();
    let name = v.required("tool_name", req.tool_name.as_deref());
    v.max_len("tool_name", name, 255);
    v.finish()?;

    let pool = DatabaseManager::pool()?;
    let result = sqlx::query(
        "UPDATE development_tools
         SET tool_name = $1, tool_version = $2, license_expiry_date = $3, updated_at = now()
         WHERE tool_id = $4",
    )
    .bind(name.unwrap_or_default())
    .bind(&req.tool_version)
    .bind(req.license_expiry_date)
    .bind(tool_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Development tool not found."));
    }

    Ok(api::ok("Development tool updated successfully."))
}

pub async fn dev_destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::DevelopmentTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let result = sqlx::query("DELETE FROM development_tools WHERE tool_id = $1")
        .bind(tool_id)
        .execute(&pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Development tool not found."));
    }

    Ok(api::ok("Development tool deleted successfully."))
}

#[derive(Debug, FromRow)]
struct TestingToolRow {
    testing_tool_id: i64,
    testing_tool_name: String,
    testing_team_id: Option<i64>,
    team_name: Option<String>,
}

pub async fn testing_store(
    Json(req): Json<TestingToolRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool()?;

    let mut v = Validator::new();
    let name = v.required("testing_tool_name", req.testing_tool_name.as_deref());
    v.max_len("testing_tool_name", name, 255);

    let mut team_id: Option<i64> = None;
    if let Some(tok) = req.testing_team_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match token::codec().decode(EntityKind::TestingTeam, tok) {
            Ok(id) => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM testing_teams WHERE testing_team_id = $1)",
                )
                .bind(id)
                .fetch_one(&pool)
                .await?;
                if exists {
                    team_id = Some(id);
                } else {
                    v.invalid("testing_team_id");
                }
            }
            Err(_) => v.invalid("testing_team_id"),
        }
    }
    v.finish()?;

    sqlx::query(
        "INSERT INTO testing_tools (testing_tool_name, testing_team_id, license_key)
         VALUES ($1, $2, $3)",
    )
    .bind(name.unwrap_or_default())
    .bind(team_id)
    .bind(&req.license_key)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Testing tool created successfully.")))
}

pub async fn testing_list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let total: i64 = match &pattern {
        Some(p) => sqlx::query_scalar("SELECT COUNT(*) FROM testing_tools WHERE testing_tool_name ILIKE $1")
            .bind(p)
            .fetch_one(&pool)
            .await?,
        None => sqlx::query_scalar("SELECT COUNT(*) FROM testing_tools").fetch_one(&pool).await?,
    };

    let base = "SELECT tt.testing_tool_id, tt.testing_tool_name, tt.testing_team_id, t.team_name
                FROM testing_tools tt
                LEFT JOIN testing_teams t ON t.testing_team_id = tt.testing_team_id";

    let rows: Vec<TestingToolRow> = match &pattern {
        Some(p) => sqlx::query_as(&format!(
            "{base} WHERE tt.testing_tool_name ILIKE $1
             ORDER BY tt.testing_tool_id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(p)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
        None => sqlx::query_as(&format!(
            "{base} ORDER BY tt.testing_tool_id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
    };

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = rows.iter().map(|r| testing_tool_json(r, &mut cache)).collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Testing tools retrieved successfully.",
    ))
}

pub async fn testing_show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::TestingTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let row: TestingToolRow = sqlx::query_as(
        "SELECT tt.testing_tool_id, tt.testing_tool_name, tt.testing_team_id, t.team_name
         FROM testing_tools tt
         LEFT JOIN testing_teams t ON t.testing_team_id = tt.testing_team_id
         WHERE tt.testing_tool_id = $1",
    )
    .bind(tool_id)
    .fetch_optional(&pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Testing tool not found."))?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(
        testing_tool_json(&row, &mut cache),
        "Testing tool retrieved successfully.",
    ))
}

pub async fn testing_update(
    Path(id): Path<String>,
    Json(req): Json<TestingToolRequest>,
) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::TestingTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let mut v = Validator::new();
    let name = v.required("testing_tool_name", req.testing_tool_name.as_deref());
    v.max_len("testing_tool_name", name, 255);

    let mut team_id: Option<i64> = None;
    if let Some(tok) = req.testing_team_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match token::codec().decode(EntityKind::TestingTeam, tok) {
            Ok(id) => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM testing_teams WHERE testing_team_id = $1)",
                )
                .bind(id)
                .fetch_one(&pool)
                .await?;
                if exists {
                    team_id = Some(id);
                } else {
                    v.invalid("testing_team_id");
                }
            }
            Err(_) => v.invalid("testing_team_id"),
        }
    }
    v.finish()?;

    let result = sqlx::query(
        "UPDATE testing_tools
         SET testing_tool_name = $1, testing_team_id = $2, license_key = COALESCE($3, license_key),
             updated_at = now()
         WHERE testing_tool_id = $4",
    )
    .bind(name.unwrap_or_default())
    .bind(team_id)
    .bind(&req.license_key)
    .bind(tool_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Testing tool not found."));
    }

    Ok(api::ok("Testing tool updated successfully."))
}

pub async fn testing_destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let tool_id = token::codec()
        .decode(EntityKind::TestingTool, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let result = sqlx::query("DELETE FROM testing_tools WHERE testing_tool_id = $1")
        .bind(tool_id)
        .execute(&pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Testing tool not found."));
    }

    Ok(api::ok("Testing tool deleted successfully."))
}

/// License keys never leave the server.
fn testing_tool_json(r: &TestingToolRow, cache: &mut TokenCache<'_>) -> Value {
    json!({
        "testing_tool_id": cache.encode(EntityKind::TestingTool, r.testing_tool_id),
        "testing_tool_name": r.testing_tool_name,
        "testing_team_id": r
            .testing_team_id
            .map(|id| cache.encode(EntityKind::TestingTeam, id)),
        "team_name": r.team_name,
    })
}
