// Project CRUD with client/manager joins, plus dated progress entries.
//
// Accessible to every authenticated role; the rest of the back office is
// admin-only.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};

use crate::api::{self, ListQuery, Pagination};
use crate::database::manager::DatabaseManager;
use crate::database::models::{Client, ProjectManager, ProjectProgress, PROJECT_STATUSES};
use crate::error::ApiError;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

pub fn routes() -> Router {
    Router::new()
        .route("/api/projects", get(list).post(store))
        .route("/api/projects/:id", get(show).put(update).delete(destroy))
        .route("/api/projects/:id/edit", get(edit))
        .route("/api/projects/:id/progress", get(progress_list).post(progress_store))
}

#[derive(Debug, Deserialize)]
pub struct ProjectRequest {
    pub project_name: Option<String>,
    /// Client and manager arrive as tokens.
    pub client_id: Option<String>,
    pub manager_id: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub estimated_end_date: Option<NaiveDate>,
    pub project_description: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressRequest {
    pub progress_date: Option<NaiveDate>,
    pub progress_description: Option<String>,
    pub image_path: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, FromRow)]
struct ProjectRow {
    project_id: i64,
    project_name: String,
    client_id: i64,
    client_name: String,
    manager_id: i64,
    manager_name: String,
    start_date: NaiveDate,
    estimated_end_date: Option<NaiveDate>,
    project_description: Option<String>,
    status: String,
}

struct ProjectInput {
    project_name: String,
    client_id: i64,
    manager_id: i64,
    start_date: NaiveDate,
    status: String,
}

async fn validate(pool: &PgPool, req: &ProjectRequest) -> Result<ProjectInput, ApiError> {
    let mut v = Validator::new();
    let name = v.required("project_name", req.project_name.as_deref());
    v.max_len("project_name", name, 255);

    if req.start_date.is_none() {
        v.required("start_date", None);
    }
    v.date_not_before(
        "estimated_end_date",
        req.estimated_end_date,
        "start_date",
        req.start_date,
    );

    let status = v.required("status", req.status.as_deref());
    v.one_of("status", status, PROJECT_STATUSES);

    let client_token = v.required("client_id", req.client_id.as_deref());
    let manager_token = v.required("manager_id", req.manager_id.as_deref());

    let mut client_id = None;
    if let Some(tok) = client_token {
        match token::codec().decode(EntityKind::Client, tok) {
            Ok(id) => {
                let exists: bool =
                    sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clients WHERE client_id = $1)")
                        .bind(id)
                        .fetch_one(pool)
                        .await?;
                if exists {
                    client_id = Some(id);
                } else {
                    v.invalid("client_id");
                }
            }
            Err(_) => v.invalid("client_id"),
        }
    }

    let mut manager_id = None;
    if let Some(tok) = manager_token {
        match token::codec().decode(EntityKind::Manager, tok) {
            Ok(id) => {
                let exists: bool = sqlx::query_scalar(
                    "SELECT EXISTS (SELECT 1 FROM project_managers WHERE manager_id = $1)",
                )
                .bind(id)
                .fetch_one(pool)
                .await?;
                if exists {
                    manager_id = Some(id);
                } else {
                    v.invalid("manager_id");
                }
            }
            Err(_) => v.invalid("manager_id"),
        }
    }

    v.finish()?;

    Ok(ProjectInput {
        project_name: name.unwrap_or_default().to_string(),
        client_id: client_id.unwrap_or_default(),
        manager_id: manager_id.unwrap_or_default(),
        start_date: req.start_date.unwrap_or_default(),
        status: status.unwrap_or_default().to_string(),
    })
}

pub async fn store(Json(req): Json<ProjectRequest>) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool()?;
    let input = validate(&pool, &req).await?;

    sqlx::query(
        "INSERT INTO projects
             (project_name, client_id, manager_id, start_date, estimated_end_date,
              project_description, status)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(&input.project_name)
    .bind(input.client_id)
    .bind(input.manager_id)
    .bind(input.start_date)
    .bind(req.estimated_end_date)
    .bind(&req.project_description)
    .bind(&input.status)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Project created successfully.")))
}

pub async fn list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    // Search spans the joined names as well as the project's own fields.
    const SEARCH: &str = "WHERE p.project_name ILIKE $1
            OR p.project_description ILIKE $1
            OR c.client_name ILIKE $1
            OR m.manager_name ILIKE $1";

    let total: i64 = match &pattern {
        Some(p) => sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM projects p
             JOIN clients c ON c.client_id = p.client_id
             JOIN project_managers m ON m.manager_id = p.manager_id
             {SEARCH}"
        ))
        .bind(p)
        .fetch_one(&pool)
        .await?,
        None => sqlx::query_scalar("SELECT COUNT(*) FROM projects").fetch_one(&pool).await?,
    };

    let base = "SELECT p.project_id, p.project_name, p.client_id, c.client_name,
                       p.manager_id, m.manager_name, p.start_date, p.estimated_end_date,
                       p.project_description, p.status
                FROM projects p
                JOIN clients c ON c.client_id = p.client_id
                JOIN project_managers m ON m.manager_id = p.manager_id";

    let rows: Vec<ProjectRow> = match &pattern {
        Some(p) => sqlx::query_as(&format!(
            "{base} {SEARCH} ORDER BY p.project_id DESC LIMIT $2 OFFSET $3"
        ))
        .bind(p)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
        None => sqlx::query_as(&format!(
            "{base} ORDER BY p.project_id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
    };

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = rows.iter().map(|r| project_json(r, &mut cache)).collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Projects retrieved successfully.",
    ))
}

pub async fn show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let row = fetch_project(&pool, &id).await?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(project_json(&row, &mut cache), "Project retrieved successfully."))
}

/// Edit payload: the project plus client and manager select lists, all tokens
/// minted from one cache so the current selections match by string equality.
pub async fn edit(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let row = fetch_project(&pool, &id).await?;

    let clients: Vec<Client> = sqlx::query_as("SELECT * FROM clients ORDER BY client_name")
        .fetch_all(&pool)
        .await?;
    let managers: Vec<ProjectManager> =
        sqlx::query_as("SELECT * FROM project_managers ORDER BY manager_name")
            .fetch_all(&pool)
            .await?;

    let mut cache = TokenCache::new(token::codec());
    let project = project_json(&row, &mut cache);
    let clients: Vec<Value> = clients
        .iter()
        .map(|c| {
            json!({
                "client_id": cache.encode(EntityKind::Client, c.client_id),
                "client_name": c.client_name,
            })
        })
        .collect();
    let managers: Vec<Value> = managers
        .iter()
        .map(|m| {
            json!({
                "manager_id": cache.encode(EntityKind::Manager, m.manager_id),
                "manager_name": m.manager_name,
            })
        })
        .collect();

    Ok(api::ok_with(
        json!({ "project": project, "clients": clients, "managers": managers }),
        "Project retrieved successfully.",
    ))
}

pub async fn update(
    Path(id): Path<String>,
    Json(req): Json<ProjectRequest>,
) -> Result<Json<Value>, ApiError> {
    let project_id = token::codec()
        .decode(EntityKind::Project, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;
    let input = validate(&pool, &req).await?;

    let result = sqlx::query(
        "UPDATE projects
         SET project_name = $1, client_id = $2, manager_id = $3, start_date = $4,
             estimated_end_date = $5, project_description = $6, status = $7, updated_at = now()
         WHERE project_id = $8",
    )
    .bind(&input.project_name)
    .bind(input.client_id)
    .bind(input.manager_id)
    .bind(input.start_date)
    .bind(req.estimated_end_date)
    .bind(&req.project_description)
    .bind(&input.status)
    .bind(project_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found."));
    }

    Ok(api::ok("Project updated successfully."))
}

pub async fn destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let project_id = token::codec()
        .decode(EntityKind::Project, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM project_progress WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM projects WHERE project_id = $1")
        .bind(project_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project not found."));
    }
    tx.commit().await?;

    Ok(api::ok("Project deleted successfully."))
}

/// GET /api/projects/:id/progress - entries newest first
pub async fn progress_list(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let project_id = token::codec()
        .decode(EntityKind::Project, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    ensure_project_exists(&pool, project_id).await?;

    let entries: Vec<ProjectProgress> = sqlx::query_as(
        "SELECT * FROM project_progress WHERE project_id = $1
         ORDER BY progress_date DESC, progress_id DESC",
    )
    .bind(project_id)
    .fetch_all(&pool)
    .await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = entries
        .iter()
        .map(|e| {
            json!({
                "progress_id": cache.encode(EntityKind::Progress, e.progress_id),
                "project_id": cache.encode(EntityKind::Project, e.project_id),
                "progress_date": e.progress_date,
                "progress_description": e.progress_description,
                "image_path": e.image_path,
                "file_path": e.file_path,
            })
        })
        .collect();

    Ok(api::ok_with(json!(data), "Project progress retrieved successfully."))
}

/// POST /api/projects/:id/progress - record a dated entry. Paths are opaque
/// references into whatever store holds the uploads.
pub async fn progress_store(
    Path(id): Path<String>,
    Json(req): Json<ProgressRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let project_id = token::codec()
        .decode(EntityKind::Project, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    ensure_project_exists(&pool, project_id).await?;

    let mut v = Validator::new();
    if req.progress_date.is_none() {
        v.required("progress_date", None);
    }
    let description = v.required("progress_description", req.progress_description.as_deref());
    v.finish()?;

    sqlx::query(
        "INSERT INTO project_progress
             (project_id, progress_date, progress_description, image_path, file_path)
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(project_id)
    .bind(req.progress_date.unwrap_or_default())
    .bind(description.unwrap_or_default())
    .bind(&req.image_path)
    .bind(&req.file_path)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Progress recorded successfully.")))
}

async fn ensure_project_exists(pool: &PgPool, project_id: i64) -> Result<(), ApiError> {
    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM projects WHERE project_id = $1)")
            .bind(project_id)
            .fetch_one(pool)
            .await?;
    if !exists {
        return Err(ApiError::not_found("Project not found."));
    }
    Ok(())
}

async fn fetch_project(pool: &PgPool, token_str: &str) -> Result<ProjectRow, ApiError> {
    let project_id = token::codec()
        .decode(EntityKind::Project, token_str)
        .map_err(|_| ApiError::invalid_token("id"))?;

    sqlx::query_as::<_, ProjectRow>(
        "SELECT p.project_id, p.project_name, p.client_id, c.client_name,
                p.manager_id, m.manager_name, p.start_date, p.estimated_end_date,
                p.project_description, p.status
         FROM projects p
         JOIN clients c ON c.client_id = p.client_id
         JOIN project_managers m ON m.manager_id = p.manager_id
         WHERE p.project_id = $1",
    )
    .bind(project_id)
    .fetch_optional(pool)
    .await?
    .ok_or_else(|| ApiError::not_found("Project not found."))
}

fn project_json(r: &ProjectRow, cache: &mut TokenCache<'_>) -> Value {
    json!({
        "project_id": cache.encode(EntityKind::Project, r.project_id),
        "project_name": r.project_name,
        "client_id": cache.encode(EntityKind::Client, r.client_id),
        "client_name": r.client_name,
        "manager_id": cache.encode(EntityKind::Manager, r.manager_id),
        "manager_name": r.manager_name,
        "start_date": r.start_date,
        "estimated_end_date": r.estimated_end_date,
        "project_description": r.project_description,
        "status": r.status,
    })
}
