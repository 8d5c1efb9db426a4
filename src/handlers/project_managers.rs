// Project manager CRUD and the select list the team forms feed from.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{self, ListQuery, Pagination};
use crate::database::manager::DatabaseManager;
use crate::database::models::ProjectManager;
use crate::error::ApiError;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

pub fn routes() -> Router {
    Router::new()
        .route("/api/project-managers", get(list).post(store))
        .route("/api/project-managers/select", get(select_list))
        .route(
            "/api/project-managers/:id",
            get(show).put(update).delete(destroy),
        )
        .route("/api/project-managers/:id/edit", get(show))
}

#[derive(Debug, Deserialize)]
pub struct ManagerRequest {
    pub manager_name: Option<String>,
    pub expertise_area: Option<String>,
    pub contact_information: Option<String>,
    pub years_of_experience: Option<i32>,
}

fn validate(req: &ManagerRequest) -> Result<String, ApiError> {
    let mut v = Validator::new();
    let name = v.required("manager_name", req.manager_name.as_deref());
    v.max_len("manager_name", name, 255);
    v.max_len("expertise_area", req.expertise_area.as_deref(), 255);
    v.min_i32("years_of_experience", req.years_of_experience, 0);
    v.finish()?;
    Ok(name.unwrap_or_default().to_string())
}

pub async fn store(Json(req): Json<ManagerRequest>) -> Result<impl IntoResponse, ApiError> {
    let name = validate(&req)?;
    let pool = DatabaseManager::pool()?;

    sqlx::query(
        "INSERT INTO project_managers (manager_name, expertise_area, contact_information, years_of_experience)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&name)
    .bind(&req.expertise_area)
    .bind(&req.contact_information)
    .bind(req.years_of_experience)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Project manager created successfully.")))
}

pub async fn list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let total: i64 = match &pattern {
        Some(p) => sqlx::query_scalar(
            "SELECT COUNT(*) FROM project_managers WHERE manager_name ILIKE $1 OR expertise_area ILIKE $1",
        )
        .bind(p)
        .fetch_one(&pool)
        .await?,
        None => sqlx::query_scalar("SELECT COUNT(*) FROM project_managers").fetch_one(&pool).await?,
    };

    let managers: Vec<ProjectManager> = match &pattern {
        Some(p) => sqlx::query_as(
            "SELECT * FROM project_managers WHERE manager_name ILIKE $1 OR expertise_area ILIKE $1
             ORDER BY manager_id DESC LIMIT $2 OFFSET $3",
        )
        .bind(p)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
        None => sqlx::query_as(
            "SELECT * FROM project_managers ORDER BY manager_id DESC LIMIT $1 OFFSET $2",
        )
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
    };

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = managers.iter().map(|m| manager_json(m, &mut cache)).collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Project managers retrieved successfully.",
    ))
}

pub async fn show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let manager_id = token::codec()
        .decode(EntityKind::Manager, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let manager: ProjectManager =
        sqlx::query_as("SELECT * FROM project_managers WHERE manager_id = $1")
            .bind(manager_id)
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Project manager not found."))?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(
        manager_json(&manager, &mut cache),
        "Project manager retrieved successfully.",
    ))
}

pub async fn update(
    Path(id): Path<String>,
    Json(req): Json<ManagerRequest>,
) -> Result<Json<Value>, ApiError> {
    let manager_id = token::codec()
        .decode(EntityKind::Manager, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let name = validate(&req)?;
    let pool = DatabaseManager::pool()?;

    let result = sqlx::query(
        "UPDATE project_managers
         SET manager_name = $1, expertise_area = $2, contact_information = $3,
             years_of_experience = $4, updated_at = now()
         WHERE manager_id = $5",
    )
    .bind(&name)
    .bind(&req.expertise_area)
    .bind(&req.contact_information)
    .bind(req.years_of_experience)
    .bind(manager_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project manager not found."));
    }

    Ok(api::ok("Project manager updated successfully."))
}

pub async fn destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let manager_id = token::codec()
        .decode(EntityKind::Manager, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    // Managers referenced by a team or project must be reassigned first.
    let in_use: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM development_teams WHERE manager_id = $1)
             OR EXISTS (SELECT 1 FROM testing_teams WHERE manager_id = $1)
             OR EXISTS (SELECT 1 FROM projects WHERE manager_id = $1)",
    )
    .bind(manager_id)
    .fetch_one(&pool)
    .await?;
    if in_use {
        return Err(ApiError::bad_request(
            "Project manager is assigned to a team or project and cannot be deleted.",
        ));
    }

    let result = sqlx::query("DELETE FROM project_managers WHERE manager_id = $1")
        .bind(manager_id)
        .execute(&pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Project manager not found."));
    }

    Ok(api::ok("Project manager deleted successfully."))
}

pub async fn select_list() -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;

    let managers: Vec<ProjectManager> =
        sqlx::query_as("SELECT * FROM project_managers ORDER BY manager_name")
            .fetch_all(&pool)
            .await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = managers
        .iter()
        .map(|m| {
            json!({
                "manager_id": cache.encode(EntityKind::Manager, m.manager_id),
                "manager_name": m.manager_name,
            })
        })
        .collect();

    Ok(api::ok_with(json!(data), "Project managers retrieved successfully."))
}

fn manager_json(m: &ProjectManager, cache: &mut TokenCache<'_>) -> Value {
    json!({
        "manager_id": cache.encode(EntityKind::Manager, m.manager_id),
        "manager_name": m.manager_name,
        "expertise_area": m.expertise_area,
        "contact_information": m.contact_information,
        "years_of_experience": m.years_of_experience,
    })
}
