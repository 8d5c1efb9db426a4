// Client CRUD.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::{self, ListQuery, Pagination};
use crate::database::manager::DatabaseManager;
use crate::database::models::Client;
use crate::error::ApiError;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

pub fn routes() -> Router {
    Router::new()
        .route("/api/clients", get(list).post(store))
        .route("/api/clients/select", get(select_list))
        .route("/api/clients/:id", get(show).put(update).delete(destroy))
        .route("/api/clients/:id/edit", get(show))
}

#[derive(Debug, Deserialize)]
pub struct ClientRequest {
    pub client_name: Option<String>,
    pub contact_information: Option<String>,
    pub registration_date: Option<NaiveDate>,
    pub client_type: Option<String>,
}

fn validate(req: &ClientRequest) -> Result<String, ApiError> {
    let mut v = Validator::new();
    let name = v.required("client_name", req.client_name.as_deref());
    v.max_len("client_name", name, 255);
    v.max_len("client_type", req.client_type.as_deref(), 100);
    v.finish()?;
    Ok(name.unwrap_or_default().to_string())
}

pub async fn store(Json(req): Json<ClientRequest>) -> Result<impl IntoResponse, ApiError> {
    let name = validate(&req)?;
    let pool = DatabaseManager::pool()?;

    sqlx::query(
        "INSERT INTO clients (client_name, contact_information, registration_date, client_type)
         VALUES ($1, $2, $3, $4)",
    )
    .bind(&name)
    .bind(&req.contact_information)
    .bind(req.registration_date)
    .bind(&req.client_type)
    .execute(&pool)
    .await?;

    Ok((StatusCode::CREATED, api::ok("Client created successfully.")))
}

pub async fn list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let total: i64 = match &pattern {
        Some(p) => sqlx::query_scalar(
            "SELECT COUNT(*) FROM clients WHERE client_name ILIKE $1 OR client_type ILIKE $1",
        )
        .bind(p)
        .fetch_one(&pool)
        .await?,
        None => sqlx::query_scalar("SELECT COUNT(*) FROM clients").fetch_one(&pool).await?,
    };

    let clients: Vec<Client> = match &pattern {
        Some(p) => sqlx::query_as(
            "SELECT * FROM clients WHERE client_name ILIKE $1 OR client_type ILIKE $1
             ORDER BY client_id DESC LIMIT $2 OFFSET $3",
        )
        .bind(p)
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?,
        None => sqlx::query_as("SELECT * FROM clients ORDER BY client_id DESC LIMIT $1 OFFSET $2")
            .bind(query.per_page())
            .bind(query.offset())
            .fetch_all(&pool)
            .await?,
    };

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = clients.iter().map(|c| client_json(c, &mut cache)).collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Clients retrieved successfully.",
    ))
}

pub async fn show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let client_id = token::codec()
        .decode(EntityKind::Client, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let client: Client = sqlx::query_as("SELECT * FROM clients WHERE client_id = $1")
        .bind(client_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Client not found."))?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(client_json(&client, &mut cache), "Client retrieved successfully."))
}

pub async fn update(
    Path(id): Path<String>,
    Json(req): Json<ClientRequest>,
) -> Result<Json<Value>, ApiError> {
    let client_id = token::codec()
        .decode(EntityKind::Client, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let name = validate(&req)?;
    let pool = DatabaseManager::pool()?;

    let result = sqlx::query(
        "UPDATE clients
         SET client_name = $1, contact_information = $2, registration_date = $3,
             client_type = $4, updated_at = now()
         WHERE client_id = $5",
    )
    .bind(&name)
    .bind(&req.contact_information)
    .bind(req.registration_date)
    .bind(&req.client_type)
    .bind(client_id)
    .execute(&pool)
    .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Client not found."));
    }

    Ok(api::ok("Client updated successfully."))
}

pub async fn destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let client_id = token::codec()
        .decode(EntityKind::Client, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let in_use: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM projects WHERE client_id = $1)")
            .bind(client_id)
            .fetch_one(&pool)
            .await?;
    if in_use {
        return Err(ApiError::bad_request(
            "Client has projects and cannot be deleted.",
        ));
    }

    let result = sqlx::query("DELETE FROM clients WHERE client_id = $1")
        .bind(client_id)
        .execute(&pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Client not found."));
    }

    Ok(api::ok("Client deleted successfully."))
}

pub async fn select_list() -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;

    let clients: Vec<Client> = sqlx::query_as("SELECT * FROM clients ORDER BY client_name")
        .fetch_all(&pool)
        .await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = clients
        .iter()
        .map(|c| {
            json!({
                "client_id": cache.encode(EntityKind::Client, c.client_id),
                "client_name": c.client_name,
            })
        })
        .collect();

    Ok(api::ok_with(json!(data), "Clients retrieved successfully."))
}

fn client_json(c: &Client, cache: &mut TokenCache<'_>) -> Value {
    json!({
        "client_id": cache.encode(EntityKind::Client, c.client_id),
        "client_name": c.client_name,
        "contact_information": c.contact_information,
        "registration_date": c.registration_date,
        "client_type": c.client_type,
    })
}
