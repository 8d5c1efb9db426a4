// Development and testing team CRUD.
//
// The two resources share one set of handlers parameterized by `TeamKind`;
// only table names and the wire name of the primary key differ. Edit payloads
// carry the full manager list alongside the team so the UI can preselect the
// current manager by comparing tokens, which relies on encoding being
// deterministic within the response.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};

use crate::api::{self, ListQuery, Pagination};
use crate::database::manager::DatabaseManager;
use crate::database::models::{ProjectManager, TeamSummary};
use crate::error::ApiError;
use crate::services::assignment::TeamKind;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

macro_rules! kind_handlers {
    ($mod_name:ident, $kind:expr) => {
        mod $mod_name {
            use super::*;

            pub async fn store(body: Json<TeamRequest>) -> Result<impl IntoResponse, ApiError> {
                super::store($kind, body).await
            }
            pub async fn list(query: Query<ListQuery>) -> Result<Json<Value>, ApiError> {
                super::list($kind, query).await
            }
            pub async fn show(path: Path<String>) -> Result<Json<Value>, ApiError> {
                super::show($kind, path).await
            }
            pub async fn edit(path: Path<String>) -> Result<Json<Value>, ApiError> {
                super::edit($kind, path).await
            }
            pub async fn update(
                path: Path<String>,
                body: Json<TeamRequest>,
            ) -> Result<Json<Value>, ApiError> {
                super::update($kind, path, body).await
            }
            pub async fn destroy(path: Path<String>) -> Result<Json<Value>, ApiError> {
                super::destroy($kind, path).await
            }
            pub async fn select_list() -> Result<Json<Value>, ApiError> {
                super::select_list($kind).await
            }
        }
    };
}

kind_handlers!(development, TeamKind::Development);
kind_handlers!(testing, TeamKind::Testing);

pub fn routes() -> Router {
    Router::new()
        .route(
            "/api/development-teams",
            get(development::list).post(development::store),
        )
        .route("/api/development-teams/select", get(development::select_list))
        .route(
            "/api/development-teams/:id",
            get(development::show)
                .put(development::update)
                .delete(development::destroy),
        )
        .route("/api/development-teams/:id/edit", get(development::edit))
        .route("/api/testing-teams", get(testing::list).post(testing::store))
        .route("/api/testing-teams/select", get(testing::select_list))
        .route(
            "/api/testing-teams/:id",
            get(testing::show).put(testing::update).delete(testing::destroy),
        )
        .route("/api/testing-teams/:id/edit", get(testing::edit))
}

#[derive(Debug, Deserialize)]
pub struct TeamRequest {
    pub team_name: Option<String>,
    pub team_size: Option<i32>,
    pub specialization: Option<String>,
    /// Manager token, not a raw id.
    pub manager_id: Option<String>,
}

#[derive(Debug, FromRow)]
struct TeamRow {
    team_id: i64,
    team_name: String,
    team_size: i32,
    specialization: Option<String>,
    manager_id: i64,
    manager_name: String,
    member_count: i64,
}

async fn store(kind: TeamKind, Json(req): Json<TeamRequest>) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool()?;
    let input = validate(&pool, &req).await?;

    let sql = format!(
        "INSERT INTO {table} (team_name, team_size, specialization, manager_id)
         VALUES ($1, $2, $3, $4)",
        table = kind.team_table()
    );
    sqlx::query(&sql)
        .bind(&input.team_name)
        .bind(input.team_size)
        .bind(&input.specialization)
        .bind(input.manager_id)
        .execute(&pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        api::ok(&format!("{} created successfully.", kind.label())),
    ))
}

async fn list(kind: TeamKind, Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let where_clause = match &pattern {
        Some(_) => "WHERE t.team_name ILIKE $1 OR t.specialization ILIKE $1",
        None => "",
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM {table} t {where_clause}",
        table = kind.team_table()
    );
    let mut count_q = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(p) = &pattern {
        count_q = count_q.bind(p.clone());
    }
    let total: i64 = count_q.fetch_one(&pool).await?;

    let (limit_ph, offset_ph) = if pattern.is_some() { ("$2", "$3") } else { ("$1", "$2") };
    let rows_sql = format!(
        "SELECT t.{id} AS team_id, t.team_name, t.team_size, t.specialization,
                t.manager_id, m.manager_name,
                (SELECT COUNT(*) FROM {pivot} p WHERE p.{id} = t.{id}) AS member_count
         FROM {table} t
         JOIN project_managers m ON m.manager_id = t.manager_id
         {where_clause}
         ORDER BY t.{id} DESC LIMIT {limit_ph} OFFSET {offset_ph}",
        id = kind.id_column(),
        pivot = kind.pivot_table(),
        table = kind.team_table(),
    );
    let mut rows_q = sqlx::query_as::<_, TeamRow>(&rows_sql);
    if let Some(p) = &pattern {
        rows_q = rows_q.bind(p.clone());
    }
    let rows = rows_q
        .bind(query.per_page())
        .bind(query.offset())
        .fetch_all(&pool)
        .await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = rows.iter().map(|r| team_json(kind, r, &mut cache)).collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Teams retrieved successfully.",
    ))
}

async fn show(kind: TeamKind, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let row = fetch_team(&pool, kind, &id).await?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(
        team_json(kind, &row, &mut cache),
        "Team retrieved successfully.",
    ))
}

/// Edit payload: the team plus every manager, tokens minted from one cache so
/// the team's `manager_id` is byte-equal to the matching entry in `managers`.
async fn edit(kind: TeamKind, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let row = fetch_team(&pool, kind, &id).await?;

    let managers: Vec<ProjectManager> =
        sqlx::query_as("SELECT * FROM project_managers ORDER BY manager_name")
            .fetch_all(&pool)
            .await?;

    let mut cache = TokenCache::new(token::codec());
    let team = team_json(kind, &row, &mut cache);
    let managers: Vec<Value> = managers
        .iter()
        .map(|m| {
            json!({
                "manager_id": cache.encode(EntityKind::Manager, m.manager_id),
                "manager_name": m.manager_name,
                "expertise_area": m.expertise_area,
            })
        })
        .collect();

    Ok(api::ok_with(
        json!({ "team": team, "managers": managers }),
        "Team retrieved successfully.",
    ))
}

async fn update(
    kind: TeamKind,
    Path(id): Path<String>,
    Json(req): Json<TeamRequest>,
) -> Result<Json<Value>, ApiError> {
    let team_id = token::codec()
        .decode(kind.entity_kind(), &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;
    let input = validate(&pool, &req).await?;

    // The shrink check and the write share a transaction, with the team row
    // locked the same way reconciliation locks it. Otherwise a concurrent
    // membership insert between the count and the UPDATE could leave the team
    // over its new size.
    let mut tx = pool.begin().await?;
    let lock_sql = format!(
        "SELECT {id} AS team_id, team_name, team_size FROM {table} WHERE {id} = $1 FOR UPDATE",
        id = kind.id_column(),
        table = kind.team_table()
    );
    sqlx::query_as::<_, TeamSummary>(&lock_sql)
        .bind(team_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found."))?;

    let count_sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {} = $1",
        kind.pivot_table(),
        kind.id_column()
    );
    let members: i64 = sqlx::query_scalar(&count_sql)
        .bind(team_id)
        .fetch_one(&mut *tx)
        .await?;
    if i64::from(input.team_size) < members {
        let mut v = Validator::new();
        v.min_i32("team_size", Some(input.team_size), members as i32);
        v.finish()?;
    }

    let sql = format!(
        "UPDATE {table}
         SET team_name = $1, team_size = $2, specialization = $3, manager_id = $4, updated_at = now()
         WHERE {id} = $5",
        table = kind.team_table(),
        id = kind.id_column()
    );
    sqlx::query(&sql)
        .bind(&input.team_name)
        .bind(input.team_size)
        .bind(&input.specialization)
        .bind(input.manager_id)
        .bind(team_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(api::ok(&format!("{} updated successfully.", kind.label())))
}

async fn destroy(kind: TeamKind, Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let team_id = token::codec()
        .decode(kind.entity_kind(), &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let mut tx = pool.begin().await?;
    let pivot_sql = format!(
        "DELETE FROM {} WHERE {} = $1",
        kind.pivot_table(),
        kind.id_column()
    );
    sqlx::query(&pivot_sql).bind(team_id).execute(&mut *tx).await?;

    let team_sql = format!(
        "DELETE FROM {} WHERE {} = $1",
        kind.team_table(),
        kind.id_column()
    );
    let result = sqlx::query(&team_sql).bind(team_id).execute(&mut *tx).await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("Team not found."));
    }
    tx.commit().await?;

    Ok(api::ok(&format!("{} deleted successfully.", kind.label())))
}

async fn select_list(kind: TeamKind) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;

    #[derive(FromRow)]
    struct SelectRow {
        team_id: i64,
        team_name: String,
        team_size: i32,
    }

    let sql = format!(
        "SELECT {id} AS team_id, team_name, team_size FROM {table} ORDER BY team_name",
        id = kind.id_column(),
        table = kind.team_table()
    );
    let rows: Vec<SelectRow> = sqlx::query_as(&sql).fetch_all(&pool).await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = rows
        .iter()
        .map(|r| {
            json!({
                (wire_id_field(kind)): cache.encode(kind.entity_kind(), r.team_id),
                "team_name": r.team_name,
                "team_size": r.team_size,
            })
        })
        .collect();

    Ok(api::ok_with(json!(data), "Teams retrieved successfully."))
}

/// Wire name of the primary key, matching the underlying column.
fn wire_id_field(kind: TeamKind) -> &'static str {
    kind.id_column()
}

fn team_json(kind: TeamKind, row: &TeamRow, cache: &mut TokenCache<'_>) -> Value {
    json!({
        (wire_id_field(kind)): cache.encode(kind.entity_kind(), row.team_id),
        "team_name": row.team_name,
        "team_size": row.team_size,
        "specialization": row.specialization,
        "member_count": row.member_count,
        "manager_id": cache.encode(EntityKind::Manager, row.manager_id),
        "manager_name": row.manager_name,
    })
}

async fn fetch_team(pool: &PgPool, kind: TeamKind, token_str: &str) -> Result<TeamRow, ApiError> {
    let team_id = token::codec()
        .decode(kind.entity_kind(), token_str)
        .map_err(|_| ApiError::invalid_token("id"))?;

    let sql = format!(
        "SELECT t.{id} AS team_id, t.team_name, t.team_size, t.specialization,
                t.manager_id, m.manager_name,
                (SELECT COUNT(*) FROM {pivot} p WHERE p.{id} = t.{id}) AS member_count
         FROM {table} t
         JOIN project_managers m ON m.manager_id = t.manager_id
         WHERE t.{id} = $1",
        id = kind.id_column(),
        pivot = kind.pivot_table(),
        table = kind.team_table(),
    );
    sqlx::query_as::<_, TeamRow>(&sql)
        .bind(team_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found."))
}

struct TeamInput {
    team_name: String,
    team_size: i32,
    specialization: Option<String>,
    manager_id: i64,
}

/// Shared create/update field validation. The shrink check against the
/// current member count happens in `update`, under the team row lock.
async fn validate(pool: &PgPool, req: &TeamRequest) -> Result<TeamInput, ApiError> {
    let mut v = Validator::new();
    let team_name = v.required("team_name", req.team_name.as_deref());
    v.max_len("team_name", team_name, 255);

    if req.team_size.is_none() {
        v.required("team_size", None);
    }
    v.min_i32("team_size", req.team_size, 1);

    let manager_token = v.required("manager_id", req.manager_id.as_deref());

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

    Ok(TeamInput {
        team_name: team_name.unwrap_or_default().to_string(),
        team_size: req.team_size.unwrap_or(1),
        specialization: req
            .specialization
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        manager_id: manager_id.unwrap_or_default(),
    })
}
