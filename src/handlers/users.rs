// User management: CRUD plus team assignment.
//
// Team membership fields are `Option<Vec<_>>` throughout: an omitted field
// leaves that kind's memberships alone, an empty list detaches all of them.
use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{FromRow, PgPool};

use crate::api::{self, ListQuery, Pagination};
use crate::auth::hash_password;
use crate::database::manager::DatabaseManager;
use crate::database::models::{User, ROLES};
use crate::error::ApiError;
use crate::services::assignment::{self, PgMembershipStore, TeamChanges, TeamKind};
use crate::services::sms;
use crate::token::{self, EntityKind, TokenCache};
use crate::validate::Validator;

pub fn routes() -> Router {
    Router::new()
        .route("/api/users", get(list).post(store))
        .route("/api/users/select", get(select_list))
        .route("/api/users/:id", get(show).put(update).delete(destroy))
        .route("/api/users/:id/edit", get(show))
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub development_team_ids: Option<Vec<String>>,
    pub testing_team_ids: Option<Vec<String>>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: Option<String>,
    pub development_team_ids: Option<Vec<String>>,
    pub testing_team_ids: Option<Vec<String>>,
}

/// POST /api/users - create a user with a temporary password and optional
/// initial team assignments. The insert and the membership writes share one
/// transaction: a capacity failure rolls back the whole create.
pub async fn store(Json(req): Json<CreateUserRequest>) -> Result<impl IntoResponse, ApiError> {
    let pool = DatabaseManager::pool()?;

    let mut v = Validator::new();
    let name = v.required("name", req.name.as_deref());
    v.max_len("name", name, 255);
    let email = v.required("email", req.email.as_deref());
    v.email("email", email);
    v.max_len("email", email, 255);
    let phone = v.required("phone", req.phone.as_deref());
    let role = v.required("role", req.role.as_deref());
    v.one_of("role", role, ROLES);
    check_unique(&pool, &mut v, email, phone, None).await?;
    v.finish()?;

    let (name, email, phone, role) = (
        name.unwrap_or_default(),
        email.unwrap_or_default(),
        phone.unwrap_or_default(),
        role.unwrap_or_default(),
    );

    let temporary_password = random_password();
    let password_hash =
        hash_password(&temporary_password).map_err(|e| ApiError::internal(e.to_string()))?;

    let mut tx = pool.begin().await?;
    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (name, email, phone, role, password_hash, must_change_password, password_expires_at)
         VALUES ($1, $2, $3, $4, $5, TRUE, now() + interval '30 days')
         RETURNING id",
    )
    .bind(name)
    .bind(email)
    .bind(phone)
    .bind(role)
    .bind(&password_hash)
    .fetch_one(&mut *tx)
    .await?;

    let changes = TeamChanges {
        development: req.development_team_ids.clone(),
        testing: req.testing_team_ids.clone(),
    };
    if !changes.is_empty() {
        let mut store = PgMembershipStore::new(&mut tx);
        assignment::reconcile(&mut store, token::codec(), user_id, &changes).await?;
    }
    tx.commit().await?;

    sms::notify(
        phone.to_string(),
        format!(
            "Your account has been created. Temporary password: {}. Please change your password upon first login.",
            temporary_password
        ),
    );

    Ok((StatusCode::CREATED, api::ok("User created successfully.")))
}

/// GET /api/users - paginated listing with team names
pub async fn list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let total: i64 = match &pattern {
        Some(p) => {
            sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE name ILIKE $1 OR email ILIKE $1")
                .bind(p)
                .fetch_one(&pool)
                .await?
        }
        None => sqlx::query_scalar("SELECT COUNT(*) FROM users").fetch_one(&pool).await?,
    };

    let users: Vec<User> = match &pattern {
        Some(p) => {
            sqlx::query_as(
                "SELECT * FROM users WHERE name ILIKE $1 OR email ILIKE $1
                 ORDER BY id DESC LIMIT $2 OFFSET $3",
            )
            .bind(p)
            .bind(query.per_page())
            .bind(query.offset())
            .fetch_all(&pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM users ORDER BY id DESC LIMIT $1 OFFSET $2")
                .bind(query.per_page())
                .bind(query.offset())
                .fetch_all(&pool)
                .await?
        }
    };

    let user_ids: Vec<i64> = users.iter().map(|u| u.id).collect();
    let dev = memberships(&pool, TeamKind::Development, &user_ids).await?;
    let test = memberships(&pool, TeamKind::Testing, &user_ids).await?;

    let mut cache = TokenCache::new(token::codec());
    let data: Vec<Value> = users
        .iter()
        .map(|u| user_json(u, &dev, &test, &mut cache))
        .collect();

    Ok(api::ok_paginated(
        json!(data),
        Pagination::new(query.page(), query.per_page(), total),
        "Users retrieved successfully.",
    ))
}

/// GET /api/users/:id - single user with memberships
pub async fn show(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let user_id = token::codec()
        .decode(EntityKind::User, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let ids = vec![user.id];
    let dev = memberships(&pool, TeamKind::Development, &ids).await?;
    let test = memberships(&pool, TeamKind::Testing, &ids).await?;

    let mut cache = TokenCache::new(token::codec());
    Ok(api::ok_with(
        user_json(&user, &dev, &test, &mut cache),
        "User retrieved successfully.",
    ))
}

/// PUT /api/users/:id - update profile fields and reconcile team memberships
/// as one transaction.
pub async fn update(
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let user_id = token::codec()
        .decode(EntityKind::User, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let existing: User = sqlx::query_as("SELECT * FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(&pool)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found."))?;

    let mut v = Validator::new();
    let name = v.required("name", req.name.as_deref());
    v.max_len("name", name, 255);
    let email = v.required("email", req.email.as_deref());
    v.email("email", email);
    v.max_len("email", email, 255);
    let phone = v.required("phone", req.phone.as_deref());
    let role = v.required("role", req.role.as_deref());
    v.one_of("role", role, ROLES);
    check_unique(&pool, &mut v, email, phone, Some(existing.id)).await?;
    v.finish()?;

    let mut tx = pool.begin().await?;
    sqlx::query("UPDATE users SET name = $1, email = $2, phone = $3, role = $4, updated_at = now() WHERE id = $5")
        .bind(name.unwrap_or_default())
        .bind(email.unwrap_or_default())
        .bind(phone.unwrap_or_default())
        .bind(role.unwrap_or_default())
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

    let changes = TeamChanges {
        development: req.development_team_ids.clone(),
        testing: req.testing_team_ids.clone(),
    };
    if !changes.is_empty() {
        let mut store = PgMembershipStore::new(&mut tx);
        assignment::reconcile(&mut store, token::codec(), user_id, &changes).await?;
    }
    tx.commit().await?;

    Ok(api::ok("User updated successfully."))
}

/// DELETE /api/users/:id
pub async fn destroy(Path(id): Path<String>) -> Result<Json<Value>, ApiError> {
    let user_id = token::codec()
        .decode(EntityKind::User, &id)
        .map_err(|_| ApiError::invalid_token("id"))?;
    let pool = DatabaseManager::pool()?;

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM development_team_user WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM testing_team_user WHERE user_id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    if result.rows_affected() == 0 {
        return Err(ApiError::not_found("User not found."));
    }
    tx.commit().await?;

    Ok(api::ok("User deleted successfully."))
}

/// GET /api/users/select - flat list for assignment dropdowns
pub async fn select_list(Query(query): Query<ListQuery>) -> Result<Json<Value>, ApiError> {
    let pool = DatabaseManager::pool()?;
    let pattern = query.like_pattern();

    let users: Vec<User> = match &pattern {
        Some(p) => {
            sqlx::query_as(
                "SELECT * FROM users WHERE name ILIKE $1 OR email ILIKE $1 ORDER BY id DESC",
            )
            .bind(p)
            .fetch_all(&pool)
            .await?
        }
        None => sqlx::query_as("SELECT * FROM users ORDER BY id DESC").fetch_all(&pool).await?,
    };

    let codec = token::codec();
    let data: Vec<Value> = users
        .iter()
        .map(|u| {
            json!({
                "id": codec.encode(EntityKind::User, u.id),
                "name": u.name,
                "role": u.role,
            })
        })
        .collect();

    Ok(api::ok_with(json!(data), "Users retrieved successfully."))
}

#[derive(Debug, FromRow)]
struct MembershipRow {
    user_id: i64,
    team_id: i64,
    team_name: String,
}

async fn memberships(
    pool: &PgPool,
    kind: TeamKind,
    user_ids: &[i64],
) -> Result<Vec<MembershipRow>, ApiError> {
    if user_ids.is_empty() {
        return Ok(vec![]);
    }
    let sql = match kind {
        TeamKind::Development => {
            "SELECT p.user_id, t.team_id, t.team_name
             FROM development_team_user p
             JOIN development_teams t ON t.team_id = p.team_id
             WHERE p.user_id = ANY($1)
             ORDER BY t.team_id"
        }
        TeamKind::Testing => {
            "SELECT p.user_id, t.testing_team_id AS team_id, t.team_name
             FROM testing_team_user p
             JOIN testing_teams t ON t.testing_team_id = p.testing_team_id
             WHERE p.user_id = ANY($1)
             ORDER BY t.testing_team_id"
        }
    };
    let rows = sqlx::query_as::<_, MembershipRow>(sql)
        .bind(user_ids)
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

fn user_json(
    user: &User,
    dev: &[MembershipRow],
    test: &[MembershipRow],
    cache: &mut TokenCache<'_>,
) -> Value {
    let development_teams: Vec<Value> = dev
        .iter()
        .filter(|m| m.user_id == user.id)
        .map(|m| {
            json!({
                "team_id": cache.encode(EntityKind::DevelopmentTeam, m.team_id),
                "team_name": m.team_name,
            })
        })
        .collect();

    let testing_teams: Vec<Value> = test
        .iter()
        .filter(|m| m.user_id == user.id)
        .map(|m| {
            json!({
                "testing_team_id": cache.encode(EntityKind::TestingTeam, m.team_id),
                "team_name": m.team_name,
            })
        })
        .collect();

    json!({
        "id": cache.encode(EntityKind::User, user.id),
        "name": user.name,
        "email": user.email,
        "phone": user.phone,
        "role": user.role,
        "development_teams": development_teams,
        "testing_teams": testing_teams,
    })
}

async fn check_unique(
    pool: &PgPool,
    v: &mut Validator,
    email: Option<&str>,
    phone: Option<&str>,
    except_id: Option<i64>,
) -> Result<(), ApiError> {
    if let Some(email) = email {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE email = $1 AND id <> COALESCE($2, -1))",
        )
        .bind(email)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if taken {
            v.taken("email");
        }
    }
    if let Some(phone) = phone {
        let taken: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM users WHERE phone = $1 AND id <> COALESCE($2, -1))",
        )
        .bind(phone)
        .bind(except_id)
        .fetch_one(pool)
        .await?;
        if taken {
            v.taken("phone");
        }
    }
    Ok(())
}

fn random_password() -> String {
    let len = crate::config::config().security.temp_password_length;
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}
