// Response envelope shared by every endpoint:
// `{ result, data?, message, pagination? }` on success, `{ result: false, … }`
// via ApiError on failure.
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config;

pub fn ok(message: &str) -> Json<Value> {
    Json(json!({ "result": true, "message": message }))
}

pub fn ok_with(data: Value, message: &str) -> Json<Value> {
    Json(json!({ "result": true, "data": data, "message": message }))
}

pub fn ok_paginated(data: Value, pagination: Pagination, message: &str) -> Json<Value> {
    Json(json!({
        "result": true,
        "data": data,
        "pagination": pagination,
        "message": message,
    }))
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub current_page: i64,
    pub last_page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl Pagination {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        let last_page = if total == 0 {
            1
        } else {
            (total + per_page - 1) / per_page
        };
        Self { current_page: page, last_page, per_page, total }
    }
}

/// Common listing query: `?search=&page=&per_page=`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

impl ListQuery {
    pub fn page(&self) -> i64 {
        self.page.filter(|p| *p >= 1).unwrap_or(1)
    }

    pub fn per_page(&self) -> i64 {
        let cfg = &config::config().api;
        self.per_page
            .filter(|p| *p >= 1)
            .unwrap_or(cfg.default_per_page)
            .min(cfg.max_per_page)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1) * self.per_page()
    }

    /// `%term%` pattern for ILIKE, or None when no search was requested.
    pub fn like_pattern(&self) -> Option<String> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s))
    }
}
