use axum::middleware;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use cpms_api::database::manager::DatabaseManager;
use cpms_api::handlers::{auth, clients, dashboard, project_managers, projects, teams, tools, users};
use cpms_api::middleware::{jwt_auth_middleware, require_admin, require_password_current};

#[tokio::main]
async fn main() {
    // Load .env if present so cargo run picks up DATABASE_URL, CPMS_TOKEN_KEY, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt::init();

    let config = cpms_api::config::config();
    tracing::info!("Starting CPMS API in {:?} mode", config.environment);

    let app = app();

    // Allow tests or deployments to override port via env
    let port = std::env::var("CPMS_API_PORT")
        .ok()
        .or_else(|| std::env::var("PORT").ok())
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(3000);

    let bind_addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .unwrap_or_else(|e| panic!("failed to bind {}: {}", bind_addr, e));

    tracing::info!("CPMS API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.expect("server");
}

fn app() -> Router {
    // Back-office management is admin-only; project browsing and progress
    // tracking are open to every authenticated role.
    let admin = Router::new()
        .merge(users::routes())
        .merge(teams::routes())
        .merge(project_managers::routes())
        .merge(clients::routes())
        .merge(tools::routes())
        .merge(dashboard::routes())
        .layer(middleware::from_fn(require_admin));

    let session = Router::new()
        .merge(projects::routes())
        .merge(auth::session_routes())
        .merge(admin)
        .layer(middleware::from_fn(require_password_current))
        .layer(middleware::from_fn(jwt_auth_middleware));

    Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .merge(auth::public_routes())
        .merge(session)
        // Global middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Json<Value> {
    Json(json!({
        "name": "cpms-api",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health() -> (axum::http::StatusCode, Json<Value>) {
    match DatabaseManager::health_check().await {
        Ok(()) => (
            axum::http::StatusCode::OK,
            Json(json!({ "status": "ok", "database": "up" })),
        ),
        Err(e) => {
            tracing::warn!("health check failed: {}", e);
            (
                axum::http::StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "degraded", "database": "down" })),
            )
        }
    }
}
