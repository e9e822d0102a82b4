// src/main.rs

use axum::{
    routing::{get, patch, post},
    Router,
};
use sqlx::PgPool;
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod config;
mod db;
mod domain;
mod error;
mod models;
mod routes;
mod session;

use config::{Config, DEFAULT_LOG_FILTER};

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
}

pub fn build_router(state: AppState) -> Router {
    // Very permissive CORS for local dev (tighten for prod)
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // health
        .route("/health", get(routes::health::health))
        // sessions
        .route("/login", post(routes::auth::login))
        .route("/logout", post(routes::auth::logout))
        // dashboard
        .route("/api/v1/dashboard", get(routes::dashboard::get_dashboard))
        .route("/api/v1/departments", get(routes::departments::list_departments))
        // cases
        .route(
            "/api/v1/cases",
            get(routes::cases::list_cases).post(routes::cases::create_case),
        )
        .route("/api/v1/cases/autocomplete", get(routes::search::autocomplete))
        .route("/api/v1/cases/search", get(routes::search::universal_search))
        .route(
            "/api/v1/cases/:id",
            get(routes::cases::get_case).patch(routes::cases::patch_case),
        )
        // tasks, notes, calls
        .route("/api/v1/cases/:id/tasks", post(routes::tasks::create_task))
        .route("/api/v1/tasks/:id", patch(routes::tasks::patch_task))
        .route("/api/v1/cases/:id/notes", post(routes::notes::add_note))
        .route("/api/v1/cases/:id/calls", post(routes::calls::log_call))
        // settings
        .route("/api/v1/settings", get(routes::settings::get_settings))
        .route("/api/v1/settings/roles", post(routes::settings::save_role))
        .route("/api/v1/settings/departments", post(routes::settings::create_department))
        .route("/api/v1/settings/user-roles", post(routes::settings::assign_user_role))
        // state & middleware
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment from .env if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let config = Config::from_env()?;
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;
    db::seed_defaults(&pool).await?;

    let addr = format!("0.0.0.0:{}", config.port);
    let app = build_router(AppState { pool, config });

    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "API listening");

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}
