// src/routes/auth.rs

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{AppError, AppResult};
use crate::models::User;
use crate::session::{expired_session_cookie, hash_token, new_token, session_cookie, session_token, verify_password};
use crate::AppState;

#[derive(Deserialize)]
pub struct LoginBody {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct LoginResp {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
}

pub async fn login(State(state): State<AppState>, Json(body): Json<LoginBody>) -> AppResult<impl IntoResponse> {
    let user = sqlx::query_as::<_, User>(
        r#"SELECT user_id, username, full_name, password_hash, is_superuser, is_active, created_at
           FROM public.users WHERE username = $1"#,
    )
    .bind(body.username.trim())
    .fetch_optional(&state.pool)
    .await?;

    let user = match user {
        Some(u) if u.is_active && verify_password(&u.password_hash, &body.password) => u,
        _ => {
            warn!(username = %body.username, "login rejected");
            return Err(AppError::InvalidCredentials);
        }
    };

    let token = new_token();
    let ttl = state.config.session_ttl_seconds;
    sqlx::query("INSERT INTO public.sessions (token_hash, user_id, expires_at) VALUES ($1,$2,$3)")
        .bind(hash_token(&token))
        .bind(user.user_id)
        .bind(Utc::now() + Duration::seconds(ttl))
        .execute(&state.pool)
        .await?;

    info!(user_id = user.user_id, "session opened");
    let resp = LoginResp { user_id: user.user_id, username: user.username, full_name: user.full_name };
    Ok(([(header::SET_COOKIE, session_cookie(&token, ttl))], Json(resp)))
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<impl IntoResponse> {
    if let Some(token) = session_token(&headers) {
        let closed = sqlx::query("DELETE FROM public.sessions WHERE token_hash = $1")
            .bind(hash_token(&token))
            .execute(&state.pool)
            .await?;
        info!(sessions = closed.rows_affected(), "session closed");
    }
    Ok((StatusCode::NO_CONTENT, [(header::SET_COOKIE, expired_session_cookie())]))
}
