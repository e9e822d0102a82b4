// src/session.rs
//
// Cookie sessions. The browser holds a random token; the database holds only its SHA-256.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use sha2::{Digest, Sha256};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use uuid::Uuid;

use crate::domain::access::{Capability, CapabilityFlags, Principal};
use crate::error::{AppError, AppResult};
use crate::models::RoleSetting;
use crate::AppState;

pub const SESSION_COOKIE: &str = "session";

fn sha256_hex(input: &[u8]) -> String {
    Sha256::digest(input).iter().map(|b| format!("{b:02x}")).collect()
}

pub fn new_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn hash_token(token: &str) -> String {
    sha256_hex(token.as_bytes())
}

/// Stored form is `salt$hex(sha256(salt || password))`.
pub fn hash_password(salt: &str, password: &str) -> String {
    format!("{salt}${}", sha256_hex(format!("{salt}{password}").as_bytes()))
}

pub fn verify_password(stored: &str, password: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, _)) => constant_time_eq(hash_password(salt, password).as_bytes(), stored.as_bytes()),
        None => false,
    }
}

/// Byte comparison whose timing does not depend on where the inputs differ.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Value of the session cookie, if the request carries one.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| raw.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

pub fn session_cookie(token: &str, max_age_seconds: i64) -> String {
    format!("{SESSION_COOKIE}={token}; HttpOnly; SameSite=Lax; Path=/; Max-Age={max_age_seconds}")
}

pub fn expired_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Lax; Path=/; Max-Age=0")
}

#[derive(FromRow)]
struct SessionRow {
    user_id: i64,
    username: String,
    is_superuser: bool,
    groups: Vec<String>,
}

/// The signed-in user plus the role settings of their groups, loaded once per request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub principal: Principal,
    pub roles: Vec<RoleSetting>,
}

impl CurrentUser {
    pub fn user_id(&self) -> i64 {
        self.principal.user_id
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.principal.has_capability(&self.roles, capability)
    }

    pub fn require(&self, capability: Capability) -> AppResult<()> {
        if self.can(capability) {
            return Ok(());
        }
        warn!(user_id = self.user_id(), capability = capability.as_str(), "capability denied");
        Err(AppError::Forbidden(format!("{} permission required", capability.as_str())))
    }

    pub fn flags(&self) -> CapabilityFlags {
        CapabilityFlags::resolve(&self.principal, &self.roles)
    }

    pub async fn load(pool: &PgPool, token: &str) -> AppResult<Option<Self>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"SELECT u.user_id, u.username, u.is_superuser,
                      COALESCE(array_agg(g.name) FILTER (WHERE g.name IS NOT NULL), '{}') AS groups
               FROM public.sessions s
               JOIN public.users u ON u.user_id = s.user_id
               LEFT JOIN public.user_groups ug ON ug.user_id = u.user_id
               LEFT JOIN public.groups g ON g.group_id = ug.group_id
               WHERE s.token_hash = $1 AND s.expires_at > now() AND u.is_active
               GROUP BY u.user_id, u.username, u.is_superuser"#,
        )
        .bind(hash_token(token))
        .fetch_optional(pool)
        .await?;

        let Some(row) = row else { return Ok(None) };

        let roles = sqlx::query_as::<_, RoleSetting>(
            r#"SELECT role_setting_id, role_name, can_case_create, can_case_edit, can_task_create,
                      can_task_edit, can_note_add, can_manage_settings
               FROM public.role_settings WHERE role_name = ANY($1)"#,
        )
        .bind(&row.groups)
        .fetch_all(pool)
        .await?;

        Ok(Some(Self {
            principal: Principal {
                user_id: row.user_id,
                username: row.username,
                is_superuser: row.is_superuser,
                groups: row.groups.into_iter().collect(),
            },
            roles,
        }))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers).ok_or(AppError::Unauthenticated)?;
        CurrentUser::load(&state.pool, &token).await?.ok_or(AppError::Unauthenticated)
    }
}
