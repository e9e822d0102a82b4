// src/routes/settings.rs

use std::collections::BTreeMap;

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use sqlx::types::Json as SqlJson;
use tracing::info;

use super::DEPARTMENT_COLUMNS;
use crate::domain::access::Capability;
use crate::domain::validation::FieldErrors;
use crate::error::AppResult;
use crate::models::{DepartmentConfig, Group, RoleSetting};
use crate::session::CurrentUser;
use crate::AppState;

const ROLE_COLUMNS: &str = "role_setting_id, role_name, can_case_create, can_case_edit, can_task_create, \
    can_task_edit, can_note_add, can_manage_settings";

#[derive(Serialize)]
pub struct SettingsResp {
    pub roles: Vec<RoleSetting>,
    pub departments: Vec<DepartmentConfig>,
    pub groups: Vec<Group>,
}

pub async fn get_settings(State(state): State<AppState>, user: CurrentUser) -> AppResult<Json<SettingsResp>> {
    user.require(Capability::ManageSettings)?;

    let roles = sqlx::query_as::<_, RoleSetting>(&format!("SELECT {ROLE_COLUMNS} FROM public.role_settings ORDER BY role_name"))
        .fetch_all(&state.pool)
        .await?;
    let departments = sqlx::query_as::<_, DepartmentConfig>(&format!(
        "SELECT {DEPARTMENT_COLUMNS} FROM public.department_configs ORDER BY name"
    ))
    .fetch_all(&state.pool)
    .await?;
    let groups = sqlx::query_as::<_, Group>("SELECT group_id, name FROM public.groups ORDER BY name")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(SettingsResp { roles, departments, groups }))
}

/// Creates or overwrites a role's flags and makes sure a group of the same name exists.
pub async fn save_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<RoleSetting>,
) -> AppResult<Json<RoleSetting>> {
    user.require(Capability::ManageSettings)?;
    let name = body.role_name.trim();
    if name.is_empty() {
        return Err(FieldErrors::single("role_name", "This field is required.").into());
    }

    let mut tx = state.pool.begin().await?;
    let role = sqlx::query_as::<_, RoleSetting>(&format!(
        r#"INSERT INTO public.role_settings
             (role_name, can_case_create, can_case_edit, can_task_create, can_task_edit, can_note_add, can_manage_settings)
           VALUES ($1,$2,$3,$4,$5,$6,$7)
           ON CONFLICT (role_name) DO UPDATE SET
             can_case_create = EXCLUDED.can_case_create,
             can_case_edit = EXCLUDED.can_case_edit,
             can_task_create = EXCLUDED.can_task_create,
             can_task_edit = EXCLUDED.can_task_edit,
             can_note_add = EXCLUDED.can_note_add,
             can_manage_settings = EXCLUDED.can_manage_settings
           RETURNING {ROLE_COLUMNS}"#
    ))
    .bind(name)
    .bind(body.can_case_create)
    .bind(body.can_case_edit)
    .bind(body.can_task_create)
    .bind(body.can_task_edit)
    .bind(body.can_note_add)
    .bind(body.can_manage_settings)
    .fetch_one(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO public.groups (name) VALUES ($1) ON CONFLICT (name) DO NOTHING")
        .bind(name)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(role = %role.role_name, user_id = user.user_id(), "role setting saved");
    Ok(Json(role))
}

#[derive(Deserialize)]
pub struct DepartmentBody {
    pub name: String,
    #[serde(default = "default_follow_up_days")]
    pub auto_follow_up_days: i32,
    #[serde(default)]
    pub predefined_actions: Vec<String>,
    #[serde(default)]
    pub metadata_template: BTreeMap<String, String>,
}
fn default_follow_up_days() -> i32 { 30 }

pub async fn create_department(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<DepartmentBody>,
) -> AppResult<(StatusCode, Json<DepartmentConfig>)> {
    user.require(Capability::ManageSettings)?;

    let mut errors = FieldErrors::new();
    let name = body.name.trim();
    if name.is_empty() {
        errors.add("name", "This field is required.");
    }
    if body.auto_follow_up_days < 0 {
        errors.add("auto_follow_up_days", "Ensure this value is greater than or equal to 0.");
    }
    errors.into_result()?;

    let actions: Vec<String> =
        body.predefined_actions.iter().map(|a| a.trim().to_string()).filter(|a| !a.is_empty()).collect();

    let created = sqlx::query_as::<_, DepartmentConfig>(&format!(
        r#"INSERT INTO public.department_configs (name, auto_follow_up_days, predefined_actions, metadata_template)
           VALUES ($1,$2,$3,$4)
           ON CONFLICT (name) DO NOTHING
           RETURNING {DEPARTMENT_COLUMNS}"#
    ))
    .bind(name)
    .bind(body.auto_follow_up_days)
    .bind(SqlJson(&actions))
    .bind(SqlJson(&body.metadata_template))
    .fetch_optional(&state.pool)
    .await?;

    let Some(dept) = created else {
        return Err(FieldErrors::single("name", "Department config with this name already exists.").into());
    };
    info!(department_id = dept.department_id, user_id = user.user_id(), "department created");
    Ok((StatusCode::CREATED, Json(dept)))
}

#[derive(Deserialize)]
pub struct UserRoleBody {
    pub user_id: i64,
    pub role_name: String,
}

#[derive(Serialize)]
pub struct UserRoleResp {
    pub user_id: i64,
    pub group: Group,
}

/// Replaces every group membership of the user with the single named role group.
pub async fn assign_user_role(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<UserRoleBody>,
) -> AppResult<Json<UserRoleResp>> {
    user.require(Capability::ManageSettings)?;

    let mut tx = state.pool.begin().await?;
    let target: Option<i64> = sqlx::query_scalar("SELECT user_id FROM public.users WHERE user_id = $1")
        .bind(body.user_id)
        .fetch_optional(&mut *tx)
        .await?;
    let group = sqlx::query_as::<_, Group>("SELECT group_id, name FROM public.groups WHERE name = $1")
        .bind(body.role_name.trim())
        .fetch_optional(&mut *tx)
        .await?;

    let group = match (target, group) {
        (Some(_), Some(group)) => group,
        (target, group) => {
            let mut errors = FieldErrors::new();
            if target.is_none() {
                errors.add("user_id", "Select a valid user.");
            }
            if group.is_none() {
                errors.add("role_name", "Select a valid role.");
            }
            return Err(errors.into());
        }
    };

    sqlx::query("DELETE FROM public.user_groups WHERE user_id = $1")
        .bind(body.user_id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO public.user_groups (user_id, group_id) VALUES ($1,$2)")
        .bind(body.user_id)
        .bind(group.group_id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    info!(target_user_id = body.user_id, role = %group.name, user_id = user.user_id(), "user role assigned");
    Ok(Json(UserRoleResp { user_id: body.user_id, group }))
}
