// src/routes/departments.rs

use axum::{extract::State, Json};
use serde::Serialize;

use super::DEPARTMENT_COLUMNS;
use crate::domain::category::CategoryKind;
use crate::error::AppResult;
use crate::models::DepartmentConfig;
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Serialize)]
pub struct DepartmentResp {
    #[serde(flatten)]
    pub department: DepartmentConfig,
    pub kind: Option<CategoryKind>,
}

pub async fn list_departments(
    State(state): State<AppState>,
    _user: CurrentUser,
) -> AppResult<Json<Vec<DepartmentResp>>> {
    let rows = sqlx::query_as::<_, DepartmentConfig>(&format!(
        "SELECT {DEPARTMENT_COLUMNS} FROM public.department_configs ORDER BY name"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        rows.into_iter()
            .map(|department| DepartmentResp { kind: CategoryKind::from_department_name(&department.name), department })
            .collect(),
    ))
}
