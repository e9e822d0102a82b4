// src/routes/mod.rs

use chrono::{Local, NaiveDate};
use sqlx::PgConnection;

use crate::domain::category::CategoryKind;
use crate::error::AppResult;
use crate::models::DepartmentConfig;

pub mod auth;
pub mod calls;
pub mod cases;
pub mod dashboard;
pub mod departments;
pub mod health;
pub mod notes;
pub mod search;
pub mod settings;
pub mod tasks;

#[cfg(test)]
pub(crate) mod test_support;

/// Clinic-local calendar date.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) const DEPARTMENT_COLUMNS: &str =
    "department_id, name, auto_follow_up_days, predefined_actions, metadata_template";

pub(crate) async fn find_department(
    conn: &mut PgConnection,
    department_id: i64,
) -> AppResult<Option<(DepartmentConfig, Option<CategoryKind>)>> {
    let dept = sqlx::query_as::<_, DepartmentConfig>(&format!(
        "SELECT {DEPARTMENT_COLUMNS} FROM public.department_configs WHERE department_id = $1"
    ))
    .bind(department_id)
    .fetch_optional(conn)
    .await?;
    Ok(dept.map(|d| {
        let kind = CategoryKind::from_department_name(&d.name);
        (d, kind)
    }))
}

/// Appends one audit entry; callers pass the transaction of the write it describes.
pub(crate) async fn log_activity(
    conn: &mut PgConnection,
    case_id: i64,
    task_id: Option<i64>,
    user_id: i64,
    note: &str,
) -> sqlx::Result<()> {
    sqlx::query(
        r#"INSERT INTO public.case_activity_logs (case_id, task_id, user_id, note)
           VALUES ($1,$2,$3,$4)"#,
    )
    .bind(case_id)
    .bind(task_id)
    .bind(user_id)
    .bind(note)
    .execute(conn)
    .await?;
    Ok(())
}

/// 404 unless the case exists.
pub(crate) async fn ensure_case(conn: &mut PgConnection, case_id: i64) -> AppResult<()> {
    let found: Option<i64> = sqlx::query_scalar("SELECT case_id FROM public.cases WHERE case_id = $1")
        .bind(case_id)
        .fetch_optional(conn)
        .await?;
    found.map(|_| ()).ok_or(crate::error::AppError::NotFound("case"))
}

/// A referenced task must belong to the same case.
pub(crate) async fn task_belongs_to_case(conn: &mut PgConnection, task_id: i64, case_id: i64) -> AppResult<bool> {
    let found: Option<i64> =
        sqlx::query_scalar("SELECT task_id FROM public.tasks WHERE task_id = $1 AND case_id = $2")
            .bind(task_id)
            .bind(case_id)
            .fetch_optional(conn)
            .await?;
    Ok(found.is_some())
}
