// src/routes/tasks.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use sqlx::{FromRow, PgConnection};
use tracing::info;

use super::cases::TASK_COLUMNS;
use super::{log_activity, today};
use crate::domain::access::Capability;
use crate::domain::category::CategoryKind;
use crate::domain::validation::{completion_timestamp, validate_task};
use crate::error::{AppError, AppResult};
use crate::models::{CreateTaskBody, PatchTaskBody, Task};
use crate::session::CurrentUser;
use crate::AppState;

async fn case_category(conn: &mut PgConnection, case_id: i64) -> AppResult<Option<CategoryKind>> {
    let name: Option<String> = sqlx::query_scalar(
        r#"SELECT d.name FROM public.cases c
           JOIN public.department_configs d ON d.department_id = c.category_id
           WHERE c.case_id = $1"#,
    )
    .bind(case_id)
    .fetch_optional(conn)
    .await?;
    let name = name.ok_or(AppError::NotFound("case"))?;
    Ok(CategoryKind::from_department_name(&name))
}

pub async fn create_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(case_id): Path<i64>,
    Json(body): Json<CreateTaskBody>,
) -> AppResult<(StatusCode, Json<Task>)> {
    user.require(Capability::TaskCreate)?;

    let mut tx = state.pool.begin().await?;
    let kind = case_category(&mut tx, case_id).await?;
    validate_task(&body.title, body.due_date, body.status, kind, today()).into_result()?;

    let task = sqlx::query_as::<_, Task>(&format!(
        r#"INSERT INTO public.tasks
             (case_id, title, due_date, status, assigned_user_id, task_type, frequency_label, notes,
              completed_at, created_by)
           VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
           RETURNING {TASK_COLUMNS}"#
    ))
    .bind(case_id)
    .bind(body.title.trim())
    .bind(body.due_date)
    .bind(body.status)
    .bind(body.assigned_user_id)
    .bind(body.task_type)
    .bind(&body.frequency_label)
    .bind(&body.notes)
    .bind(completion_timestamp(body.status, None, Utc::now()))
    .bind(user.user_id())
    .fetch_one(&mut *tx)
    .await?;

    log_activity(&mut tx, case_id, Some(task.task_id), user.user_id(), &format!("Task created: {}", task.title)).await?;
    tx.commit().await?;

    info!(case_id, task_id = task.task_id, user_id = user.user_id(), "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(FromRow)]
struct TaskWithCategory {
    #[sqlx(flatten)]
    task: Task,
    category_name: String,
}

pub async fn patch_task(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(body): Json<PatchTaskBody>,
) -> AppResult<Json<Task>> {
    user.require(Capability::TaskEdit)?;

    let mut tx = state.pool.begin().await?;
    let existing = sqlx::query_as::<_, TaskWithCategory>(
        r#"SELECT t.task_id, t.case_id, t.title, t.due_date, t.status, t.assigned_user_id, t.task_type,
                  t.frequency_label, t.notes, t.completed_at, t.created_by, t.created_at, t.updated_at,
                  d.name AS category_name
           FROM public.tasks t
           JOIN public.cases c ON c.case_id = t.case_id
           JOIN public.department_configs d ON d.department_id = c.category_id
           WHERE t.task_id = $1
           FOR UPDATE OF t"#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("task"))?;

    let kind = CategoryKind::from_department_name(&existing.category_name);
    let mut task = existing.task;
    if let Some(title) = body.title {
        task.title = title.trim().to_string();
    }
    if let Some(due_date) = body.due_date {
        task.due_date = due_date;
    }
    if let Some(status) = body.status {
        task.status = status;
    }
    if let Some(assigned) = body.assigned_user_id {
        task.assigned_user_id = assigned;
    }
    if let Some(task_type) = body.task_type {
        task.task_type = task_type;
    }
    if let Some(label) = body.frequency_label {
        task.frequency_label = label;
    }
    if let Some(notes) = body.notes {
        task.notes = notes;
    }

    validate_task(&task.title, task.due_date, task.status, kind, today()).into_result()?;

    let updated = sqlx::query_as::<_, Task>(&format!(
        r#"UPDATE public.tasks SET
             title = $2, due_date = $3, status = $4, assigned_user_id = $5, task_type = $6,
             frequency_label = $7, notes = $8, completed_at = $9, updated_at = now()
           WHERE task_id = $1
           RETURNING {TASK_COLUMNS}"#
    ))
    .bind(id)
    .bind(&task.title)
    .bind(task.due_date)
    .bind(task.status)
    .bind(task.assigned_user_id)
    .bind(task.task_type)
    .bind(&task.frequency_label)
    .bind(&task.notes)
    .bind(completion_timestamp(task.status, task.completed_at, Utc::now()))
    .fetch_one(&mut *tx)
    .await?;

    let note = format!("Task updated: {} ({})", updated.title, updated.status);
    log_activity(&mut tx, updated.case_id, Some(id), user.user_id(), &note).await?;
    tx.commit().await?;

    info!(case_id = updated.case_id, task_id = id, user_id = user.user_id(), status = %updated.status, "task updated");
    Ok(Json(updated))
}
