// src/routes/notes.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use tracing::info;

use super::{ensure_case, task_belongs_to_case};
use crate::domain::access::Capability;
use crate::domain::validation::FieldErrors;
use crate::error::AppResult;
use crate::models::CaseActivityLog;
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct NoteBody {
    pub note: String,
    #[serde(default)]
    pub task_id: Option<i64>,
}

pub async fn add_note(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(case_id): Path<i64>,
    Json(body): Json<NoteBody>,
) -> AppResult<(StatusCode, Json<CaseActivityLog>)> {
    user.require(Capability::NoteAdd)?;

    let mut conn = state.pool.acquire().await?;
    ensure_case(&mut conn, case_id).await?;

    let mut errors = FieldErrors::new();
    if body.note.trim().is_empty() {
        errors.add("note", "This field is required.");
    }
    if let Some(task_id) = body.task_id {
        if !task_belongs_to_case(&mut conn, task_id, case_id).await? {
            errors.add("task_id", "Task does not belong to this case.");
        }
    }
    errors.into_result()?;

    let log = sqlx::query_as::<_, CaseActivityLog>(
        r#"INSERT INTO public.case_activity_logs (case_id, task_id, user_id, note)
           VALUES ($1,$2,$3,$4)
           RETURNING activity_log_id, case_id, task_id, user_id, note, created_at"#,
    )
    .bind(case_id)
    .bind(body.task_id)
    .bind(user.user_id())
    .bind(body.note.trim())
    .fetch_one(&mut *conn)
    .await?;

    info!(case_id, activity_log_id = log.activity_log_id, user_id = user.user_id(), "note added");
    Ok((StatusCode::CREATED, Json(log)))
}
