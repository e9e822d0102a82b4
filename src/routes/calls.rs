// src/routes/calls.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::cases::CALL_COLUMNS;
use super::{ensure_case, log_activity, task_belongs_to_case};
use crate::domain::access::Capability;
use crate::domain::calls::{summarize_calls, CallSummary};
use crate::domain::validation::FieldErrors;
use crate::error::AppResult;
use crate::models::{CallLog, CallOutcome};
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct CallBody {
    pub outcome: CallOutcome,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub task_id: Option<i64>,
}

#[derive(Serialize)]
pub struct LoggedCall {
    pub call: CallLog,
    pub summary: CallSummary,
}

pub async fn log_call(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(case_id): Path<i64>,
    Json(body): Json<CallBody>,
) -> AppResult<(StatusCode, Json<LoggedCall>)> {
    user.require(Capability::NoteAdd)?;

    let mut tx = state.pool.begin().await?;
    ensure_case(&mut tx, case_id).await?;
    if let Some(task_id) = body.task_id {
        if !task_belongs_to_case(&mut tx, task_id, case_id).await? {
            return Err(FieldErrors::single("task_id", "Task does not belong to this case.").into());
        }
    }

    let call = sqlx::query_as::<_, CallLog>(&format!(
        r#"INSERT INTO public.call_logs (case_id, task_id, outcome, notes, staff_user_id)
           VALUES ($1,$2,$3,$4,$5)
           RETURNING {CALL_COLUMNS}"#
    ))
    .bind(case_id)
    .bind(body.task_id)
    .bind(body.outcome)
    .bind(body.notes.trim())
    .bind(user.user_id())
    .fetch_one(&mut *tx)
    .await?;

    let note = format!("Call outcome logged: {}", body.outcome.label());
    log_activity(&mut tx, case_id, body.task_id, user.user_id(), &note).await?;

    let history = sqlx::query_as::<_, CallLog>(&format!(
        "SELECT {CALL_COLUMNS} FROM public.call_logs WHERE case_id = $1 ORDER BY created_at DESC, call_log_id DESC"
    ))
    .bind(case_id)
    .fetch_all(&mut *tx)
    .await?;
    tx.commit().await?;

    info!(case_id, call_log_id = call.call_log_id, user_id = user.user_id(), outcome = %body.outcome, "call logged");
    Ok((StatusCode::CREATED, Json(LoggedCall { call, summary: summarize_calls(&history) })))
}
