// src/routes/cases.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgArguments, query::QueryAs, FromRow, PgConnection, Postgres, QueryBuilder};
use tracing::{info, warn};

use super::{find_department, log_activity, today};
use crate::domain::access::{Capability, CapabilityFlags};
use crate::domain::calls::{summarize_calls, CallSummary};
use crate::domain::category::CategoryKind;
use crate::domain::schedule::generate_tasks;
use crate::domain::search::like_contains;
use crate::domain::validation::{
    check_status_transition, default_review_date, derive_age, grey_list_cutoff, validate_case, FieldErrors,
    DUPLICATE_ACTIVE_UHID,
};
use crate::error::{AppError, AppResult};
use crate::models::{CallLog, Case, CaseActivityLog, CaseFields, CasePatch, CaseStatus, DepartmentConfig, Task};
use crate::session::CurrentUser;
use crate::AppState;

pub const PAGE_SIZE: i64 = 25;
const RECENT_ACTIVITY: i64 = 50;

pub(crate) const CASE_COLUMNS: &str = "case_id, uhid, first_name, last_name, gender, date_of_birth, age, place, \
    phone_number, alternate_phone_number, category_id, status, diagnosis, ncd_flags, referred_by, high_risk, \
    lmp, edd, usg_edd, surgical_pathway, surgery_done, review_frequency, review_date, surgery_date, \
    gravida, para, abortions, living, metadata, notes, patient_name, created_by, created_at, updated_at";

pub(crate) const TASK_COLUMNS: &str = "task_id, case_id, title, due_date, status, assigned_user_id, task_type, \
    frequency_label, notes, completed_at, created_by, created_at, updated_at";

pub(crate) const CALL_COLUMNS: &str = "call_log_id, case_id, task_id, outcome, notes, staff_user_id, created_at";

// ───────────────────────────────────────
// List
// ───────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ListCasesQ {
    pub q: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub assigned_user: Option<String>,
    pub due_start: Option<String>,
    pub due_end: Option<String>,
    pub page: Option<String>,
}

/// Parsed list filters. Values that do not parse are dropped rather than rejected.
#[derive(Debug, Default, PartialEq)]
pub struct CaseFilters {
    pub q: Option<String>,
    pub status: Option<CaseStatus>,
    pub category_id: Option<i64>,
    pub assigned_user_id: Option<i64>,
    pub due_start: Option<NaiveDate>,
    pub due_end: Option<NaiveDate>,
    pub page: i64,
}

fn non_empty(raw: &Option<String>) -> Option<&str> {
    raw.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

impl CaseFilters {
    pub fn from_query(q: &ListCasesQ) -> Self {
        Self {
            q: non_empty(&q.q).map(str::to_string),
            status: non_empty(&q.status).and_then(|s| s.parse().ok()),
            category_id: non_empty(&q.category).and_then(|s| s.parse().ok()),
            assigned_user_id: non_empty(&q.assigned_user).and_then(|s| s.parse().ok()),
            due_start: non_empty(&q.due_start).and_then(|s| s.parse().ok()),
            due_end: non_empty(&q.due_end).and_then(|s| s.parse().ok()),
            page: non_empty(&q.page).and_then(|s| s.parse().ok()).filter(|p: &i64| *p >= 1).unwrap_or(1),
        }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'_, Postgres>) {
        qb.push(" WHERE TRUE");
        if let Some(q) = &self.q {
            let pattern = like_contains(q);
            qb.push(" AND (");
            for (i, column) in ["c.uhid", "c.phone_number", "c.first_name", "c.last_name", "c.patient_name", "c.place"]
                .iter()
                .enumerate()
            {
                if i > 0 {
                    qb.push(" OR ");
                }
                qb.push(*column).push(" ILIKE ").push_bind(pattern.clone());
            }
            qb.push(")");
        }
        if let Some(status) = self.status {
            qb.push(" AND c.status = ").push_bind(status);
        }
        if let Some(category_id) = self.category_id {
            qb.push(" AND c.category_id = ").push_bind(category_id);
        }
        if let Some(user_id) = self.assigned_user_id {
            qb.push(" AND EXISTS (SELECT 1 FROM public.tasks t WHERE t.case_id = c.case_id AND t.assigned_user_id = ")
                .push_bind(user_id)
                .push(")");
        }
        if let Some(start) = self.due_start {
            qb.push(" AND EXISTS (SELECT 1 FROM public.tasks t WHERE t.case_id = c.case_id AND t.due_date >= ")
                .push_bind(start)
                .push(")");
        }
        if let Some(end) = self.due_end {
            qb.push(" AND EXISTS (SELECT 1 FROM public.tasks t WHERE t.case_id = c.case_id AND t.due_date <= ")
                .push_bind(end)
                .push(")");
        }
    }
}

#[derive(Debug, Serialize, FromRow)]
pub struct CaseListRow {
    pub case_id: i64,
    pub uhid: String,
    pub patient_name: String,
    pub phone_number: String,
    pub place: String,
    pub status: CaseStatus,
    pub category_id: i64,
    pub category_name: String,
    pub diagnosis: String,
    pub high_risk: bool,
    pub updated_at: DateTime<Utc>,
    pub task_count: i64,
}

#[derive(Serialize)]
pub struct CasePage {
    pub results: Vec<CaseListRow>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
    pub page_count: i64,
}

pub async fn list_cases(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<ListCasesQ>,
) -> AppResult<Json<CasePage>> {
    let filters = CaseFilters::from_query(&q);

    let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM public.cases c");
    filters.push_where(&mut count_qb);
    let total: i64 = count_qb.build_query_scalar().fetch_one(&state.pool).await?;

    let mut qb = QueryBuilder::<Postgres>::new(
        r#"SELECT c.case_id, c.uhid, c.patient_name, c.phone_number, c.place, c.status, c.category_id,
                  d.name AS category_name, c.diagnosis, c.high_risk, c.updated_at,
                  (SELECT COUNT(*) FROM public.tasks t WHERE t.case_id = c.case_id) AS task_count
           FROM public.cases c
           JOIN public.department_configs d ON d.department_id = c.category_id"#,
    );
    filters.push_where(&mut qb);
    qb.push(" ORDER BY c.updated_at DESC, c.case_id DESC LIMIT ")
        .push_bind(PAGE_SIZE)
        .push(" OFFSET ")
        .push_bind((filters.page - 1) * PAGE_SIZE);
    let results = qb.build_query_as::<CaseListRow>().fetch_all(&state.pool).await?;

    Ok(Json(CasePage {
        results,
        page: filters.page,
        page_size: PAGE_SIZE,
        total,
        page_count: (total + PAGE_SIZE - 1) / PAGE_SIZE,
    }))
}

// ───────────────────────────────────────
// Create / update
// ───────────────────────────────────────

type CaseQuery<'q> = QueryAs<'q, Postgres, Case, PgArguments>;

/// Binds `$1..$30`: every staff-editable column followed by patient_name.
fn bind_fields<'q>(query: CaseQuery<'q>, f: &'q CaseFields) -> CaseQuery<'q> {
    query
        .bind(&f.uhid)
        .bind(&f.first_name)
        .bind(&f.last_name)
        .bind(f.gender)
        .bind(f.date_of_birth)
        .bind(f.age)
        .bind(&f.place)
        .bind(&f.phone_number)
        .bind(&f.alternate_phone_number)
        .bind(f.category_id)
        .bind(f.status)
        .bind(&f.diagnosis)
        .bind(&f.ncd_flags)
        .bind(&f.referred_by)
        .bind(f.high_risk)
        .bind(f.lmp)
        .bind(f.edd)
        .bind(f.usg_edd)
        .bind(f.surgical_pathway)
        .bind(f.surgery_done)
        .bind(f.review_frequency)
        .bind(f.review_date)
        .bind(f.surgery_date)
        .bind(f.gravida)
        .bind(f.para)
        .bind(f.abortions)
        .bind(f.living)
        .bind(&f.metadata)
        .bind(&f.notes)
        .bind(f.full_name())
}

async fn active_uhid_taken(conn: &mut PgConnection, uhid: &str, exclude: Option<i64>) -> sqlx::Result<bool> {
    sqlx::query_scalar(
        r#"SELECT EXISTS (
             SELECT 1 FROM public.cases
             WHERE uhid = $1 AND status = 'ACTIVE' AND ($2::BIGINT IS NULL OR case_id <> $2)
           )"#,
    )
    .bind(uhid)
    .bind(exclude)
    .fetch_one(conn)
    .await
}

/// Runs the field rules plus the datastore-backed ones (category exists, active UHID unique).
async fn check_case(
    conn: &mut PgConnection,
    fields: &CaseFields,
    exclude: Option<i64>,
    today: NaiveDate,
) -> AppResult<(DepartmentConfig, Option<CategoryKind>, FieldErrors)> {
    let Some((dept, kind)) = find_department(&mut *conn, fields.category_id).await? else {
        return Err(FieldErrors::single("category_id", "Select a valid category.").into());
    };
    let mut errors = validate_case(fields, kind, today);
    if fields.status == CaseStatus::Active
        && !fields.uhid.trim().is_empty()
        && active_uhid_taken(conn, &fields.uhid, exclude).await?
    {
        errors.add("uhid", DUPLICATE_ACTIVE_UHID);
    }
    Ok((dept, kind, errors))
}

#[derive(Debug, Serialize)]
pub struct CreatedCase {
    pub case: Case,
    pub tasks: Vec<Task>,
}

pub async fn create_case(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(mut fields): Json<CaseFields>,
) -> AppResult<(StatusCode, Json<CreatedCase>)> {
    user.require(Capability::CaseCreate)?;
    let today = today();

    derive_age(&mut fields, today);
    default_review_date(&mut fields, today);

    let mut tx = state.pool.begin().await?;
    let (dept, kind, errors) = check_case(&mut tx, &fields, None, today).await?;
    errors.into_result()?;

    let case = bind_fields(
        sqlx::query_as::<_, Case>(&format!(
            r#"INSERT INTO public.cases
                 (uhid, first_name, last_name, gender, date_of_birth, age, place, phone_number,
                  alternate_phone_number, category_id, status, diagnosis, ncd_flags, referred_by, high_risk,
                  lmp, edd, usg_edd, surgical_pathway, surgery_done, review_frequency, review_date,
                  surgery_date, gravida, para, abortions, living, metadata, notes, patient_name, created_by)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,
                       $21,$22,$23,$24,$25,$26,$27,$28,$29,$30,$31)
               RETURNING {CASE_COLUMNS}"#
        )),
        &fields,
    )
    .bind(user.user_id())
    .fetch_one(&mut *tx)
    .await?;

    let specs = generate_tasks(&fields, kind, &dept.predefined_actions, today);
    let mut tasks = Vec::with_capacity(specs.len());
    for spec in &specs {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"INSERT INTO public.tasks (case_id, title, due_date, task_type, frequency_label, created_by)
               VALUES ($1,$2,$3,$4,$5,$6)
               RETURNING {TASK_COLUMNS}"#
        ))
        .bind(case.case_id)
        .bind(&spec.title)
        .bind(spec.due_date)
        .bind(spec.task_type)
        .bind(&spec.label)
        .bind(user.user_id())
        .fetch_one(&mut *tx)
        .await?;
        tasks.push(task);
    }

    log_activity(
        &mut tx,
        case.case_id,
        None,
        user.user_id(),
        &format!("Case created with {} starter task(s)", tasks.len()),
    )
    .await?;
    tx.commit().await?;

    info!(case_id = case.case_id, user_id = user.user_id(), tasks = tasks.len(), "case created");
    Ok((StatusCode::CREATED, Json(CreatedCase { case, tasks })))
}

async fn load_case(conn: &mut PgConnection, case_id: i64) -> AppResult<Case> {
    sqlx::query_as::<_, Case>(&format!("SELECT {CASE_COLUMNS} FROM public.cases WHERE case_id = $1"))
        .bind(case_id)
        .fetch_optional(conn)
        .await?
        .ok_or(AppError::NotFound("case"))
}

pub async fn patch_case(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(patch): Json<CasePatch>,
) -> AppResult<Json<Case>> {
    user.require(Capability::CaseEdit)?;
    let today = today();

    let mut tx = state.pool.begin().await?;
    let existing = load_case(&mut tx, id).await?;
    let old_status = existing.fields.status;
    let requested_status = patch.status;

    let mut fields = existing.fields;
    patch.apply(&mut fields);
    derive_age(&mut fields, today);

    let (_, _, mut errors) = check_case(&mut tx, &fields, Some(id), today).await?;
    if let Some(target) = requested_status {
        let has_grey_tasks: bool = sqlx::query_scalar(
            r#"SELECT EXISTS (
                 SELECT 1 FROM public.tasks
                 WHERE case_id = $1 AND status <> 'COMPLETED' AND due_date < $2
               )"#,
        )
        .bind(id)
        .bind(grey_list_cutoff(today))
        .fetch_one(&mut *tx)
        .await?;
        let gate = check_status_transition(target, has_grey_tasks, user.principal.is_doctor_or_admin());
        if !gate.is_empty() {
            warn!(case_id = id, user_id = user.user_id(), status = %target, "grey-list transition denied");
        }
        errors.extend(gate);
    }
    errors.into_result()?;

    let case = bind_fields(
        sqlx::query_as::<_, Case>(&format!(
            r#"UPDATE public.cases SET
                 uhid = $1, first_name = $2, last_name = $3, gender = $4, date_of_birth = $5, age = $6,
                 place = $7, phone_number = $8, alternate_phone_number = $9, category_id = $10,
                 status = $11, diagnosis = $12, ncd_flags = $13, referred_by = $14, high_risk = $15,
                 lmp = $16, edd = $17, usg_edd = $18, surgical_pathway = $19, surgery_done = $20,
                 review_frequency = $21, review_date = $22, surgery_date = $23, gravida = $24,
                 para = $25, abortions = $26, living = $27, metadata = $28, notes = $29,
                 patient_name = $30, updated_at = now()
               WHERE case_id = $31
               RETURNING {CASE_COLUMNS}"#
        )),
        &fields,
    )
    .bind(id)
    .fetch_one(&mut *tx)
    .await?;

    if old_status != case.fields.status {
        let note = format!("Case status changed: {old_status} → {}", case.fields.status);
        log_activity(&mut tx, id, None, user.user_id(), &note).await?;
    }
    tx.commit().await?;

    info!(case_id = id, user_id = user.user_id(), status = %case.fields.status, "case updated");
    Ok(Json(case))
}

// ───────────────────────────────────────
// Detail
// ───────────────────────────────────────

#[derive(Serialize)]
pub struct CaseDetail {
    pub case: Case,
    pub category: DepartmentConfig,
    pub category_kind: Option<CategoryKind>,
    pub effective_edd: Option<NaiveDate>,
    pub trimester: Option<&'static str>,
    pub tasks: Vec<Task>,
    pub activity: Vec<CaseActivityLog>,
    pub calls: Vec<CallLog>,
    pub call_summary: CallSummary,
    pub capabilities: CapabilityFlags,
}

pub async fn get_case(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> AppResult<Json<CaseDetail>> {
    let today = today();
    let mut conn = state.pool.acquire().await?;

    let case = load_case(&mut conn, id).await?;
    let (category, category_kind) =
        find_department(&mut conn, case.fields.category_id).await?.ok_or(AppError::NotFound("category"))?;

    let tasks = sqlx::query_as::<_, Task>(&format!(
        "SELECT {TASK_COLUMNS} FROM public.tasks WHERE case_id = $1 ORDER BY due_date, task_id"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    let activity = sqlx::query_as::<_, CaseActivityLog>(
        r#"SELECT activity_log_id, case_id, task_id, user_id, note, created_at
           FROM public.case_activity_logs WHERE case_id = $1
           ORDER BY created_at DESC, activity_log_id DESC LIMIT $2"#,
    )
    .bind(id)
    .bind(RECENT_ACTIVITY)
    .fetch_all(&mut *conn)
    .await?;

    let calls = sqlx::query_as::<_, CallLog>(&format!(
        "SELECT {CALL_COLUMNS} FROM public.call_logs WHERE case_id = $1 ORDER BY created_at DESC, call_log_id DESC"
    ))
    .bind(id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(Json(CaseDetail {
        effective_edd: case.fields.effective_edd(),
        trimester: case.fields.trimester(today),
        call_summary: summarize_calls(&calls),
        capabilities: user.flags(),
        case,
        category,
        category_kind,
        tasks,
        activity,
        calls,
    }))
}
