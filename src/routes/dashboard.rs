// src/routes/dashboard.rs
//
// Round-trips: session + roles (extractor), task rows, case aggregates,
// overdue buckets, call logs. Volume never adds queries.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Duration;
use serde::Deserialize;

use super::cases::CALL_COLUMNS;
use super::today;
use crate::domain::calls::{summarize_calls, CallSummary};
use crate::domain::dashboard::{
    overdue_bounds, parse_upcoming_days, partition, CaseCounts, Dashboard, DashboardTaskRow, OverdueBuckets,
};
use crate::error::AppResult;
use crate::models::{CallLog, CaseStatus};
use crate::session::CurrentUser;
use crate::AppState;

#[derive(Deserialize)]
pub struct DashboardQ {
    pub upcoming_days: Option<String>,
}

pub async fn get_dashboard(
    State(state): State<AppState>,
    _user: CurrentUser,
    Query(q): Query<DashboardQ>,
) -> AppResult<Json<Dashboard>> {
    let today = today();
    let upcoming_days = parse_upcoming_days(q.upcoming_days.as_deref());
    let horizon = today + Duration::days(upcoming_days);

    let rows = sqlx::query_as::<_, DashboardTaskRow>(
        r#"SELECT t.task_id, t.case_id, t.title, t.due_date, t.status,
                  c.uhid, c.patient_name, c.diagnosis, d.name AS category_name,
                  c.phone_number, c.referred_by, c.high_risk, c.ncd_flags
           FROM public.tasks t
           JOIN public.cases c ON c.case_id = t.case_id
           JOIN public.department_configs d ON d.department_id = c.category_id
           WHERE t.status = 'AWAITING_REPORTS'
              OR (t.status <> 'COMPLETED' AND t.due_date < $1)
              OR (t.status = 'SCHEDULED' AND t.due_date BETWEEN $1 AND $2)
           ORDER BY t.due_date, t.case_id, t.task_id"#,
    )
    .bind(today)
    .bind(horizon)
    .fetch_all(&state.pool)
    .await?;

    let aggregates = sqlx::query_as::<_, (String, CaseStatus, i64)>(
        r#"SELECT d.name, c.status, COUNT(*)
           FROM public.cases c
           JOIN public.department_configs d ON d.department_id = c.category_id
           GROUP BY d.name, c.status"#,
    )
    .fetch_all(&state.pool)
    .await?;

    let (grey_cutoff, overdue_before) = overdue_bounds(today);
    let (red_list, grey_list) = sqlx::query_as::<_, (i64, i64)>(
        r#"SELECT COUNT(*) FILTER (WHERE due_date >= $1),
                  COUNT(*) FILTER (WHERE due_date < $1)
           FROM public.tasks
           WHERE status <> 'COMPLETED' AND due_date < $2"#,
    )
    .bind(grey_cutoff)
    .bind(overdue_before)
    .fetch_one(&state.pool)
    .await?;

    let parts = partition(rows, today, upcoming_days);
    let case_ids = parts.case_ids();

    let logs = sqlx::query_as::<_, CallLog>(&format!(
        r#"SELECT {CALL_COLUMNS} FROM public.call_logs
           WHERE case_id = ANY($1)
           ORDER BY case_id, created_at DESC, call_log_id DESC"#
    ))
    .bind(&case_ids)
    .fetch_all(&state.pool)
    .await?;

    let mut by_case: HashMap<i64, Vec<CallLog>> = HashMap::new();
    for log in logs {
        by_case.entry(log.case_id).or_default().push(log);
    }
    let calls: HashMap<i64, CallSummary> =
        by_case.iter().map(|(case_id, history)| (*case_id, summarize_calls(history))).collect();

    Ok(Json(Dashboard::assemble(
        &parts,
        &calls,
        today,
        upcoming_days,
        CaseCounts::from_aggregates(&aggregates),
        OverdueBuckets { red_list, grey_list },
    )))
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use sqlx::PgPool;

    use super::*;
    use crate::routes::test_support::{count_queries, department_id, seeded_state, staff};

    /// Adds `n` cases, each with an overdue, a today, an upcoming and an awaiting
    /// task plus a failed call.
    async fn add_cases(pool: &PgPool, first: i64, n: i64) {
        let dept = department_id(pool, "Surgery").await;
        let today = today();
        for i in first..first + n {
            let case_id: i64 = sqlx::query_scalar(
                r#"INSERT INTO public.cases (uhid, first_name, patient_name, phone_number, category_id, age)
                   VALUES ($1, 'Patient', $1, '9876500000', $2, 40) RETURNING case_id"#,
            )
            .bind(format!("UH-D{i}"))
            .bind(dept)
            .fetch_one(pool)
            .await
            .unwrap();

            for (title, due, status) in [
                ("Xray", today - Duration::days(3), "SCHEDULED"),
                ("ECG", today, "SCHEDULED"),
                ("LAB TEST", today + Duration::days(2), "SCHEDULED"),
                ("Biopsy report", today + Duration::days(1), "AWAITING_REPORTS"),
            ] {
                sqlx::query("INSERT INTO public.tasks (case_id, title, due_date, status) VALUES ($1,$2,$3,$4)")
                    .bind(case_id)
                    .bind(title)
                    .bind(due)
                    .bind(status)
                    .execute(pool)
                    .await
                    .unwrap();
            }
            sqlx::query("INSERT INTO public.call_logs (case_id, outcome) VALUES ($1, 'NO_ANSWER')")
                .bind(case_id)
                .execute(pool)
                .await
                .unwrap();
        }
    }

    #[sqlx::test]
    async fn round_trips_stay_bounded_as_volume_grows(pool: PgPool) {
        let state = seeded_state(pool.clone()).await;
        let nurse = staff(&pool, "nurse", Some("Nurse"), false).await;

        add_cases(&pool, 0, 2).await;
        let q = || Query(DashboardQ { upcoming_days: Some("7".into()) });
        let (small, small_queries) = count_queries(get_dashboard(State(state.clone()), nurse.clone(), q())).await;
        let Json(small) = small.unwrap();
        assert_eq!(small.today_cards.len(), 2);

        add_cases(&pool, 2, 20).await;
        let (large, large_queries) = count_queries(get_dashboard(State(state), nurse, q())).await;
        let Json(large) = large.unwrap();

        assert_eq!(large.today_cards.len(), 22);
        assert_eq!(large.upcoming_cards.len(), 22);
        assert_eq!(large.overdue_cards.len(), 22);
        assert_eq!(large.awaiting_cards.len(), 22);
        assert_eq!(large.overdue_cards[0].failed_attempt_count, 1);
        assert_eq!(large.counts.surgery, 22);

        // Two more for the session and role lookups in the request extractor.
        assert!((1..=4).contains(&small_queries), "{small_queries} queries");
        assert_eq!(small_queries, large_queries);
    }
}
