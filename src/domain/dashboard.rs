// src/domain/dashboard.rs

use std::collections::HashMap;

use chrono::{Duration, NaiveDate};
use serde::Serialize;
use sqlx::FromRow;

use super::calls::CallSummary;
use super::category::CategoryKind;
use super::validation::grey_list_cutoff;
use crate::models::{CallCommunicationStatus, CaseStatus, TaskStatus};

pub const DEFAULT_UPCOMING_DAYS: i64 = 7;
pub const MAX_UPCOMING_DAYS: i64 = 30;

/// Unparsable input falls back to the default; numbers are clamped to 1..=30.
pub fn parse_upcoming_days(raw: Option<&str>) -> i64 {
    raw.and_then(|s| s.trim().parse::<i64>().ok())
        .map(|days| days.clamp(1, MAX_UPCOMING_DAYS))
        .unwrap_or(DEFAULT_UPCOMING_DAYS)
}

/// A task joined with the case fields a card needs.
#[derive(Debug, Clone, FromRow)]
pub struct DashboardTaskRow {
    pub task_id: i64,
    pub case_id: i64,
    pub title: String,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub uhid: String,
    pub patient_name: String,
    pub diagnosis: String,
    pub category_name: String,
    pub phone_number: String,
    pub referred_by: String,
    pub high_risk: bool,
    pub ncd_flags: Vec<String>,
}

#[derive(Debug, Default)]
pub struct Partitions {
    pub today: Vec<DashboardTaskRow>,
    pub upcoming: Vec<DashboardTaskRow>,
    pub overdue: Vec<DashboardTaskRow>,
    pub awaiting: Vec<DashboardTaskRow>,
}

impl Partitions {
    pub fn case_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = [&self.today, &self.upcoming, &self.overdue, &self.awaiting]
            .into_iter()
            .flatten()
            .map(|row| row.case_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// Splits tasks (already ordered by due date, case, id) into the four
/// dashboard lists. Overdue and awaiting may overlap.
pub fn partition(rows: Vec<DashboardTaskRow>, today: NaiveDate, upcoming_days: i64) -> Partitions {
    let horizon = today + Duration::days(upcoming_days);
    let mut parts = Partitions::default();
    for row in rows {
        if row.status == TaskStatus::AwaitingReports {
            parts.awaiting.push(row.clone());
        }
        if row.status != TaskStatus::Completed && row.due_date < today {
            parts.overdue.push(row);
        } else if row.status == TaskStatus::Scheduled && row.due_date == today {
            parts.today.push(row);
        } else if row.status == TaskStatus::Scheduled && row.due_date > today && row.due_date <= horizon {
            parts.upcoming.push(row);
        }
    }
    parts
}

#[derive(Debug, Clone, Serialize)]
pub struct PatientDayCard {
    pub due_date: NaiveDate,
    pub case_id: i64,
    pub uhid: String,
    pub patient_name: String,
    pub diagnosis: String,
    pub phone_number: String,
    pub referred_by: String,
    pub high_risk: bool,
    pub ncd_flags: Vec<String>,
    pub task_titles: Vec<String>,
    pub task_ids: Vec<i64>,
    pub call_status: CallCommunicationStatus,
    pub failed_attempt_count: u32,
}

/// One card per (due date, case) in first-seen order, titles deduplicated.
/// Every task id is kept so the card can act on each task.
pub fn build_cards(rows: &[DashboardTaskRow], calls: &HashMap<i64, CallSummary>) -> Vec<PatientDayCard> {
    let mut cards: Vec<PatientDayCard> = Vec::new();
    let mut index: HashMap<(NaiveDate, i64), usize> = HashMap::new();

    for row in rows {
        let slot = *index.entry((row.due_date, row.case_id)).or_insert_with(|| {
            let summary = calls.get(&row.case_id).cloned().unwrap_or_default();
            let diagnosis = if row.diagnosis.trim().is_empty() { &row.category_name } else { &row.diagnosis };
            cards.push(PatientDayCard {
                due_date: row.due_date,
                case_id: row.case_id,
                uhid: row.uhid.clone(),
                patient_name: row.patient_name.clone(),
                diagnosis: diagnosis.clone(),
                phone_number: row.phone_number.clone(),
                referred_by: row.referred_by.clone(),
                high_risk: row.high_risk,
                ncd_flags: row.ncd_flags.clone(),
                task_titles: Vec::new(),
                task_ids: Vec::new(),
                call_status: summary.status,
                failed_attempt_count: summary.failed_attempt_count,
            });
            cards.len() - 1
        });
        let card = &mut cards[slot];
        card.task_ids.push(row.task_id);
        if !card.task_titles.contains(&row.title) {
            card.task_titles.push(row.title.clone());
        }
    }
    cards
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CaseCounts {
    pub active: i64,
    pub completed: i64,
    pub anc: i64,
    pub surgery: i64,
    pub non_surgical: i64,
}

impl CaseCounts {
    /// Folds `(department name, status, count)` aggregates; the per-category
    /// counts cover ACTIVE cases only.
    pub fn from_aggregates(rows: &[(String, CaseStatus, i64)]) -> Self {
        let mut counts = Self::default();
        for (department, status, n) in rows {
            match status {
                CaseStatus::Active => counts.active += n,
                CaseStatus::Completed => counts.completed += n,
                _ => {}
            }
            if *status != CaseStatus::Active {
                continue;
            }
            match CategoryKind::from_department_name(department) {
                Some(CategoryKind::Anc) => counts.anc += n,
                Some(CategoryKind::Surgery) => counts.surgery += n,
                Some(CategoryKind::NonSurgical) => counts.non_surgical += n,
                None => {}
            }
        }
        counts
    }
}

/// Red list: overdue 1..=30 days. Grey list: overdue beyond that.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OverdueBuckets {
    pub red_list: i64,
    pub grey_list: i64,
}

/// Bounds for the overdue bucket query: `[grey_cutoff, today)` is red, `< grey_cutoff` is grey.
pub fn overdue_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    (grey_list_cutoff(today), today)
}

#[derive(Debug, Serialize)]
pub struct Dashboard {
    pub today: NaiveDate,
    pub upcoming_days: i64,
    pub counts: CaseCounts,
    pub overdue: OverdueBuckets,
    pub today_cards: Vec<PatientDayCard>,
    pub upcoming_cards: Vec<PatientDayCard>,
    pub overdue_cards: Vec<PatientDayCard>,
    pub awaiting_cards: Vec<PatientDayCard>,
}

impl Dashboard {
    pub fn assemble(
        parts: &Partitions,
        calls: &HashMap<i64, CallSummary>,
        today: NaiveDate,
        upcoming_days: i64,
        counts: CaseCounts,
        overdue: OverdueBuckets,
    ) -> Self {
        Self {
            today,
            upcoming_days,
            counts,
            overdue,
            today_cards: build_cards(&parts.today, calls),
            upcoming_cards: build_cards(&parts.upcoming, calls),
            overdue_cards: build_cards(&parts.overdue, calls),
            awaiting_cards: build_cards(&parts.awaiting, calls),
        }
    }
}
