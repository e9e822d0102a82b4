// src/domain/schedule.rs
//
// Starter tasks emitted when a case is created. Pure: the caller persists.

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use super::category::CategoryKind;
use crate::models::{CaseFields, SurgicalPathway, TaskType};

/// Days between consecutive ANC schedule months.
const ANC_MONTH_DAYS: i64 = 28;
const DEFAULT_REVIEW_DAYS: i64 = 30;
const FALLBACK_ACTION: &str = "Review by consultant";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    pub title: String,
    pub due_date: NaiveDate,
    pub task_type: TaskType,
    pub label: String,
}

impl TaskSpec {
    fn new(title: &str, due_date: NaiveDate, task_type: TaskType, label: impl Into<String>) -> Self {
        Self { title: title.to_string(), due_date, task_type, label: label.into() }
    }
}

const ANC_SCHEDULE: &[(i64, &[&str])] = &[
    (2, &[
        "Routine prenatal check up",
        "Urine pregnancy test",
        "Blood and urine test (ANC profile)",
        "Pregnancy ultrasound scan for cardiac activity",
    ]),
    (3, &[
        "Routine prenatal check up",
        "First trimester combined test",
        "NT ultrasound scan (sonography) and a double marker test",
    ]),
    (4, &["Routine prenatal check up"]),
    (5, &["Routine prenatal check up", "Anomaly or ultrasound level II scan"]),
    (6, &["Routine prenatal check up", "First dose of Tetanus Toxoid (TT) injection"]),
    (7, &[
        "Routine prenatal check up (once every two weeks)",
        "Second dose of Tetanus Toxoid (TT) injection",
        "Growth and fetal wellbeing ultrasound scan",
        "Blood test (CBC/Urine R/OGCT)",
    ]),
    (8, &["Routine prenatal check up (once every two weeks)"]),
    (9, &[
        "Routine prenatal check up (once every week)",
        "Growth ultrasound scan",
        "Nonstress test (NST)",
        "Blood test (CBC/HIV/HBsAg)",
    ]),
];

/// Keyword classification of ANC titles; lab keywords win over procedure ones.
pub fn classify_anc_title(title: &str) -> TaskType {
    let lower = title.to_lowercase();
    if ["test", "blood", "urine"].iter().any(|k| lower.contains(k)) {
        TaskType::Lab
    } else if ["scan", "injection", "nst"].iter().any(|k| lower.contains(k)) {
        TaskType::Procedure
    } else {
        TaskType::Visit
    }
}

fn review_label(case: &CaseFields) -> String {
    case.review_frequency.map(|f| f.label()).unwrap_or("Review").to_string()
}

/// Ordered starter tasks for a case. Unrecognised categories follow the
/// non-surgical branch.
pub fn generate_tasks(
    case: &CaseFields,
    kind: Option<CategoryKind>,
    predefined_actions: &[String],
    today: NaiveDate,
) -> Vec<TaskSpec> {
    match kind.unwrap_or(CategoryKind::NonSurgical) {
        CategoryKind::Anc => anc_tasks(case, today),
        CategoryKind::Surgery => surgery_tasks(case, today),
        CategoryKind::NonSurgical => {
            let review = case.review_date.unwrap_or(today + Duration::days(DEFAULT_REVIEW_DAYS));
            let action = predefined_actions
                .first()
                .map(String::as_str)
                .filter(|a| !a.trim().is_empty())
                .unwrap_or(FALLBACK_ACTION);
            vec![TaskSpec::new(action, review, TaskType::Custom, review_label(case))]
        }
    }
}

fn anc_tasks(case: &CaseFields, today: NaiveDate) -> Vec<TaskSpec> {
    let start = case.lmp.unwrap_or(today);
    let edd = case.effective_edd();
    let mut tasks = Vec::new();
    for (month, titles) in ANC_SCHEDULE {
        let mut due = start + Duration::days(ANC_MONTH_DAYS * (month - 1));
        if let Some(edd) = edd {
            due = due.min(edd);
        }
        let label = format!("ANC month {month}");
        tasks.extend(
            titles
                .iter()
                .map(|title| TaskSpec::new(title, due, classify_anc_title(title), label.clone())),
        );
    }
    tasks
}

fn surgery_tasks(case: &CaseFields, today: NaiveDate) -> Vec<TaskSpec> {
    match case.surgical_pathway {
        Some(SurgicalPathway::PlannedSurgery) => {
            let surgery = case.surgery_date.unwrap_or(today);
            let pre_op = surgery - Duration::days(7);
            vec![
                TaskSpec::new("Lab test", pre_op, TaskType::Lab, "Pre-op"),
                TaskSpec::new("Xray", pre_op, TaskType::Procedure, "Pre-op"),
                TaskSpec::new("ECG", pre_op, TaskType::Procedure, "Pre-op"),
                TaskSpec::new("Inform Anesthetist", surgery - Duration::days(5), TaskType::Call, "Pre-op"),
                TaskSpec::new("Surgery Date", surgery, TaskType::Procedure, "Planned surgery"),
            ]
        }
        _ => {
            let review = case.review_date.unwrap_or(today + Duration::days(DEFAULT_REVIEW_DAYS));
            vec![TaskSpec::new("Surveillance Review", review, TaskType::Visit, review_label(case))]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewFrequency;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn case() -> CaseFields {
        serde_json::from_value(serde_json::json!({
            "uhid": "UH1", "phone_number": "9876543210", "category_id": 1
        }))
        .unwrap()
    }

    #[test]
    fn anc_schedule_spans_months_two_to_nine() {
        let mut c = case();
        c.lmp = Some(today() - Duration::days(60));
        c.edd = Some(today() + Duration::days(210));
        let tasks = generate_tasks(&c, Some(CategoryKind::Anc), &[], today());

        assert_eq!(tasks.len(), 21);
        assert_eq!(tasks[0].title, "Routine prenatal check up");
        assert_eq!(tasks[0].due_date, c.lmp.unwrap() + Duration::days(28));
        assert_eq!(tasks[0].label, "ANC month 2");
        assert_eq!(tasks.last().unwrap().label, "ANC month 9");
        // ordered by schedule month, never by title
        assert!(tasks.windows(2).all(|w| w[0].due_date <= w[1].due_date));
    }

    #[test]
    fn anc_due_dates_are_clipped_to_usg_edd() {
        let mut c = case();
        c.lmp = Some(today());
        c.edd = Some(today() + Duration::days(300));
        c.usg_edd = Some(today() + Duration::days(100));
        let tasks = generate_tasks(&c, Some(CategoryKind::Anc), &[], today());
        assert!(tasks.iter().all(|t| t.due_date <= c.usg_edd.unwrap()));
        assert_eq!(tasks.last().unwrap().due_date, c.usg_edd.unwrap());
    }

    #[test]
    fn anc_without_lmp_starts_today() {
        let c = case();
        let tasks = generate_tasks(&c, Some(CategoryKind::Anc), &[], today());
        assert_eq!(tasks[0].due_date, today() + Duration::days(28));
    }

    #[test]
    fn anc_titles_are_classified_by_keyword() {
        assert_eq!(classify_anc_title("Urine pregnancy test"), TaskType::Lab);
        assert_eq!(classify_anc_title("Nonstress test (NST)"), TaskType::Lab);
        assert_eq!(classify_anc_title("Growth ultrasound scan"), TaskType::Procedure);
        assert_eq!(classify_anc_title("Second dose of Tetanus Toxoid (TT) injection"), TaskType::Procedure);
        assert_eq!(classify_anc_title("Routine prenatal check up"), TaskType::Visit);
    }

    #[test]
    fn planned_surgery_emits_pre_op_bundle() {
        let mut c = case();
        c.surgical_pathway = Some(SurgicalPathway::PlannedSurgery);
        c.surgery_date = Some(today() + Duration::days(14));
        let tasks = generate_tasks(&c, Some(CategoryKind::Surgery), &[], today());

        let titles: Vec<_> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Lab test", "Xray", "ECG", "Inform Anesthetist", "Surgery Date"]);
        assert_eq!(tasks[0].due_date, today() + Duration::days(7));
        assert_eq!(tasks[3].due_date, today() + Duration::days(9));
        assert_eq!(tasks[3].task_type, TaskType::Call);
        assert_eq!(tasks[4].due_date, today() + Duration::days(14));
    }

    #[test]
    fn surveillance_defaults_review_to_thirty_days() {
        let mut c = case();
        c.surgical_pathway = Some(SurgicalPathway::Surveillance);
        let tasks = generate_tasks(&c, Some(CategoryKind::Surgery), &[], today());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, "Surveillance Review");
        assert_eq!(tasks[0].due_date, today() + Duration::days(30));
        assert_eq!(tasks[0].label, "Review");
    }

    #[test]
    fn non_surgical_uses_first_predefined_action() {
        let mut c = case();
        c.review_date = Some(today() + Duration::days(12));
        c.review_frequency = Some(ReviewFrequency::Quarterly);
        let actions = vec!["Consultant Review".to_string(), "Opinion".to_string()];
        let tasks = generate_tasks(&c, Some(CategoryKind::NonSurgical), &actions, today());
        assert_eq!(tasks, vec![TaskSpec::new(
            "Consultant Review",
            today() + Duration::days(12),
            TaskType::Custom,
            "Every 3 months",
        )]);
    }

    #[test]
    fn unknown_category_falls_through_to_non_surgical() {
        let tasks = generate_tasks(&case(), None, &[], today());
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].title, FALLBACK_ACTION);
        assert_eq!(tasks[0].due_date, today() + Duration::days(30));
    }
}
