// src/domain/validation.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;

use super::category::CategoryKind;
use crate::models::{age_on, CaseFields, CaseStatus, NcdFlag, SurgicalPathway, TaskStatus};

/// Non-completed tasks overdue by more than this many days put a case on the grey list.
pub const GREY_LIST_DAYS: i64 = 30;

pub const DUPLICATE_ACTIVE_UHID: &str = "No duplicate active cases are allowed for the same UHID.";

/// Validation failures keyed by field name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn has(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn is_phone(value: &str) -> bool {
    value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Fills age from date of birth. Runs before validation on every write.
pub fn derive_age(fields: &mut CaseFields, today: NaiveDate) {
    if let Some(dob) = fields.date_of_birth {
        if dob <= today {
            fields.age = Some(age_on(dob, today));
        }
    }
}

/// New cases with a review frequency but no review date get one from the frequency.
pub fn default_review_date(fields: &mut CaseFields, today: NaiveDate) {
    if fields.review_date.is_none() {
        if let Some(freq) = fields.review_frequency {
            fields.review_date = Some(today + Duration::days(freq.days()));
        }
    }
}

/// Every rule a case must satisfy before it is written, except active-UHID
/// uniqueness which needs the datastore.
pub fn validate_case(fields: &CaseFields, kind: Option<CategoryKind>, today: NaiveDate) -> FieldErrors {
    let mut errors = FieldErrors::new();

    if fields.uhid.trim().is_empty() {
        errors.add("uhid", "This field is required.");
    }
    if fields.first_name.trim().is_empty() {
        errors.add("first_name", "This field is required.");
    }

    if fields.phone_number.is_empty() {
        errors.add("phone_number", "This field is required.");
    } else if !is_phone(&fields.phone_number) {
        errors.add("phone_number", "Phone number must be exactly 10 digits.");
    }
    if !fields.alternate_phone_number.is_empty() && !is_phone(&fields.alternate_phone_number) {
        errors.add("alternate_phone_number", "Alternate phone number must be exactly 10 digits.");
    }

    match fields.date_of_birth {
        Some(dob) if dob > today => errors.add("date_of_birth", "Date of birth cannot be in the future."),
        None if fields.age.is_none() => errors.add("age", "Enter age when date of birth is not known."),
        _ => {}
    }
    if fields.age.is_some_and(|a| a < 0) {
        errors.add("age", "Age cannot be negative.");
    }

    for flag in &fields.ncd_flags {
        if flag.parse::<NcdFlag>().is_err() {
            errors.add("ncd_flags", format!("Unknown NCD flag '{flag}'."));
        }
    }

    for (field, value) in [
        ("gravida", fields.gravida),
        ("para", fields.para),
        ("abortions", fields.abortions),
        ("living", fields.living),
    ] {
        if value.is_some_and(|v| v < 0) {
            errors.add(field, "Must be zero or more.");
        }
    }

    match kind {
        Some(CategoryKind::Anc) => validate_anc(fields, &mut errors),
        Some(CategoryKind::Surgery) => match fields.surgical_pathway {
            None => errors.add("surgical_pathway", "Please choose surveillance or planned surgery."),
            Some(SurgicalPathway::Surveillance) if fields.review_date.is_none() => {
                errors.add("review_date", "Surveillance cases require a review date.")
            }
            Some(SurgicalPathway::PlannedSurgery) if fields.surgery_date.is_none() => {
                errors.add("surgery_date", "Planned surgery cases require a surgery date.")
            }
            _ => {}
        },
        Some(CategoryKind::NonSurgical) if fields.review_date.is_none() => {
            errors.add("review_date", "Non-surgical cases require a review date.")
        }
        _ => {}
    }

    errors
}

fn validate_anc(fields: &CaseFields, errors: &mut FieldErrors) {
    if fields.lmp.is_none() {
        errors.add("lmp", "ANC cases require LMP.");
    }
    if fields.effective_edd().is_none() {
        errors.add("edd", "ANC cases require at least one EDD (LMP-based or USG-based).");
    }

    // GPLA arithmetic only applies once all four counters are recorded.
    if let (Some(g), Some(p), Some(a), Some(_)) = (fields.gravida, fields.para, fields.abortions, fields.living) {
        if p > g {
            errors.add("para", "Para (P) cannot exceed Gravida (G).");
        } else if a > g {
            errors.add("abortions", "Abortions (A) cannot exceed Gravida (G).");
        } else if i64::from(p) + i64::from(a) > i64::from(g) {
            errors.add("abortions", "The sum of Para and Abortions cannot exceed Gravida.");
        }
    }
}

/// Task write rules. ANC tasks cannot be completed ahead of their due date.
pub fn validate_task(
    title: &str,
    due_date: NaiveDate,
    status: TaskStatus,
    kind: Option<CategoryKind>,
    today: NaiveDate,
) -> FieldErrors {
    let mut errors = FieldErrors::new();
    if title.trim().is_empty() {
        errors.add("title", "This field is required.");
    }
    if status == TaskStatus::Completed && kind == Some(CategoryKind::Anc) && due_date > today {
        errors.add("status", "ANC tasks cannot be completed before their scheduled due date.");
    }
    errors
}

/// `completed_at` is stamped on the transition into COMPLETED and cleared on any other status.
pub fn completion_timestamp(
    status: TaskStatus,
    previous: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match status {
        TaskStatus::Completed => Some(previous.unwrap_or(now)),
        _ => None,
    }
}

pub fn grey_list_cutoff(today: NaiveDate) -> NaiveDate {
    today - Duration::days(GREY_LIST_DAYS)
}

/// Grey-listed cases may only be set ACTIVE or LOSS_TO_FOLLOW_UP by Doctor/Admin.
pub fn check_status_transition(target: CaseStatus, has_grey_tasks: bool, elevated: bool) -> FieldErrors {
    let gated = matches!(target, CaseStatus::Active | CaseStatus::LossToFollowUp);
    if has_grey_tasks && gated && !elevated {
        FieldErrors::single("status", "Only Doctor/Admin can set Grey List cases to Active or Loss to Follow-up.")
    } else {
        FieldErrors::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReviewFrequency;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 20).unwrap()
    }

    fn base() -> CaseFields {
        serde_json::from_value(serde_json::json!({
            "uhid": "UH-1", "first_name": "Jane", "last_name": "Doe",
            "phone_number": "9999999999", "category_id": 1, "age": 28
        }))
        .unwrap()
    }

    fn anc() -> CaseFields {
        let mut c = base();
        c.lmp = Some(today() - Duration::days(56));
        c.edd = Some(today() + Duration::days(210));
        c
    }

    #[test]
    fn anc_without_lmp_is_rejected() {
        let mut c = anc();
        c.lmp = None;
        let errors = validate_case(&c, Some(CategoryKind::Anc), today());
        assert!(errors.has("lmp"));
        assert!(validate_case(&anc(), Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn anc_accepts_usg_edd_alone() {
        let mut c = anc();
        c.edd = None;
        assert!(validate_case(&c, Some(CategoryKind::Anc), today()).has("edd"));
        c.usg_edd = Some(today() + Duration::days(200));
        assert!(validate_case(&c, Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn gpla_para_above_gravida_is_a_field_error() {
        let mut c = anc();
        (c.gravida, c.para, c.abortions, c.living) = (Some(1), Some(2), Some(0), Some(0));
        let errors = validate_case(&c, Some(CategoryKind::Anc), today());
        assert!(errors.has("para"));
        assert!(!errors.has("abortions"));
    }

    #[test]
    fn gpla_sum_rule() {
        let mut c = anc();
        (c.gravida, c.para, c.abortions, c.living) = (Some(3), Some(2), Some(2), Some(2));
        let errors = validate_case(&c, Some(CategoryKind::Anc), today());
        assert!(errors.has("abortions"));
        assert!(!errors.has("para"));

        (c.gravida, c.para, c.abortions, c.living) = (Some(3), Some(2), Some(1), Some(2));
        assert!(validate_case(&c, Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn gpla_sum_does_not_overflow_on_large_counters() {
        let mut c = anc();
        (c.gravida, c.para, c.abortions, c.living) =
            (Some(2_000_000_000), Some(1_500_000_000), Some(1_500_000_000), Some(0));
        let errors = validate_case(&c, Some(CategoryKind::Anc), today());
        assert!(errors.has("abortions"));
        assert!(!errors.has("para"));

        (c.gravida, c.para, c.abortions) = (Some(i32::MAX), Some(i32::MAX), Some(0));
        assert!(validate_case(&c, Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn gpla_is_skipped_while_incomplete() {
        let mut c = anc();
        (c.gravida, c.para) = (Some(1), Some(2));
        assert!(validate_case(&c, Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn phone_numbers_must_be_ten_digits() {
        let mut c = base();
        c.review_date = Some(today());
        c.phone_number = "98765-4321".into();
        c.alternate_phone_number = "12345".into();
        let errors = validate_case(&c, Some(CategoryKind::NonSurgical), today());
        assert!(errors.has("phone_number"));
        assert!(errors.has("alternate_phone_number"));
    }

    #[test]
    fn surgery_pathway_requirements() {
        let mut c = base();
        assert!(validate_case(&c, Some(CategoryKind::Surgery), today()).has("surgical_pathway"));
        c.surgical_pathway = Some(SurgicalPathway::PlannedSurgery);
        assert!(validate_case(&c, Some(CategoryKind::Surgery), today()).has("surgery_date"));
        c.surgical_pathway = Some(SurgicalPathway::Surveillance);
        assert!(validate_case(&c, Some(CategoryKind::Surgery), today()).has("review_date"));
        c.review_date = Some(today());
        assert!(validate_case(&c, Some(CategoryKind::Surgery), today()).is_empty());
    }

    #[test]
    fn non_surgical_requires_review_date_but_unknown_category_does_not() {
        let c = base();
        assert!(validate_case(&c, Some(CategoryKind::NonSurgical), today()).has("review_date"));
        assert!(validate_case(&c, None, today()).is_empty());
    }

    #[test]
    fn age_is_required_without_dob_and_derived_with_it() {
        let mut c = base();
        c.review_date = Some(today());
        c.age = None;
        assert!(validate_case(&c, Some(CategoryKind::NonSurgical), today()).has("age"));

        c.date_of_birth = NaiveDate::from_ymd_opt(2001, 5, 21);
        derive_age(&mut c, today());
        assert_eq!(c.age, Some(24));
        assert!(validate_case(&c, Some(CategoryKind::NonSurgical), today()).is_empty());
    }

    #[test]
    fn review_frequency_fills_missing_review_date() {
        let mut c = base();
        c.review_frequency = Some(ReviewFrequency::HalfYearly);
        default_review_date(&mut c, today());
        assert_eq!(c.review_date, Some(today() + Duration::days(180)));
    }

    #[test]
    fn unknown_ncd_flags_are_rejected() {
        let mut c = base();
        c.ncd_flags = vec!["T2DM".into(), "GOUT".into()];
        assert!(validate_case(&c, None, today()).has("ncd_flags"));
    }

    #[test]
    fn anc_task_cannot_complete_early() {
        let future = today() + Duration::days(7);
        let errors = validate_task("Scan", future, TaskStatus::Completed, Some(CategoryKind::Anc), today());
        assert!(errors.has("status"));
        assert!(validate_task("Scan", today(), TaskStatus::Completed, Some(CategoryKind::Anc), today()).is_empty());
        assert!(validate_task("Scan", future, TaskStatus::Completed, Some(CategoryKind::Surgery), today()).is_empty());
        assert!(validate_task("Scan", future, TaskStatus::Scheduled, Some(CategoryKind::Anc), today()).is_empty());
    }

    #[test]
    fn completed_at_follows_status() {
        let now = Utc::now();
        let earlier = now - Duration::hours(3);
        assert_eq!(completion_timestamp(TaskStatus::Completed, None, now), Some(now));
        assert_eq!(completion_timestamp(TaskStatus::Completed, Some(earlier), now), Some(earlier));
        assert_eq!(completion_timestamp(TaskStatus::Scheduled, Some(earlier), now), None);
    }

    #[test]
    fn grey_list_gate_requires_elevated_role() {
        assert!(check_status_transition(CaseStatus::Active, true, false).has("status"));
        assert!(check_status_transition(CaseStatus::LossToFollowUp, true, false).has("status"));
        assert!(check_status_transition(CaseStatus::Active, true, true).is_empty());
        assert!(check_status_transition(CaseStatus::Completed, true, false).is_empty());
        assert!(check_status_transition(CaseStatus::Active, false, false).is_empty());
    }

    #[test]
    fn grey_list_starts_after_thirty_days() {
        let cutoff = grey_list_cutoff(today());
        assert_eq!(cutoff, today() - Duration::days(GREY_LIST_DAYS));
        assert!(today() - Duration::days(30) >= cutoff);
        assert!(today() - Duration::days(31) < cutoff);
    }
}
