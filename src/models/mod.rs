// src/models/mod.rs

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Closed enumeration persisted as TEXT. Serialises as its stored code.
/// The `labelled` form also gets a human-readable `label()`.
macro_rules! text_enum {
    (labelled $(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal, $label:literal),+ $(,)? }) => {
        text_enum!($(#[$meta])* $name { $($variant => $code),+ });

        impl $name {
            pub fn label(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }
        }
    };
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $code),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($code => Ok($name::$variant),)+
                    other => Err(UnknownVariant { kind: stringify!($name), value: other.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }

        impl sqlx::Type<sqlx::Postgres> for $name {
            fn type_info() -> sqlx::postgres::PgTypeInfo {
                <&str as sqlx::Type<sqlx::Postgres>>::type_info()
            }

            fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
                <&str as sqlx::Type<sqlx::Postgres>>::compatible(ty)
            }
        }

        impl<'q> sqlx::Encode<'q, sqlx::Postgres> for $name {
            fn encode_by_ref(&self, buf: &mut sqlx::postgres::PgArgumentBuffer) -> sqlx::encode::IsNull {
                <&str as sqlx::Encode<'q, sqlx::Postgres>>::encode(self.as_str(), buf)
            }
        }

        impl<'r> sqlx::Decode<'r, sqlx::Postgres> for $name {
            fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                let raw = <&str as sqlx::Decode<'r, sqlx::Postgres>>::decode(value)?;
                Ok(raw.parse()?)
            }
        }
    };
}

// ───────────────────────────────────────
// Enumerations
// ───────────────────────────────────────
text_enum!(CaseStatus {
    Active => "ACTIVE",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    LossToFollowUp => "LOSS_TO_FOLLOW_UP",
});

text_enum!(TaskStatus {
    Scheduled => "SCHEDULED",
    AwaitingReports => "AWAITING_REPORTS",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

text_enum!(TaskType {
    Visit => "VISIT",
    Lab => "LAB",
    Procedure => "PROCEDURE",
    Call => "CALL",
    Custom => "CUSTOM",
});

text_enum!(labelled CallOutcome {
    AnsweredConfirmedVisit => "ANSWERED_CONFIRMED_VISIT", "Answered - Confirmed visit",
    AnsweredUncertain => "ANSWERED_UNCERTAIN", "Answered - Uncertain",
    NoAnswer => "NO_ANSWER", "No answer",
    SwitchedOff => "SWITCHED_OFF", "Switched off",
    CallRejected => "CALL_REJECTED", "Call rejected",
    InvalidNumber => "INVALID_NUMBER", "Invalid number",
    PatientShifted => "PATIENT_SHIFTED", "Patient shifted",
    PatientDeclined => "PATIENT_DECLINED", "Patient declined",
    RudeBehavior => "RUDE_BEHAVIOR", "Rude behavior",
    CallBackLater => "CALL_BACK_LATER", "Call back later",
});

text_enum!(CallCommunicationStatus {
    NotContacted => "NONE",
    Confirmed => "CONFIRMED",
    NotReachable => "NOT_REACHABLE",
    InvalidContact => "INVALID_CONTACT",
    Lost => "LOST",
    CallBackLater => "CALL_BACK_LATER",
});

text_enum!(SurgicalPathway {
    PlannedSurgery => "PLANNED_SURGERY",
    Surveillance => "SURVEILLANCE",
});

text_enum!(labelled ReviewFrequency {
    Monthly => "MONTHLY", "Monthly",
    Quarterly => "QUARTERLY", "Every 3 months",
    HalfYearly => "HALF_YEARLY", "Every 6 months",
    Yearly => "YEARLY", "Yearly",
});

text_enum!(Gender {
    Female => "FEMALE",
    Male => "MALE",
    Other => "OTHER",
    Unknown => "UNKNOWN",
});

text_enum!(
    /// Non-communicable disease flags recorded against a case.
    NcdFlag {
        T2dm => "T2DM",
        Shtn => "SHTN",
        Ba => "BA",
        Epilepsy => "EPILEPSY",
        Cad => "CAD",
        Ckd => "CKD",
        Cld => "CLD",
        Cva => "CVA",
        Copd => "COPD",
        Thyroid => "THYROID",
        Smoking => "SMOKING",
        Alcohol => "ALCOHOL",
        Ssp => "SSP",
    }
);

impl ReviewFrequency {
    pub fn days(self) -> i64 {
        match self {
            ReviewFrequency::Monthly => 30,
            ReviewFrequency::Quarterly => 90,
            ReviewFrequency::HalfYearly => 180,
            ReviewFrequency::Yearly => 365,
        }
    }
}

// ───────────────────────────────────────
// Identity
// ───────────────────────────────────────
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct User {
    pub user_id: i64,
    pub username: String,
    pub full_name: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_superuser: bool,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Group {
    pub group_id: i64,
    pub name: String,
}

// ───────────────────────────────────────
// Configuration
// ───────────────────────────────────────
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct DepartmentConfig {
    pub department_id: i64,
    pub name: String,
    pub auto_follow_up_days: i32,
    pub predefined_actions: Json<Vec<String>>,   // ordered
    pub metadata_template: Json<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RoleSetting {
    #[serde(default)]
    pub role_setting_id: i64,
    pub role_name: String,
    #[serde(default)] pub can_case_create: bool,
    #[serde(default)] pub can_case_edit: bool,
    #[serde(default)] pub can_task_create: bool,
    #[serde(default)] pub can_task_edit: bool,
    #[serde(default)] pub can_note_add: bool,
    #[serde(default)] pub can_manage_settings: bool,
}

// ───────────────────────────────────────
// Cases
// ───────────────────────────────────────

/// The staff-editable part of a case, shared by the create body and the stored row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CaseFields {
    pub uhid: String,
    #[serde(default)] pub first_name: String,
    #[serde(default)] pub last_name: String,
    #[serde(default)] pub gender: Option<Gender>,
    #[serde(default)] pub date_of_birth: Option<NaiveDate>,
    #[serde(default)] pub age: Option<i32>,
    #[serde(default)] pub place: String,
    pub phone_number: String,
    #[serde(default)] pub alternate_phone_number: String,
    pub category_id: i64,
    #[serde(default = "default_case_status")] pub status: CaseStatus,
    #[serde(default)] pub diagnosis: String,
    #[serde(default)] pub ncd_flags: Vec<String>,
    #[serde(default)] pub referred_by: String,
    #[serde(default)] pub high_risk: bool,
    #[serde(default)] pub lmp: Option<NaiveDate>,
    #[serde(default)] pub edd: Option<NaiveDate>,
    #[serde(default)] pub usg_edd: Option<NaiveDate>,
    #[serde(default)] pub surgical_pathway: Option<SurgicalPathway>,
    #[serde(default)] pub surgery_done: bool,
    #[serde(default)] pub review_frequency: Option<ReviewFrequency>,
    #[serde(default)] pub review_date: Option<NaiveDate>,
    #[serde(default)] pub surgery_date: Option<NaiveDate>,
    #[serde(default)] pub gravida: Option<i32>,
    #[serde(default)] pub para: Option<i32>,
    #[serde(default)] pub abortions: Option<i32>,
    #[serde(default)] pub living: Option<i32>,
    #[serde(default = "empty_object")] pub metadata: serde_json::Value,
    #[serde(default)] pub notes: String,
}
fn default_case_status() -> CaseStatus { CaseStatus::Active }
fn empty_object() -> serde_json::Value { serde_json::json!({}) }

impl CaseFields {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim()).trim().to_string()
    }

    /// USG-based EDD wins over the LMP-based one.
    pub fn effective_edd(&self) -> Option<NaiveDate> {
        self.usg_edd.or(self.edd)
    }

    pub fn trimester(&self, today: NaiveDate) -> Option<&'static str> {
        let lmp = self.lmp?;
        let weeks = ((today - lmp).num_days() / 7).max(0);
        Some(match weeks {
            0..=12 => "First",
            13..=27 => "Second",
            _ => "Third",
        })
    }
}

/// Completed years between `dob` and `today`.
pub fn age_on(dob: NaiveDate, today: NaiveDate) -> i32 {
    let mut years = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        years -= 1;
    }
    years
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Case {
    pub case_id: i64,
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub fields: CaseFields,
    pub patient_name: String,
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial update; absent fields keep their stored value, `null` clears a nullable one.
#[derive(Debug, Default, Deserialize)]
pub struct CasePatch {
    pub uhid: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "nullable")] pub gender: Option<Option<Gender>>,
    #[serde(default, deserialize_with = "nullable")] pub date_of_birth: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub age: Option<Option<i32>>,
    pub place: Option<String>,
    pub phone_number: Option<String>,
    pub alternate_phone_number: Option<String>,
    pub category_id: Option<i64>,
    pub status: Option<CaseStatus>,
    pub diagnosis: Option<String>,
    pub ncd_flags: Option<Vec<String>>,
    pub referred_by: Option<String>,
    pub high_risk: Option<bool>,
    #[serde(default, deserialize_with = "nullable")] pub lmp: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub edd: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub usg_edd: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub surgical_pathway: Option<Option<SurgicalPathway>>,
    pub surgery_done: Option<bool>,
    #[serde(default, deserialize_with = "nullable")] pub review_frequency: Option<Option<ReviewFrequency>>,
    #[serde(default, deserialize_with = "nullable")] pub review_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub surgery_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "nullable")] pub gravida: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")] pub para: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")] pub abortions: Option<Option<i32>>,
    #[serde(default, deserialize_with = "nullable")] pub living: Option<Option<i32>>,
    pub metadata: Option<serde_json::Value>,
    pub notes: Option<String>,
}

/// Keeps "key present with null" distinct from "key absent" for patch bodies.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

macro_rules! merge {
    ($patch:ident, $fields:ident; $($plain:ident),+; $($optional:ident),+) => {
        $(if let Some(v) = $patch.$plain { $fields.$plain = v; })+
        $(if let Some(v) = $patch.$optional { $fields.$optional = v; })+
    };
}

impl CasePatch {
    pub fn apply(self, fields: &mut CaseFields) {
        let patch = self;
        merge!(patch, fields;
            uhid, first_name, last_name, place, phone_number, alternate_phone_number,
            category_id, status, diagnosis, ncd_flags, referred_by, high_risk,
            surgery_done, metadata, notes;
            gender, date_of_birth, age, lmp, edd, usg_edd, surgical_pathway,
            review_frequency, review_date, surgery_date, gravida, para, abortions, living);
    }
}

// ───────────────────────────────────────
// Tasks, activity, calls
// ───────────────────────────────────────
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Task {
    pub task_id: i64,
    pub case_id: i64,
    pub title: String,
    pub due_date: NaiveDate,
    pub status: TaskStatus,
    pub assigned_user_id: Option<i64>,
    pub task_type: TaskType,
    pub frequency_label: String,
    pub notes: String,
    pub completed_at: Option<DateTime<Utc>>,   // set iff status = COMPLETED
    pub created_by: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskBody {
    pub title: String,
    pub due_date: NaiveDate,
    #[serde(default = "default_task_status")] pub status: TaskStatus,
    #[serde(default)] pub assigned_user_id: Option<i64>,
    #[serde(default = "default_task_type")] pub task_type: TaskType,
    #[serde(default)] pub frequency_label: String,
    #[serde(default)] pub notes: String,
}
fn default_task_status() -> TaskStatus { TaskStatus::Scheduled }
fn default_task_type() -> TaskType { TaskType::Custom }

#[derive(Debug, Default, Deserialize)]
pub struct PatchTaskBody {
    pub title: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub status: Option<TaskStatus>,
    #[serde(default, deserialize_with = "nullable")]
    pub assigned_user_id: Option<Option<i64>>,
    pub task_type: Option<TaskType>,
    pub frequency_label: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CaseActivityLog {
    pub activity_log_id: i64,
    pub case_id: i64,
    pub task_id: Option<i64>,
    pub user_id: Option<i64>,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CallLog {
    pub call_log_id: i64,
    pub case_id: i64,
    pub task_id: Option<i64>,
    pub outcome: CallOutcome,
    pub notes: String,
    pub staff_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn text_enums_parse_their_stored_codes() {
        assert_eq!("LOSS_TO_FOLLOW_UP".parse::<CaseStatus>().unwrap(), CaseStatus::LossToFollowUp);
        assert_eq!(CallCommunicationStatus::NotContacted.as_str(), "NONE");
        assert!("loss".parse::<CaseStatus>().is_err());
        let json = serde_json::to_string(&TaskStatus::AwaitingReports).unwrap();
        assert_eq!(json, "\"AWAITING_REPORTS\"");
    }

    #[test]
    fn patch_null_clears_and_absent_keeps() {
        let mut fields: CaseFields = serde_json::from_value(serde_json::json!({
            "uhid": "UH-9", "phone_number": "9876543210", "category_id": 2,
            "review_date": "2026-12-01", "gravida": 2, "place": "Chennai"
        }))
        .unwrap();

        let patch: CasePatch = serde_json::from_str(r#"{"review_date": null, "place": "Madurai"}"#).unwrap();
        patch.apply(&mut fields);
        assert_eq!(fields.review_date, None);
        assert_eq!(fields.gravida, Some(2));
        assert_eq!(fields.place, "Madurai");

        let patch: CasePatch = serde_json::from_str(r#"{"gravida": 3}"#).unwrap();
        patch.apply(&mut fields);
        assert_eq!(fields.gravida, Some(3));
    }

    #[test]
    fn task_patch_distinguishes_unassign_from_absent() {
        let body: PatchTaskBody = serde_json::from_str(r#"{"assigned_user_id": null}"#).unwrap();
        assert_eq!(body.assigned_user_id, Some(None));
        let body: PatchTaskBody = serde_json::from_str(r#"{"title": "Scan"}"#).unwrap();
        assert_eq!(body.assigned_user_id, None);
    }

    #[test]
    fn age_counts_completed_years() {
        assert_eq!(age_on(d(1995, 1, 15), d(2026, 1, 14)), 30);
        assert_eq!(age_on(d(1995, 1, 15), d(2026, 1, 15)), 31);
    }

    #[test]
    fn patch_keeps_absent_fields() {
        let mut fields: CaseFields = serde_json::from_value(serde_json::json!({
            "uhid": "UH1", "first_name": "Asha", "phone_number": "9876543210",
            "category_id": 1, "place": "Chennai"
        }))
        .unwrap();
        assert_eq!(fields.status, CaseStatus::Active);

        let patch = CasePatch { place: Some("Pune".into()), gravida: Some(Some(2)), ..Default::default() };
        patch.apply(&mut fields);
        assert_eq!(fields.place, "Pune");
        assert_eq!(fields.gravida, Some(2));
        assert_eq!(fields.first_name, "Asha");
    }

    #[test]
    fn trimester_follows_weeks_since_lmp() {
        let mut fields: CaseFields = serde_json::from_value(serde_json::json!({
            "uhid": "UH2", "phone_number": "9876543210", "category_id": 1
        }))
        .unwrap();
        let today = d(2026, 6, 1);
        assert_eq!(fields.trimester(today), None);
        fields.lmp = Some(today - chrono::Duration::weeks(5));
        assert_eq!(fields.trimester(today), Some("First"));
        fields.lmp = Some(today - chrono::Duration::weeks(20));
        assert_eq!(fields.trimester(today), Some("Second"));
        fields.lmp = Some(today - chrono::Duration::weeks(30));
        assert_eq!(fields.trimester(today), Some("Third"));
    }
}
