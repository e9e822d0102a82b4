// src/domain/calls.rs

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{CallCommunicationStatus, CallLog, CallOutcome};

impl CallOutcome {
    pub fn is_failed_attempt(self) -> bool {
        matches!(
            self,
            CallOutcome::NoAnswer | CallOutcome::SwitchedOff | CallOutcome::CallRejected | CallOutcome::RudeBehavior
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CallSummary {
    pub status: CallCommunicationStatus,
    pub failed_attempt_count: u32,
    pub latest_outcome: Option<CallOutcome>,
    pub latest_logged_at: Option<DateTime<Utc>>,
}

impl Default for CallSummary {
    fn default() -> Self {
        Self {
            status: CallCommunicationStatus::NotContacted,
            failed_attempt_count: 0,
            latest_outcome: None,
            latest_logged_at: None,
        }
    }
}

/// Summarises one case's call history. `logs` must be newest first.
pub fn summarize_calls(logs: &[CallLog]) -> CallSummary {
    let Some(latest) = logs.first() else {
        return CallSummary::default();
    };

    let status = match latest.outcome {
        CallOutcome::AnsweredConfirmedVisit => CallCommunicationStatus::Confirmed,
        CallOutcome::PatientShifted => CallCommunicationStatus::Lost,
        CallOutcome::InvalidNumber => CallCommunicationStatus::InvalidContact,
        CallOutcome::CallBackLater => CallCommunicationStatus::CallBackLater,
        outcome if outcome.is_failed_attempt() => CallCommunicationStatus::NotReachable,
        _ => CallCommunicationStatus::NotContacted,
    };

    // A confirmed visit resets the counter.
    let failed_attempt_count = logs
        .iter()
        .take_while(|log| log.outcome != CallOutcome::AnsweredConfirmedVisit)
        .filter(|log| log.outcome.is_failed_attempt())
        .count() as u32;

    CallSummary {
        status,
        failed_attempt_count,
        latest_outcome: Some(latest.outcome),
        latest_logged_at: Some(latest.created_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    /// Builds a newest-first history from oldest-first outcomes.
    fn history(outcomes: &[CallOutcome]) -> Vec<CallLog> {
        let start = Utc::now() - Duration::days(1);
        let mut logs: Vec<CallLog> = outcomes
            .iter()
            .enumerate()
            .map(|(i, outcome)| CallLog {
                call_log_id: i as i64 + 1,
                case_id: 7,
                task_id: None,
                outcome: *outcome,
                notes: String::new(),
                staff_user_id: Some(1),
                created_at: start + Duration::minutes(i as i64),
            })
            .collect();
        logs.reverse();
        logs
    }

    #[test]
    fn empty_history_is_not_contacted() {
        let summary = summarize_calls(&[]);
        assert_eq!(summary.status, CallCommunicationStatus::NotContacted);
        assert_eq!(summary.failed_attempt_count, 0);
        assert_eq!(summary.latest_outcome, None);
    }

    #[test]
    fn confirmation_resets_failed_counter() {
        use CallOutcome::*;
        let summary = summarize_calls(&history(&[NoAnswer, CallRejected, AnsweredConfirmedVisit]));
        assert_eq!(summary.status, CallCommunicationStatus::Confirmed);
        assert_eq!(summary.failed_attempt_count, 0);
    }

    #[test]
    fn failures_after_confirmation_are_counted() {
        use CallOutcome::*;
        let logs = history(&[NoAnswer, NoAnswer, AnsweredConfirmedVisit, SwitchedOff, AnsweredUncertain, RudeBehavior]);
        let summary = summarize_calls(&logs);
        assert_eq!(summary.status, CallCommunicationStatus::NotReachable);
        assert_eq!(summary.failed_attempt_count, 2);
        assert_eq!(summary.latest_outcome, Some(RudeBehavior));
    }

    #[test]
    fn latest_outcome_drives_status() {
        use CallOutcome::*;
        assert_eq!(summarize_calls(&history(&[PatientShifted])).status, CallCommunicationStatus::Lost);
        assert_eq!(summarize_calls(&history(&[InvalidNumber])).status, CallCommunicationStatus::InvalidContact);
        assert_eq!(summarize_calls(&history(&[NoAnswer, CallBackLater])).status, CallCommunicationStatus::CallBackLater);
        assert_eq!(summarize_calls(&history(&[PatientDeclined])).status, CallCommunicationStatus::NotContacted);
    }
}
