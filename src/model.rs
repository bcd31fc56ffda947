use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// What the operator asked to happen to a panel member's data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum RequestAction {
    Delete,
    Anonymize,
}

impl RequestAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestAction::Delete => "Delete",
            RequestAction::Anonymize => "Anonymize",
        }
    }

    pub fn parse_action(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "delete" => Some(RequestAction::Delete),
            "anonymize" => Some(RequestAction::Anonymize),
            _ => None,
        }
    }

    /// Past-tense label written to the finished store ("Deleted").
    pub fn performed_label(&self) -> &'static str {
        match self {
            RequestAction::Delete => "Deleted",
            RequestAction::Anonymize => "Anonymized",
        }
    }
}

/// Whether deletion endpoints really delete or are only read with GET.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ApiMode {
    #[default]
    Delete,
    DryRun,
}

impl ApiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiMode::Delete => "delete",
            ApiMode::DryRun => "dry_run",
        }
    }
}

/// How Anonymize requests are handled while anonymization is unavailable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizePolicy {
    #[default]
    SubstituteDelete,
    Reject,
}

/// What to do when a contact answered a survey none of the credentials can reach.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissingSurveyPolicy {
    #[default]
    Skip,
    Abort,
}

/// A row of the pending store. `action`, `requested_date` and `reason` are
/// optional here because operators may leave cells blank; the loader rejects
/// such rows before anything is sent to the platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeletionRequest {
    pub id: i64,
    pub contact_id: Option<String>,
    pub email: Option<String>,
    pub action: Option<RequestAction>,
    pub requested_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub enabled: bool,
}

/// Input for a new pending row.
#[derive(Debug, Clone, Default)]
pub struct NewRequest {
    pub contact_id: Option<String>,
    pub email: Option<String>,
    pub action: Option<RequestAction>,
    pub requested_date: Option<NaiveDate>,
    pub reason: Option<String>,
    pub enabled: bool,
}

/// One survey response of a contact, taken from the contact's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SurveyResponseRef {
    pub survey_id: String,
    pub response_id: String,
}

/// Append-only record of a completed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinishedRequest {
    pub id: i64,
    pub request_id: i64,
    pub contact_id: String,
    pub email: Option<String>,
    pub action_performed: String,
    pub requested_date: Option<NaiveDate>,
    pub reason: String,
    pub run_id: String,
    pub completed_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_action_is_case_insensitive() {
        assert_eq!(RequestAction::parse_action("delete"), Some(RequestAction::Delete));
        assert_eq!(
            RequestAction::parse_action(" Anonymize "),
            Some(RequestAction::Anonymize)
        );
        assert_eq!(RequestAction::parse_action("purge"), None);
    }

    #[test]
    fn policies_deserialize_from_snake_case() {
        let mode: ApiMode = serde_yaml::from_str("dry_run").unwrap();
        assert_eq!(mode, ApiMode::DryRun);
        let policy: AnonymizePolicy = serde_yaml::from_str("reject").unwrap();
        assert_eq!(policy, AnonymizePolicy::Reject);
        let missing: MissingSurveyPolicy = serde_yaml::from_str("abort").unwrap();
        assert_eq!(missing, MissingSurveyPolicy::Abort);
    }
}
