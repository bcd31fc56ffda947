//! Runs validated requests against the platform and records what finished.
//!
//! Requests are handled one at a time. The first failure stops the run: the
//! failing request and everything after it stay pending, while every request
//! completed before it has already been moved to the finished store.
use anyhow::{Context, Result};
use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::db::{self, Pool};
use crate::key_index::SurveyKeyIndex;
use crate::loader::ActiveRequest;
use crate::model::{ApiMode, FinishedRequest, MissingSurveyPolicy, SurveyResponseRef};
use crate::survey::{ApiStatus, HistoryEntry, SurveyPlatform};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error(
        "survey response deletion failed: ({status}) {message} [{survey_id} : {response_id}]"
    )]
    ResponseDeletion {
        request_id: i64,
        survey_id: String,
        response_id: String,
        status: u16,
        message: String,
    },
    #[error("directory contact deletion failed: ({status}) {message} [{contact_id}]")]
    ContactDeletion {
        request_id: i64,
        contact_id: String,
        status: u16,
        message: String,
    },
    #[error(
        "survey {survey_id} (request {request_id}) is not reachable with any credential; \
         it was deleted or access has not been granted"
    )]
    SurveyNotAccessible { request_id: i64, survey_id: String },
    #[error("request {request_id} has no directory contact id")]
    MissingContactId { request_id: i64 },
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub run_id: String,
    pub mode: ApiMode,
    pub missing_survey: MissingSurveyPolicy,
    pub whitelisted_statuses: Vec<u16>,
}

impl RunOptions {
    pub fn new(mode: ApiMode, missing_survey: MissingSurveyPolicy, whitelist: Vec<u16>) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            mode,
            missing_survey,
            whitelisted_statuses: whitelist,
        }
    }

    fn is_whitelisted(&self, status: &ApiStatus) -> bool {
        self.whitelisted_statuses.contains(&status.code)
    }
}

pub struct RunContext<'a> {
    pub pool: &'a Pool,
    pub platform: &'a dyn SurveyPlatform,
    pub index: &'a SurveyKeyIndex,
    pub options: RunOptions,
}

/// What happened to one request on the platform side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub request_id: i64,
    pub contact_id: String,
    pub action_performed: String,
    pub responses_deleted: usize,
    pub surveys_skipped: Vec<String>,
}

#[derive(Debug)]
pub struct RunFailure {
    pub request_id: i64,
    pub error: anyhow::Error,
}

#[derive(Debug)]
pub struct RunReport {
    pub run_id: String,
    pub mode: ApiMode,
    pub outcomes: Vec<RequestOutcome>,
    pub finished: Vec<FinishedRequest>,
    pub failure: Option<RunFailure>,
    pub not_attempted: usize,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// Turn a failed run into an error while keeping the summary available to callers.
    pub fn into_result(self) -> Result<Self> {
        match self.failure {
            None => Ok(self),
            Some(RunFailure { request_id, error }) => Err(error.context(format!(
                "run {} aborted at request {} ({} finished, {} not attempted)",
                self.run_id,
                request_id,
                self.outcomes.len(),
                self.not_attempted
            ))),
        }
    }
}

/// One response per survey: entries without a response id are dropped and a
/// survey seen twice keeps its last response, at its first position.
pub fn response_refs(history: &[HistoryEntry]) -> Vec<SurveyResponseRef> {
    let mut refs: Vec<SurveyResponseRef> = Vec::new();
    let mut positions: HashMap<String, usize> = HashMap::new();
    for entry in history {
        let (Some(survey_id), Some(response_id)) = (&entry.survey_id, &entry.response_id) else {
            continue;
        };
        match positions.get(survey_id) {
            Some(&pos) => refs[pos].response_id = response_id.clone(),
            None => {
                positions.insert(survey_id.clone(), refs.len());
                refs.push(SurveyResponseRef {
                    survey_id: survey_id.clone(),
                    response_id: response_id.clone(),
                });
            }
        }
    }
    refs
}

/// Delete every survey response and then the directory contact of one request.
pub async fn process_request(
    ctx: &RunContext<'_>,
    active: &ActiveRequest,
) -> Result<RequestOutcome> {
    let request_id = active.id();
    let contact_id = active
        .request
        .contact_id
        .clone()
        .ok_or(ExecuteError::MissingContactId { request_id })?;

    let history = ctx.platform.contact_history(&contact_id).await?;
    let refs = response_refs(&history);
    debug!(entries = history.len(), responses = refs.len(), "loaded contact history");

    let mut deleted = 0usize;
    let mut skipped = Vec::new();
    for r in &refs {
        let Some(credential) = ctx.index.credential_for(&r.survey_id) else {
            match ctx.options.missing_survey {
                MissingSurveyPolicy::Skip => {
                    warn!(survey_id = %r.survey_id, "survey not reachable; skipping");
                    skipped.push(r.survey_id.clone());
                    continue;
                }
                MissingSurveyPolicy::Abort => {
                    return Err(ExecuteError::SurveyNotAccessible {
                        request_id,
                        survey_id: r.survey_id.clone(),
                    }
                    .into())
                }
            }
        };

        let status = ctx
            .platform
            .delete_survey_response(credential, &r.survey_id, &r.response_id)
            .await
            .with_context(|| format!("deleting response {} of {}", r.response_id, r.survey_id))?;
        if !ctx.options.is_whitelisted(&status) {
            return Err(ExecuteError::ResponseDeletion {
                request_id,
                survey_id: r.survey_id.clone(),
                response_id: r.response_id.clone(),
                status: status.code,
                message: status.message.unwrap_or_default(),
            }
            .into());
        }
        debug!(survey_id = %r.survey_id, status = status.code, credential = %credential.name, "response handled");
        deleted += 1;
    }

    let status = ctx
        .platform
        .delete_contact(&contact_id)
        .await
        .with_context(|| format!("deleting contact {}", contact_id))?;
    if !ctx.options.is_whitelisted(&status) {
        return Err(ExecuteError::ContactDeletion {
            request_id,
            contact_id,
            status: status.code,
            message: status.message.unwrap_or_default(),
        }
        .into());
    }

    Ok(RequestOutcome {
        request_id,
        contact_id,
        action_performed: active.action.performed_label().to_string(),
        responses_deleted: deleted,
        surveys_skipped: skipped,
    })
}

/// Process requests in order, stopping at the first failure. In delete mode
/// each completed request is moved to the finished store before the next starts.
pub async fn execute_requests(ctx: &RunContext<'_>, requests: &[ActiveRequest]) -> RunReport {
    let mut report = RunReport {
        run_id: ctx.options.run_id.clone(),
        mode: ctx.options.mode,
        outcomes: Vec::new(),
        finished: Vec::new(),
        failure: None,
        not_attempted: 0,
    };

    for (pos, active) in requests.iter().enumerate() {
        let span = info_span!("request", request_id = active.id(), run_id = %ctx.options.run_id);
        let result = async {
            let outcome = process_request(ctx, active).await?;
            let finished = match ctx.options.mode {
                ApiMode::Delete => Some(
                    db::complete_request(
                        ctx.pool,
                        &active.request,
                        &outcome.contact_id,
                        &outcome.action_performed,
                        &ctx.options.run_id,
                        Utc::now(),
                    )
                    .await
                    .context("failed to record finished request")?,
                ),
                ApiMode::DryRun => None,
            };
            Ok::<_, anyhow::Error>((outcome, finished))
        }
        .instrument(span)
        .await;

        match result {
            Ok((outcome, finished)) => {
                info!(
                    request_id = outcome.request_id,
                    responses = outcome.responses_deleted,
                    skipped = outcome.surveys_skipped.len(),
                    mode = ctx.options.mode.as_str(),
                    "request processed"
                );
                report.outcomes.push(outcome);
                report.finished.extend(finished);
            }
            Err(err) => {
                error!(request_id = active.id(), error = %format!("{:#}", err), "request failed; aborting run");
                report.failure = Some(RunFailure {
                    request_id: active.id(),
                    error: err,
                });
                report.not_attempted = requests.len() - pos - 1;
                break;
            }
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(survey: Option<&str>, response: Option<&str>) -> HistoryEntry {
        HistoryEntry {
            survey_id: survey.map(str::to_string),
            response_id: response.map(str::to_string),
        }
    }

    #[test]
    fn response_refs_drop_missing_ids() {
        let refs = response_refs(&[
            entry(Some("SV_1"), Some("R_1")),
            entry(Some("SV_2"), None),
            entry(None, Some("R_3")),
        ]);
        assert_eq!(
            refs,
            vec![SurveyResponseRef {
                survey_id: "SV_1".into(),
                response_id: "R_1".into()
            }]
        );
    }

    #[test]
    fn response_refs_keep_last_response_per_survey() {
        let refs = response_refs(&[
            entry(Some("SV_1"), Some("R_1")),
            entry(Some("SV_2"), Some("R_2")),
            entry(Some("SV_1"), Some("R_9")),
        ]);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].survey_id, "SV_1");
        assert_eq!(refs[0].response_id, "R_9");
        assert_eq!(refs[1].response_id, "R_2");
    }

    #[test]
    fn whitelist_accepts_configured_codes() {
        let opts = RunOptions::new(ApiMode::Delete, MissingSurveyPolicy::Skip, vec![200, 404]);
        assert!(opts.is_whitelisted(&ApiStatus::new(200)));
        assert!(opts.is_whitelisted(&ApiStatus::new(404)));
        assert!(!opts.is_whitelisted(&ApiStatus::new(401)));
        assert!(!opts.is_whitelisted(&ApiStatus::new(500)));
    }

    #[test]
    fn execute_error_messages_name_the_resource() {
        let err = ExecuteError::ResponseDeletion {
            request_id: 1,
            survey_id: "SV_1".into(),
            response_id: "R_1".into(),
            status: 403,
            message: "Forbidden".into(),
        };
        assert_eq!(
            err.to_string(),
            "survey response deletion failed: (403) Forbidden [SV_1 : R_1]"
        );
    }
}
