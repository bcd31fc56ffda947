//! Reads pending requests and turns them into validated, ready-to-run work.
use anyhow::Result;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{self, Pool};
use crate::model::{AnonymizePolicy, DeletionRequest, RequestAction};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error(
        "requests {ids:?} are incomplete: each needs a contact id or email, an action \
         (Delete or Anonymize), a request date and a reason"
    )]
    MissingData { ids: Vec<i64> },
    #[error("anonymization is not implemented; requests {ids:?} ask for it")]
    AnonymizationUnsupported { ids: Vec<i64> },
}

/// A request that passed validation: every field the executor needs is present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveRequest {
    pub request: DeletionRequest,
    pub action: RequestAction,
}

impl ActiveRequest {
    pub fn id(&self) -> i64 {
        self.request.id
    }
}

fn is_complete(req: &DeletionRequest) -> bool {
    let has_identity = req.contact_id.is_some() || req.email.is_some();
    let has_reason = req.reason.as_deref().is_some_and(|r| !r.trim().is_empty());
    has_identity && req.action.is_some() && req.requested_date.is_some() && has_reason
}

/// Keep enabled rows, reject incomplete ones and apply the anonymization policy.
pub fn prepare_requests(
    pending: Vec<DeletionRequest>,
    policy: AnonymizePolicy,
) -> Result<Vec<ActiveRequest>, LoadError> {
    let enabled: Vec<DeletionRequest> = pending.into_iter().filter(|r| r.enabled).collect();

    let missing: Vec<i64> = enabled
        .iter()
        .filter(|r| !is_complete(r))
        .map(|r| r.id)
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::MissingData { ids: missing });
    }

    let anonymize: Vec<i64> = enabled
        .iter()
        .filter(|r| r.action == Some(RequestAction::Anonymize))
        .map(|r| r.id)
        .collect();
    if !anonymize.is_empty() {
        match policy {
            AnonymizePolicy::Reject => {
                return Err(LoadError::AnonymizationUnsupported { ids: anonymize })
            }
            AnonymizePolicy::SubstituteDelete => {
                warn!(ids = ?anonymize, "anonymization unavailable; deleting instead");
            }
        }
    }

    Ok(enabled
        .into_iter()
        .filter_map(|request| {
            let action = match request.action? {
                RequestAction::Anonymize => RequestAction::Delete,
                other => other,
            };
            Some(ActiveRequest { request, action })
        })
        .collect())
}

/// Load every enabled pending request, oldest first.
pub async fn load_active_requests(
    pool: &Pool,
    policy: AnonymizePolicy,
) -> Result<Vec<ActiveRequest>> {
    let pending = db::list_pending(pool).await?;
    let total = pending.len();
    let active = prepare_requests(pending, policy)?;
    info!(total, active = active.len(), "loaded pending requests");
    Ok(active)
}
