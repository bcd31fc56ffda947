//! Fills in directory contact ids for requests that only carry an email.
use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use tracing::{info, instrument};

use crate::db::{self, Pool};
use crate::loader::ActiveRequest;
use crate::survey::SurveyPlatform;

static CONTACT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^CID_[A-Za-z0-9]+$").expect("valid regex"));

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("email '{email}' (request {request_id}) is not in the directory")]
    EmailNotFound { request_id: i64, email: String },
    #[error("request {request_id} has neither a valid contact id nor an email")]
    NoIdentity { request_id: i64 },
}

/// Exact match only: the id ends up as a URL path segment.
pub fn is_contact_id(value: &str) -> bool {
    CONTACT_ID.is_match(value)
}

/// Make sure every request carries a directory contact id, searching by email
/// where needed. With `persist`, resolved ids are written back to the pending store.
#[instrument(skip_all)]
pub async fn resolve_contact_ids(
    pool: &Pool,
    platform: &dyn SurveyPlatform,
    mut requests: Vec<ActiveRequest>,
    persist: bool,
) -> Result<Vec<ActiveRequest>> {
    for active in requests.iter_mut() {
        let req = &mut active.request;
        if req.contact_id.as_deref().is_some_and(is_contact_id) {
            continue;
        }
        let Some(email) = req.email.clone() else {
            return Err(ResolveError::NoIdentity { request_id: req.id }.into());
        };
        let contact = platform
            .search_contact_by_email(&email)
            .await
            .with_context(|| format!("contact lookup for request {} failed", req.id))?
            .ok_or(ResolveError::EmailNotFound {
                request_id: req.id,
                email: email.clone(),
            })?;
        info!(request_id = req.id, contact_id = %contact.id, "resolved contact by email");
        if persist {
            db::set_contact_id(pool, req.id, &contact.id).await?;
        }
        req.contact_id = Some(contact.id);
    }
    Ok(requests)
}
