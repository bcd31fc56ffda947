//! Inputs accepted by the repository layer.
//!
//! Keep these structs focused on what a query needs. Validation of request
//! content lives in the loader.

use chrono::{DateTime, NaiveDate, Utc};

use crate::model::RequestAction;

/// Fields an operator may change on a pending row. `None` leaves a column untouched.
#[derive(Debug, Clone, Default)]
pub struct PendingEdit {
    pub contact_id: Option<String>,
    pub email: Option<String>,
    pub action: Option<RequestAction>,
    pub requested_date: Option<NaiveDate>,
    pub reason: Option<String>,
}

impl PendingEdit {
    pub fn is_empty(&self) -> bool {
        self.contact_id.is_none()
            && self.email.is_none()
            && self.action.is_none()
            && self.requested_date.is_none()
            && self.reason.is_none()
    }
}

/// Optional completion window for listing finished requests (inclusive).
#[derive(Debug, Clone, Default)]
pub struct FinishedFilter {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}
