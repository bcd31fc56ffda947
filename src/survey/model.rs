use serde::Deserialize;

/// Common response envelope of the v3 API.
#[derive(Deserialize, Debug)]
pub struct Envelope<T> {
    pub meta: Meta,
    pub result: Option<T>,
}

#[derive(Deserialize, Debug)]
pub struct Meta {
    #[serde(rename = "httpStatus")]
    pub http_status: String,
    #[serde(default)]
    pub error: Option<MetaError>,
}

#[derive(Deserialize, Debug)]
pub struct MetaError {
    #[serde(rename = "errorMessage", default)]
    pub error_message: String,
}

/// One page of a list endpoint.
#[derive(Deserialize, Debug)]
pub struct Page<T> {
    #[serde(default = "Vec::new")]
    pub elements: Vec<T>,
    #[serde(rename = "nextPage", default)]
    pub next_page: Option<String>,
}

/// Entry of a contact's history when queried with `type=response`.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    #[serde(default)]
    pub survey_id: Option<String>,
    #[serde(default)]
    pub response_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SurveySummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ContactSummary {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Outcome of a deletion call: the numeric status and the platform's message, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiStatus {
    pub code: u16,
    pub message: Option<String>,
}

impl ApiStatus {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            message: None,
        }
    }

    pub fn with_message(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }
}

/// Extract the numeric code from an envelope status such as `"404 - Not Found"`.
pub fn parse_status(http_status: &str) -> Option<u16> {
    http_status
        .trim()
        .split(|c: char| !c.is_ascii_digit())
        .next()
        .filter(|digits| !digits.is_empty())
        .and_then(|digits| digits.parse().ok())
}
