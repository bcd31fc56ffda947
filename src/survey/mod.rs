//! Client for the survey platform's v3 REST API: directory contacts, contact
//! history, survey listing and response deletion.
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Credential, Platform};
use crate::model::ApiMode;

pub mod model;

pub use model::{parse_status, ApiStatus, ContactSummary, HistoryEntry, SurveySummary};
use model::{Envelope, Page};

const TOKEN_HEADER: &str = "X-API-TOKEN";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("unexpected response from {url} (HTTP {status}): {body}")]
    Decode {
        url: String,
        status: u16,
        body: String,
    },
    #[error("({status}) {message} [{url}]")]
    Status {
        url: String,
        status: u16,
        message: String,
    },
}

impl ApiError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Operations the deletion workflow needs from the platform.
#[async_trait]
pub trait SurveyPlatform: Send + Sync {
    /// First directory contact whose email equals `email`.
    async fn search_contact_by_email(&self, email: &str) -> Result<Option<ContactSummary>>;

    /// Complete response history of a contact, all pages.
    async fn contact_history(&self, contact_id: &str) -> Result<Vec<HistoryEntry>>;

    /// All surveys reachable with `credential`, all pages.
    async fn list_surveys(&self, credential: &Credential) -> Result<Vec<SurveySummary>>;

    async fn delete_survey_response(
        &self,
        credential: &Credential,
        survey_id: &str,
        response_id: &str,
    ) -> Result<ApiStatus>;

    async fn delete_contact(&self, contact_id: &str) -> Result<ApiStatus>;
}

#[derive(Clone)]
pub struct SurveyClient {
    http: Client,
    base_url: Url,
    directory_id: String,
    directory_token: String,
    page_size: u32,
    mode: ApiMode,
}

impl fmt::Debug for SurveyClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurveyClient")
            .field("base_url", &self.base_url)
            .field("directory_id", &self.directory_id)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SurveyClient {
    pub fn from_config(platform: &Platform, mode: ApiMode, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(platform.base_url.trim()).context("invalid platform.base_url")?;
        let http = Client::builder()
            .user_agent(concat!("panel-purge/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url,
            directory_id: platform.directory_id.clone(),
            directory_token: platform.directory_token.clone(),
            page_size: platform.page_size,
            mode,
        })
    }

    pub fn mode(&self) -> ApiMode {
        self.mode
    }

    /// `{base}/API/v3/{segments...}`. Every segment is percent-encoded on its
    /// own, so an id can never climb out of the resource it names.
    fn api_url(&self, segments: &[&str]) -> Result<Url> {
        if let Some(bad) = segments
            .iter()
            .find(|s| s.is_empty() || **s == "." || **s == "..")
        {
            bail!("refusing to build platform URL with path segment {:?}", bad);
        }
        let mut url = self.base_url.clone();
        url.set_query(None);
        url.set_fragment(None);
        url.path_segments_mut()
            .map_err(|_| anyhow!("platform.base_url cannot carry a path"))?
            .pop_if_empty()
            .extend(["API", "v3"])
            .extend(segments);
        Ok(url)
    }

    pub fn contact_search_url(&self) -> Result<Url> {
        self.api_url(&["directories", self.directory_id.as_str(), "contacts", "search"])
    }

    pub fn contact_url(&self, contact_id: &str) -> Result<Url> {
        self.api_url(&["directories", self.directory_id.as_str(), "contacts", contact_id])
    }

    pub fn contact_history_url(&self, contact_id: &str) -> Result<Url> {
        let mut url = self.api_url(&[
            "directories",
            self.directory_id.as_str(),
            "contacts",
            contact_id,
            "history",
        ])?;
        url.query_pairs_mut()
            .append_pair("type", "response")
            .append_pair("pageSize", &self.page_size.to_string());
        Ok(url)
    }

    pub fn surveys_url(&self) -> Result<Url> {
        self.api_url(&["surveys"])
    }

    pub fn survey_response_url(&self, survey_id: &str, response_id: &str) -> Result<Url> {
        self.api_url(&["surveys", survey_id, "responses", response_id])
    }

    /// Method used for destructive calls; dry runs only read the resource.
    fn deletion_method(&self) -> Method {
        match self.mode {
            ApiMode::Delete => Method::DELETE,
            ApiMode::DryRun => Method::GET,
        }
    }

    pub fn build_request(
        &self,
        method: Method,
        url: Url,
        token: &str,
        body: Option<&Value>,
    ) -> Result<reqwest::Request> {
        let mut builder = self
            .http
            .request(method, url)
            .header(TOKEN_HEADER, token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.build().context("failed to build platform request")
    }

    async fn execute(&self, request: reqwest::Request) -> Result<(StatusCode, String), ApiError> {
        let url = request.url().to_string();
        debug!(method = %request.method(), %url, "platform request");
        for (name, value) in request.headers() {
            if name.as_str().eq_ignore_ascii_case(TOKEN_HEADER) {
                debug!("  {}: [REDACTED]", name);
            } else {
                debug!("  {}: {}", name, value.to_str().unwrap_or("[invalid]"));
            }
        }

        let res = self
            .http
            .execute(request)
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;
        debug!(%status, "platform response");
        if status == StatusCode::TOO_MANY_REQUESTS {
            warn!(%url, "rate limited by platform");
        }
        Ok((status, body))
    }

    /// Send a request and decode its envelope, mapping any non-200 status to
    /// `ApiError::Status`.
    async fn fetch_envelope<T: DeserializeOwned>(
        &self,
        request: reqwest::Request,
    ) -> Result<T, ApiError> {
        let url = request.url().to_string();
        let (status, body) = self.execute(request).await?;
        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(env) => env,
            Err(_) if !status.is_success() => {
                return Err(ApiError::Status {
                    url,
                    status: status.as_u16(),
                    message: body,
                })
            }
            Err(_) => {
                return Err(ApiError::Decode {
                    url,
                    status: status.as_u16(),
                    body,
                })
            }
        };
        let code = parse_status(&envelope.meta.http_status).unwrap_or(status.as_u16());
        if code != 200 {
            let message = envelope
                .meta
                .error
                .map(|e| e.error_message)
                .unwrap_or_else(|| envelope.meta.http_status.clone());
            return Err(ApiError::Status {
                url,
                status: code,
                message,
            });
        }
        envelope.result.ok_or(ApiError::Decode {
            url,
            status: code,
            body,
        })
    }

    /// Follow `nextPage` links from `first` and collect every element.
    pub async fn fetch_all_pages<T: DeserializeOwned>(
        &self,
        first: Url,
        token: &str,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first);
        while let Some(url) = next.take() {
            let request = self.build_request(Method::GET, url.clone(), token, None)?;
            let page: Page<T> = self.fetch_envelope(request).await?;
            items.extend(page.elements);
            if let Some(raw) = page.next_page.filter(|s| !s.trim().is_empty()) {
                let parsed = Url::parse(&raw)
                    .or_else(|_| self.base_url.join(&raw))
                    .with_context(|| format!("invalid nextPage {}", raw))?;
                if parsed == url {
                    warn!(%url, "nextPage points at the current page; stopping");
                } else {
                    next = Some(parsed);
                }
            }
        }
        Ok(items)
    }

    /// Send a destructive call and report the status instead of failing on it,
    /// so callers decide which statuses are acceptable.
    async fn send_deletion(&self, url: Url, token: &str) -> Result<ApiStatus> {
        let request = self.build_request(self.deletion_method(), url, token, None)?;
        let (status, body) = self.execute(request).await?;
        match serde_json::from_str::<Envelope<Value>>(&body) {
            Ok(env) => {
                let code = parse_status(&env.meta.http_status).unwrap_or(status.as_u16());
                Ok(ApiStatus {
                    code,
                    message: env.meta.error.map(|e| e.error_message),
                })
            }
            Err(_) => Ok(ApiStatus {
                code: status.as_u16(),
                message: (!body.trim().is_empty()).then_some(body),
            }),
        }
    }
}

#[async_trait]
impl SurveyPlatform for SurveyClient {
    async fn search_contact_by_email(&self, email: &str) -> Result<Option<ContactSummary>> {
        let body = json!({
            "filter": {
                "filterType": "email",
                "comparison": "eq",
                "value": email,
            }
        });
        let request = self.build_request(
            Method::POST,
            self.contact_search_url()?,
            &self.directory_token,
            Some(&body),
        )?;
        let page: Page<ContactSummary> = self
            .fetch_envelope(request)
            .await
            .context("contact search failed")?;
        Ok(page.elements.into_iter().next())
    }

    async fn contact_history(&self, contact_id: &str) -> Result<Vec<HistoryEntry>> {
        let url = self.contact_history_url(contact_id)?;
        self.fetch_all_pages(url, &self.directory_token)
            .await
            .with_context(|| format!("failed to load response history of {}", contact_id))
    }

    async fn list_surveys(&self, credential: &Credential) -> Result<Vec<SurveySummary>> {
        self.fetch_all_pages(self.surveys_url()?, &credential.token)
            .await
            .with_context(|| format!("failed to list surveys for credential {}", credential.name))
    }

    async fn delete_survey_response(
        &self,
        credential: &Credential,
        survey_id: &str,
        response_id: &str,
    ) -> Result<ApiStatus> {
        let url = self.survey_response_url(survey_id, response_id)?;
        self.send_deletion(url, &credential.token).await
    }

    async fn delete_contact(&self, contact_id: &str) -> Result<ApiStatus> {
        let url = self.contact_url(contact_id)?;
        self.send_deletion(url, &self.directory_token).await
    }
}
