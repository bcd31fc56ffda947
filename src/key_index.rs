use anyhow::Result;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::config::Credential;
use crate::survey::SurveyPlatform;

/// Which credential can reach which survey. Built fresh for every run.
#[derive(Debug, Default, Clone)]
pub struct SurveyKeyIndex {
    by_survey: HashMap<String, Credential>,
}

impl SurveyKeyIndex {
    pub fn credential_for(&self, survey_id: &str) -> Option<&Credential> {
        self.by_survey.get(survey_id)
    }

    pub fn insert(&mut self, survey_id: impl Into<String>, credential: Credential) {
        self.by_survey.insert(survey_id.into(), credential);
    }

    pub fn len(&self) -> usize {
        self.by_survey.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_survey.is_empty()
    }

    /// `(survey_id, credential name)` pairs sorted by survey id.
    pub fn entries(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .by_survey
            .iter()
            .map(|(survey, cred)| (survey.as_str(), cred.name.as_str()))
            .collect();
        out.sort_unstable();
        out
    }
}

/// List every survey of every credential. A survey reachable by several
/// credentials maps to the one listed last.
pub async fn build_survey_key_index(
    platform: &dyn SurveyPlatform,
    credentials: &[Credential],
) -> Result<SurveyKeyIndex> {
    let mut index = SurveyKeyIndex::default();
    for credential in credentials {
        let surveys = platform.list_surveys(credential).await?;
        debug!(credential = %credential.name, surveys = surveys.len(), "listed surveys");
        for survey in surveys {
            index.insert(survey.id, credential.clone());
        }
    }
    info!(surveys = index.len(), credentials = credentials.len(), "built survey key index");
    Ok(index)
}
