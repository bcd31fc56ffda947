use anyhow::Result;
use tracing::{info, instrument};

use crate::config::Config;
use crate::db::Pool;
use crate::executor::{self, RunContext, RunOptions, RunReport};
use crate::key_index;
use crate::loader;
use crate::model::ApiMode;
use crate::resolver;
use crate::survey::SurveyPlatform;

/// One full batch: load, resolve contacts, index survey credentials, execute.
///
/// Loading and resolution failures abort before anything is deleted and are
/// returned as errors. Failures during execution are carried in the report.
#[instrument(skip_all, fields(mode = mode.as_str()))]
pub async fn run_batch(
    cfg: &Config,
    pool: &Pool,
    platform: &dyn SurveyPlatform,
    mode: ApiMode,
) -> Result<RunReport> {
    let options = RunOptions::new(
        mode,
        cfg.app.missing_survey_policy,
        cfg.platform.whitelisted_statuses.clone(),
    );

    let active = loader::load_active_requests(pool, cfg.app.anonymize_policy).await?;
    if active.is_empty() {
        info!("no active requests");
        return Ok(RunReport {
            run_id: options.run_id,
            mode,
            outcomes: Vec::new(),
            finished: Vec::new(),
            failure: None,
            not_attempted: 0,
        });
    }

    let active =
        resolver::resolve_contact_ids(pool, platform, active, mode == ApiMode::Delete).await?;
    let index = key_index::build_survey_key_index(platform, &cfg.platform.credentials).await?;

    info!(run_id = %options.run_id, requests = active.len(), "processing requests");
    let ctx = RunContext {
        pool,
        platform,
        index: &index,
        options,
    };
    Ok(executor::execute_requests(&ctx, &active).await)
}
