use anyhow::Result;
use std::path::Path;
use std::time::Duration;

use panel_purge::config;
use panel_purge::key_index::build_survey_key_index;
use panel_purge::model::ApiMode;
use panel_purge::survey::SurveyClient;

// Needs a real ./config.yaml with working tokens: cargo test -- --ignored
#[tokio::test]
#[ignore]
async fn platform_it_builds_key_index_read_only() -> Result<()> {
    let cfg = config::load(Some(Path::new("./config.yaml")))?;
    let client = SurveyClient::from_config(
        &cfg.platform,
        ApiMode::DryRun,
        Duration::from_secs(cfg.app.request_timeout_seconds),
    )?;

    let index = build_survey_key_index(&client, &cfg.platform.credentials).await?;
    println!("Surveys reachable: {}", index.len());
    for (survey, credential) in index.entries().into_iter().take(10) {
        println!("  {} -> {}", survey, credential);
    }
    assert!(!index.is_empty());
    Ok(())
}
