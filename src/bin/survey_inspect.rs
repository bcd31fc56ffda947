use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use panel_purge::config;
use panel_purge::executor::response_refs;
use panel_purge::key_index::build_survey_key_index;
use panel_purge::model::ApiMode;
use panel_purge::survey::{SurveyClient, SurveyPlatform};

/// Read-only view of which credential reaches which survey, and of a contact's responses.
#[derive(Parser, Debug)]
#[command(author, version)]
struct Args {
    /// Path to YAML config
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Contact id whose response history should be listed
    #[arg(long)]
    contact_id: Option<String>,

    /// Skip building the survey key index
    #[arg(long)]
    no_index: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    panel_purge::init_tracing();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    let client = SurveyClient::from_config(
        &cfg.platform,
        ApiMode::DryRun,
        Duration::from_secs(cfg.app.request_timeout_seconds),
    )?;

    let index = if args.no_index {
        None
    } else {
        let index = build_survey_key_index(&client, &cfg.platform.credentials).await?;
        println!("Surveys: {}", index.len());
        for (survey, credential) in index.entries() {
            println!("  {} -> {}", survey, credential);
        }
        Some(index)
    };

    if let Some(contact_id) = args.contact_id.as_deref() {
        let history = client.contact_history(contact_id).await?;
        let refs = response_refs(&history);
        println!("Contact {}: {} responses", contact_id, refs.len());
        for r in refs {
            let reach = index
                .as_ref()
                .map(|idx| {
                    idx.credential_for(&r.survey_id)
                        .map(|c| c.name.as_str())
                        .unwrap_or("unreachable")
                })
                .unwrap_or("?");
            println!("  {} / {} [{}]", r.survey_id, r.response_id, reach);
        }
    }
    Ok(())
}
