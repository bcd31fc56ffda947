use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info};

use panel_purge::model::ApiMode;
use panel_purge::survey::SurveyClient;
use panel_purge::{config, db, runner};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Delete panel members' survey responses and directory contacts for every enabled pending request"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Probe deletion endpoints with GET and leave both stores untouched
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    panel_purge::init_tracing();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    let mode = if args.dry_run {
        ApiMode::DryRun
    } else {
        cfg.app.mode
    };
    let client = SurveyClient::from_config(
        &cfg.platform,
        mode,
        Duration::from_secs(cfg.app.request_timeout_seconds),
    )?;

    let report = runner::run_batch(&cfg, &pool, &client, mode).await?;

    for outcome in &report.outcomes {
        println!(
            "#{:<5} {:<24} {:<9} responses={} skipped_surveys={}",
            outcome.request_id,
            outcome.contact_id,
            outcome.action_performed,
            outcome.responses_deleted,
            outcome.surveys_skipped.len()
        );
    }
    let remaining = db::count_pending(&pool).await?;
    info!(
        run_id = %report.run_id,
        mode = report.mode.as_str(),
        processed = report.outcomes.len(),
        recorded = report.finished.len(),
        pending = remaining,
        "run finished"
    );

    if let Err(err) = report.into_result() {
        error!("{:#}", err);
        return Err(err);
    }
    Ok(())
}
