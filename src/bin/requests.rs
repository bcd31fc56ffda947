use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use panel_purge::config;
use panel_purge::db::{self, FinishedFilter, PendingEdit};
use panel_purge::model::{NewRequest, RequestAction};

#[derive(Debug, Parser)]
#[command(author, version, about = "Manage the pending and finished deletion request stores")]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Queue a new deletion request
    Add {
        /// Directory contact id (CID_...), if known
        #[arg(long)]
        contact_id: Option<String>,
        /// Email address of the panel member
        #[arg(long)]
        email: Option<String>,
        /// Delete or Anonymize
        #[arg(long, default_value = "Delete", value_parser = parse_action)]
        action: RequestAction,
        /// Date the member asked for deletion (YYYY-MM-DD), defaults to today
        #[arg(long)]
        requested: Option<NaiveDate>,
        /// Internal note on why deletion was requested
        #[arg(long)]
        reason: String,
        /// Queue the request disabled so the next run ignores it
        #[arg(long)]
        disabled: bool,
    },
    /// List pending requests
    List,
    /// Include a pending request in the next run
    Enable { id: i64 },
    /// Exclude a pending request from the next run
    Disable { id: i64 },
    /// Change fields of a pending request
    Edit {
        id: i64,
        #[arg(long)]
        contact_id: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, value_parser = parse_action)]
        action: Option<RequestAction>,
        #[arg(long)]
        requested: Option<NaiveDate>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Remove a pending request without processing it
    Remove { id: i64 },
    /// List finished requests, newest first
    Finished {
        /// Only requests completed on or after this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,
        /// Only requests completed on or before this date (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,
    },
}

fn parse_action(s: &str) -> Result<RequestAction, String> {
    RequestAction::parse_action(s).ok_or_else(|| format!("unknown action '{}'", s))
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn day_end(date: NaiveDate) -> Result<DateTime<Utc>> {
    date.and_hms_milli_opt(23, 59, 59, 999)
        .map(|dt| dt.and_utc())
        .ok_or_else(|| anyhow!("invalid date {}", date))
}

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

#[tokio::main]
async fn main() -> Result<()> {
    panel_purge::init_tracing();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let pool = db::init_pool(&cfg.database_url()).await?;
    db::run_migrations(&pool).await?;

    match args.command {
        Command::Add {
            contact_id,
            email,
            action,
            requested,
            reason,
            disabled,
        } => {
            if contact_id.is_none() && email.is_none() {
                return Err(anyhow!("provide --contact-id or --email"));
            }
            let id = db::insert_request(
                &pool,
                &NewRequest {
                    contact_id,
                    email,
                    action: Some(action),
                    requested_date: Some(requested.unwrap_or_else(|| Utc::now().date_naive())),
                    reason: Some(reason),
                    enabled: !disabled,
                },
            )
            .await?;
            println!("Queued request #{}", id);
        }
        Command::List => {
            let pending = db::list_pending(&pool).await?;
            if pending.is_empty() {
                println!("No pending requests.");
            }
            for r in pending {
                println!(
                    "#{:<5} {:<3} {:<24} {:<32} {:<9} {:<10} {}",
                    r.id,
                    if r.enabled { "on" } else { "off" },
                    show(r.contact_id.as_deref()),
                    show(r.email.as_deref()),
                    r.action.map(|a| a.as_str()).unwrap_or("-"),
                    r.requested_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".into()),
                    show(r.reason.as_deref()),
                );
            }
        }
        Command::Enable { id } => {
            db::set_enabled(&pool, id, true).await?;
            println!("Enabled request #{}", id);
        }
        Command::Disable { id } => {
            db::set_enabled(&pool, id, false).await?;
            println!("Disabled request #{}", id);
        }
        Command::Edit {
            id,
            contact_id,
            email,
            action,
            requested,
            reason,
        } => {
            let edit = PendingEdit {
                contact_id,
                email,
                action,
                requested_date: requested,
                reason,
            };
            db::update_pending(&pool, id, &edit).await?;
            println!("Updated request #{}", id);
        }
        Command::Remove { id } => {
            db::delete_pending(&pool, id).await?;
            println!("Removed request #{}", id);
        }
        Command::Finished { from, to } => {
            let filter = FinishedFilter {
                from: from.map(day_start),
                to: to.map(day_end).transpose()?,
            };
            let finished = db::list_finished(&pool, &filter).await?;
            if finished.is_empty() {
                println!("No finished requests.");
            }
            for f in finished {
                println!(
                    "{} {:<24} {:<9} requested={} reason={} run={}",
                    f.completed_at.format("%Y-%m-%d %H:%M"),
                    f.contact_id,
                    f.action_performed,
                    f.requested_date
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "-".into()),
                    f.reason,
                    f.run_id,
                );
            }
        }
    }

    Ok(())
}
