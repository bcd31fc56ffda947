use super::model::{FinishedFilter, PendingEdit};
use crate::model::{DeletionRequest, FinishedRequest, NewRequest, RequestAction};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::{instrument, warn};

pub type Pool = SqlitePool;

const PENDING_COLUMNS: &str =
    "id, contact_id, email, action, requested_date, reason, enabled";

const FINISHED_COLUMNS: &str = "id, request_id, contact_id, email, action_performed, \
     requested_date, reason, run_id, completed_at";

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // Enable WAL and stricter durability.
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous=FULL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/`, ensure the parent
/// directory exists and ask SQLite to create the file. Leaves in-memory URLs
/// and other schemes untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(err) = std::fs::create_dir_all(parent) {
                warn!(path = %parent.display(), error = %err, "failed to create database directory");
            }
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded_path);
    match query_part {
        Some(q) if q.contains("mode=") => {
            rebuilt.push('?');
            rebuilt.push_str(q);
        }
        Some(q) => {
            rebuilt.push('?');
            rebuilt.push_str(q);
            rebuilt.push_str("&mode=rwc");
        }
        None => rebuilt.push_str("?mode=rwc"),
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

fn pending_from_row(row: &SqliteRow) -> Result<DeletionRequest> {
    let id: i64 = row.get("id");
    let action = match row.try_get::<Option<String>, _>("action")? {
        Some(raw) if !raw.trim().is_empty() => Some(
            RequestAction::parse_action(&raw)
                .ok_or_else(|| anyhow!("request {} has unknown action {}", id, raw))?,
        ),
        _ => None,
    };
    Ok(DeletionRequest {
        id,
        contact_id: non_blank(row.try_get("contact_id")?),
        email: non_blank(row.try_get("email")?),
        action,
        requested_date: row.try_get::<Option<NaiveDate>, _>("requested_date")?,
        reason: non_blank(row.try_get("reason")?),
        enabled: row.get::<bool, _>("enabled"),
    })
}

fn finished_from_row(row: &SqliteRow) -> Result<FinishedRequest> {
    Ok(FinishedRequest {
        id: row.get("id"),
        request_id: row.get("request_id"),
        contact_id: row.get("contact_id"),
        email: row.try_get("email")?,
        action_performed: row.get("action_performed"),
        requested_date: row.try_get::<Option<NaiveDate>, _>("requested_date")?,
        reason: row.get("reason"),
        run_id: row.get("run_id"),
        completed_at: row.try_get::<DateTime<Utc>, _>("completed_at")?,
    })
}

/// Cells are stored as typed by the operator; surrounding whitespace never
/// belongs to an id, email or reason.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[instrument(skip_all)]
pub async fn insert_request(pool: &Pool, req: &NewRequest) -> Result<i64> {
    let rec = sqlx::query(
        "INSERT INTO pending_requests (contact_id, email, action, requested_date, reason, enabled) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(req.contact_id.as_deref())
    .bind(req.email.as_deref())
    .bind(req.action.map(|a| a.as_str()))
    .bind(req.requested_date)
    .bind(req.reason.as_deref())
    .bind(req.enabled)
    .fetch_one(pool)
    .await?;
    Ok(rec.get("id"))
}

/// All pending rows, oldest request first; rows without a date sort last.
#[instrument(skip_all)]
pub async fn list_pending(pool: &Pool) -> Result<Vec<DeletionRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {PENDING_COLUMNS} FROM pending_requests \
         ORDER BY requested_date IS NULL, requested_date ASC, id ASC"
    ))
    .fetch_all(pool)
    .await?;
    rows.iter().map(pending_from_row).collect()
}

#[instrument(skip_all)]
pub async fn get_pending(pool: &Pool, id: i64) -> Result<Option<DeletionRequest>> {
    let row = sqlx::query(&format!(
        "SELECT {PENDING_COLUMNS} FROM pending_requests WHERE id = ?"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    row.as_ref().map(pending_from_row).transpose()
}

#[instrument(skip_all)]
pub async fn count_pending(pool: &Pool) -> Result<i64> {
    let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM pending_requests")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[instrument(skip_all)]
pub async fn set_enabled(pool: &Pool, id: i64, enabled: bool) -> Result<()> {
    let res = sqlx::query("UPDATE pending_requests SET enabled = ? WHERE id = ?")
        .bind(enabled)
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("pending request {} not found", id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn set_contact_id(pool: &Pool, id: i64, contact_id: &str) -> Result<()> {
    sqlx::query("UPDATE pending_requests SET contact_id = ? WHERE id = ?")
        .bind(contact_id)
        .bind(id)
        .execute(pool)
        .await
        .context("failed to persist resolved contact id")?;
    Ok(())
}

#[instrument(skip_all)]
pub async fn update_pending(pool: &Pool, id: i64, edit: &PendingEdit) -> Result<()> {
    if edit.is_empty() {
        return Err(anyhow!("nothing to update for pending request {}", id));
    }
    let res = sqlx::query(
        "UPDATE pending_requests SET \
            contact_id = COALESCE(?, contact_id), \
            email = COALESCE(?, email), \
            action = COALESCE(?, action), \
            requested_date = COALESCE(?, requested_date), \
            reason = COALESCE(?, reason) \
         WHERE id = ?",
    )
    .bind(edit.contact_id.as_deref())
    .bind(edit.email.as_deref())
    .bind(edit.action.map(|a| a.as_str()))
    .bind(edit.requested_date)
    .bind(edit.reason.as_deref())
    .bind(id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("pending request {} not found", id));
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn delete_pending(pool: &Pool, id: i64) -> Result<()> {
    let res = sqlx::query("DELETE FROM pending_requests WHERE id = ?")
        .bind(id)
        .execute(pool)
        .await?;
    if res.rows_affected() == 0 {
        return Err(anyhow!("pending request {} not found", id));
    }
    Ok(())
}

/// Append a finished record and remove its pending row in one transaction.
#[instrument(skip_all, fields(request_id = req.id))]
pub async fn complete_request(
    pool: &Pool,
    req: &DeletionRequest,
    contact_id: &str,
    action_performed: &str,
    run_id: &str,
    completed_at: DateTime<Utc>,
) -> Result<FinishedRequest> {
    let reason = req
        .reason
        .clone()
        .ok_or_else(|| anyhow!("request {} has no reason", req.id))?;

    let mut tx = pool.begin().await?;
    let finished_id: i64 = sqlx::query(
        "INSERT INTO finished_requests \
            (request_id, contact_id, email, action_performed, requested_date, reason, run_id, completed_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(req.id)
    .bind(contact_id)
    .bind(req.email.as_deref())
    .bind(action_performed)
    .bind(req.requested_date)
    .bind(&reason)
    .bind(run_id)
    .bind(completed_at)
    .fetch_one(&mut *tx)
    .await?
    .get("id");

    let removed = sqlx::query("DELETE FROM pending_requests WHERE id = ?")
        .bind(req.id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if removed == 0 {
        return Err(anyhow!("pending request {} vanished before completion", req.id));
    }
    tx.commit().await?;

    Ok(FinishedRequest {
        id: finished_id,
        request_id: req.id,
        contact_id: contact_id.to_string(),
        email: req.email.clone(),
        action_performed: action_performed.to_string(),
        requested_date: req.requested_date,
        reason,
        run_id: run_id.to_string(),
        completed_at,
    })
}

/// Finished requests, most recent first, optionally limited to a completion window.
#[instrument(skip_all)]
pub async fn list_finished(pool: &Pool, filter: &FinishedFilter) -> Result<Vec<FinishedRequest>> {
    let rows = sqlx::query(&format!(
        "SELECT {FINISHED_COLUMNS} FROM finished_requests \
         WHERE (? IS NULL OR datetime(completed_at) >= datetime(?)) \
           AND (? IS NULL OR datetime(completed_at) <= datetime(?)) \
         ORDER BY datetime(completed_at) DESC, id DESC"
    ))
    .bind(filter.from)
    .bind(filter.from)
    .bind(filter.to)
    .bind(filter.to)
    .fetch_all(pool)
    .await?;
    rows.iter().map(finished_from_row).collect()
}
