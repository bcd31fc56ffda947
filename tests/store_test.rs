use chrono::{NaiveDate, TimeZone, Utc};

use panel_purge::db::{self, FinishedFilter, PendingEdit};
use panel_purge::model::{NewRequest, RequestAction};

async fn setup_pool() -> sqlx::SqlitePool {
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

fn new_request(email: &str, date: Option<NaiveDate>) -> NewRequest {
    NewRequest {
        contact_id: None,
        email: Some(email.to_string()),
        action: Some(RequestAction::Delete),
        requested_date: date,
        reason: Some("email_opt_out".into()),
        enabled: true,
    }
}

#[tokio::test]
async fn pending_rows_sort_by_requested_date() {
    let pool = setup_pool().await;
    let late = db::insert_request(
        &pool,
        &new_request("late@example.com", NaiveDate::from_ymd_opt(2024, 5, 2)),
    )
    .await
    .unwrap();
    let undated = db::insert_request(&pool, &new_request("undated@example.com", None))
        .await
        .unwrap();
    let early = db::insert_request(
        &pool,
        &new_request("early@example.com", NaiveDate::from_ymd_opt(2024, 1, 9)),
    )
    .await
    .unwrap();

    let ids: Vec<i64> = db::list_pending(&pool)
        .await
        .unwrap()
        .iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![early, late, undated]);
    assert_eq!(db::count_pending(&pool).await.unwrap(), 3);
}

#[tokio::test]
async fn blank_cells_read_back_as_missing() {
    let pool = setup_pool().await;
    let id = db::insert_request(
        &pool,
        &NewRequest {
            contact_id: Some("  ".into()),
            email: Some("a@example.com".into()),
            action: None,
            requested_date: None,
            reason: Some("".into()),
            enabled: false,
        },
    )
    .await
    .unwrap();

    let row = db::get_pending(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.contact_id, None);
    assert_eq!(row.action, None);
    assert_eq!(row.reason, None);
    assert!(!row.enabled);
}

#[tokio::test]
async fn padded_cells_read_back_trimmed() {
    let pool = setup_pool().await;
    let id = db::insert_request(
        &pool,
        &NewRequest {
            contact_id: Some(" CID_real ".into()),
            email: Some("\ta@example.com ".into()),
            action: Some(RequestAction::Delete),
            requested_date: None,
            reason: Some(" email_opt_out".into()),
            enabled: true,
        },
    )
    .await
    .unwrap();

    let row = db::get_pending(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.contact_id.as_deref(), Some("CID_real"));
    assert_eq!(row.email.as_deref(), Some("a@example.com"));
    assert_eq!(row.reason.as_deref(), Some("email_opt_out"));
}

#[tokio::test]
async fn enable_edit_and_remove() {
    let pool = setup_pool().await;
    let id = db::insert_request(&pool, &new_request("a@example.com", None))
        .await
        .unwrap();

    db::set_enabled(&pool, id, false).await.unwrap();
    assert!(!db::get_pending(&pool, id).await.unwrap().unwrap().enabled);
    assert!(db::set_enabled(&pool, id + 100, true).await.is_err());

    db::update_pending(
        &pool,
        id,
        &PendingEdit {
            action: Some(RequestAction::Anonymize),
            requested_date: NaiveDate::from_ymd_opt(2024, 2, 29),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let row = db::get_pending(&pool, id).await.unwrap().unwrap();
    assert_eq!(row.action, Some(RequestAction::Anonymize));
    assert_eq!(row.requested_date, NaiveDate::from_ymd_opt(2024, 2, 29));
    assert_eq!(row.email.as_deref(), Some("a@example.com"));
    assert_eq!(row.reason.as_deref(), Some("email_opt_out"));

    assert!(db::update_pending(&pool, id, &PendingEdit::default())
        .await
        .is_err());

    db::set_contact_id(&pool, id, "CID_5").await.unwrap();
    assert_eq!(
        db::get_pending(&pool, id)
            .await
            .unwrap()
            .unwrap()
            .contact_id
            .as_deref(),
        Some("CID_5")
    );

    db::delete_pending(&pool, id).await.unwrap();
    assert!(db::get_pending(&pool, id).await.unwrap().is_none());
    assert!(db::delete_pending(&pool, id).await.is_err());
}

#[tokio::test]
async fn complete_request_is_all_or_nothing() {
    let pool = setup_pool().await;
    let id = db::insert_request(
        &pool,
        &new_request("a@example.com", NaiveDate::from_ymd_opt(2024, 3, 1)),
    )
    .await
    .unwrap();
    let req = db::get_pending(&pool, id).await.unwrap().unwrap();
    let at = Utc.with_ymd_and_hms(2024, 3, 5, 10, 0, 0).unwrap();

    let finished = db::complete_request(&pool, &req, "CID_1", "Deleted", "run-1", at)
        .await
        .unwrap();
    assert_eq!(finished.request_id, id);
    assert_eq!(finished.completed_at, at);
    assert!(db::get_pending(&pool, id).await.unwrap().is_none());

    // the pending row is gone, so a second completion must not append anything
    assert!(
        db::complete_request(&pool, &req, "CID_1", "Deleted", "run-2", at)
            .await
            .is_err()
    );
    let all = db::list_finished(&pool, &FinishedFilter::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].email.as_deref(), Some("a@example.com"));
    assert_eq!(all[0].requested_date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(all[0].completed_at, at);
}

#[tokio::test]
async fn finished_can_be_filtered_by_completion_window() {
    let pool = setup_pool().await;
    let mut ids = Vec::new();
    for (n, day) in [(1, 1), (2, 10), (3, 20)] {
        let id = db::insert_request(
            &pool,
            &new_request(&format!("m{n}@example.com"), NaiveDate::from_ymd_opt(2024, 4, 1)),
        )
        .await
        .unwrap();
        let req = db::get_pending(&pool, id).await.unwrap().unwrap();
        let at = Utc.with_ymd_and_hms(2024, 4, day, 12, 0, 0).unwrap();
        db::complete_request(&pool, &req, &format!("CID_{n}"), "Deleted", "run", at)
            .await
            .unwrap();
        ids.push(id);
    }

    let all = db::list_finished(&pool, &FinishedFilter::default())
        .await
        .unwrap();
    let order: Vec<i64> = all.iter().map(|f| f.request_id).collect();
    assert_eq!(order, vec![ids[2], ids[1], ids[0]]);

    let window = FinishedFilter {
        from: Some(Utc.with_ymd_and_hms(2024, 4, 5, 0, 0, 0).unwrap()),
        to: Some(Utc.with_ymd_and_hms(2024, 4, 15, 0, 0, 0).unwrap()),
    };
    let mid = db::list_finished(&pool, &window).await.unwrap();
    assert_eq!(mid.len(), 1);
    assert_eq!(mid[0].contact_id, "CID_2");

    let since = FinishedFilter {
        from: Some(Utc.with_ymd_and_hms(2024, 4, 10, 12, 0, 0).unwrap()),
        to: None,
    };
    assert_eq!(db::list_finished(&pool, &since).await.unwrap().len(), 2);
}
