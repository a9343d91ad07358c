use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use estate_ingest::config::{AnalyzeConfig, DispatchConfig, MatchConfig};
use estate_ingest::models::{
    FilterCriteria, LocationScope, NewReadQueueItem, NotificationStatus, Range,
};
use estate_ingest::pipeline::{Analyzer, NotificationDispatcher, NotificationMatcher};
use estate_ingest::store::Store;
use estate_ingest::testing::{
    detail_payload, insert_filter, insert_user, seed_catalog, FilterFixture, RecordingNotifier,
};

fn match_config() -> MatchConfig {
    MatchConfig {
        batch_size: 2,
        window: chrono::Duration::hours(24),
    }
}

fn dispatch_config(max_attempts: i64, base_backoff: chrono::Duration) -> DispatchConfig {
    DispatchConfig {
        batch_size: 100,
        max_attempts,
        base_backoff,
    }
}

/// Fetched and analyzed post under Tehran city. Returns the post id.
async fn post(store: &Store, token: &str, payload: &Value) -> i64 {
    let item = NewReadQueueItem {
        external_id: token.to_string(),
        category_id: 3,
        category_slug: "buy-apartment".into(),
        location_scope: LocationScope::City,
        province_id: Some(8),
        city_id: Some(1),
        payload: json!({"data": {"token": token}}),
    };
    store
        .enqueue_read_items("divar", &[item], Utc::now())
        .await
        .unwrap();
    let reserved = store.reserve_read_items(1).await.unwrap().remove(0);
    store
        .complete_fetch(&reserved, payload, Utc::now())
        .await
        .unwrap();

    let analyzer = Analyzer::new(
        store.clone(),
        AnalyzeConfig {
            min_chunk_spacing: Duration::ZERO,
            ..Default::default()
        },
    );
    analyzer.process_pending_jobs(10).await.unwrap();
    store
        .find_post_by_read_queue_id(reserved.id)
        .await
        .unwrap()
        .unwrap()
        .id
}

struct Scenario {
    store: Store,
    big: i64,
    small: i64,
    by_area: i64,
    by_price: i64,
}

/// Two posts and three filters:
/// - `by_area` (user 1): Tehran city, buy-apartment, 100 to 150 m², elevator
/// - `by_price` (user 1): anything under real-estate up to 3 billion
/// - an inactive user's catch-all filter
async fn scenario() -> Scenario {
    let store = Store::in_memory().await.unwrap();
    seed_catalog(&store).await.unwrap();
    insert_user(&store, 1, true).await.unwrap();
    insert_user(&store, 2, false).await.unwrap();

    let by_area = insert_filter(
        &store,
        1,
        FilterFixture {
            city_id: Some(1),
            category_slug: Some("buy-apartment".into()),
            criteria: FilterCriteria {
                area: Range {
                    min: Some(Decimal::from(100)),
                    max: Some(Decimal::from(150)),
                },
                elevator: true,
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let by_price = insert_filter(
        &store,
        1,
        FilterFixture {
            category_slug: Some("real-estate".into()),
            criteria: FilterCriteria {
                total_price: Range {
                    min: None,
                    max: Some(Decimal::from(3_000_000_000i64)),
                },
                ..Default::default()
            },
            ..Default::default()
        },
    )
    .await
    .unwrap();

    insert_filter(&store, 2, FilterFixture::default()).await.unwrap();

    let big = post(&store, "big", &detail_payload("آپارتمان", "۱۲۰", "۴ میلیارد")).await;
    let small = post(&store, "small", &detail_payload("آپارتمان", "۹۰", "۲.۵ میلیارد")).await;

    Scenario {
        store,
        big,
        small,
        by_area,
        by_price,
    }
}

#[tokio::test]
async fn matches_each_post_against_active_filters() {
    let s = scenario().await;
    let matcher = NotificationMatcher::new(s.store.clone(), match_config());

    let stats = matcher.run_once().await.unwrap();
    assert_eq!(stats.posts_checked, 2);
    assert_eq!(stats.notifications_created, 2);

    let big = s.store.notifications_for_post(s.big).await.unwrap();
    assert_eq!(big.len(), 1);
    assert_eq!(big[0].saved_filter_id, s.by_area);
    assert_eq!(big[0].user_id, 1);
    assert_eq!(big[0].status, NotificationStatus::Pending);

    let small = s.store.notifications_for_post(s.small).await.unwrap();
    assert_eq!(small.len(), 1);
    assert_eq!(small[0].saved_filter_id, s.by_price);
}

#[tokio::test]
async fn checked_posts_are_not_matched_twice() {
    let s = scenario().await;
    let matcher = NotificationMatcher::new(s.store.clone(), match_config());
    matcher.run_once().await.unwrap();

    let again = matcher.run_once().await.unwrap();
    assert_eq!(again.posts_checked, 0);

    // Even if a post is re-opened for matching, a pair is notified once.
    sqlx::query("UPDATE posts SET notifications_checked = 0")
        .execute(s.store.pool())
        .await
        .unwrap();
    let reopened = matcher.run_once().await.unwrap();
    assert_eq!(reopened.posts_checked, 2);
    assert_eq!(reopened.notifications_created, 0);
    assert_eq!(s.store.notifications_for_post(s.big).await.unwrap().len(), 1);
}

#[tokio::test]
async fn posts_outside_the_window_are_ignored() {
    let s = scenario().await;
    sqlx::query("UPDATE posts SET created_at = ?")
        .bind(Utc::now() - chrono::Duration::days(2))
        .execute(s.store.pool())
        .await
        .unwrap();

    let matcher = NotificationMatcher::new(s.store.clone(), match_config());
    assert_eq!(matcher.run_once().await.unwrap().posts_checked, 0);
}

#[tokio::test]
async fn delivered_notification_is_marked_sent() {
    let s = scenario().await;
    NotificationMatcher::new(s.store.clone(), match_config())
        .run_once()
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::delivering());
    let dispatcher = NotificationDispatcher::new(
        s.store.clone(),
        notifier.clone(),
        dispatch_config(5, chrono::Duration::seconds(30)),
    );
    let stats = dispatcher.dispatch_due().await.unwrap();
    assert_eq!(stats.delivered, 2);

    let sent = &s.store.notifications_for_post(s.big).await.unwrap()[0];
    assert_eq!(sent.status, NotificationStatus::Sent);
    assert_eq!(sent.attempt_count, 1);
    assert!(sent.delivered_at.is_some());

    let emitted = notifier.emitted();
    assert_eq!(emitted.len(), 2);
    assert!(emitted.iter().all(|(user, _)| *user == 1));
    assert!(emitted.iter().any(|(_, payload)| payload["postId"] == json!(s.big)));

    assert_eq!(dispatcher.dispatch_due().await.unwrap().delivered, 0);
}

#[tokio::test]
async fn offline_user_is_retried_later() {
    let s = scenario().await;
    NotificationMatcher::new(s.store.clone(), match_config())
        .run_once()
        .await
        .unwrap();

    let dispatcher = NotificationDispatcher::new(
        s.store.clone(),
        Arc::new(RecordingNotifier::offline()),
        dispatch_config(5, chrono::Duration::seconds(30)),
    );
    let before = Utc::now();
    let stats = dispatcher.dispatch_due().await.unwrap();
    assert_eq!(stats.retried, 2);

    let pending = &s.store.notifications_for_post(s.big).await.unwrap()[0];
    assert_eq!(pending.status, NotificationStatus::Pending);
    assert_eq!(pending.attempt_count, 1);
    assert!(pending.next_attempt_at >= before + chrono::Duration::seconds(30));
    assert_eq!(pending.last_error.as_deref(), Some("not delivered"));

    // Not due yet.
    assert_eq!(dispatcher.dispatch_due().await.unwrap(), Default::default());
}

#[tokio::test]
async fn delivery_gives_up_at_the_ceiling() {
    let s = scenario().await;
    NotificationMatcher::new(s.store.clone(), match_config())
        .run_once()
        .await
        .unwrap();

    let notifier = Arc::new(RecordingNotifier::offline());
    let dispatcher = NotificationDispatcher::new(
        s.store.clone(),
        notifier.clone(),
        dispatch_config(2, chrono::Duration::zero()),
    );

    assert_eq!(dispatcher.dispatch_due().await.unwrap().retried, 2);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(dispatcher.dispatch_due().await.unwrap().failed, 2);

    let failed = &s.store.notifications_for_post(s.small).await.unwrap()[0];
    assert_eq!(failed.status, NotificationStatus::Failed);
    assert_eq!(failed.attempt_count, 2);
    assert_eq!(notifier.emitted().len(), 4);
}

#[tokio::test]
async fn scripted_recovery_delivers_on_retry() {
    let s = scenario().await;
    sqlx::query("DELETE FROM saved_filters WHERE id = ?")
        .bind(s.by_price)
        .execute(s.store.pool())
        .await
        .unwrap();
    NotificationMatcher::new(s.store.clone(), match_config())
        .run_once()
        .await
        .unwrap();

    let dispatcher = NotificationDispatcher::new(
        s.store.clone(),
        Arc::new(RecordingNotifier::delivering().then(false)),
        dispatch_config(5, chrono::Duration::zero()),
    );
    assert_eq!(dispatcher.dispatch_due().await.unwrap().retried, 1);
    tokio::time::sleep(Duration::from_millis(5)).await;
    assert_eq!(dispatcher.dispatch_due().await.unwrap().delivered, 1);

    let sent = &s.store.notifications_for_post(s.big).await.unwrap()[0];
    assert_eq!(sent.status, NotificationStatus::Sent);
    assert_eq!(sent.attempt_count, 2);
}
