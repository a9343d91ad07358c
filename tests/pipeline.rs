use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use estate_ingest::config::{
    AnalyzeConfig, DispatchConfig, FetchConfig, HarvestConfig, MatchConfig, ScheduleConfig,
};
use estate_ingest::models::NotificationStatus;
use estate_ingest::pipeline::{
    Analyzer, Fetcher, Harvester, NotificationDispatcher, NotificationMatcher,
};
use estate_ingest::scheduler::{self, Stages};
use estate_ingest::scrapers::SlidingWindowLimiter;
use estate_ingest::store::Store;
use estate_ingest::testing::{
    detail_payload, insert_filter, insert_user, search_row, seed_catalog, FilterFixture,
    MockDetail, MockDetailSource, MockListingSource, RecordingNotifier,
};

#[tokio::test]
async fn scheduled_stages_carry_a_listing_to_its_subscriber() {
    let store = Store::in_memory().await.unwrap();
    seed_catalog(&store).await.unwrap();
    insert_user(&store, 1, true).await.unwrap();
    insert_filter(
        &store,
        1,
        FilterFixture {
            category_slug: Some("buy-apartment".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let listing = MockListingSource::new().on_page(
        None,
        vec![search_row("A"), json!({"widget_type": "BANNER_ROW", "data": {}})],
        None,
    );
    let details = MockDetailSource::new().on(
        "A",
        MockDetail::Payload(detail_payload("آپارتمان", "۱۲۰", "۴ میلیارد")),
    );
    let notifier = Arc::new(RecordingNotifier::delivering());
    let limiter = Arc::new(SlidingWindowLimiter::new(100, Duration::from_millis(10)));

    let stages = Stages {
        harvester: Arc::new(Harvester::new(
            store.clone(),
            Arc::new(listing),
            limiter.clone(),
            HarvestConfig {
                page_delay: Duration::from_millis(1),
                max_pages: None,
            },
        )),
        fetcher: Arc::new(Fetcher::new(
            store.clone(),
            Arc::new(details),
            limiter,
            FetchConfig {
                min_batch_spacing: Duration::from_millis(10),
                ..Default::default()
            },
        )),
        analyzer: Arc::new(Analyzer::new(
            store.clone(),
            AnalyzeConfig {
                min_chunk_spacing: Duration::ZERO,
                ..Default::default()
            },
        )),
        matcher: Arc::new(NotificationMatcher::new(store.clone(), MatchConfig::default())),
        dispatcher: Some(Arc::new(NotificationDispatcher::new(
            store.clone(),
            notifier.clone(),
            DispatchConfig::default(),
        ))),
    };

    let every = Duration::from_millis(50);
    let schedule = ScheduleConfig {
        harvest_every: Duration::from_secs(60),
        fetch_every: every,
        analyze_every: every,
        match_every: every,
        dispatch_every: every,
    };

    scheduler::run(
        stages,
        schedule,
        AnalyzeConfig::default(),
        tokio::time::sleep(Duration::from_millis(1500)),
    )
    .await
    .unwrap();

    let item = store.find_read_item("divar", "A").await.unwrap().unwrap();
    let post = store
        .find_post_by_read_queue_id(item.id)
        .await
        .unwrap()
        .unwrap();
    assert!(post.notifications_checked);

    let notifications = store.notifications_for_post(post.id).await.unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].status, NotificationStatus::Sent);
    assert_eq!(notifier.emitted().len(), 1);
}
