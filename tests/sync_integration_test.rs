// End-to-end engine runs against mocked source and target APIs:
// token expiry fallback, stale-downstream rebuild, dry-run suppression,
// token bootstrap/persistence, and sensor identity collisions.

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Match, Mock, MockServer, Request, Respond, ResponseTemplate};

use timeseries_replicator::filters::ChangeFilter;
use timeseries_replicator::retention::RetentionTable;
use timeseries_replicator::source::client::SourceClient;
use timeseries_replicator::source::models::ChangeToken;
use timeseries_replicator::sync::engine::{SyncEngine, SyncOptions};
use timeseries_replicator::target::client::TargetClient;

// The engine persists its token under $HOME; serialize tests that re-point it.
static HOME_LOCK: Mutex<()> = Mutex::new(());

fn lock_home(temp: &tempfile::TempDir) -> std::sync::MutexGuard<'static, ()> {
    let guard = HOME_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    std::env::set_var("HOME", temp.path());
    guard
}

fn state_file(temp: &tempfile::TempDir) -> std::path::PathBuf {
    temp.path().join(".timeseries-replicator/state.json")
}

struct HasParam(&'static str);

impl Match for HasParam {
    fn matches(&self, request: &Request) -> bool {
        request.url.query_pairs().any(|(k, _)| k == self.0)
    }
}

struct LacksParam(&'static str);

impl Match for LacksParam {
    fn matches(&self, request: &Request) -> bool {
        !request.url.query_pairs().any(|(k, _)| k == self.0)
    }
}

fn points_json(count: usize, spacing: Duration) -> serde_json::Value {
    let end = Utc::now();
    let points: Vec<serde_json::Value> = (0..count)
        .map(|i| {
            json!({
                "timestamp": (end - spacing * ((count - 1 - i) as i32)).to_rfc3339(),
                "value": i as f64,
                "qualifiers": [],
            })
        })
        .collect();
    json!({ "points": points, "numPoints": count })
}

fn changes_json(
    events: serde_json::Value,
    next_token: Option<&str>,
    token_expired: bool,
    response_time: &str,
) -> serde_json::Value {
    json!({
        "changes": events,
        "nextToken": next_token,
        "tokenExpired": token_expired,
        "responseTime": response_time,
    })
}

fn descriptor_json() -> serde_json::Value {
    json!({
        "descriptors": [{
            "seriesId": "ts-1",
            "identifier": "Stage.Working@Loc1",
            "locationId": "loc-1",
            "utcOffsetHours": 0.0,
            "computationPeriod": "Daily",
        }]
    })
}

async fn mount_source_basics(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "3.10" })))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path("/series/describe"))
        .respond_with(ResponseTemplate::new(200).set_body_json(descriptor_json()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/locations/loc-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "descriptor": {
                "locationId": "loc-1",
                "name": "Loc One",
                "latitude": 47.1,
                "longitude": -122.3,
                "elevation": 12.0,
                "utcOffsetHours": 0.0,
            },
            "extendedData": {},
        })))
        .mount(server)
        .await;
}

fn engine(
    source: &MockServer,
    target: &MockServer,
    filter: ChangeFilter,
    options: SyncOptions,
) -> SyncEngine {
    SyncEngine::new(
        SourceClient::new(source.uri(), None, 5).unwrap(),
        TargetClient::new(target.uri(), None, 5).unwrap(),
        filter,
        RetentionTable::default(),
        options,
    )
}

#[tokio::test]
async fn test_full_run_bootstraps_and_persists_token() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    let response_time = Utc::now();
    let events = json!([{ "seriesId": "ts-1", "firstPointChanged": null }]);
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            events,
            None,
            false,
            &response_time.to_rfc3339(),
        )))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/ts-1/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(points_json(20, Duration::days(1))))
        .expect(1)
        .mount(&source)
        .await;

    Mock::given(method("POST"))
        .and(path("/datasource/clear"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors/find"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "handle": "sensor-1" })))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors/sensor-1/observations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "inserted": 20 })))
        .expect(1)
        .mount(&target)
        .await;

    let report = engine(
        &source,
        &target,
        ChangeFilter::default(),
        SyncOptions::default(),
    )
    .run()
    .await
    .unwrap();

    assert!(report.full_resync);
    assert_eq!(report.series_exported, 1);
    assert_eq!(report.points_exported, 20);

    // Bootstrapped token honors the clock-skew margin.
    assert!(report.next_token.0 <= response_time - Duration::seconds(60));

    // And it was persisted for the next run.
    let contents = std::fs::read_to_string(state_file(&temp)).unwrap();
    let saved: serde_json::Value = serde_json::from_str(&contents).unwrap();
    let saved_token: DateTime<Utc> = saved["change_token"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();
    assert_eq!(saved_token, report.next_token.0);
}

#[tokio::test]
async fn test_expired_token_falls_back_to_full_resync() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    let response_time = Utc::now().to_rfc3339();
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .and(HasParam("since"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            json!([]),
            Some("2026-08-20T00:00:00Z"),
            true,
            &response_time,
        )))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .and(LacksParam("since"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            json!([]),
            Some("2026-08-29T00:00:00Z"),
            false,
            &response_time,
        )))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("POST"))
        .and(path("/datasource/clear"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;

    let options = SyncOptions {
        token_override: Some(ChangeToken::parse("2026-08-01T00:00:00Z").unwrap()),
        ..Default::default()
    };
    let report = engine(&source, &target, ChangeFilter::default(), options)
        .run()
        .await
        .unwrap();

    assert!(report.full_resync);
    assert_eq!(
        report.next_token,
        ChangeToken::parse("2026-08-29T00:00:00Z").unwrap()
    );
}

#[tokio::test]
async fn test_never_resync_keeps_expired_token_result() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .and(HasParam("since"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            json!([]),
            Some("2026-08-20T00:00:00Z"),
            true,
            &Utc::now().to_rfc3339(),
        )))
        .expect(1)
        .mount(&source)
        .await;

    let options = SyncOptions {
        token_override: Some(ChangeToken::parse("2026-08-01T00:00:00Z").unwrap()),
        never_resync: true,
        ..Default::default()
    };
    let report = engine(&source, &target, ChangeFilter::default(), options)
        .run()
        .await
        .unwrap();

    // No fallback query, no resync semantics, no datasource clear.
    assert!(!report.full_resync);
    assert!(target.received_requests().await.unwrap().is_empty());
}

/// Incremental fetch gets a bounded window; the stale-rebuild refetch is unbounded.
struct PointsByWindow;

impl Respond for PointsByWindow {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let bounded = request.url.query_pairs().any(|(k, _)| k == "from");
        let body = if bounded {
            points_json(10, Duration::days(1))
        } else {
            points_json(30, Duration::days(1))
        };
        ResponseTemplate::new(200).set_body_json(body)
    }
}

#[tokio::test]
async fn test_stale_downstream_forces_delete_and_unbounded_rebuild() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    let first_changed = Utc::now() - Duration::days(5);
    let events = json!([{
        "seriesId": "ts-1",
        "firstPointChanged": first_changed.to_rfc3339(),
    }]);
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            events,
            Some("2026-08-29T00:00:00Z"),
            false,
            &Utc::now().to_rfc3339(),
        )))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/ts-1/points"))
        .respond_with(PointsByWindow)
        .expect(2)
        .mount(&source)
        .await;

    // Existing sensor already covers the changed range: its history is stale.
    Mock::given(method("POST"))
        .and(path("/sensors/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "seriesId": "ts-1",
            "handle": "sensor-1",
            "lastObserved": (Utc::now() - Duration::days(1)).to_rfc3339(),
        })))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/sensors/sensor-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/observations/purge-deleted"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "purged": 7 })))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "handle": "sensor-2" })))
        .expect(1)
        .mount(&target)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors/sensor-2/observations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "inserted": 30 })))
        .expect(1)
        .mount(&target)
        .await;

    let options = SyncOptions {
        token_override: Some(ChangeToken::parse("2026-08-01T00:00:00Z").unwrap()),
        ..Default::default()
    };
    let report = engine(&source, &target, ChangeFilter::default(), options)
        .run()
        .await
        .unwrap();

    assert!(!report.full_resync);
    assert_eq!(report.points_exported, 30);

    // The rebuild fetch dropped the lower bound.
    let fetches: Vec<_> = source
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/series/ts-1/points")
        .collect();
    assert_eq!(fetches.len(), 2);
    assert!(fetches[0].url.query_pairs().any(|(k, _)| k == "from"));
    assert!(!fetches[1].url.query_pairs().any(|(k, _)| k == "from"));
}

#[tokio::test]
async fn test_dry_run_reads_everything_and_mutates_nothing() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    let events = json!([{ "seriesId": "ts-1", "firstPointChanged": null }]);
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            events,
            Some("2026-08-29T00:00:00Z"),
            false,
            &Utc::now().to_rfc3339(),
        )))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/ts-1/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(points_json(15, Duration::days(1))))
        .expect(1)
        .mount(&source)
        .await;
    Mock::given(method("POST"))
        .and(path("/sensors/find"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&target)
        .await;

    let options = SyncOptions {
        dry_run: true,
        force_resync: true,
        ..Default::default()
    };
    let report = engine(&source, &target, ChangeFilter::default(), options)
        .run()
        .await
        .unwrap();

    assert!(report.full_resync);
    assert_eq!(report.points_exported, 15);

    // The only target traffic is the read-side sensor lookup.
    let target_requests = target.received_requests().await.unwrap();
    assert!(target_requests
        .iter()
        .all(|r| r.url.path() == "/sensors/find"));

    // And the token was not persisted.
    assert!(!state_file(&temp).exists());
}

#[tokio::test]
async fn test_sensor_identity_collision_aborts_before_token_persistence() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    mount_source_basics(&source).await;

    let events = json!([{ "seriesId": "ts-1", "firstPointChanged": null }]);
    Mock::given(method("GET"))
        .and(path("/series/changes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(changes_json(
            events,
            Some("2026-08-29T00:00:00Z"),
            false,
            &Utc::now().to_rfc3339(),
        )))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/series/ts-1/points"))
        .respond_with(ResponseTemplate::new(200).set_body_json(points_json(5, Duration::days(1))))
        .mount(&source)
        .await;
    Mock::given(method("POST"))
        .and(path("/datasource/clear"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&target)
        .await;
    // A sensor answering for ts-1 but owned by another series.
    Mock::given(method("POST"))
        .and(path("/sensors/find"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "seriesId": "ts-other",
            "handle": "sensor-9",
            "lastObserved": null,
        })))
        .mount(&target)
        .await;

    let err = engine(
        &source,
        &target,
        ChangeFilter::default(),
        SyncOptions::default(),
    )
    .run()
    .await
    .unwrap_err();

    assert!(format!("{:#}", err).contains("identity collision"));
    assert!(!state_file(&temp).exists());
}

#[tokio::test]
async fn test_unknown_filter_name_fails_before_any_catalog_call() {
    let temp = tempfile::tempdir().unwrap();
    let _guard = lock_home(&temp);

    let source = MockServer::start().await;
    let target = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "version": "3.10" })))
        .mount(&source)
        .await;
    Mock::given(method("GET"))
        .and(path("/metadata/approvals"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [{ "id": "1200", "name": "Approved" }]
        })))
        .mount(&source)
        .await;

    let filter = ChangeFilter::new(
        None,
        None,
        None,
        Vec::new(),
        Vec::new(),
        vec!["Bogus".to_string()],
        Vec::new(),
        Vec::new(),
    )
    .unwrap();

    let err = engine(&source, &target, filter, SyncOptions::default())
        .run()
        .await
        .unwrap_err();
    assert!(format!("{:#}", err).contains("Unknown approval level 'Bogus'"));

    let catalog_calls = source
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/series/changes")
        .count();
    assert_eq!(catalog_calls, 0);
}
