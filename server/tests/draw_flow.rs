use chrono::{NaiveDate, TimeDelta, Utc};
use lotto_execution::mocks::{number, slot, MOCK_SLOT};
use lotto_execution::validate;
use lotto_server::{DrawError, DrawOutcome, DrawRequest, DrawService, DrawStore, NewTicket, ServerConfig};
use lotto_types::{parse_draw_date, SelectionStrategy, SellerId, RESULT_LEN};
use std::path::Path;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

const DRAW_DATE: &str = "2025-01-10";

fn date() -> NaiveDate {
    parse_draw_date(DRAW_DATE).expect("date")
}

fn config() -> ServerConfig {
    ServerConfig {
        deterministic_seed: Some(42),
        ..ServerConfig::default()
    }
}

fn service_at(path: &Path, config: ServerConfig) -> Arc<DrawService> {
    let store = DrawStore::open(path).expect("open store");
    let clock = config.clock().expect("clock");
    Arc::new(DrawService::new(store, Arc::new(config), clock))
}

fn request() -> DrawRequest {
    DrawRequest::new(date(), slot(MOCK_SLOT), None)
}

fn sell(service: &DrawService, seller: SellerId, numbers: &str, points: &str) {
    let (start, _) = service.clock().day_bounds(date());
    service
        .store()
        .insert_ticket(&NewTicket {
            seller_id: seller,
            draw_times: MOCK_SLOT.to_string(),
            ticket_numbers: numbers.to_string(),
            total_points: points.to_string(),
            total_quantity: 0,
            created_at: start + TimeDelta::hours(10),
        })
        .expect("insert ticket");
}

#[tokio::test]
async fn generation_is_idempotent_across_restarts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("draws.db");

    let first = service_at(&path, config());
    sell(&first, 4, "1011:2,3022:1", "400");
    let outcome = first.generate(request()).await.expect("generate");
    let DrawOutcome::Generated(result) = outcome else {
        panic!("expected a generated result, got {outcome:?}");
    };
    assert_eq!(
        first.generate(request()).await.expect("repeat"),
        DrawOutcome::AlreadyGenerated(request().key)
    );

    let reopened = service_at(&path, config());
    assert_eq!(
        reopened.generate(request()).await.expect("after restart"),
        DrawOutcome::AlreadyGenerated(request().key)
    );
    let stored = reopened.find(request().key).await.expect("find").expect("stored");
    assert_eq!(stored.winning_numbers, result.winning_numbers);
    assert_eq!(stored.strategy, result.strategy);
    assert_eq!(reopened.list_for_date(date()).await.expect("list").len(), 1);
}

#[tokio::test]
async fn single_heavy_ticket_is_prescreened() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = service_at(&dir.path().join("draws.db"), config());
    service
        .store()
        .record_win_percent(50.0, Utc::now())
        .expect("win percent");
    sell(&service, 7, "1007:5", "1000");

    let DrawOutcome::Generated(result) = service.generate(request()).await.expect("generate")
    else {
        panic!("expected a generated result");
    };
    assert_eq!(result.winning_numbers.len(), RESULT_LEN);
    assert!(result.entry_for(&number("1007")).is_none());
    assert_eq!(result.total_payout(), 0);
    assert_eq!(validate(&result.winning_numbers), Ok(()));
    assert!(result
        .winning_numbers
        .iter()
        .any(|entry| entry.number.prefix() == 10));
}

#[tokio::test]
async fn empty_slot_gets_random_result() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = service_at(&dir.path().join("draws.db"), config());
    // sold for another slot only
    let (start, _) = service.clock().day_bounds(date());
    service
        .store()
        .insert_ticket(&NewTicket {
            seller_id: 2,
            draw_times: "[\"03:00 PM\"]".to_string(),
            ticket_numbers: "1007:1".to_string(),
            total_points: "100".to_string(),
            total_quantity: 1,
            created_at: start + TimeDelta::hours(10),
        })
        .expect("insert ticket");

    let DrawOutcome::Generated(result) = service.generate(request()).await.expect("generate")
    else {
        panic!("expected a generated result");
    };
    assert_eq!(result.strategy, SelectionStrategy::NoSales);
    assert_eq!(result.total_points, 0.0);
    assert!(result.winning_numbers.iter().all(|entry| entry.quantity == 0));
    assert_eq!(validate(&result.winning_numbers), Ok(()));
    assert_eq!(service.metrics().snapshot().no_sales, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_triggers_write_one_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("draws.db");
    // two services model two processes sharing the database
    let a = service_at(&path, config());
    let b = service_at(&path, config());
    sell(&a, 1, "1001:1,3003:2,5005:1", "900");

    let mut handles = Vec::new();
    for idx in 0..8 {
        let service = if idx % 2 == 0 { a.clone() } else { b.clone() };
        handles.push(tokio::spawn(async move { service.generate(request()).await }));
    }
    let mut generated = 0;
    for handle in handles {
        match handle.await.expect("join").expect("outcome") {
            DrawOutcome::Generated(_) => generated += 1,
            DrawOutcome::AlreadyGenerated(_) | DrawOutcome::InProgress(_) => {}
        }
    }
    assert_eq!(generated, 1);
    assert_eq!(a.list_for_date(date()).await.expect("list").len(), 1);
}

#[tokio::test]
async fn zero_aggregation_timeout_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = service_at(
        &dir.path().join("draws.db"),
        ServerConfig {
            aggregation_timeout_ms: 0,
            ..config()
        },
    );
    sell(&service, 1, "1001:1", "100");

    let err = service.generate(request()).await.expect_err("timeout");
    assert!(matches!(err, DrawError::AggregationTimeout { .. }));
    assert!(service.find(request().key).await.expect("find").is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn save_blocked_past_execution_timeout_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("draws.db");
    let service = service_at(
        &path,
        ServerConfig {
            execution_timeout_ms: 300,
            ..config()
        },
    );
    sell(&service, 1, "1001:1", "100");

    // another writer holds the database write lock well past the execution timeout
    let (locked_tx, locked_rx) = mpsc::channel();
    let writer = thread::spawn(move || {
        let conn = rusqlite::Connection::open(&path).expect("second connection");
        conn.execute_batch("BEGIN IMMEDIATE").expect("write lock");
        locked_tx.send(()).expect("signal");
        thread::sleep(Duration::from_millis(1_500));
        conn.execute_batch("COMMIT").expect("release");
    });
    locked_rx.recv().expect("writer holds lock");

    let err = service.generate(request()).await.expect_err("timeout");
    assert!(matches!(err, DrawError::ExecutionTimeout { .. }));
    writer.join().expect("writer thread");

    assert!(service.find(request().key).await.expect("find").is_none());
    assert_eq!(service.metrics().snapshot().timed_out, 1);
    // the draw lock was released, so a retry runs and stores a result
    let retried = service.generate(request()).await.expect("retry");
    assert!(matches!(retried, DrawOutcome::Generated(_)));
}

#[tokio::test]
async fn flagged_priority_sellers_win_first() {
    let dir = tempfile::tempdir().expect("tempdir");
    let service = service_at(&dir.path().join("draws.db"), config());
    let store = service.store();
    store.record_win_percent(50.0, Utc::now()).expect("win percent");
    store.upsert_seller(9, "priority counter", true).expect("seller 9");
    store.upsert_seller(3, "regular counter", false).expect("seller 3");
    // out-of-series bulk entries widen both sellers' ceilings
    sell(&service, 3, "1003:1,3001:1,0001:400", "5000");
    sell(&service, 9, "1002:1,5002:1,0000:400", "5000");

    let DrawOutcome::Generated(result) = service.generate(request()).await.expect("generate")
    else {
        panic!("expected a generated result");
    };
    assert_eq!(result.strategy, SelectionStrategy::Priority);
    for won in ["1002", "5002", "3001"] {
        let entry = result.entry_for(&number(won)).expect("purchased winner");
        assert_eq!(entry.quantity, 1);
        assert_eq!(entry.payout, 180);
    }
    // prefix 10 went to the priority seller
    assert!(result.entry_for(&number("1003")).is_none());
    assert_eq!(validate(&result.winning_numbers), Ok(()));
}
