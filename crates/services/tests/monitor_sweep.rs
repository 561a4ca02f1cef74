use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use exam_core::Clock;
use exam_core::model::{ExamId, SessionMode, SessionStatus, UserId, WarningKind};
use exam_core::time::fixed_now;
use services::{ChannelNotifier, ExpiryMonitor, MonitorEvent, SessionEngine};
use storage::repository::Storage;
use tokio::sync::{mpsc, watch};

mod common;

const USER: UserId = UserId::new(7);
const EXAM: ExamId = ExamId::new(1);

async fn engine_with_bank() -> (SessionEngine, Storage) {
    let storage = Storage::in_memory();
    common::seed_bank(&storage).await;
    let engine = SessionEngine::new(Clock::fixed(fixed_now()), &storage);
    (engine, storage)
}

fn monitor_at(
    at: DateTime<Utc>,
    engine: &SessionEngine,
    storage: &Storage,
) -> (ExpiryMonitor, mpsc::UnboundedReceiver<MonitorEvent>) {
    let (notifier, rx) = ChannelNotifier::new();
    let monitor = ExpiryMonitor::new(
        Clock::fixed(at),
        engine.clone(),
        storage.sessions.clone(),
        Arc::new(notifier),
    )
    .with_pass_percent(70);
    (monitor, rx)
}

fn drain(rx: &mut mpsc::UnboundedReceiver<MonitorEvent>) -> Vec<MonitorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn warnings_fire_once_per_threshold_as_time_passes() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();

    // 9m50s left: the 10-minute boundary has been crossed
    let (monitor, mut rx) = monitor_at(
        fixed_now() + Duration::minutes(50) + Duration::seconds(10),
        &engine,
        &storage,
    );
    monitor.sweep_once().await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![MonitorEvent::WarningRaised {
            session_id: session.id(),
            user_id: USER,
            kind: WarningKind::TenMinutes,
        }]
    );

    // same sweep again: the flag is set, nothing new fires
    monitor.sweep_once().await.unwrap();
    assert!(drain(&mut rx).is_empty());

    // exactly 5 minutes left
    let (monitor, mut rx) = monitor_at(fixed_now() + Duration::minutes(55), &engine, &storage);
    monitor.sweep_once().await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![MonitorEvent::WarningRaised {
            session_id: session.id(),
            user_id: USER,
            kind: WarningKind::FiveMinutes,
        }]
    );

    // 50 seconds left
    let (monitor, mut rx) = monitor_at(
        fixed_now() + Duration::minutes(59) + Duration::seconds(10),
        &engine,
        &storage,
    );
    monitor.sweep_once().await.unwrap();
    assert_eq!(
        drain(&mut rx),
        vec![MonitorEvent::WarningRaised {
            session_id: session.id(),
            user_id: USER,
            kind: WarningKind::OneMinute,
        }]
    );

    // all three flags stuck set after everything else that happened
    let stored = engine.get_session(session.id()).await.unwrap();
    assert!(stored.warning_sent(WarningKind::TenMinutes));
    assert!(stored.warning_sent(WarningKind::FiveMinutes));
    assert!(stored.warning_sent(WarningKind::OneMinute));
}

#[tokio::test]
async fn a_long_outage_raises_only_the_tightest_warning() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();

    // the monitor slept through the 10- and 5-minute boundaries; with 30
    // seconds left only the 1-minute warning may fire in this sweep
    let (monitor, mut rx) = monitor_at(
        fixed_now() + Duration::minutes(59) + Duration::seconds(30),
        &engine,
        &storage,
    );
    monitor.sweep_once().await.unwrap();
    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        events[0],
        MonitorEvent::WarningRaised {
            kind: WarningKind::OneMinute,
            ..
        }
    ));

    let stored = engine.get_session(session.id()).await.unwrap();
    assert!(stored.warning_sent(WarningKind::OneMinute));
    assert!(!stored.warning_sent(WarningKind::FiveMinutes));
    assert!(!stored.warning_sent(WarningKind::TenMinutes));
}

#[tokio::test]
async fn expired_sessions_are_auto_submitted_exactly_once() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    for row in rows.iter().take(10) {
        common::answer_correctly(&engine, &storage, session.id(), row.question_id).await;
    }

    let (monitor, mut rx) = monitor_at(fixed_now() + Duration::minutes(61), &engine, &storage);
    monitor.sweep_once().await.unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.len(), 1);
    match &events[0] {
        MonitorEvent::AutoSubmitted {
            session_id,
            user_id,
            outcome,
        } => {
            assert_eq!(*session_id, session.id());
            assert_eq!(*user_id, USER);
            assert_eq!(outcome.result.correct, 10);
            assert_eq!(outcome.result.percent, 25);
            assert!(!outcome.passed);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let stored = engine.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Submitted);

    // the session left the scan set; a later sweep emits nothing
    monitor.sweep_once().await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn manually_submitted_sessions_are_not_resubmitted() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    engine.finalize_and_submit(session.id(), 70).await.unwrap();

    let (monitor, mut rx) = monitor_at(fixed_now() + Duration::minutes(61), &engine, &storage);
    monitor.sweep_once().await.unwrap();
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn practice_sessions_are_outside_the_scan_set() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Practice)
        .await
        .unwrap();

    let (monitor, mut rx) = monitor_at(fixed_now() + Duration::days(30), &engine, &storage);
    monitor.sweep_once().await.unwrap();
    assert!(drain(&mut rx).is_empty());

    let stored = engine.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Active);
}

#[tokio::test]
async fn run_loop_stops_cleanly_on_shutdown() {
    let (engine, storage) = engine_with_bank().await;
    let (notifier, _rx) = ChannelNotifier::new();
    let monitor = ExpiryMonitor::new(
        Clock::fixed(fixed_now()),
        engine.clone(),
        storage.sessions.clone(),
        Arc::new(notifier),
    )
    .with_sweep_interval(StdDuration::from_millis(10));

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(monitor.run(rx));

    tokio::time::sleep(StdDuration::from_millis(30)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(StdDuration::from_secs(1), handle)
        .await
        .expect("monitor loop should stop on shutdown")
        .unwrap();
}
