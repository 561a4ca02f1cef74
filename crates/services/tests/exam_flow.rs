use std::collections::HashSet;

use chrono::Duration;
use exam_core::Clock;
use exam_core::model::{AnswerId, ExamId, SessionMode, SessionStatus, UserId};
use exam_core::time::fixed_now;
use services::{EngineError, SessionEngine};
use storage::repository::{QuestionState, Storage};

mod common;

const USER: UserId = UserId::new(7);
const EXAM: ExamId = ExamId::new(1);

async fn engine_with_bank() -> (SessionEngine, Storage) {
    let storage = Storage::in_memory();
    common::seed_bank(&storage).await;
    let engine = SessionEngine::new(Clock::fixed(fixed_now()), &storage);
    (engine, storage)
}

#[tokio::test]
async fn session_holds_a_contiguous_permutation_of_distinct_questions() {
    let (engine, storage) = engine_with_bank().await;

    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage
        .sessions
        .question_rows(session.id())
        .await
        .unwrap();

    assert_eq!(rows.len(), 40);
    let positions: HashSet<u32> = rows.iter().map(|r| r.index).collect();
    assert_eq!(positions, (1..=40).collect::<HashSet<u32>>());
    let questions: HashSet<_> = rows.iter().map(|r| r.question_id).collect();
    assert_eq!(questions.len(), 40);
}

#[tokio::test]
async fn second_active_session_is_rejected() {
    let (engine, _storage) = engine_with_bank().await;

    engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let err = engine
        .create_session(USER, EXAM, SessionMode::Practice)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ActiveSessionExists));
}

#[tokio::test]
async fn single_choice_recording_always_leaves_exactly_one_selection() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    let single = rows
        .iter()
        .find(|r| r.question_id.value() < 4000)
        .expect("bank has single-choice questions");
    let q = single.question_id;

    for k in [1_i64, 2, 3, 2, 1] {
        let answer = AnswerId::new(q.value() * 10 + k);
        engine
            .record_single_choice(session.id(), q, answer)
            .await
            .unwrap();
        let selected = engine.selected_answer_ids(session.id(), q).await.unwrap();
        assert_eq!(selected, vec![answer]);
    }
}

#[tokio::test]
async fn multi_choice_toggle_is_its_own_inverse() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    let multi = rows
        .iter()
        .find(|r| r.question_id.value() >= 4000)
        .expect("bank has multi-choice questions");
    let q = multi.question_id;

    let a = AnswerId::new(q.value() * 10 + 1);
    let b = AnswerId::new(q.value() * 10 + 3);
    assert!(engine.toggle_multi_choice(session.id(), q, a).await.unwrap());
    assert!(engine.toggle_multi_choice(session.id(), q, b).await.unwrap());
    let before = engine.selected_answer_ids(session.id(), q).await.unwrap();

    assert!(!engine.toggle_multi_choice(session.id(), q, b).await.unwrap());
    assert!(engine.toggle_multi_choice(session.id(), q, b).await.unwrap());
    let after = engine.selected_answer_ids(session.id(), q).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn end_to_end_exam_passes_exactly_at_threshold() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();

    for (i, row) in rows.iter().enumerate() {
        if i < 28 {
            common::answer_correctly(&engine, &storage, session.id(), row.question_id).await;
        } else {
            common::answer_incorrectly(&engine, &storage, session.id(), row.question_id).await;
        }
    }

    let progress = engine.progress(session.id()).await.unwrap();
    assert_eq!(progress.answered, 40);
    assert_eq!(progress.total, 40);

    let outcome = engine.finalize_and_submit(session.id(), 70).await.unwrap();
    assert_eq!(outcome.result.total, 40);
    assert_eq!(outcome.result.correct, 28);
    assert_eq!(outcome.result.percent, 70);
    assert!(outcome.passed);

    let section_totals: u32 = outcome.result.by_section.iter().map(|s| s.total).sum();
    assert_eq!(section_totals, 40);

    let stored = engine.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Submitted);
    assert_eq!(stored.score_percent(), Some(70));
    assert_eq!(engine.remaining_seconds(session.id()).await.unwrap(), None);

    // passing leaves no cooldown anchor behind
    assert_eq!(storage.users.last_failure(USER).await.unwrap(), None);
}

#[tokio::test]
async fn finalize_is_idempotent_and_stamps_the_cooldown_once() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    for row in &rows {
        common::answer_incorrectly(&engine, &storage, session.id(), row.question_id).await;
    }

    let first = engine.finalize_and_submit(session.id(), 70).await.unwrap();
    assert!(!first.passed);
    assert_eq!(first.result.correct, 0);
    assert_eq!(storage.users.last_failure(USER).await.unwrap(), Some(fixed_now()));

    // a later replay (different clock) returns the identical outcome and
    // does not move the cooldown anchor
    let later = SessionEngine::new(Clock::fixed(fixed_now() + Duration::minutes(5)), &storage);
    let second = later.finalize_and_submit(session.id(), 70).await.unwrap();
    assert_eq!(second, first);
    assert_eq!(storage.users.last_failure(USER).await.unwrap(), Some(fixed_now()));

    let stored = engine.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Submitted);
}

#[tokio::test]
async fn practice_session_never_expires_and_cannot_be_submitted() {
    let (engine, _storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Practice)
        .await
        .unwrap();

    assert_eq!(session.expires_at(), None);
    assert_eq!(engine.remaining_seconds(session.id()).await.unwrap(), None);

    engine.abandon(session.id()).await.unwrap();
    let stored = engine.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Expired);
    assert_eq!(stored.finished_at(), Some(fixed_now()));

    let err = engine.finalize_and_submit(session.id(), 70).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));

    // abandoning twice is rejected as well
    let err = engine.abandon(session.id()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn restart_practice_spawns_a_fresh_session() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Practice)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    common::answer_correctly(&engine, &storage, session.id(), rows[0].question_id).await;

    let fresh = engine.restart_practice(session.id()).await.unwrap();
    assert_ne!(fresh.id(), session.id());
    assert_eq!(fresh.mode(), SessionMode::Practice);
    assert!(fresh.is_active());

    let old = engine.get_session(session.id()).await.unwrap();
    assert_eq!(old.status(), SessionStatus::Expired);

    let progress = engine.progress(fresh.id()).await.unwrap();
    assert_eq!(progress.answered, 0);
}

#[tokio::test]
async fn restart_is_for_practice_only() {
    let (engine, _storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let err = engine.restart_practice(session.id()).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}

#[tokio::test]
async fn navigation_flags_and_resets() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();

    assert_eq!(engine.set_current_index(session.id(), 0).await.unwrap(), 1);
    assert_eq!(engine.set_current_index(session.id(), 99).await.unwrap(), 40);
    assert_eq!(engine.set_current_index(session.id(), 17).await.unwrap(), 17);

    assert!(engine.toggle_flag(session.id(), 3).await.unwrap());
    assert!(!engine.toggle_flag(session.id(), 3).await.unwrap());
    assert!(engine.toggle_flag(session.id(), 5).await.unwrap());

    let q1 = engine.get_question_at(session.id(), 1).await.unwrap();
    common::answer_correctly(&engine, &storage, session.id(), q1.question_id).await;

    let board = engine.answer_board(session.id()).await.unwrap();
    assert_eq!(board.len(), 40);
    assert_eq!(board[0], QuestionState::Answered);
    assert_eq!(board[4], QuestionState::Flagged);
    assert_eq!(board[1], QuestionState::Unanswered);

    let progress = engine.progress(session.id()).await.unwrap();
    assert_eq!((progress.answered, progress.flagged), (1, 1));

    engine.reset_answers(session.id(), Some(q1.question_id)).await.unwrap();
    let progress = engine.progress(session.id()).await.unwrap();
    assert_eq!(progress.answered, 0);
    // reset touches answers only
    assert_eq!(progress.flagged, 1);

    engine.clear_all_flags(session.id()).await.unwrap();
    let progress = engine.progress(session.id()).await.unwrap();
    assert_eq!(progress.flagged, 0);
}

#[tokio::test]
async fn terminal_sessions_reject_mutations() {
    let (engine, storage) = engine_with_bank().await;
    let session = engine
        .create_session(USER, EXAM, SessionMode::Exam)
        .await
        .unwrap();
    let rows = storage.sessions.question_rows(session.id()).await.unwrap();
    let q = rows[0].question_id;
    engine.finalize_and_submit(session.id(), 70).await.unwrap();

    let err = engine
        .record_single_choice(session.id(), q, AnswerId::new(q.value() * 10 + 1))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let err = engine.toggle_flag(session.id(), 1).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
    let err = engine.set_current_index(session.id(), 2).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidState(_)));
}
