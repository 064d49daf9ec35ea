//! Integration tests for the game actor using a recording session link.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use learnloop_protocol::{
    QuestionStatus, Quiz, QuizAction, ServerMessage,
};
use learnloop_quiz::{QuizConfig, QuizError, QuizGameHandle, SessionLink};
use tokio::sync::mpsc;

// =========================================================================
// Recording link: a settable participant count plus a publish log.
// =========================================================================

#[derive(Clone)]
struct RecordingLink {
    connected: Arc<AtomicUsize>,
    published: mpsc::UnboundedSender<ServerMessage>,
}

impl SessionLink for RecordingLink {
    fn connected_count(&self) -> usize {
        self.connected.load(Ordering::SeqCst)
    }

    fn publish(&self, message: ServerMessage) {
        let _ = self.published.send(message);
    }
}

struct Harness {
    handle: QuizGameHandle,
    connected: Arc<AtomicUsize>,
    published: mpsc::UnboundedReceiver<ServerMessage>,
}

fn spawn_game(connected: usize) -> Harness {
    let (tx, rx) = mpsc::unbounded_channel();
    let connected = Arc::new(AtomicUsize::new(connected));
    let link = RecordingLink {
        connected: Arc::clone(&connected),
        published: tx,
    };
    Harness {
        handle: QuizGameHandle::spawn(QuizConfig::default(), link),
        connected,
        published: rx,
    }
}

fn quiz() -> Arc<Quiz> {
    let json = r#"{
        "id": 3,
        "type": 0,
        "title": "Planets",
        "questions": [
            {
                "id": 10,
                "question": "Gas giants?",
                "questionType": 0,
                "answers": [
                    { "id": 1, "title": "Jupiter", "correct": 1 },
                    { "id": 2, "title": "Mars" },
                    { "id": 3, "title": "Saturn", "correct": 1 }
                ]
            },
            {
                "id": 20,
                "question": "Closest to the sun?",
                "questionType": 0,
                "answers": [
                    { "id": 4, "title": "Mercury", "correct": 1 },
                    { "id": 5, "title": "Venus" }
                ]
            }
        ]
    }"#;
    Arc::new(Quiz::from_json(json).unwrap())
}

fn question_number(msg: &ServerMessage) -> usize {
    match msg {
        ServerMessage::QuestionStarted(m) => m.question_number,
        other => panic!("expected question-started, got {other:?}"),
    }
}

// =========================================================================
// Progression
// =========================================================================

#[tokio::test]
async fn test_start_asks_first_question() {
    let h = spawn_game(2);

    let msg = h.handle.start(quiz(), "host").await.unwrap();
    assert_eq!(question_number(&msg), 1);

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.quiz_id, Some(3));
    assert_eq!(snap.current_question_index, 0);
    assert_eq!(snap.active_question, Some(10));
    assert_eq!(snap.timer.map(|t| t.question_id), Some(10));
}

#[tokio::test]
async fn test_next_loads_quiz_when_nothing_started() {
    let h = spawn_game(2);

    let msg = h.handle.next(quiz(), "host").await.unwrap();
    assert_eq!(question_number(&msg), 1);

    let msg = h.handle.next(quiz(), "host").await.unwrap();
    assert_eq!(question_number(&msg), 2);
}

#[tokio::test]
async fn test_submission_before_start_fails() {
    let h = spawn_game(1);
    let err = h.handle.submit_answer(10, vec![1], "ann").await.unwrap_err();
    assert!(matches!(err, QuizError::NotStarted));
}

// =========================================================================
// Scenario: two questions, two participants
// =========================================================================

#[tokio::test]
async fn test_two_participants_full_run() {
    let h = spawn_game(2);
    h.handle.start(quiz(), "host").await.unwrap();

    let a = h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap();
    assert_eq!(a.answered_count, 1);
    assert_eq!(a.status, QuestionStatus::InProgress);
    assert_eq!(a.envelope.action, Some(QuizAction::QuestionStats));

    let b = h.handle.submit_answer(10, vec![2], "bob").await.unwrap();
    assert_eq!(b.answered_count, 2);
    assert_eq!(b.status, QuestionStatus::Ended);
    assert_eq!(b.envelope.action, Some(QuizAction::QuestionEnded));
    assert!(h.handle.snapshot().await.unwrap().timer.is_none());

    let msg = h.handle.next(quiz(), "host").await.unwrap();
    assert_eq!(question_number(&msg), 2);
    assert_eq!(h.handle.snapshot().await.unwrap().current_question_index, 1);

    h.handle.submit_answer(20, vec![4], "ann").await.unwrap();
    h.handle.submit_answer(20, vec![4], "bob").await.unwrap();

    let ServerMessage::QuizStats(summary) = h.handle.next(quiz(), "host").await.unwrap()
    else {
        panic!("expected quiz summary");
    };
    assert!(h.handle.snapshot().await.unwrap().current_question_index >= 2);
    assert_eq!(summary.learners_count, 2);
    assert_eq!(summary.player_stats["ann"].count_correct, 2);
    assert_eq!(summary.player_stats["bob"].count_correct, 1);
    assert_eq!(summary.player_stats["bob"].count_answered, 2);
}

#[tokio::test]
async fn test_invalid_answer_id_leaves_stats_unchanged() {
    let h = spawn_game(2);
    h.handle.start(quiz(), "host").await.unwrap();

    let err = h.handle.submit_answer(10, vec![42], "ann").await.unwrap_err();
    assert!(err.to_string().starts_with("invalid answer id"));

    let snap = h.handle.snapshot().await.unwrap();
    assert!(snap.player_stats.is_empty());
    let stats = h.handle.submit_answer(10, vec![1], "bob").await.unwrap();
    assert_eq!(stats.answered_count, 1);
}

#[tokio::test]
async fn test_already_answered_produces_no_output() {
    let mut h = spawn_game(3);
    h.handle.start(quiz(), "host").await.unwrap();
    h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap();

    let err = h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap_err();
    assert!(matches!(err, QuizError::AlreadyAnswered { .. }));
    assert!(h.published.try_recv().is_err());
}

#[tokio::test]
async fn test_disconnect_changes_convergence() {
    let h = spawn_game(3);
    h.handle.start(quiz(), "host").await.unwrap();
    h.handle.submit_answer(10, vec![1], "ann").await.unwrap();

    h.connected.store(2, Ordering::SeqCst);
    let stats = h.handle.submit_answer(10, vec![1], "bob").await.unwrap();
    assert_eq!(stats.status, QuestionStatus::Ended);
    assert_eq!(stats.learners_count, 2);
}

#[tokio::test]
async fn test_concurrent_submissions_are_serialized() {
    let h = spawn_game(10);
    h.handle.start(quiz(), "host").await.unwrap();

    let mut tasks = Vec::new();
    for i in 0..10 {
        let handle = h.handle.clone();
        tasks.push(tokio::spawn(async move {
            handle.submit_answer(10, vec![1, 3], format!("p{i}")).await
        }));
    }

    let mut counts = Vec::new();
    let mut ended = 0;
    for task in tasks {
        let stats = task.await.unwrap().unwrap();
        counts.push(stats.answered_count);
        if stats.status == QuestionStatus::Ended {
            ended += 1;
        }
    }
    counts.sort_unstable();
    assert_eq!(counts, (1..=10).collect::<Vec<_>>());
    assert_eq!(ended, 1);

    let snap = h.handle.snapshot().await.unwrap();
    assert_eq!(snap.player_stats.len(), 10);
    assert!(snap.player_stats.values().all(|p| p.count_correct == 1));
}

// =========================================================================
// Timer
// =========================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_publishes_question_end() {
    let mut h = spawn_game(3);
    h.handle.start(quiz(), "host").await.unwrap();
    h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap();

    tokio::time::sleep(Duration::from_secs(29)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(2)).await;
    let snap = h.handle.snapshot().await.unwrap();
    assert!(snap.timer.is_none());
    assert!(snap.active_question.is_none());

    let ServerMessage::QuestionStats(stats) = h.published.try_recv().unwrap() else {
        panic!("expected question statistics");
    };
    assert_eq!(stats.envelope.action, Some(QuizAction::QuestionEnded));
    assert_eq!(stats.status, QuestionStatus::TimedOut);
    assert_eq!(stats.question_id, 10);
    assert_eq!(stats.answered_count, 1);
    assert_eq!(stats.learners_count, 3);
    assert_eq!(stats.answers_stats.len(), 3);

    // Exactly one timeout per question.
    tokio::time::sleep(Duration::from_secs(60)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_late_answer_after_timeout_is_not_graded() {
    let h = spawn_game(2);
    h.handle.start(quiz(), "host").await.unwrap();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let late = h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap();

    assert_eq!(late.envelope.action, Some(QuizAction::QuestionEnded));
    assert_eq!(late.status, QuestionStatus::TimedOut);
    assert_eq!(late.answered_count, 0);
    assert!(h.handle.snapshot().await.unwrap().player_stats.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_advance_retires_previous_timer() {
    let mut h = spawn_game(2);
    h.handle.start(quiz(), "host").await.unwrap();

    tokio::time::sleep(Duration::from_secs(20)).await;
    h.handle.next(quiz(), "host").await.unwrap();

    // Question 10's deadline passes without a timeout.
    tokio::time::sleep(Duration::from_secs(15)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_err());

    // Question 20 times out 30s after it was asked.
    tokio::time::sleep(Duration::from_secs(16)).await;
    h.handle.snapshot().await.unwrap();
    let ServerMessage::QuestionStats(stats) = h.published.try_recv().unwrap() else {
        panic!("expected question statistics");
    };
    assert_eq!(stats.question_id, 20);
}

#[tokio::test(start_paused = true)]
async fn test_converged_question_never_times_out() {
    let mut h = spawn_game(1);
    h.handle.start(quiz(), "host").await.unwrap();
    h.handle.submit_answer(10, vec![1, 3], "ann").await.unwrap();

    tokio::time::sleep(Duration::from_secs(120)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_restart_cancels_pending_timer() {
    let mut h = spawn_game(2);
    h.handle.start(quiz(), "host").await.unwrap();

    tokio::time::sleep(Duration::from_secs(25)).await;
    h.handle.start(quiz(), "host").await.unwrap();

    tokio::time::sleep(Duration::from_secs(10)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_err());

    tokio::time::sleep(Duration::from_secs(25)).await;
    h.handle.snapshot().await.unwrap();
    assert!(h.published.try_recv().is_ok());
}
