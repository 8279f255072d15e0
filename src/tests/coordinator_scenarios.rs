//! End-to-end scenarios for the processing coordinator.
//!
//! These tests drive the coordinator through realistic provider behavior
//! (slow calls, failures, under-reported progress) using scripted mocks.
//! Scenarios that need real API keys live with the providers and are
//! `#[ignore]`d; everything here runs offline.

use super::support::{init_logs, wait_for_terminal};
use crate::coordinator::Coordinator;
use crate::operations::{ErrorKind, OperationResult, OperationStatus};
use crate::progress::ProgressHandle;
use crate::stt::{OpenAiTranscriber, TranscribeError, Transcriber, Transcription};
use crate::summarize::{SummarizeError, Summarizer, SummaryLength, SummaryOutput};
use crate::usage::{NoopUsageLedger, UsageError, UsageLedger};
use async_trait::async_trait;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Transcriber that sleeps, under-reports progress (stops at 0.9, as the
/// legacy implementation did), and then succeeds.
struct ScriptedTranscriber {
    text: String,
    duration_secs: Option<f32>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            duration_secs: Some(1.0),
            delay: Duration::from_millis(20),
            calls: AtomicUsize::new(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(
        &self,
        _audio_ref: &Path,
        _language_hint: Option<&str>,
        progress: ProgressHandle,
        cancel: &CancellationToken,
    ) -> Result<Transcription, TranscribeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        progress.report(0.3);

        tokio::select! {
            _ = cancel.cancelled() => return Err(TranscribeError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        progress.report(0.9);
        Ok(Transcription {
            text: self.text.clone(),
            duration_secs: self.duration_secs,
        })
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Summarizer returning raw output with thinking tags, like a local
/// reasoning model would.
struct ThinkingSummarizer;

#[async_trait]
impl Summarizer for ThinkingSummarizer {
    async fn summarize(
        &self,
        _transcript: &str,
        _length: SummaryLength,
        progress: ProgressHandle,
        _cancel: &CancellationToken,
    ) -> Result<SummaryOutput, SummarizeError> {
        progress.report(0.5);
        Ok(SummaryOutput {
            clean: "Key points only.".to_string(),
            raw: Some("<think>planning</think>Key points only.".to_string()),
        })
    }

    async fn validate_api_key(&self, _key: &str) -> Result<bool, SummarizeError> {
        Ok(true)
    }

    fn name(&self) -> &'static str {
        "thinking"
    }
}

/// Usage ledger that records bookings, optionally failing each one.
#[derive(Default)]
struct RecordingLedger {
    bookings: Mutex<Vec<(String, f32)>>,
    fail: bool,
}

#[async_trait]
impl UsageLedger for RecordingLedger {
    async fn book_usage(&self, user_key: &str, seconds: f32) -> Result<(), UsageError> {
        self.bookings
            .lock()
            .unwrap()
            .push((user_key.to_string(), seconds));
        if self.fail {
            return Err(UsageError::Api("ledger unavailable".to_string()));
        }
        Ok(())
    }
}

fn coordinator_with(
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
) -> Coordinator {
    coordinator_with_ledger(transcriber, summarizer, Arc::new(NoopUsageLedger))
}

fn coordinator_with_ledger(
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    ledger: Arc<dyn UsageLedger>,
) -> Coordinator {
    init_logs();
    Coordinator::new(transcriber, summarizer, ledger)
}

#[tokio::test(start_paused = true)]
async fn test_transcription_round_trip_keeps_text_unchanged() {
    let transcriber = Arc::new(ScriptedTranscriber::new("Hello world."));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let op = coordinator.start_transcription("rec-1", "/tmp/one-second.wav", None);
    assert_eq!(op.status, OperationStatus::Running { progress: 0.0 });

    let done = wait_for_terminal(&coordinator, op.id).await;
    assert_eq!(
        done.status,
        OperationStatus::Completed {
            result: OperationResult::Transcript {
                text: "Hello world.".to_string()
            }
        }
    );
}

#[tokio::test(start_paused = true)]
async fn test_progress_reaches_full_before_completion() {
    let transcriber = Arc::new(ScriptedTranscriber::new("hi"));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));
    let mut events = coordinator.subscribe();

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    wait_for_terminal(&coordinator, op.id).await;

    // The provider stopped reporting at 0.9; the coordinator must still
    // emit 1.0 immediately before the completed event.
    let mut progress_seen = Vec::new();
    let mut completed = false;
    while let Ok(event) = events.try_recv() {
        match event.status {
            OperationStatus::Running { progress } => progress_seen.push(progress),
            OperationStatus::Completed { .. } => {
                completed = true;
                break;
            }
            other => panic!("unexpected status: {:?}", other),
        }
    }

    assert!(completed);
    assert_eq!(progress_seen.last().copied(), Some(1.0));
    // Monotonic along the way.
    assert!(progress_seen.windows(2).all(|w| w[0] <= w[1]));
}

#[tokio::test]
async fn test_missing_audio_surfaces_as_failed_not_found() {
    // Real provider: the file check fails before any network traffic.
    let transcriber = Arc::new(OpenAiTranscriber::new("test-key".to_string(), None));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let op = coordinator.start_transcription("rec-1", "/nonexistent/missing.wav", None);
    let done = wait_for_terminal(&coordinator, op.id).await;

    match done.status {
        OperationStatus::Failed {
            error: ErrorKind::FileNotFound(path),
        } => assert_eq!(path, "/nonexistent/missing.wav"),
        other => panic!("expected FileNotFound failure, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_cancellation_wins_over_late_completion() {
    let transcriber =
        Arc::new(ScriptedTranscriber::new("too late").with_delay(Duration::from_millis(40)));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    assert!(coordinator.cancel_operation(op.id));
    assert_eq!(
        coordinator.get(op.id).unwrap().status,
        OperationStatus::Cancelled
    );

    // Give the job time to unwind; the result must stay discarded.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(
        coordinator.get(op.id).unwrap().status,
        OperationStatus::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn test_cancelling_one_recording_leaves_others_alone() {
    let transcriber =
        Arc::new(ScriptedTranscriber::new("kept").with_delay(Duration::from_millis(30)));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let doomed = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    let kept = coordinator.start_transcription("rec-2", "/tmp/b.wav", None);
    assert_ne!(doomed.id, kept.id);

    coordinator.cancel_operation(doomed.id);

    let done = wait_for_terminal(&coordinator, kept.id).await;
    assert!(matches!(done.status, OperationStatus::Completed { .. }));
    assert_eq!(
        coordinator.get(doomed.id).unwrap().status,
        OperationStatus::Cancelled
    );
}

#[tokio::test(start_paused = true)]
async fn test_terminal_status_is_immutable() {
    let transcriber = Arc::new(ScriptedTranscriber::new("done"));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    wait_for_terminal(&coordinator, op.id).await;

    // Cancel after completion is refused and changes nothing.
    assert!(!coordinator.cancel_operation(op.id));
    assert!(matches!(
        coordinator.get(op.id).unwrap().status,
        OperationStatus::Completed { .. }
    ));
}

#[tokio::test]
async fn test_retry_after_failure_is_a_fresh_operation() {
    let transcriber = Arc::new(OpenAiTranscriber::new("test-key".to_string(), None));
    let coordinator = coordinator_with(transcriber, Arc::new(ThinkingSummarizer));

    let first = coordinator.start_transcription("rec-1", "/nonexistent/a.wav", None);
    wait_for_terminal(&coordinator, first.id).await;

    // The terminal operation no longer blocks the dedup slot.
    let second = coordinator.start_transcription("rec-1", "/nonexistent/a.wav", None);
    assert_ne!(first.id, second.id);

    wait_for_terminal(&coordinator, second.id).await;
    assert_eq!(coordinator.list("rec-1", None).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_summary_result_carries_clean_and_raw() {
    let coordinator = coordinator_with(
        Arc::new(ScriptedTranscriber::new("unused")),
        Arc::new(ThinkingSummarizer),
    );

    let op = coordinator.start_summarization("rec-1", "long transcript text");
    let done = wait_for_terminal(&coordinator, op.id).await;

    match done.status {
        OperationStatus::Completed {
            result: OperationResult::Summary { clean, raw },
        } => {
            assert_eq!(clean, "Key points only.");
            assert_eq!(raw.as_deref(), Some("<think>planning</think>Key points only."));
        }
        other => panic!("expected summary, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_usage_booked_once_after_successful_transcription() {
    let ledger = Arc::new(RecordingLedger::default());
    let coordinator = coordinator_with_ledger(
        Arc::new(ScriptedTranscriber::new("hello")),
        Arc::new(ThinkingSummarizer),
        ledger.clone(),
    )
    .with_user_key(Some("user-7".to_string()));

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    wait_for_terminal(&coordinator, op.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    let bookings = ledger.bookings.lock().unwrap().clone();
    assert_eq!(bookings, vec![("user-7".to_string(), 1.0)]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_booking_does_not_affect_completed_status() {
    let ledger = Arc::new(RecordingLedger {
        bookings: Mutex::new(Vec::new()),
        fail: true,
    });
    let coordinator = coordinator_with_ledger(
        Arc::new(ScriptedTranscriber::new("hello")),
        Arc::new(ThinkingSummarizer),
        ledger.clone(),
    )
    .with_user_key(Some("user-7".to_string()));

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    let done = wait_for_terminal(&coordinator, op.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(matches!(done.status, OperationStatus::Completed { .. }));
    assert_eq!(ledger.bookings.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_no_booking_without_user_key() {
    let ledger = Arc::new(RecordingLedger::default());
    let coordinator = coordinator_with_ledger(
        Arc::new(ScriptedTranscriber::new("hello")),
        Arc::new(ThinkingSummarizer),
        ledger.clone(),
    );

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    wait_for_terminal(&coordinator, op.id).await;
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(ledger.bookings.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_transcription_books_nothing() {
    let ledger = Arc::new(RecordingLedger::default());
    let coordinator = coordinator_with_ledger(
        Arc::new(ScriptedTranscriber::new("hello").with_delay(Duration::from_millis(50))),
        Arc::new(ThinkingSummarizer),
        ledger.clone(),
    )
    .with_user_key(Some("user-7".to_string()));

    let op = coordinator.start_transcription("rec-1", "/tmp/a.wav", None);
    coordinator.cancel_operation(op.id);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(ledger.bookings.lock().unwrap().is_empty());
}
