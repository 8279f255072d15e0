//! Processing operation coordinator.
//!
//! Turns "transcribe/summarize this recording" requests into tracked,
//! cancellable, deduplicated asynchronous jobs:
//!
//! - one spawned task per operation, driving exactly one provider call
//! - at most one non-terminal operation per (recording, kind) pair; a
//!   duplicate start returns the existing operation instead of spawning
//! - cancellation is synchronous and authoritative: once requested, the
//!   operation reads as cancelled even while the provider call unwinds,
//!   and a late success/failure from the job is discarded
//! - terminal operations stay queryable until `cleanup_completed_operations`
//!
//! All registry mutation goes through one mutex with short critical
//! sections; the lock is never held across an await.

use crate::operations::{ErrorKind, Operation, OperationKind, OperationResult, OperationStatus};
use crate::progress::{ProgressHandle, ProgressGate};
use crate::stt::{TranscribeError, Transcriber};
use crate::summarize::{SummarizeError, Summarizer, SummaryLength};
use crate::usage::UsageLedger;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Capacity of the change-notification channel. Observers that fall behind
/// miss events and should re-read a snapshot.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Status-change notification for observers rendering progress UI.
#[derive(Debug, Clone, Serialize)]
pub struct OperationEvent {
    pub id: Uuid,
    pub recording_id: String,
    pub kind: OperationKind,
    pub status: OperationStatus,
}

struct OperationEntry {
    op: Operation,
    /// Owned exclusively by this operation; never shared across operations.
    cancel: CancellationToken,
}

/// Coordinates transcription and summarization jobs.
///
/// Constructed explicitly and handed to callers (no process-wide singleton);
/// clones share the same registry. `start_*` must be called within a Tokio
/// runtime since each operation runs as a spawned task.
#[derive(Clone)]
pub struct Coordinator {
    registry: Arc<Mutex<HashMap<Uuid, OperationEntry>>>,
    transcriber: Arc<dyn Transcriber>,
    summarizer: Arc<dyn Summarizer>,
    usage: Arc<dyn UsageLedger>,
    events: broadcast::Sender<OperationEvent>,
    user_key: Option<String>,
    summary_length: SummaryLength,
}

impl Coordinator {
    /// Create a new coordinator over the given capabilities.
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        summarizer: Arc<dyn Summarizer>,
        usage: Arc<dyn UsageLedger>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            registry: Arc::new(Mutex::new(HashMap::new())),
            transcriber,
            summarizer,
            usage,
            events,
            user_key: None,
            summary_length: SummaryLength::default(),
        }
    }

    /// Set the user key reported to the usage ledger after successful
    /// transcriptions. Without it, bookings are skipped.
    pub fn with_user_key(mut self, user_key: Option<String>) -> Self {
        self.user_key = user_key;
        self
    }

    /// Set the summary verbosity used for summarization jobs.
    pub fn with_summary_length(mut self, length: SummaryLength) -> Self {
        self.summary_length = length;
        self
    }

    /// Lock the registry, recovering from poisoning: registry state is a
    /// plain map and stays consistent even if a holder panicked.
    fn registry(&self) -> MutexGuard<'_, HashMap<Uuid, OperationEntry>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, op: &Operation) {
        // Nobody listening is fine.
        let _ = self.events.send(OperationEvent {
            id: op.id,
            recording_id: op.recording_id.clone(),
            kind: op.kind,
            status: op.status.clone(),
        });
    }

    /// Start transcribing `audio_ref` for `recording_id`.
    ///
    /// Returns immediately with the new operation (status `Running(0.0)`),
    /// or with the already-running operation for the same recording. Input
    /// problems (missing file, empty file) are not validated here; they
    /// surface later as a `Failed` status.
    pub fn start_transcription(
        &self,
        recording_id: impl Into<String>,
        audio_ref: impl Into<PathBuf>,
        language_hint: Option<String>,
    ) -> Operation {
        let recording_id = recording_id.into();
        let audio_ref = audio_ref.into();

        let (op, cancel) =
            match self.insert_or_existing(recording_id, OperationKind::Transcription) {
                StartOutcome::Existing(op) => return op,
                StartOutcome::Inserted { op, cancel } => (op, cancel),
            };

        let this = self.clone();
        let id = op.id;
        tokio::spawn(async move {
            this.run_transcription(id, audio_ref, language_hint, cancel)
                .await;
        });

        op
    }

    /// Start summarizing `transcript` for `recording_id`.
    ///
    /// Same contract as [`Coordinator::start_transcription`].
    pub fn start_summarization(
        &self,
        recording_id: impl Into<String>,
        transcript: impl Into<String>,
    ) -> Operation {
        let recording_id = recording_id.into();
        let transcript = transcript.into();

        let (op, cancel) =
            match self.insert_or_existing(recording_id, OperationKind::Summarization) {
                StartOutcome::Existing(op) => return op,
                StartOutcome::Inserted { op, cancel } => (op, cancel),
            };

        let this = self.clone();
        let id = op.id;
        tokio::spawn(async move {
            this.run_summarization(id, transcript, cancel).await;
        });

        op
    }

    /// Dedup check and insert under one lock acquisition, so two concurrent
    /// starts for the same pair cannot both insert.
    fn insert_or_existing(&self, recording_id: String, kind: OperationKind) -> StartOutcome {
        let mut registry = self.registry();

        if let Some(existing) = registry
            .values()
            .find(|e| {
                e.op.kind == kind
                    && e.op.recording_id == recording_id
                    && !e.op.status.is_terminal()
            })
            .map(|e| e.op.clone())
        {
            log::debug!(
                "Coordinator: {:?} already running for recording {}, returning operation {}",
                kind,
                recording_id,
                existing.id
            );
            return StartOutcome::Existing(existing);
        }

        let op = Operation::new(recording_id, kind);
        let cancel = CancellationToken::new();
        registry.insert(
            op.id,
            OperationEntry {
                op: op.clone(),
                cancel: cancel.clone(),
            },
        );
        drop(registry);

        log::info!(
            "Coordinator: started {:?} operation {} for recording {}",
            kind,
            op.id,
            op.recording_id
        );
        self.emit(&op);

        StartOutcome::Inserted { op, cancel }
    }

    /// Cancel an operation.
    ///
    /// Synchronous and authoritative: after this returns `true`, reads of
    /// the operation observe `Cancelled`, even while the underlying provider
    /// call is still unwinding. Returns `false` for unknown or already
    /// terminal operations.
    pub fn cancel_operation(&self, id: Uuid) -> bool {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return false;
        };
        if entry.op.status.is_terminal() {
            return false;
        }

        entry.cancel.cancel();
        entry.op.status = OperationStatus::Cancelled;
        let snapshot = entry.op.clone();
        drop(registry);

        log::info!("Coordinator: cancelled operation {}", id);
        self.emit(&snapshot);
        true
    }

    /// Remove every terminal operation from the registry.
    ///
    /// Idempotent; running operations are never removed. This is the only
    /// path that removes operations. Returns the number removed.
    pub fn cleanup_completed_operations(&self) -> usize {
        let mut registry = self.registry();
        let before = registry.len();
        registry.retain(|_, entry| !entry.op.status.is_terminal());
        let removed = before - registry.len();
        drop(registry);

        if removed > 0 {
            log::debug!("Coordinator: cleaned up {} completed operations", removed);
        }
        removed
    }

    // ==================== Query surface ====================

    /// Consistent snapshot of all tracked operations.
    pub fn snapshot(&self) -> Vec<Operation> {
        let registry = self.registry();
        let mut ops: Vec<Operation> = registry.values().map(|e| e.op.clone()).collect();
        ops.sort_by_key(|op| op.created_at);
        ops
    }

    /// Snapshot of one operation.
    pub fn get(&self, id: Uuid) -> Option<Operation> {
        self.registry().get(&id).map(|e| e.op.clone())
    }

    /// Snapshot of operations for a recording, optionally filtered by kind.
    pub fn list(&self, recording_id: &str, kind: Option<OperationKind>) -> Vec<Operation> {
        let registry = self.registry();
        let mut ops: Vec<Operation> = registry
            .values()
            .filter(|e| {
                e.op.recording_id == recording_id && kind.map_or(true, |k| e.op.kind == k)
            })
            .map(|e| e.op.clone())
            .collect();
        ops.sort_by_key(|op| op.created_at);
        ops
    }

    /// Subscribe to status-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.events.subscribe()
    }

    // ==================== Job runners ====================

    /// Progress callback for one job: monotonic via the gate, written back
    /// to the registry only while the operation is still running.
    fn progress_fn(&self, id: Uuid) -> ProgressHandle {
        let this = self.clone();
        let gate = ProgressGate::new();
        ProgressHandle::new(move |p: f32| {
            if let Some(p) = gate.advance(p) {
                this.set_progress(id, p);
            }
        })
    }

    fn set_progress(&self, id: Uuid, progress: f32) {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return;
        };
        // A terminal status (e.g. a concurrent cancel) is never regressed
        // back to running by a late progress report.
        match entry.op.status {
            OperationStatus::Running { progress: prev } if progress > prev => {
                entry.op.status = OperationStatus::Running { progress };
                let snapshot = entry.op.clone();
                drop(registry);
                self.emit(&snapshot);
            }
            _ => {}
        }
    }

    async fn run_transcription(
        &self,
        id: Uuid,
        audio_ref: PathBuf,
        language_hint: Option<String>,
        cancel: CancellationToken,
    ) {
        let progress = self.progress_fn(id);

        // The provider also receives the token for cooperative observation,
        // but the race here guarantees bounded cancellation latency even if
        // a provider ignores it.
        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(TranscribeError::Cancelled),

            result = self.transcriber.transcribe(
                &audio_ref,
                language_hint.as_deref(),
                progress,
                &cancel,
            ) => result,
        };

        match outcome {
            Ok(transcription) => {
                let committed = self.commit_success(
                    id,
                    OperationResult::Transcript {
                        text: transcription.text,
                    },
                );
                // Best-effort booking, only for results that actually stuck.
                if committed {
                    self.book_usage(transcription.duration_secs).await;
                }
            }
            Err(err) => match err.failure_kind() {
                Some(kind) => {
                    log::warn!("Coordinator: transcription {} failed: {}", id, err);
                    self.commit_failure(id, kind);
                }
                None => self.commit_cancelled(id),
            },
        }
    }

    async fn run_summarization(&self, id: Uuid, transcript: String, cancel: CancellationToken) {
        let progress = self.progress_fn(id);

        let outcome = tokio::select! {
            biased;

            _ = cancel.cancelled() => Err(SummarizeError::Cancelled),

            result = self.summarizer.summarize(
                &transcript,
                self.summary_length,
                progress,
                &cancel,
            ) => result,
        };

        match outcome {
            Ok(summary) => {
                self.commit_success(
                    id,
                    OperationResult::Summary {
                        clean: summary.clean,
                        raw: summary.raw,
                    },
                );
            }
            Err(err) => match err.failure_kind() {
                Some(kind) => {
                    log::warn!("Coordinator: summarization {} failed: {}", id, err);
                    self.commit_failure(id, kind);
                }
                None => self.commit_cancelled(id),
            },
        }
    }

    /// Commit a successful result. Re-checks the token at the completion
    /// boundary: if cancellation won the race, the result is discarded.
    /// Returns whether the completion stuck.
    fn commit_success(&self, id: Uuid, result: OperationResult) -> bool {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return false;
        };
        if entry.cancel.is_cancelled() || entry.op.status.is_terminal() {
            log::debug!("Coordinator: discarding result of cancelled operation {}", id);
            return false;
        }

        // Successful completion always reports full progress first.
        entry.op.status = OperationStatus::Running { progress: 1.0 };
        let full = entry.op.clone();
        entry.op.status = OperationStatus::Completed { result };
        let done = entry.op.clone();
        drop(registry);

        self.emit(&full);
        self.emit(&done);
        log::info!("Coordinator: operation {} completed", id);
        true
    }

    fn commit_failure(&self, id: Uuid, error: ErrorKind) {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return;
        };
        if entry.cancel.is_cancelled() || entry.op.status.is_terminal() {
            return;
        }

        entry.op.status = OperationStatus::Failed { error };
        let snapshot = entry.op.clone();
        drop(registry);

        self.emit(&snapshot);
    }

    /// Terminal cancel observed by the job itself (the status is usually
    /// already `Cancelled` via `cancel_operation`; this covers providers
    /// reporting cancellation on their own).
    fn commit_cancelled(&self, id: Uuid) {
        let mut registry = self.registry();
        let Some(entry) = registry.get_mut(&id) else {
            return;
        };
        if entry.op.status.is_terminal() {
            return;
        }

        entry.op.status = OperationStatus::Cancelled;
        let snapshot = entry.op.clone();
        drop(registry);

        self.emit(&snapshot);
    }

    async fn book_usage(&self, duration_secs: Option<f32>) {
        let Some(user_key) = &self.user_key else {
            return;
        };
        let Some(seconds) = duration_secs else {
            log::debug!("Coordinator: provider reported no audio duration, skipping booking");
            return;
        };

        if let Err(err) = self.usage.book_usage(user_key, seconds).await {
            // Best-effort: the transcription stays completed.
            log::warn!("Coordinator: usage booking failed: {}", err);
        }
    }
}

enum StartOutcome {
    Existing(Operation),
    Inserted {
        op: Operation,
        cancel: CancellationToken,
    },
}
