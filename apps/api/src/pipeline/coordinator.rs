//! Pipeline coordinator: drives one uploaded document through the remote stages.
//!
//! Flow: validate → Uploading → Analyzing → ComputingStats → Complete.
//!
//! Stage N+1 never starts before stage N resolves successfully. Each stage
//! call runs under the retry policy; a failure that survives it ends the
//! session in `Failed` with the stage it happened in. Nothing from a failed
//! session is kept as a partial result.
//!
//! Progress events are advisory. If the channel cannot be opened the session
//! still runs on its own stage transitions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::documents::store::ResumeCollectionStore;
use crate::models::document::DocumentAnalysis;
use crate::models::upload::UploadFile;
use crate::pipeline::session::{IllegalTransition, SessionSnapshot, StaleEvent};
use crate::pipeline::stage::PipelineStage;
use crate::pipeline::validation::UploadRules;
use crate::pipeline::PipelineError;
use crate::progress::{ProgressCallback, ProgressChannel, ProgressEvent, Subscription};
use crate::remote::retry::RetryPolicy;
use crate::remote::{RemoteError, RemoteProcessor};

const PROGRESS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SESSION_RETENTION: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub upload_rules: UploadRules,
    pub retry: RetryPolicy,
    /// Shared topic the processor publishes progress on; events are told
    /// apart by the session id they carry.
    pub progress_topic: String,
    /// How long a finished session stays readable before it is dropped.
    pub session_retention: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            upload_rules: UploadRules::default(),
            retry: RetryPolicy::default(),
            progress_topic: "resume-processing".to_string(),
            session_retention: DEFAULT_SESSION_RETENTION,
        }
    }
}

struct SessionSlot {
    user_id: String,
    status: watch::Receiver<SessionSnapshot>,
    cancel: CancellationToken,
}

impl SessionSlot {
    fn is_active(&self) -> bool {
        !self.cancel.is_cancelled() && !self.status.borrow().is_finished()
    }
}

/// Caller-side view of a running session.
pub struct SessionHandle {
    pub session_id: Uuid,
    status: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    /// Resolves with the terminal or cancelled snapshot.
    pub async fn wait(&mut self) -> SessionSnapshot {
        loop {
            {
                let snapshot = self.status.borrow_and_update();
                if snapshot.is_finished() {
                    return snapshot.clone();
                }
            }
            if self.status.changed().await.is_err() {
                return self.status.borrow().clone();
            }
        }
    }
}

/// State owned by one spawned pipeline run.
struct SessionRun {
    session_id: Uuid,
    user_id: String,
    file: UploadFile,
    status: Arc<watch::Sender<SessionSnapshot>>,
    cancel: CancellationToken,
}

impl SessionRun {
    fn update(&self, change: impl FnOnce(&mut SessionSnapshot) -> Result<(), IllegalTransition>) {
        self.status.send_modify(|snapshot| {
            if let Err(e) = change(snapshot) {
                error!("Session {}: {e}", self.session_id);
            }
        });
    }

    fn enter(&self, stage: PipelineStage) {
        self.update(|s| s.advance(stage));
        info!("Session {} → {}", self.session_id, stage);
    }

    fn current_stage(&self) -> PipelineStage {
        self.status.borrow().stage
    }
}

pub struct PipelineCoordinator {
    remote: Arc<dyn RemoteProcessor>,
    progress: Arc<dyn ProgressChannel>,
    store: Arc<ResumeCollectionStore>,
    settings: PipelineSettings,
    sessions: Mutex<HashMap<Uuid, SessionSlot>>,
}

impl PipelineCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteProcessor>,
        progress: Arc<dyn ProgressChannel>,
        store: Arc<ResumeCollectionStore>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            remote,
            progress,
            store,
            settings,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Validates the file and starts a session for it.
    ///
    /// A user has at most one non-terminal session: a second submit while one
    /// is in flight is rejected with `SessionInProgress`.
    pub fn submit(
        self: &Arc<Self>,
        user_id: &str,
        file: UploadFile,
    ) -> Result<SessionHandle, PipelineError> {
        self.settings.upload_rules.validate(&file)?;

        let session_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let (status_tx, status_rx) = watch::channel(SessionSnapshot::new(session_id, user_id));

        {
            let mut sessions = self.lock_sessions();
            if sessions
                .values()
                .any(|s| s.user_id == user_id && s.is_active())
            {
                return Err(PipelineError::SessionInProgress(user_id.to_string()));
            }
            // Finished sessions for this user are superseded by the new one.
            sessions.retain(|_, s| s.user_id != user_id);
            sessions.insert(
                session_id,
                SessionSlot {
                    user_id: user_id.to_string(),
                    status: status_rx.clone(),
                    cancel: cancel.clone(),
                },
            );
        }

        info!(
            "Session {} started for user {} ({}, {} bytes)",
            session_id,
            user_id,
            file.file_name,
            file.len()
        );

        let run = SessionRun {
            session_id,
            user_id: user_id.to_string(),
            file,
            status: Arc::new(status_tx),
            cancel,
        };
        let coordinator = Arc::clone(self);
        let retention = self.settings.session_retention;
        tokio::spawn(async move {
            coordinator.drive(run).await;
            tokio::time::sleep(retention).await;
            coordinator.expire(session_id);
        });

        Ok(SessionHandle {
            session_id,
            status: status_rx,
        })
    }

    pub fn status(&self, session_id: Uuid) -> Option<SessionSnapshot> {
        self.lock_sessions()
            .get(&session_id)
            .map(|slot| slot.status.borrow().clone())
    }

    pub fn cancel(&self, session_id: Uuid) -> Result<(), PipelineError> {
        let sessions = self.lock_sessions();
        let slot = sessions
            .get(&session_id)
            .ok_or(PipelineError::SessionNotFound(session_id))?;
        slot.cancel.cancel();
        info!("Session {session_id} cancelled by client");
        Ok(())
    }

    /// The user's non-terminal session, if any.
    pub fn active_session(&self, user_id: &str) -> Option<Uuid> {
        self.lock_sessions()
            .iter()
            .find(|(_, s)| s.user_id == user_id && s.is_active())
            .map(|(id, _)| *id)
    }

    /// Drops a finished session from the registry.
    fn expire(&self, session_id: Uuid) {
        let mut sessions = self.lock_sessions();
        if sessions.get(&session_id).is_some_and(|slot| !slot.is_active()) {
            sessions.remove(&session_id);
            debug!("Session {session_id} expired");
        }
    }

    fn lock_sessions(&self) -> MutexGuard<'_, HashMap<Uuid, SessionSlot>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn drive(&self, run: SessionRun) {
        let subscription = self.open_progress(&run).await;

        let outcome = tokio::select! {
            biased;
            _ = run.cancel.cancelled() => Err(PipelineError::Cancelled),
            result = self.run_stages(&run) => result,
        };

        if let Some(subscription) = &subscription {
            subscription.unsubscribe();
        }

        if run.cancel.is_cancelled() {
            info!(
                "Session {} torn down at {}; discarding in-flight results",
                run.session_id,
                run.current_stage()
            );
            run.status.send_modify(SessionSnapshot::mark_cancelled);
            return;
        }

        match outcome {
            Ok(analysis) => {
                // Refresh first so the store already holds the new score when
                // the session reports Complete.
                if let Err(e) = self.store.refresh(&run.user_id).await {
                    warn!("Session {}: {e}", run.session_id);
                }
                if run.cancel.is_cancelled() {
                    run.status.send_modify(SessionSnapshot::mark_cancelled);
                    return;
                }
                let score = analysis.score;
                run.update(|s| s.complete(analysis));
                info!("Session {} complete (score {score})", run.session_id);
            }
            Err(err) => {
                let stage = err.stage().unwrap_or_else(|| run.current_stage());
                warn!("Session {} failed at {stage}: {err}", run.session_id);

                // The upload already created the document remotely; the
                // collection must reflect it even though analysis failed.
                let uploaded = run.status.borrow().document_id.is_some();
                if uploaded {
                    if let Err(e) = self.store.refresh(&run.user_id).await {
                        warn!("Session {}: {e}", run.session_id);
                    }
                }
                if run.cancel.is_cancelled() {
                    run.status.send_modify(SessionSnapshot::mark_cancelled);
                    return;
                }
                run.update(|s| s.fail(stage, err.to_string()));
            }
        }
    }

    async fn run_stages(&self, run: &SessionRun) -> Result<DocumentAnalysis, PipelineError> {
        let remote = self.remote.as_ref();
        let retry = &self.settings.retry;
        let session_id = run.session_id;
        let user_id = run.user_id.as_str();
        let file = &run.file;

        // Stage 1: upload
        run.enter(PipelineStage::Uploading);
        let receipt = retry
            .run_if("upload", RemoteError::is_safe_to_resend, move || {
                remote.upload(user_id, file, session_id)
            })
            .await
            .map_err(|source| PipelineError::Transport {
                stage: PipelineStage::Uploading,
                source,
            })?;

        if !receipt.accepted {
            return Err(PipelineError::Rejected {
                stage: PipelineStage::Uploading,
                reason: "the processor did not accept the upload".to_string(),
            });
        }
        let document_id = receipt.document_id.ok_or_else(|| PipelineError::Rejected {
            stage: PipelineStage::Uploading,
            reason: "upload response carried no document id".to_string(),
        })?;
        run.status
            .send_modify(|s| s.document_id = Some(document_id.clone()));
        debug!("Session {session_id} uploaded document {document_id}");

        // Stage 2: analysis
        run.enter(PipelineStage::Analyzing);
        let id = &document_id;
        retry
            .run("analyze", move || remote.analyze(id, session_id))
            .await
            .map_err(|source| PipelineError::Transport {
                stage: PipelineStage::Analyzing,
                source,
            })?;

        // Stage 3: derived statistics
        run.enter(PipelineStage::ComputingStats);
        let analysis = retry
            .run("compute_stats", move || remote.compute_stats(id, session_id))
            .await
            .map_err(|source| PipelineError::Transport {
                stage: PipelineStage::ComputingStats,
                source,
            })?;

        if !analysis.has_valid_score() {
            return Err(PipelineError::Rejected {
                stage: PipelineStage::ComputingStats,
                reason: format!("score {} is outside the 0–10 range", analysis.score),
            });
        }

        Ok(analysis)
    }

    async fn open_progress(&self, run: &SessionRun) -> Option<Subscription> {
        let status = Arc::clone(&run.status);
        let cancel = run.cancel.clone();
        let session_id = run.session_id;

        let callback: ProgressCallback = Arc::new(move |event: ProgressEvent| {
            if let Err(stale) = apply_progress(&status, &cancel, session_id, event) {
                debug!("Dropping progress event for session {session_id}: {stale}");
            }
        });

        let topic = &self.settings.progress_topic;
        match tokio::time::timeout(
            PROGRESS_CONNECT_TIMEOUT,
            self.progress.subscribe(topic, callback),
        )
        .await
        {
            Ok(Ok(subscription)) => Some(subscription),
            Ok(Err(e)) => {
                warn!("Session {session_id}: no live progress ({e})");
                None
            }
            Err(_) => {
                warn!("Session {session_id}: progress channel did not connect in time");
                None
            }
        }
    }
}

/// Applies an inbound progress event to the session it belongs to.
fn apply_progress(
    status: &watch::Sender<SessionSnapshot>,
    cancel: &CancellationToken,
    session_id: Uuid,
    event: ProgressEvent,
) -> Result<(), StaleEvent> {
    let message = match event {
        ProgressEvent::Tagged {
            session_id: id,
            message,
        } if id == session_id => message,
        ProgressEvent::Tagged { session_id: id, .. } => {
            return Err(StaleEvent::ForeignSession(id))
        }
        ProgressEvent::Untagged { .. } => return Err(StaleEvent::Uncorrelated),
    };

    if cancel.is_cancelled() {
        return Err(StaleEvent::SessionEnded(session_id));
    }

    let mut outcome = Ok(());
    status.send_if_modified(|snapshot| match snapshot.record_progress(&message) {
        Ok(()) => true,
        Err(stale) => {
            outcome = Err(stale);
            false
        }
    });
    outcome
}
