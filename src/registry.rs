//! The process-wide session registry and control surface.
//!
//! Maps session ids to running [`FocusSession`]s and enforces at most one
//! non-terminal session per id. The registry lock guards only map access:
//! device acquisition happens off-lock behind a per-id reservation, and stop
//! requests drop the lock before joining a worker, so sessions under
//! different ids start and stop independently.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{error, info, warn};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::capture::CaptureOpener;
use crate::classify::FrameClassifier;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::EngineError;
use crate::report::{FocusReport, ReportFinalizer};
use crate::session::{FocusSession, LiveStats, SessionStats};
use crate::stream::FrameStream;

/// Result of a successful stop. `report` is `None` when the statistics could
/// not be persisted; the session is stopped and its camera released either
/// way.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StopResponse {
    pub statistics: SessionStats,
    pub report: Option<FocusReport>,
}

/// Registered sessions plus the ids currently acquiring a device. A pending
/// id claims the slot while the (blocking) open runs off-lock; it is cleared
/// again on every open outcome.
#[derive(Default)]
struct RegistryState {
    sessions: HashMap<String, Arc<FocusSession>>,
    pending: HashSet<String>,
}

pub struct SessionRegistry {
    state: Mutex<RegistryState>,
    opener: Arc<dyn CaptureOpener>,
    classifier: Arc<dyn FrameClassifier>,
    finalizer: ReportFinalizer,
    config: EngineConfig,
}

impl SessionRegistry {
    pub fn new(
        opener: Arc<dyn CaptureOpener>,
        classifier: Arc<dyn FrameClassifier>,
        db: Database,
        config: EngineConfig,
    ) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            opener,
            classifier,
            finalizer: ReportFinalizer::new(db),
            config,
        }
    }

    /// Start monitoring under `session_id` for `owner_id`.
    ///
    /// Fails with `AlreadyActive` if a non-terminal session holds the id and
    /// with `CameraUnavailable` if the device cannot be acquired; in the
    /// latter case nothing is registered, so a retry with the same id can
    /// succeed. The registry lock is not held while the device opens, so a
    /// slow camera never blocks operations on other ids.
    pub async fn start(
        &self,
        session_id: impl Into<String>,
        course_id: Option<String>,
        owner_id: impl Into<String>,
    ) -> Result<Arc<FocusSession>, EngineError> {
        let session_id = session_id.into();

        {
            let mut state = self.state.lock().await;
            if state.pending.contains(&session_id) {
                return Err(EngineError::AlreadyActive(session_id));
            }
            if let Some(existing) = state.sessions.get(&session_id) {
                if !existing.is_stopped().await {
                    return Err(EngineError::AlreadyActive(session_id));
                }
                // terminal entry that was never removed; replace it
                state.sessions.remove(&session_id);
            }
            state.pending.insert(session_id.clone());
        }

        let opener = self.opener.clone();
        let device_index = self.config.device_index;
        let opened = tokio::task::spawn_blocking(move || opener.open(device_index)).await;

        let source = match opened {
            Ok(Ok(source)) => source,
            Ok(Err(err)) => {
                self.state.lock().await.pending.remove(&session_id);
                return Err(EngineError::CameraUnavailable(err.to_string()));
            }
            Err(err) => {
                self.state.lock().await.pending.remove(&session_id);
                return Err(EngineError::CameraUnavailable(format!(
                    "capture open task failed: {err}"
                )));
            }
        };

        let session = FocusSession::spawn(
            session_id.clone(),
            owner_id.into(),
            course_id,
            source,
            self.classifier.clone(),
            &self.config,
        )
        .await;

        let mut state = self.state.lock().await;
        state.pending.remove(&session_id);
        state.sessions.insert(session_id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, session_id: &str) -> Result<Arc<FocusSession>, EngineError> {
        self.state
            .lock()
            .await
            .sessions
            .get(session_id)
            .cloned()
            .ok_or_else(|| EngineError::NotFound(session_id.to_string()))
    }

    pub async fn live_stats(&self, session_id: &str) -> Result<LiveStats, EngineError> {
        let session = self.get(session_id).await?;
        Ok(session.live_stats().await)
    }

    /// Subscribe to a session's annotated frame stream.
    pub async fn stream(&self, session_id: &str) -> Result<FrameStream, EngineError> {
        let session = self.get(session_id).await?;
        Ok(session.subscribe())
    }

    /// Stop a session: join its worker (which releases the camera), finalize
    /// the report exactly once, then drop the registry entry.
    ///
    /// Does not return until release and finalization have both completed,
    /// with one exception: when a stall forced the stop, the camera's blocked
    /// read cannot be interrupted, so its release happens on a drain task as
    /// soon as that read returns, possibly after this method has returned. A
    /// concurrent duplicate stop observes the identical statistics; a stop
    /// arriving after removal gets `NotFound`.
    pub async fn stop(&self, session_id: &str) -> Result<StopResponse, EngineError> {
        let session = self.get(session_id).await?;

        let mut gate = session.finalize.lock().await;
        let stats = session.halt().await;

        if !gate.done {
            gate.done = true;
            match self.finalizer.finalize(&session, &stats).await {
                Ok(report) => gate.report = Some(report),
                Err(err) => {
                    // the session is stopped and the camera released; the
                    // caller still gets its statistics
                    error!("failed to save report for session {session_id}: {err:#}");
                }
            }
        }
        let report = gate.report.clone();
        drop(gate);

        if report.is_none() {
            warn!("session {session_id} stopped without a saved report");
        }

        // The id may have been legitimately restarted while this stop was
        // finalizing; only evict the entry if it is still our session.
        {
            let mut state = self.state.lock().await;
            if state
                .sessions
                .get(session.id())
                .is_some_and(|current| Arc::ptr_eq(current, &session))
            {
                state.sessions.remove(session.id());
                info!("session {session_id} removed from registry");
            }
        }

        Ok(StopResponse {
            statistics: stats,
            report,
        })
    }

    /// Ids of all registered sessions, running or awaiting removal.
    pub async fn active_ids(&self) -> Vec<String> {
        self.state.lock().await.sessions.keys().cloned().collect()
    }
}
