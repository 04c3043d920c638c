use std::sync::Arc;

use chrono::Utc;
use log::{error, info};
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::capture::CaptureSource;
use crate::classify::FrameClassifier;
use crate::config::EngineConfig;
use crate::report::FocusReport;
use crate::stream::FrameStream;

use super::state::{LiveStats, SessionPhase, SessionState, SessionStats};
use super::worker::{capture_loop, WorkerContext};

/// Tracks whether this session's report has been finalized, and with what
/// result. Guarded by its own lock so that finalization runs at most once
/// even under concurrent stop requests.
#[derive(Debug, Default)]
pub(crate) struct FinalizeSlot {
    pub done: bool,
    pub report: Option<FocusReport>,
}

/// One bounded interval of monitoring: owns the capture worker, the running
/// counters and the stream fan-out for a single session id.
#[derive(Debug)]
pub struct FocusSession {
    id: String,
    owner_id: String,
    course_id: Option<String>,
    state: Arc<Mutex<SessionState>>,
    frames: broadcast::Sender<Arc<Vec<u8>>>,
    cancel: CancellationToken,
    worker: Mutex<Option<JoinHandle<()>>>,
    pub(crate) finalize: Mutex<FinalizeSlot>,
}

impl FocusSession {
    /// Create the session, transition it to Active and spawn its capture
    /// worker. The capture source has already been opened by the caller and
    /// is owned by the worker from here on.
    pub(crate) async fn spawn(
        id: String,
        owner_id: String,
        course_id: Option<String>,
        source: Box<dyn CaptureSource>,
        classifier: Arc<dyn FrameClassifier>,
        config: &EngineConfig,
    ) -> Arc<Self> {
        let mut initial = SessionState::new();
        initial.begin(Utc::now());

        let state = Arc::new(Mutex::new(initial));
        let (frames, _) = broadcast::channel(config.stream_buffer.max(1));
        let cancel = CancellationToken::new();

        let session = Arc::new(Self {
            id: id.clone(),
            owner_id,
            course_id,
            state: state.clone(),
            frames: frames.clone(),
            cancel: cancel.clone(),
            worker: Mutex::new(None),
            finalize: Mutex::new(FinalizeSlot::default()),
        });

        let ctx = WorkerContext {
            session_id: id,
            state,
            classifier,
            frames,
            cancel,
            capture_interval: config.capture_interval(),
            stall_timeout: config.stall_timeout(),
            jpeg_quality: config.jpeg_quality,
        };

        let handle = tokio::spawn(capture_loop(ctx, source));
        *session.worker.lock().await = Some(handle);

        info!("session {} active", session.id);
        session
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    pub fn course_id(&self) -> Option<&str> {
        self.course_id.as_deref()
    }

    pub async fn live_stats(&self) -> LiveStats {
        self.state.lock().await.live_stats()
    }

    pub async fn is_stopped(&self) -> bool {
        self.state.lock().await.phase == SessionPhase::Stopped
    }

    /// Subscribe to the annotated frame stream. The stream ends once the
    /// session leaves its active phase.
    pub fn subscribe(&self) -> FrameStream {
        FrameStream::new(self.frames.subscribe(), self.cancel.clone())
    }

    /// Drive the session to Stopped: request cancellation, wait for the
    /// worker to release the capture source and exit, then freeze counters.
    ///
    /// Idempotent. Concurrent callers serialize on the worker handle; all of
    /// them observe the same final statistics, and the source is released
    /// exactly once (by the worker, in its own context). One caveat: if the
    /// worker stopped because a read stalled, that read is still blocked when
    /// this returns, and the source is released by a drain task once the read
    /// comes back.
    pub(crate) async fn halt(&self) -> SessionStats {
        {
            let state = self.state.lock().await;
            if let Some(stats) = state.final_stats() {
                return stats;
            }
        }

        self.state.lock().await.request_stop();
        self.cancel.cancel();

        // Hold the handle lock until the statistics are frozen so a second
        // stop cannot observe a half-stopped session.
        let mut worker = self.worker.lock().await;
        if let Some(handle) = worker.take() {
            if let Err(err) = handle.await {
                error!("capture worker for session {} failed to join: {err}", self.id);
            }
        }

        let stats = self.state.lock().await.finish(Utc::now());
        drop(worker);

        info!(
            "session {} stopped: {} frames, {:.2}% focused",
            self.id, stats.total_frames, stats.focus_percentage
        );
        stats
    }
}
