use thiserror::Error;

/// Errors surfaced by the session control surface.
///
/// Per-frame problems (a frame that cannot be classified, a slow camera) are
/// recovered inside the capture loop and never show up here; this taxonomy
/// covers only the operations a caller invokes directly.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The capture device could not be acquired. No session was created and
    /// nothing was registered, so a later start with the same id may succeed.
    #[error("could not access camera: {0}")]
    CameraUnavailable(String),

    /// A non-terminal session already exists under this id. The existing
    /// session is left untouched.
    #[error("session {0} is already active")]
    AlreadyActive(String),

    /// No session is registered under this id.
    #[error("session {0} not found")]
    NotFound(String),

    /// The finalized report could not be saved. The session itself is
    /// stopped and its camera released regardless.
    #[error("report for session {session_id} was not saved")]
    Persistence {
        session_id: String,
        #[source]
        source: anyhow::Error,
    },
}

/// A capture device could not be opened (missing, busy, permission denied).
#[derive(Debug, Error)]
#[error("failed to open capture device {device_index}: {reason}")]
pub struct OpenError {
    pub device_index: u32,
    pub reason: String,
}

impl OpenError {
    pub fn new(device_index: u32, reason: impl Into<String>) -> Self {
        Self {
            device_index,
            reason: reason.into(),
        }
    }
}

/// A well-formed-looking frame could not be classified (malformed image
/// data). Distinct from `FocusLabel::Unknown`, which is a successful
/// classification with no loaded model.
#[derive(Debug, Error)]
#[error("frame could not be classified: {0}")]
pub struct ClassifyError(pub String);
