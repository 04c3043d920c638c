//! focuswatch — live focus-session engine.
//!
//! The engine drives one camera-fed classification loop per monitored
//! session: frames are pulled from an owned [`capture::CaptureSource`],
//! labeled by a pluggable [`classify::FrameClassifier`], counted, annotated
//! and published as a multipart video stream. Stopping a session joins its
//! capture worker, freezes the counters and finalizes a persisted report
//! exactly once. The [`registry::SessionRegistry`] is the control surface an
//! embedding application (HTTP layer, desktop shell) calls into; routing,
//! authentication and authorization live out there, not here.
//!
//! ```no_run
//! use std::sync::Arc;
//! use focuswatch::{
//!     capture::ImageDirOpener, classify::PhashClassifier, config::EngineConfig,
//!     db::Database, registry::SessionRegistry,
//! };
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let config = EngineConfig::default();
//! let db = Database::new(config.database_path.clone())?;
//! let registry = SessionRegistry::new(
//!     Arc::new(ImageDirOpener::new("./footage")),
//!     Arc::new(PhashClassifier::new()),
//!     db,
//!     config,
//! );
//!
//! registry.start("lecture-3", Some("cs101".into()), "student-42").await?;
//! let stats = registry.live_stats("lecture-3").await?;
//! let outcome = registry.stop("lecture-3").await?;
//! # Ok(())
//! # }
//! ```

mod annotate;
pub mod capture;
pub mod classify;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod registry;
pub mod report;
pub mod session;
pub mod stream;

#[cfg(test)]
pub(crate) mod testutil;

pub use capture::{CaptureOpener, CaptureSource, Frame, FrameRead};
pub use classify::{FocusLabel, FrameClassifier, PhashClassifier};
pub use config::EngineConfig;
pub use db::Database;
pub use error::{ClassifyError, EngineError, OpenError};
pub use registry::{SessionRegistry, StopResponse};
pub use report::{FocusReport, ReportFinalizer, ReportRenderer};
pub use session::{FocusSession, LiveStats, SessionPhase, SessionStats};
pub use stream::FrameStream;
