//! Report finalization: the one place a stopped session's statistics become
//! a persisted record.

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::db::Database;
use crate::error::EngineError;
use crate::session::{FocusSession, SessionStats};

/// Persisted summary of one student's stopped session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusReport {
    pub id: String,
    pub student_id: String,
    pub course_id: Option<String>,
    pub session_id: String,
    pub focus_percentage: f64,
    pub focused_frames: u64,
    pub distracted_frames: u64,
    pub total_frames: u64,
    pub duration_secs: u64,
    /// Where the rendered document lives, once a renderer has produced one.
    pub report_path: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Renders a finalized report into a downloadable document (PDF or similar).
///
/// Invoked by the embedding application, never by the engine itself, and not
/// required to succeed for a report to count as finalized.
pub trait ReportRenderer: Send + Sync {
    fn render(&self, report: &FocusReport) -> anyhow::Result<Vec<u8>>;
}

/// Builds and saves the report record for a stopped session.
///
/// The registry's finalize gate guarantees this runs at most once per
/// session. A save failure never blocks the session's own stop path; the
/// camera is already released by the time this is reached.
pub struct ReportFinalizer {
    db: Database,
}

impl ReportFinalizer {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn finalize(
        &self,
        session: &FocusSession,
        stats: &SessionStats,
    ) -> Result<FocusReport, EngineError> {
        let report = FocusReport {
            id: Uuid::new_v4().to_string(),
            student_id: session.owner_id().to_string(),
            course_id: session.course_id().map(|id| id.to_string()),
            session_id: session.id().to_string(),
            focus_percentage: stats.focus_percentage,
            focused_frames: stats.focused_frames,
            distracted_frames: stats.distracted_frames,
            total_frames: stats.total_frames,
            duration_secs: stats.duration_secs,
            report_path: None,
            created_at: Utc::now(),
        };

        self.db
            .insert_report(&report)
            .await
            .map_err(|err| EngineError::Persistence {
                session_id: session.id().to_string(),
                source: err,
            })?;

        info!(
            "saved report {} for session {} ({:.2}% focused)",
            report.id, report.session_id, report.focus_percentage
        );
        Ok(report)
    }
}
