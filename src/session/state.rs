use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::FocusLabel;

/// Lifecycle of a focus session. Phases only ever advance:
/// Created → Active → Stopping → Stopped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Created,
    Active,
    Stopping,
    Stopped,
}

/// Raw frame counters. Accumulation stays integral; percentage rounding
/// happens only where a value becomes a reported artifact.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameCounters {
    pub total: u64,
    pub focused: u64,
    pub distracted: u64,
    pub unknown: u64,
}

impl FrameCounters {
    pub fn record(&mut self, label: FocusLabel) {
        self.total += 1;
        match label {
            FocusLabel::Focused => self.focused += 1,
            FocusLabel::Distracted => self.distracted += 1,
            FocusLabel::Unknown => self.unknown += 1,
        }
    }

    /// Focused share of all counted frames, rounded to two decimals.
    /// Zero when nothing has been counted yet.
    pub fn focus_percentage(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        round2(self.focused as f64 / self.total as f64 * 100.0)
    }
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Finalized statistics of a stopped session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub focus_percentage: f64,
    pub total_frames: u64,
    pub focused_frames: u64,
    pub distracted_frames: u64,
    pub duration_secs: u64,
}

/// Point-in-time statistics of a session that may still be running.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveStats {
    pub focus_percentage: f64,
    pub total_frames: u64,
    pub focused_frames: u64,
    pub distracted_frames: u64,
    pub is_running: bool,
}

/// Mutable core of a session, guarded by the session's lock.
///
/// The capture worker is the only writer of counters; a stop request only
/// ever advances the phase. Once `finish` has run, counters are frozen and
/// the computed statistics are cached for idempotent re-reads.
#[derive(Debug)]
pub struct SessionState {
    pub phase: SessionPhase,
    pub counters: FrameCounters,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    final_stats: Option<SessionStats>,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Created,
            counters: FrameCounters::default(),
            started_at: None,
            stopped_at: None,
            final_stats: None,
        }
    }

    /// Created → Active.
    pub fn begin(&mut self, now: DateTime<Utc>) {
        debug_assert_eq!(self.phase, SessionPhase::Created);
        self.phase = SessionPhase::Active;
        self.started_at = Some(now);
    }

    /// Count one classified frame. Returns false (and counts nothing) once
    /// the session is no longer ingesting; a frame already in flight while a
    /// stop request lands is still counted, which is why Stopping accepts it.
    pub fn record_frame(&mut self, label: FocusLabel) -> bool {
        match self.phase {
            SessionPhase::Active | SessionPhase::Stopping => {
                self.counters.record(label);
                true
            }
            SessionPhase::Created | SessionPhase::Stopped => false,
        }
    }

    /// Active → Stopping. No-op in any other phase.
    pub fn request_stop(&mut self) {
        if self.phase == SessionPhase::Active {
            self.phase = SessionPhase::Stopping;
        }
    }

    /// Advance to Stopped, freeze counters and cache the final statistics.
    /// Idempotent: later calls return the cached statistics unchanged.
    pub fn finish(&mut self, now: DateTime<Utc>) -> SessionStats {
        if let Some(stats) = &self.final_stats {
            return stats.clone();
        }

        self.phase = SessionPhase::Stopped;
        self.stopped_at = Some(now);

        let duration_secs = match (self.started_at, self.stopped_at) {
            (Some(start), Some(stop)) => (stop - start).num_seconds().max(0) as u64,
            _ => 0,
        };

        let stats = SessionStats {
            focus_percentage: self.counters.focus_percentage(),
            total_frames: self.counters.total,
            focused_frames: self.counters.focused,
            distracted_frames: self.counters.distracted,
            duration_secs,
        };
        self.final_stats = Some(stats.clone());
        stats
    }

    pub fn final_stats(&self) -> Option<SessionStats> {
        self.final_stats.clone()
    }

    pub fn live_stats(&self) -> LiveStats {
        LiveStats {
            focus_percentage: self.counters.focus_percentage(),
            total_frames: self.counters.total,
            focused_frames: self.counters.focused,
            distracted_frames: self.counters.distracted,
            // Stopping means ingestion has ceased (or is about to); callers
            // polling for liveness should see the session as done.
            is_running: self.phase == SessionPhase::Active,
        }
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
