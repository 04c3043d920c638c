//! Frame classification: a pluggable model answering "is this student
//! focused?" for a single frame.

use serde::{Deserialize, Serialize};

use crate::capture::Frame;
use crate::error::ClassifyError;

mod phash;

pub use phash::PhashClassifier;

/// Verdict for one classified frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusLabel {
    Focused,
    Distracted,
    /// No model is loaded. Counted toward the frame total but toward neither
    /// the focused nor the distracted bucket.
    Unknown,
}

impl FocusLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusLabel::Focused => "Focused",
            FocusLabel::Distracted => "Distracted",
            FocusLabel::Unknown => "Unknown",
        }
    }
}

/// Stateless-per-call frame classifier.
///
/// Implementations must not fail for a well-formed frame; a missing model is
/// reported as `Unknown`, not as an error.
pub trait FrameClassifier: Send + Sync {
    fn classify(&self, frame: &Frame) -> Result<FocusLabel, ClassifyError>;
}
