use image_hasher::{HashAlg, Hasher, HasherConfig, ImageHash};

use crate::capture::Frame;
use crate::error::ClassifyError;

use super::{FocusLabel, FrameClassifier};

const DEFAULT_DISTANCE_THRESHOLD: u32 = 10;

/// Perceptual-hash classifier.
///
/// Calibrated with a reference frame of the attentive student; a live frame
/// whose hash stays within `distance_threshold` hamming bits of the
/// reference reads as Focused, anything further as Distracted. Without a
/// calibrated reference every frame is `Unknown`.
pub struct PhashClassifier {
    hasher: Hasher,
    reference: Option<ImageHash>,
    distance_threshold: u32,
}

impl PhashClassifier {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_DISTANCE_THRESHOLD)
    }

    pub fn with_threshold(distance_threshold: u32) -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::DoubleGradient)
            .hash_size(8, 8)
            .to_hasher();

        Self {
            hasher,
            reference: None,
            distance_threshold,
        }
    }

    /// Calibrate against a frame of the student in a focused posture.
    pub fn calibrate(&mut self, reference: &Frame) -> Result<(), ClassifyError> {
        let hash = self.hash(reference)?;
        self.reference = Some(hash);
        Ok(())
    }

    pub fn is_calibrated(&self) -> bool {
        self.reference.is_some()
    }

    fn hash(&self, frame: &Frame) -> Result<ImageHash, ClassifyError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(ClassifyError("empty frame".into()));
        }
        Ok(self.hasher.hash_image(&frame.image))
    }
}

impl Default for PhashClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClassifier for PhashClassifier {
    fn classify(&self, frame: &Frame) -> Result<FocusLabel, ClassifyError> {
        let Some(reference) = &self.reference else {
            return Ok(FocusLabel::Unknown);
        };

        let hash = self.hash(frame)?;
        if hash.dist(reference) <= self.distance_threshold {
            Ok(FocusLabel::Focused)
        } else {
            Ok(FocusLabel::Distracted)
        }
    }
}
