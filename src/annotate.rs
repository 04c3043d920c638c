//! Label overlay and JPEG encoding for streamed frames.
//!
//! The classification verdict is rendered as a color-coded status band along
//! the top edge of the frame: green for focused, red for distracted, gray
//! when no model is loaded.

use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, Rgb, RgbImage};

use crate::capture::Frame;
use crate::classify::FocusLabel;

const FOCUSED_COLOR: Rgb<u8> = Rgb([0, 200, 80]);
const DISTRACTED_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
const UNKNOWN_COLOR: Rgb<u8> = Rgb([120, 120, 120]);

fn band_color(label: FocusLabel) -> Rgb<u8> {
    match label {
        FocusLabel::Focused => FOCUSED_COLOR,
        FocusLabel::Distracted => DISTRACTED_COLOR,
        FocusLabel::Unknown => UNKNOWN_COLOR,
    }
}

/// Copy the frame with its status band applied.
pub fn annotate(frame: &Frame, label: FocusLabel) -> RgbImage {
    let mut image = frame.image.clone();
    let height = image.height();
    let band_height = (height / 20).max(4).min(height);
    let color = band_color(label);

    for y in 0..band_height {
        for x in 0..image.width() {
            image.put_pixel(x, y, color);
        }
    }

    image
}

pub fn encode_jpeg(image: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
    image
        .write_with_encoder(encoder)
        .context("failed to JPEG-encode frame")?;
    Ok(bytes)
}

/// Annotate and encode in one pass; this is what the capture loop publishes.
pub fn annotated_jpeg(frame: &Frame, label: FocusLabel, quality: u8) -> Result<Vec<u8>> {
    encode_jpeg(&annotate(frame, label), quality)
}
