//! Capture sources: the owned camera/video handle a session reads frames from.
//!
//! A source is exclusively owned by one session for its active lifetime. The
//! read contract is blocking-pull: `read_frame` suspends the calling thread
//! until a frame is available or the source is exhausted. After `release` the
//! source only ever reports `EndOfStream`; release itself is idempotent.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use image::RgbImage;
use log::warn;

use crate::error::OpenError;

/// One still image pulled from a capture source.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }

    /// Decode an encoded still (PNG, JPEG, ...) into a frame.
    pub fn from_encoded(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes).context("failed to decode frame bytes")?;
        Ok(Self::new(image.to_rgb8()))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Result of one blocking read from a capture source.
pub enum FrameRead {
    Frame(Frame),
    /// The source is exhausted or has been released. Never an error: a
    /// session treats this as an implicit stop trigger.
    EndOfStream,
}

pub trait CaptureSource: Send {
    /// Blocking read of the next frame.
    fn read_frame(&mut self) -> FrameRead;

    /// Release the underlying device handle. Idempotent; after release,
    /// `read_frame` returns `EndOfStream`.
    fn release(&mut self);
}

/// Acquires capture devices on session start.
pub trait CaptureOpener: Send + Sync {
    fn open(&self, device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError>;
}

const FRAME_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// Capture source backed by an ordered directory of encoded still images.
///
/// Useful for pre-recorded footage and for exercising the engine without
/// camera hardware; real camera backends plug in through [`CaptureSource`].
pub struct ImageDirSource {
    files: Vec<PathBuf>,
    cursor: usize,
    released: bool,
}

impl ImageDirSource {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        files.sort();

        if files.is_empty() {
            anyhow::bail!("no image files in {}", dir.display());
        }

        Ok(Self {
            files,
            cursor: 0,
            released: false,
        })
    }
}

impl CaptureSource for ImageDirSource {
    fn read_frame(&mut self) -> FrameRead {
        while !self.released && self.cursor < self.files.len() {
            let path = &self.files[self.cursor];
            self.cursor += 1;

            match std::fs::read(path).map_err(anyhow::Error::from).and_then(
                |bytes| Frame::from_encoded(&bytes),
            ) {
                Ok(frame) => return FrameRead::Frame(frame),
                Err(err) => {
                    warn!("skipping unreadable frame {}: {err:#}", path.display());
                }
            }
        }

        FrameRead::EndOfStream
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Opener for [`ImageDirSource`] directories. If the root contains a
/// `device<N>` subdirectory it is used for device index N, otherwise the
/// root itself serves every index.
pub struct ImageDirOpener {
    root: PathBuf,
}

impl ImageDirOpener {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl CaptureOpener for ImageDirOpener {
    fn open(&self, device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError> {
        let per_device = self.root.join(format!("device{device_index}"));
        let dir = if per_device.is_dir() {
            per_device
        } else {
            self.root.clone()
        };

        ImageDirSource::open(&dir)
            .map(|source| Box::new(source) as Box<dyn CaptureSource>)
            .map_err(|err| OpenError::new(device_index, format!("{err:#}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::solid_png;

    #[test]
    fn dir_source_reads_frames_in_order_then_ends() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.png"), solid_png(4, 4, [255, 0, 0])).unwrap();
        std::fs::write(dir.path().join("002.png"), solid_png(4, 4, [0, 255, 0])).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"not a frame").unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        let FrameRead::Frame(first) = source.read_frame() else {
            panic!("expected first frame");
        };
        assert_eq!(first.image.get_pixel(0, 0).0, [255, 0, 0]);

        assert!(matches!(source.read_frame(), FrameRead::Frame(_)));
        assert!(matches!(source.read_frame(), FrameRead::EndOfStream));
    }

    #[test]
    fn released_source_only_reports_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("001.png"), solid_png(4, 4, [1, 2, 3])).unwrap();

        let mut source = ImageDirSource::open(dir.path()).unwrap();
        source.release();
        source.release();
        assert!(matches!(source.read_frame(), FrameRead::EndOfStream));
    }

    #[test]
    fn opener_fails_for_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let opener = ImageDirOpener::new(dir.path());
        assert!(opener.open(0).is_err());
    }
}
