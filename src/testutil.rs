//! Shared test doubles: scripted capture sources and classifiers, plus small
//! fixture helpers.

use std::future::Future;
use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use image::RgbImage;
use tempfile::TempDir;

use crate::capture::{CaptureOpener, CaptureSource, Frame, FrameRead};
use crate::classify::{FocusLabel, FrameClassifier};
use crate::db::Database;
use crate::error::{ClassifyError, OpenError};
use crate::report::FocusReport;

pub(crate) fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
    let image = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    Frame::new(image)
}

/// Deterministic per-pixel noise so perceptually distinct frames stay
/// distinct across runs.
pub(crate) fn noise_frame(width: u32, height: u32, seed: u64) -> Frame {
    let mut state = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
    let mut next = move || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as u8
    };

    let image = RgbImage::from_fn(width, height, |_, _| image::Rgb([next(), next(), next()]));
    Frame::new(image)
}

pub(crate) fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
    let image = RgbImage::from_pixel(width, height, image::Rgb(rgb));
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

pub(crate) fn test_database() -> (Database, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::new(dir.path().join("focuswatch-test.sqlite3")).unwrap();
    (db, dir)
}

pub(crate) fn sample_report(
    id: &str,
    student_id: &str,
    session_id: &str,
    focus_percentage: f64,
) -> FocusReport {
    let focused = focus_percentage.round() as u64;
    FocusReport {
        id: id.to_string(),
        student_id: student_id.to_string(),
        course_id: None,
        session_id: session_id.to_string(),
        focus_percentage,
        focused_frames: focused,
        distracted_frames: 100 - focused,
        total_frames: 100,
        duration_secs: 60,
        report_path: None,
        created_at: Utc::now(),
    }
}

/// Poll `cond` until it holds or the deadline passes (then panic).
pub(crate) async fn wait_until<F, Fut>(timeout: Duration, mut cond: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if cond().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition not met within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

/// Capture source that serves generated frames: a fixed number of them, or
/// endlessly until released. Counts every release call so tests can assert
/// the source was released exactly once.
pub(crate) struct ScriptedSource {
    remaining: Option<usize>,
    released: Arc<AtomicBool>,
    release_count: Arc<AtomicUsize>,
}

impl CaptureSource for ScriptedSource {
    fn read_frame(&mut self) -> FrameRead {
        if self.released.load(Ordering::SeqCst) {
            return FrameRead::EndOfStream;
        }

        match &mut self.remaining {
            Some(0) => FrameRead::EndOfStream,
            Some(n) => {
                *n -= 1;
                FrameRead::Frame(solid_frame(32, 32, [90, 90, 90]))
            }
            None => FrameRead::Frame(solid_frame(32, 32, [90, 90, 90])),
        }
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct ScriptedOpener {
    frames_per_open: Option<usize>,
    release_count: Arc<AtomicUsize>,
}

impl ScriptedOpener {
    pub fn bounded(frames: usize) -> Self {
        Self {
            frames_per_open: Some(frames),
            release_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn endless() -> Self {
        Self {
            frames_per_open: None,
            release_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

impl CaptureOpener for ScriptedOpener {
    fn open(&self, _device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError> {
        Ok(Box::new(ScriptedSource {
            remaining: self.frames_per_open,
            released: Arc::new(AtomicBool::new(false)),
            release_count: self.release_count.clone(),
        }))
    }
}

/// Source whose read parks on a channel until the test lets it go, standing
/// in for a wedged camera driver. Once unblocked (or released) reads report
/// end of stream.
pub(crate) struct BlockingSource {
    gate: std::sync::mpsc::Receiver<()>,
    released: bool,
    release_count: Arc<AtomicUsize>,
}

impl CaptureSource for BlockingSource {
    fn read_frame(&mut self) -> FrameRead {
        if !self.released {
            // parks until the test drops the sender
            let _ = self.gate.recv();
        }
        FrameRead::EndOfStream
    }

    fn release(&mut self) {
        self.released = true;
        self.release_count.fetch_add(1, Ordering::SeqCst);
    }
}

pub(crate) struct BlockingOpener {
    gate: Mutex<Option<std::sync::mpsc::Sender<()>>>,
    release_count: Arc<AtomicUsize>,
}

impl BlockingOpener {
    pub fn new() -> Self {
        Self {
            gate: Mutex::new(None),
            release_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Let the parked read return.
    pub fn unblock(&self) {
        *self.gate.lock().unwrap() = None;
    }

    pub fn release_count(&self) -> usize {
        self.release_count.load(Ordering::SeqCst)
    }
}

impl CaptureOpener for BlockingOpener {
    fn open(&self, _device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError> {
        let (tx, rx) = std::sync::mpsc::channel();
        *self.gate.lock().unwrap() = Some(tx);
        Ok(Box::new(BlockingSource {
            gate: rx,
            released: false,
            release_count: self.release_count.clone(),
        }))
    }
}

/// Opener whose first `open` parks until the test signals, then serves an
/// endless source. Later opens return immediately.
pub(crate) struct SlowOpener {
    gate: Mutex<Option<std::sync::mpsc::Receiver<()>>>,
    open_calls: Arc<AtomicUsize>,
    release_count: Arc<AtomicUsize>,
}

impl SlowOpener {
    pub fn new() -> (Self, std::sync::mpsc::Sender<()>) {
        let (tx, rx) = std::sync::mpsc::channel();
        let opener = Self {
            gate: Mutex::new(Some(rx)),
            open_calls: Arc::new(AtomicUsize::new(0)),
            release_count: Arc::new(AtomicUsize::new(0)),
        };
        (opener, tx)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }
}

impl CaptureOpener for SlowOpener {
    fn open(&self, _device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            // parks until the test signals (or drops) the sender
            let _ = gate.recv();
        }
        Ok(Box::new(ScriptedSource {
            remaining: None,
            released: Arc::new(AtomicBool::new(false)),
            release_count: self.release_count.clone(),
        }))
    }
}

/// Opener standing in for a missing or busy camera.
pub(crate) struct FailingOpener;

impl CaptureOpener for FailingOpener {
    fn open(&self, device_index: u32) -> Result<Box<dyn CaptureSource>, OpenError> {
        Err(OpenError::new(device_index, "device is busy"))
    }
}

enum ClassifierScript {
    Always(FocusLabel),
    Sequence(Vec<FocusLabel>),
    FailEveryOther,
}

/// Classifier that follows a script instead of looking at pixels.
pub(crate) struct ScriptedClassifier {
    script: ClassifierScript,
    calls: Mutex<usize>,
}

impl ScriptedClassifier {
    pub fn always(label: FocusLabel) -> Self {
        Self {
            script: ClassifierScript::Always(label),
            calls: Mutex::new(0),
        }
    }

    pub fn sequence(labels: Vec<FocusLabel>) -> Self {
        Self {
            script: ClassifierScript::Sequence(labels),
            calls: Mutex::new(0),
        }
    }

    /// Fails the first call, succeeds the second, and so on.
    pub fn failing_every_other() -> Self {
        Self {
            script: ClassifierScript::FailEveryOther,
            calls: Mutex::new(0),
        }
    }
}

impl FrameClassifier for ScriptedClassifier {
    fn classify(&self, _frame: &Frame) -> Result<FocusLabel, ClassifyError> {
        let mut calls = self.calls.lock().unwrap();
        let call = *calls;
        *calls += 1;

        match &self.script {
            ClassifierScript::Always(label) => Ok(*label),
            ClassifierScript::Sequence(labels) => {
                Ok(labels.get(call).copied().unwrap_or(FocusLabel::Unknown))
            }
            ClassifierScript::FailEveryOther => {
                if call % 2 == 0 {
                    Err(ClassifyError("scripted failure".into()))
                } else {
                    Ok(FocusLabel::Focused)
                }
            }
        }
    }
}
