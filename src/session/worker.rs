//! The capture worker: one long-lived task per active session.
//!
//! The worker is the only writer of frame counters and the only task that
//! touches the capture source. Cancellation is cooperative: a stop request
//! cancels the token, the worker notices at its next loop boundary, releases
//! the source and exits. A frame already being processed when the request
//! lands completes its counter update first.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{broadcast, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::annotate;
use crate::capture::{CaptureSource, Frame, FrameRead};
use crate::classify::FrameClassifier;

use super::state::SessionState;

pub(crate) struct WorkerContext {
    pub session_id: String,
    pub state: Arc<Mutex<SessionState>>,
    pub classifier: Arc<dyn FrameClassifier>,
    pub frames: broadcast::Sender<Arc<Vec<u8>>>,
    pub cancel: CancellationToken,
    pub capture_interval: Duration,
    pub stall_timeout: Option<Duration>,
    pub jpeg_quality: u8,
}

enum ReadOutcome {
    Frame(Box<dyn CaptureSource>, Frame),
    EndOfStream(Box<dyn CaptureSource>),
    /// No frame within the stall window; the abandoned read drains and
    /// releases the source on a side task.
    Stalled,
    JoinFailed,
}

pub(crate) async fn capture_loop(ctx: WorkerContext, source: Box<dyn CaptureSource>) {
    let mut ticker = tokio::time::interval(ctx.capture_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut source = Some(source);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let Some(src) = source.take() else { break };

                match read_one(src, ctx.stall_timeout).await {
                    ReadOutcome::Frame(src, frame) => {
                        source = Some(src);
                        process_frame(&ctx, frame).await;
                    }
                    ReadOutcome::EndOfStream(mut src) => {
                        info!("capture source for session {} exhausted, stopping", ctx.session_id);
                        src.release();
                        ctx.state.lock().await.request_stop();
                        break;
                    }
                    ReadOutcome::Stalled => {
                        warn!(
                            "no frame within {:?} for session {}, stopping",
                            ctx.stall_timeout, ctx.session_id
                        );
                        ctx.state.lock().await.request_stop();
                        break;
                    }
                    ReadOutcome::JoinFailed => {
                        error!("capture read worker for session {} failed to join", ctx.session_id);
                        ctx.state.lock().await.request_stop();
                        break;
                    }
                }
            }
            _ = ctx.cancel.cancelled() => {
                info!("capture loop for session {} shutting down", ctx.session_id);
                break;
            }
        }
    }

    if let Some(mut src) = source.take() {
        src.release();
    }
}

/// One blocking read, hopped onto the blocking pool. The source travels into
/// the read task and back out so that release never races a read.
async fn read_one(source: Box<dyn CaptureSource>, stall: Option<Duration>) -> ReadOutcome {
    let mut source = source;
    let mut task = tokio::task::spawn_blocking(move || {
        let read = source.read_frame();
        (source, read)
    });

    let joined = match stall {
        Some(window) => match tokio::time::timeout(window, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                // The blocking read is still in flight and cannot be
                // interrupted; drain it elsewhere and release there.
                tokio::spawn(async move {
                    if let Ok((mut source, _)) = task.await {
                        source.release();
                    }
                });
                return ReadOutcome::Stalled;
            }
        },
        None => task.await,
    };

    match joined {
        Ok((source, FrameRead::Frame(frame))) => ReadOutcome::Frame(source, frame),
        Ok((source, FrameRead::EndOfStream)) => ReadOutcome::EndOfStream(source),
        Err(_) => ReadOutcome::JoinFailed,
    }
}

async fn process_frame(ctx: &WorkerContext, frame: Frame) {
    let classifier = ctx.classifier.clone();
    let classified = tokio::task::spawn_blocking(move || {
        let label = classifier.classify(&frame);
        (frame, label)
    })
    .await;

    let (frame, label) = match classified {
        Ok((frame, Ok(label))) => (frame, label),
        Ok((_, Err(err))) => {
            // recovered locally: skip the frame, keep the session running
            warn!("classification failed for session {}: {err}", ctx.session_id);
            return;
        }
        Err(err) => {
            error!("classification worker for session {} panicked: {err}", ctx.session_id);
            return;
        }
    };

    if !ctx.state.lock().await.record_frame(label) {
        return;
    }

    let quality = ctx.jpeg_quality;
    let encoded = tokio::task::spawn_blocking(move || {
        annotate::annotated_jpeg(&frame, label, quality)
    })
    .await;

    match encoded {
        Ok(Ok(jpeg)) => {
            // no receivers is fine, nobody is watching the stream right now
            let _ = ctx.frames.send(Arc::new(jpeg));
        }
        Ok(Err(err)) => warn!("failed to encode frame for session {}: {err:#}", ctx.session_id),
        Err(err) => error!("encode worker for session {} panicked: {err}", ctx.session_id),
    }
}
