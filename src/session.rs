//! Tracking session: the capture-and-process loop
//!
//! One tick per captured frame. Control requests (tuning swaps, calibration,
//! stop) come in through a [`SessionHandle`] and are picked up at the top of
//! the next tick, so a tick never observes a half-applied change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch, Notify};
use tracing::{debug, error, info, warn};

use crate::error::{FacerigError, Result, TrackingError};
use crate::output::OutputDispatcher;
use crate::pipeline::{CalibrationStatus, Pipeline, Tuning};
use crate::tracking::LandmarkSource;

/// Control requests applied between ticks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    StartCalibration,
    CommitCalibration,
    ResetCalibration,
    ResetSmoothing,
}

/// Counters reported when the session ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub ticks: u64,
    pub no_face_ticks: u64,
    /// Malformed detector packets
    pub source_errors: u64,
    /// Per-sink dispatches skipped because the previous one was still running
    pub dispatch_skipped: u64,
    /// Ticks that took longer than one frame interval
    pub overruns: u64,
}

#[derive(Debug, Default)]
struct StopSignal {
    requested: AtomicBool,
    notify: Notify,
}

/// Control surface for a running session. Cheap to clone.
#[derive(Clone)]
pub struct SessionHandle {
    tuning: Arc<watch::Sender<Arc<Tuning>>>,
    commands: mpsc::UnboundedSender<SessionCommand>,
    calibration: watch::Receiver<CalibrationStatus>,
    stop: Arc<StopSignal>,
}

impl SessionHandle {
    /// Publish a new tuning snapshot; the next tick uses it in full
    pub fn update_tuning(&self, tuning: Tuning) {
        self.tuning.send_replace(Arc::new(tuning));
    }

    /// Snapshot currently in effect
    pub fn tuning(&self) -> Arc<Tuning> {
        Arc::clone(&*self.tuning.borrow())
    }

    /// Returns `false` if the session has already ended
    pub fn start_calibration(&self) -> bool {
        self.send(SessionCommand::StartCalibration)
    }

    pub fn commit_calibration(&self) -> bool {
        self.send(SessionCommand::CommitCalibration)
    }

    pub fn reset_calibration(&self) -> bool {
        self.send(SessionCommand::ResetCalibration)
    }

    pub fn reset_smoothing(&self) -> bool {
        self.send(SessionCommand::ResetSmoothing)
    }

    /// Calibration status as of the last completed tick
    pub fn calibration_status(&self) -> CalibrationStatus {
        *self.calibration.borrow()
    }

    /// Finish the current tick and exit
    pub fn stop(&self) {
        self.stop.requested.store(true, Ordering::SeqCst);
        self.stop.notify.notify_one();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.requested.load(Ordering::SeqCst)
    }

    fn send(&self, command: SessionCommand) -> bool {
        self.commands.send(command).is_ok()
    }
}

pub struct TrackingSession<S> {
    source: S,
    pipeline: Pipeline,
    dispatcher: OutputDispatcher,
    tuning: watch::Receiver<Arc<Tuning>>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    calibration: watch::Sender<CalibrationStatus>,
    stop: Arc<StopSignal>,
    frame_budget: Duration,
    stats: SessionStats,
}

impl<S: LandmarkSource> TrackingSession<S> {
    pub fn new(
        source: S,
        pipeline: Pipeline,
        dispatcher: OutputDispatcher,
        tuning: Tuning,
    ) -> (Self, SessionHandle) {
        let (tuning_tx, tuning_rx) = watch::channel(Arc::new(tuning));
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (calibration_tx, calibration_rx) = watch::channel(pipeline.calibrator().status());
        let stop = Arc::new(StopSignal::default());

        let session = Self {
            source,
            pipeline,
            dispatcher,
            tuning: tuning_rx,
            commands: command_rx,
            calibration: calibration_tx,
            stop: Arc::clone(&stop),
            frame_budget: frame_interval(30),
            stats: SessionStats::default(),
        };
        let handle = SessionHandle {
            tuning: Arc::new(tuning_tx),
            commands: command_tx,
            calibration: calibration_rx,
            stop,
        };
        (session, handle)
    }

    /// Tick budget used for overrun accounting (default 30 fps)
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.frame_budget = frame_interval(fps);
        self
    }

    /// Run until stopped or the source is exhausted.
    ///
    /// Only a failing source is fatal; sink and calibration problems are
    /// logged and the loop carries on.
    pub async fn run(mut self) -> Result<SessionStats> {
        info!("Tracking session started");

        loop {
            if self.stop.requested.load(Ordering::SeqCst) {
                break;
            }

            let next = tokio::select! {
                biased;
                _ = self.stop.notify.notified() => break,
                next = self.source.next_frame() => next,
            };

            let captured = match next {
                Ok(Some(captured)) => captured,
                Ok(None) => {
                    info!("Landmark source exhausted");
                    break;
                }
                Err(e) if is_recoverable(&e) => {
                    self.stats.source_errors += 1;
                    if self.stats.source_errors == 1 || self.stats.source_errors % 100 == 0 {
                        warn!(
                            "Dropped landmark packet ({} so far): {}",
                            self.stats.source_errors, e
                        );
                    } else {
                        debug!("Dropped landmark packet: {}", e);
                    }
                    continue;
                }
                Err(e) => {
                    error!("Landmark source failed: {}", e);
                    self.dispatcher.drain().await;
                    return Err(e);
                }
            };

            let started = Instant::now();
            self.apply_commands();

            // one snapshot for the whole tick
            let tuning = Arc::clone(&*self.tuning.borrow());
            let frame = self
                .pipeline
                .process(&captured.landmarks, &tuning)
                .with_raster(captured.raster);

            self.stats.ticks += 1;
            if !frame.face_detected() {
                self.stats.no_face_ticks += 1;
            }

            let report = self.dispatcher.dispatch(&frame);
            self.stats.dispatch_skipped += report.skipped_busy as u64;

            let status = self.pipeline.calibrator().status();
            self.calibration.send_if_modified(|current| {
                let changed = *current != status;
                *current = status;
                changed
            });

            let elapsed = started.elapsed();
            if elapsed > self.frame_budget {
                self.stats.overruns += 1;
                warn!(
                    "Tick {} took {:?} (budget {:?})",
                    frame.sequence(),
                    elapsed,
                    self.frame_budget
                );
            }
        }

        self.dispatcher.drain().await;
        for (name, health, failures) in self.dispatcher.sink_status() {
            if failures > 0 {
                info!(
                    "Output sink '{}' ended {} with {} failures",
                    name,
                    health.map_or_else(|| "busy".to_string(), |h| h.to_string()),
                    failures
                );
            }
        }
        info!(
            "Tracking session stopped: {} ticks, {} without face, {} source errors, \
             {} skipped dispatches, {} overruns",
            self.stats.ticks,
            self.stats.no_face_ticks,
            self.stats.source_errors,
            self.stats.dispatch_skipped,
            self.stats.overruns
        );
        Ok(self.stats)
    }

    fn apply_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            debug!("Session command: {:?}", command);
            match command {
                SessionCommand::StartCalibration => {
                    self.pipeline.calibrator_mut().start_calibration()
                }
                SessionCommand::CommitCalibration => {
                    if let Err(notice) = self.pipeline.calibrator_mut().commit() {
                        warn!("Calibration commit ignored: {}", notice);
                    }
                }
                SessionCommand::ResetCalibration => self.pipeline.calibrator_mut().reset(),
                SessionCommand::ResetSmoothing => self.pipeline.reset_smoothing(),
            }
        }
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

/// Bad packets are skipped; anything else means the source is gone
fn is_recoverable(error: &FacerigError) -> bool {
    matches!(
        error,
        FacerigError::Tracking(TrackingError::PacketParse(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::LandmarkFrame;
    use crate::tracking::{CapturedFrame, ReplaySource};
    use tokio::runtime::Handle;

    fn no_face_source(count: u64) -> ReplaySource {
        ReplaySource::new((1..=count).map(|seq| CapturedFrame::new(LandmarkFrame::no_face(seq))))
    }

    fn session<S: LandmarkSource>(source: S) -> (TrackingSession<S>, SessionHandle) {
        TrackingSession::new(
            source,
            Pipeline::default(),
            OutputDispatcher::new(Handle::current()),
            Tuning::default(),
        )
    }

    /// Fails once with a bad packet, then reports a dead socket
    struct FailingSource {
        calls: u32,
    }

    impl LandmarkSource for FailingSource {
        async fn next_frame(&mut self) -> Result<Option<CapturedFrame>> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(TrackingError::PacketParse("garbage".to_string()).into());
            }
            Err(TrackingError::SourceReceive("socket closed".to_string()).into())
        }
    }

    #[tokio::test]
    async fn test_runs_until_source_exhausted() {
        let (session, _handle) = session(no_face_source(5));
        let stats = session.run().await.unwrap();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.no_face_ticks, 5);
        assert_eq!(stats.source_errors, 0);
    }

    #[tokio::test]
    async fn test_stop_before_run() {
        let (session, handle) = session(no_face_source(5));
        handle.stop();
        assert!(handle.is_stopped());
        assert_eq!(session.run().await.unwrap().ticks, 0);
    }

    #[tokio::test]
    async fn test_stop_while_waiting_for_frames() {
        let source = no_face_source(1_000).with_interval(Duration::from_millis(5));
        let (session, handle) = session(source);
        let task = tokio::spawn(session.run());

        tokio::time::sleep(Duration::from_millis(30)).await;
        handle.stop();
        let stats = task.await.unwrap().unwrap();
        assert!(stats.ticks < 1_000);
    }

    #[tokio::test]
    async fn test_commands_apply_at_next_tick() {
        let (session, handle) = session(no_face_source(3));
        assert_eq!(handle.calibration_status(), CalibrationStatus::Idle);
        assert!(handle.start_calibration());

        let status = handle.clone();
        session.run().await.unwrap();
        assert_eq!(
            status.calibration_status(),
            CalibrationStatus::Collecting {
                collected: 0,
                required: 30
            }
        );
        // session ended, receiver dropped
        assert!(!handle.commit_calibration());
    }

    #[tokio::test]
    async fn test_tuning_snapshot_swap() {
        let (_session, handle) = session(no_face_source(1));
        let mut tuning = Tuning::default();
        tuning.smoothing = crate::pipeline::SmoothingStrength::uniform(0.2).unwrap();
        handle.update_tuning(tuning);
        assert_eq!(*handle.tuning(), tuning);
    }

    #[tokio::test]
    async fn test_bad_packets_skipped_dead_source_fatal() {
        let (session, _handle) = session(FailingSource { calls: 0 });
        assert!(matches!(
            session.run().await,
            Err(FacerigError::Tracking(TrackingError::SourceReceive(_)))
        ));
    }
}
