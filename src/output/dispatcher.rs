//! Output fan-out
//!
//! Each sink is delivered to on the blocking pool so a slow or stuck sink
//! never holds up the capture loop. At most one delivery per sink is in
//! flight; if it is still running when the next frame arrives, that frame is
//! skipped for the sink instead of queued.
//!
//! Draining waits at most `drain_timeout` per sink. A delivery that is still
//! stuck after that is left running on the blocking pool and the sink stays
//! busy.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{NetworkSender, OutputFrame, Sink, SinkHealth, VTubeStudioSink, VirtualCameraSink};
use crate::config::Config;

/// What happened to one frame across all sinks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    /// Previous delivery still in flight
    pub skipped_busy: usize,
    pub skipped_disabled: usize,
}

struct SinkSlot {
    name: &'static str,
    sink: Arc<Mutex<Sink>>,
    in_flight: Option<JoinHandle<()>>,
    failures: Arc<AtomicU64>,
}

impl SinkSlot {
    fn is_busy(&self) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

/// Default upper bound on waiting for one sink while draining
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct OutputDispatcher {
    runtime: Handle,
    slots: Vec<SinkSlot>,
    drain_timeout: Duration,
}

impl OutputDispatcher {
    pub fn new(runtime: Handle) -> Self {
        Self {
            runtime,
            slots: Vec::new(),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Build the enabled sinks from configuration. A sink that cannot be
    /// created is logged and left out; the pipeline runs without it.
    pub fn from_config(config: &Config, runtime: Handle) -> Self {
        let mut dispatcher = Self::new(runtime)
            .with_drain_timeout(Duration::from_millis(config.dispatch.drain_timeout_ms));
        let write_timeout = Duration::from_millis(config.dispatch.write_timeout_ms);

        if config.vmc.enabled {
            match NetworkSender::new(&config.vmc, write_timeout) {
                Ok(sender) => dispatcher.add_sink(sender),
                Err(e) => warn!("VMC output unavailable: {}", e),
            }
        }

        if config.virtual_camera.enabled {
            match VirtualCameraSink::open(&config.virtual_camera) {
                Ok(camera) => dispatcher.add_sink(camera),
                Err(e) => warn!("Virtual camera output unavailable: {}", e),
            }
        }

        if config.vtube_studio.enabled {
            match VTubeStudioSink::new(&config.vtube_studio) {
                Ok(vts) => dispatcher.add_sink(vts),
                Err(e) => warn!("VTube Studio output unavailable: {}", e),
            }
        }

        if dispatcher.is_empty() {
            warn!("No output sinks enabled");
        }
        dispatcher
    }

    pub fn add_sink(&mut self, sink: impl Into<Sink>) {
        let sink = sink.into();
        info!("Output sink '{}' added", sink.name());
        self.slots.push(SinkSlot {
            name: sink.name(),
            sink: Arc::new(Mutex::new(sink)),
            in_flight: None,
            failures: Arc::new(AtomicU64::new(0)),
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Hand the frame to every enabled sink without waiting for delivery
    pub fn dispatch(&mut self, frame: &OutputFrame) -> DispatchReport {
        let mut report = DispatchReport::default();
        let frame = Arc::new(frame.clone());

        for slot in &mut self.slots {
            if slot.is_busy() {
                report.skipped_busy += 1;
                continue;
            }

            let disabled = match slot.sink.try_lock() {
                Ok(sink) => sink.health() == SinkHealth::Disabled,
                Err(TryLockError::WouldBlock) => {
                    report.skipped_busy += 1;
                    continue;
                }
                Err(TryLockError::Poisoned(_)) => true,
            };
            if disabled {
                report.skipped_disabled += 1;
                continue;
            }

            let sink = Arc::clone(&slot.sink);
            let failures = Arc::clone(&slot.failures);
            let frame = Arc::clone(&frame);
            let name = slot.name;
            slot.in_flight = Some(
                self.runtime
                    .spawn_blocking(move || deliver(name, &sink, &frame, &failures)),
            );
            report.dispatched += 1;
        }

        report
    }

    /// Wait for in-flight deliveries to finish, bounded per sink
    pub async fn drain(&mut self) {
        for slot in &mut self.slots {
            let Some(mut handle) = slot.in_flight.take() else {
                continue;
            };
            match tokio::time::timeout(self.drain_timeout, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("Output sink '{}' task failed: {}", slot.name, e),
                Err(_) => {
                    warn!(
                        "Output sink '{}' still writing after {:?}, abandoning delivery",
                        slot.name, self.drain_timeout
                    );
                    slot.in_flight = Some(handle);
                }
            }
        }
    }

    /// `(name, health, failure count)` per sink; `None` health while a
    /// delivery holds the sink
    pub fn sink_status(&self) -> Vec<(&'static str, Option<SinkHealth>, u64)> {
        self.slots
            .iter()
            .map(|slot| {
                let health = match slot.sink.try_lock() {
                    Ok(sink) => Some(sink.health()),
                    Err(TryLockError::Poisoned(_)) => Some(SinkHealth::Disabled),
                    Err(TryLockError::WouldBlock) => None,
                };
                (slot.name, health, slot.failures.load(Ordering::Relaxed))
            })
            .collect()
    }
}

/// Runs on the blocking pool. Logs health transitions once rather than every
/// failed tick.
fn deliver(name: &'static str, sink: &Mutex<Sink>, frame: &OutputFrame, failures: &AtomicU64) {
    let Ok(mut sink) = sink.lock() else {
        return;
    };

    let before = sink.health();
    let result = sink.accept(frame);
    let after = sink.health();

    match result {
        Ok(()) => {
            if before != after {
                info!("Output sink '{}' is {} again", name, after);
            }
        }
        Err(e) => {
            let count = failures.fetch_add(1, Ordering::Relaxed) + 1;
            if before != after || count == 1 {
                warn!("Output sink '{}' {} ({} failures): {}", name, after, count, e);
            } else {
                debug!("Output sink '{}' frame {} failed: {}", name, frame.sequence(), e);
            }
        }
    }
}
