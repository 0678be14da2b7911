//! Telemetry polling loop
//!
//! Requests every polled PID in turn, decodes the replies into a
//! [`TelemetrySample`], feeds it to the trip tracker and publishes a
//! [`TelemetrySnapshot`] once per cycle. Runs until cancelled or until the
//! link to the adapter is gone.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::{decode, FieldFault, PidValue, TelemetrySample, TelemetrySnapshot};
use crate::protocol::{CommandDriver, ConnectionState, Pid, ProtocolError, Reply, Transport};
use crate::scoring::EfficiencyScorer;
use crate::trip::{TripSummary, TripTracker};

/// Pending trip-control requests
const CONTROL_QUEUE: usize = 8;

/// Polling cadence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Pause after each PID request
    pub inter_command_delay_ms: u64,
    /// Pause after a failed cycle before retrying
    pub error_backoff_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            inter_command_delay_ms: 100,
            error_backoff_ms: 500,
        }
    }
}

/// Poll loop lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollerState {
    /// Created, not yet running
    Idle,
    /// Polling
    Running,
    /// Cancelled or link lost; never restarts
    Stopped,
}

/// Trip control, applied between poll cycles
#[derive(Debug)]
pub enum PollControl {
    /// Finalize the trip in progress and start a new one
    FinishTrip(oneshot::Sender<TripSummary>),
    /// Discard the trip in progress
    ResetTrip(oneshot::Sender<()>),
}

/// What the poller hands back when it stops
pub struct PollerExit<T> {
    /// The driver, so the caller can shut the transport down
    pub driver: CommandDriver<T>,
    /// The trip in progress when polling stopped
    pub summary: TripSummary,
    /// True if polling stopped because the adapter went away
    pub link_lost: bool,
}

/// Owns the driver and the trip state while polling
pub struct Poller<T> {
    driver: CommandDriver<T>,
    tracker: TripTracker,
    scorer: EfficiencyScorer,
    config: PollerConfig,
    snapshots: watch::Sender<TelemetrySnapshot>,
    status: watch::Sender<PollerState>,
    state: Option<Arc<watch::Sender<ConnectionState>>>,
    control_tx: mpsc::Sender<PollControl>,
    control_rx: mpsc::Receiver<PollControl>,
    cancel: CancellationToken,
    origin: Instant,
    cycle: u64,
}

impl<T: Transport> Poller<T> {
    /// Poller that takes over an initialized driver
    pub fn new(
        driver: CommandDriver<T>,
        tracker: TripTracker,
        scorer: EfficiencyScorer,
        config: PollerConfig,
    ) -> Self {
        let (snapshots, _) = watch::channel(TelemetrySnapshot::empty());
        let (status, _) = watch::channel(PollerState::Idle);
        let (control_tx, control_rx) = mpsc::channel(CONTROL_QUEUE);
        Self {
            driver,
            tracker,
            scorer,
            config,
            snapshots,
            status,
            state: None,
            control_tx,
            control_rx,
            cancel: CancellationToken::new(),
            origin: Instant::now(),
            cycle: 0,
        }
    }

    /// Report link loss as [`ConnectionState::Disconnected`] on `state`
    pub fn with_state(mut self, state: Arc<watch::Sender<ConnectionState>>) -> Self {
        self.state = Some(state);
        self
    }

    /// Stop when `cancel` fires
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Latest snapshot, cached for late subscribers
    pub fn subscribe(&self) -> watch::Receiver<TelemetrySnapshot> {
        self.snapshots.subscribe()
    }

    /// Lifecycle changes; the current value is cached
    pub fn status(&self) -> watch::Receiver<PollerState> {
        self.status.subscribe()
    }

    /// Sender for [`PollControl`] requests
    pub fn controller(&self) -> mpsc::Sender<PollControl> {
        self.control_tx.clone()
    }

    /// Token that stops [`run`](Self::run) when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Poll until cancelled or the link is lost
    pub async fn run(mut self) -> PollerExit<T> {
        self.status.send_replace(PollerState::Running);
        info!("polling started");
        let link_lost = loop {
            if self.cancel.is_cancelled() {
                break false;
            }
            self.apply_controls();

            match self.poll_cycle().await {
                Ok(Some(sample)) => self.publish(sample),
                Ok(None) => break false,
                Err(e) if e.is_link_lost() => {
                    warn!("adapter link lost: {e}");
                    break true;
                }
                Err(e) => {
                    warn!("poll cycle failed: {e}");
                    self.cycle += 1;
                    self.snapshots.send_replace(TelemetrySnapshot::with_fault(
                        self.cycle,
                        self.origin.elapsed(),
                        FieldFault::LinkError,
                    ));
                    if !pause(&self.cancel, self.config.error_backoff_ms).await {
                        break false;
                    }
                }
            }
        };

        let summary = self.tracker.finalize(&self.scorer);
        // Stopped must be visible before Disconnected is
        self.status.send_replace(PollerState::Stopped);
        if link_lost {
            self.tracker.reset();
            if let Some(state) = &self.state {
                state.send_replace(ConnectionState::Disconnected);
            }
        }
        info!(cycles = self.cycle, link_lost, "polling stopped");

        PollerExit {
            driver: self.driver,
            summary,
            link_lost,
        }
    }

    fn apply_controls(&mut self) {
        while let Ok(command) = self.control_rx.try_recv() {
            match command {
                PollControl::FinishTrip(reply) => {
                    let summary = self.tracker.finalize(&self.scorer);
                    self.tracker.reset();
                    if reply.send(summary).is_err() {
                        debug!("trip summary requester went away");
                    }
                }
                PollControl::ResetTrip(reply) => {
                    self.tracker.reset();
                    let _ = reply.send(());
                }
            }
        }
    }

    /// One pass over every PID. `Ok(None)` means cancellation interrupted it.
    async fn poll_cycle(&mut self) -> Result<Option<TelemetrySample>, ProtocolError> {
        let mut sample = TelemetrySample::default();
        for pid in Pid::POLL_ORDER {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            let reply = self.driver.request(pid.command()).await?;
            match read_field(pid, &reply) {
                Ok(value) => sample.set(value),
                Err(fault) => {
                    trace!(%pid, %fault, "field unavailable");
                    sample.set_fault(pid, fault);
                }
            }
            if !pause(&self.cancel, self.config.inter_command_delay_ms).await {
                return Ok(None);
            }
        }
        sample.timestamp = self.origin.elapsed();
        Ok(Some(sample))
    }

    fn publish(&mut self, sample: TelemetrySample) {
        self.cycle += 1;
        let observation = self.tracker.observe(&sample);
        let snapshot = TelemetrySnapshot::from_cycle(
            self.cycle,
            &sample,
            observation.gear,
            observation.integration.as_ref(),
            self.tracker.state(),
        );
        trace!(cycle = self.cycle, "snapshot published");
        self.snapshots.send_replace(snapshot);
    }
}

/// Sleep unless cancelled first; false if cancelled
async fn pause(cancel: &CancellationToken, ms: u64) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(Duration::from_millis(ms)) => true,
    }
}

fn read_field(pid: Pid, reply: &Reply) -> Result<PidValue, FieldFault> {
    match reply {
        Reply::Data(payload) => decode(pid, payload).map_err(FieldFault::from),
        other => Err(FieldFault::from_reply(other).unwrap_or(FieldFault::UnexpectedResponse)),
    }
}
