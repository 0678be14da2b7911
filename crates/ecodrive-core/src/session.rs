//! Adapter session
//!
//! A [`Session`] owns one adapter link from connect to disconnect: it runs
//! the initialization sequence, spawns the polling task, forwards trip
//! control to it and tears everything down in order.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EcoDriveConfig;
use crate::protocol::{
    open_port, open_tcp, AdapterInitializer, BoxedTransport, CommandDriver, ConnectionState,
    ProtocolError, Transport,
};
use crate::scoring::EfficiencyScorer;
use crate::telemetry::{PollControl, Poller, PollerExit, PollerState, TelemetrySnapshot};
use crate::trip::{TripSummary, TripTracker};

/// Handles to a running poll task
struct PollTask {
    task: JoinHandle<PollerExit<BoxedTransport>>,
    cancel: CancellationToken,
    control: mpsc::Sender<PollControl>,
    snapshots: watch::Receiver<TelemetrySnapshot>,
    status: watch::Receiver<PollerState>,
}

/// One adapter link and its polling task
pub struct Session {
    config: EcoDriveConfig,
    state: Arc<watch::Sender<ConnectionState>>,
    /// Initialized driver waiting for [`Session::start`]
    driver: Option<CommandDriver<BoxedTransport>>,
    poll: Option<PollTask>,
    adapter: Option<String>,
    /// Trip finalized by a poll task that ended on link loss, until claimed
    finished_trip: Option<TripSummary>,
}

impl Session {
    /// Disconnected session; nothing is opened until [`connect`](Self::connect)
    pub fn new(config: EcoDriveConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            config,
            state: Arc::new(state),
            driver: None,
            poll: None,
            adapter: None,
            finished_trip: None,
        }
    }

    /// Configuration the session was created with
    pub fn config(&self) -> &EcoDriveConfig {
        &self.config
    }

    /// Connection state changes; the current value is cached
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Current connection state
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Identification line reported by the adapter on reset
    pub fn adapter(&self) -> Option<&str> {
        self.adapter.as_deref()
    }

    /// Open the configured transport (TCP if an address is set, serial
    /// otherwise) and initialize the adapter
    pub async fn connect_configured(&mut self) -> Result<String, ProtocolError> {
        let conn = self.config.connection.clone();
        let transport = if let Some(addr) = conn.tcp_address.as_deref() {
            open_tcp(addr, Duration::from_millis(conn.connect_timeout_ms)).await?
        } else if let Some(port) = conn.port_name.as_deref() {
            open_port(port, Some(conn.baud_rate))?
        } else {
            return Err(ProtocolError::ConnectionFailed(
                "no serial port or TCP address configured".to_string(),
            ));
        };
        self.connect(transport).await
    }

    /// Initialize the adapter on an open transport.
    ///
    /// Returns the adapter identification. On failure the transport is shut
    /// down and the state becomes [`ConnectionState::Error`].
    pub async fn connect<T: Transport + 'static>(
        &mut self,
        transport: T,
    ) -> Result<String, ProtocolError> {
        self.reap_finished().await;
        if self.driver.is_some() || self.poll.is_some() {
            return Err(ProtocolError::AlreadyConnected);
        }
        self.state.send_replace(ConnectionState::Connecting);

        let boxed: BoxedTransport = Box::new(transport);
        let mut driver = CommandDriver::new(boxed, self.config.driver.clone());
        let initializer = AdapterInitializer::new(self.config.init.clone());

        match initializer.run(&mut driver).await {
            Ok(identity) => {
                info!(adapter = %identity, "connected");
                self.driver = Some(driver);
                self.adapter = Some(identity.clone());
                self.state.send_replace(ConnectionState::Connected);
                Ok(identity)
            }
            Err(e) => {
                warn!("adapter initialization failed: {e}");
                if let Err(close) = driver.shutdown().await {
                    warn!("closing transport failed: {close}");
                }
                self.state.send_replace(ConnectionState::Error);
                Err(e)
            }
        }
    }

    /// Start polling with fresh trip accumulators.
    ///
    /// Returns the snapshot channel. Calling it again while polling returns
    /// another receiver for the same task.
    pub async fn start(&mut self) -> Result<watch::Receiver<TelemetrySnapshot>, ProtocolError> {
        self.reap_finished().await;
        if let Some(poll) = &self.poll {
            return Ok(poll.snapshots.clone());
        }
        let driver = self.driver.take().ok_or(ProtocolError::NotConnected)?;

        let tracker = TripTracker::new(self.config.gear.clone(), self.config.fuel.clone());
        let scorer = EfficiencyScorer::new(self.config.scoring.clone());
        let poller = Poller::new(driver, tracker, scorer, self.config.poller.clone())
            .with_state(Arc::clone(&self.state));

        let snapshots = poller.subscribe();
        let poll = PollTask {
            cancel: poller.cancel_token(),
            control: poller.controller(),
            snapshots: snapshots.clone(),
            status: poller.status(),
            task: tokio::spawn(poller.run()),
        };
        self.poll = Some(poll);
        Ok(snapshots)
    }

    /// Latest-snapshot channel of the running poll task
    pub fn snapshots(&self) -> Option<watch::Receiver<TelemetrySnapshot>> {
        self.poll.as_ref().map(|p| p.snapshots.clone())
    }

    /// Lifecycle of the poll task; `Idle` when none has been started
    pub fn poller_state(&self) -> PollerState {
        self.poll
            .as_ref()
            .map_or(PollerState::Idle, |p| *p.status.borrow())
    }

    /// True while the poll task is alive
    pub fn is_polling(&self) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.task.is_finished())
    }

    /// Finalize the trip in progress and begin a new one.
    ///
    /// With no poll task running, returns the trip that ended with the link,
    /// if it has not been claimed yet.
    pub async fn finish_trip(&mut self) -> Result<TripSummary, ProtocolError> {
        self.reap_finished().await;
        if self.poll.is_none() {
            return self.finished_trip.take().ok_or(ProtocolError::PollerStopped);
        }
        let (tx, rx) = oneshot::channel();
        self.send_control(PollControl::FinishTrip(tx)).await?;
        rx.await.map_err(|_| ProtocolError::PollerStopped)
    }

    /// Discard the trip in progress
    pub async fn reset_trip(&mut self) -> Result<(), ProtocolError> {
        self.reap_finished().await;
        let (tx, rx) = oneshot::channel();
        self.send_control(PollControl::ResetTrip(tx)).await?;
        rx.await.map_err(|_| ProtocolError::PollerStopped)
    }

    async fn send_control(&self, command: PollControl) -> Result<(), ProtocolError> {
        let poll = self.poll.as_ref().ok_or(ProtocolError::PollerStopped)?;
        poll.control
            .send(command)
            .await
            .map_err(|_| ProtocolError::PollerStopped)
    }

    /// Summary of a trip that ended because the link dropped, if unclaimed
    pub fn take_finished_trip(&mut self) -> Option<TripSummary> {
        self.finished_trip.take()
    }

    /// Join a poll task that stopped on its own, close its transport and keep
    /// its trip summary for the caller
    async fn reap_finished(&mut self) {
        let stopped = self.poll.as_ref().is_some_and(|p| {
            p.task.is_finished() || *p.status.borrow() == PollerState::Stopped
        });
        if !stopped {
            return;
        }
        let Some(poll) = self.poll.take() else {
            return;
        };
        match poll.task.await {
            Ok(exit) => {
                debug!(link_lost = exit.link_lost, "collected stopped poll task");
                self.finished_trip = Some(exit.summary);
                close(exit.driver).await;
            }
            Err(e) => warn!("poll task ended abnormally: {e}"),
        }
        self.adapter = None;
    }

    /// Stop polling, close the transport and return the trip in progress.
    ///
    /// The poll task is joined before the transport is shut down. Without a
    /// poll task, returns the unclaimed trip that ended with the link.
    pub async fn disconnect(&mut self) -> Option<TripSummary> {
        let mut summary = self.finished_trip.take();
        let mut driver = self.driver.take();

        if let Some(poll) = self.poll.take() {
            poll.cancel.cancel();
            match poll.task.await {
                Ok(exit) => {
                    summary = Some(exit.summary);
                    driver = Some(exit.driver);
                }
                Err(e) => warn!("poll task ended abnormally: {e}"),
            }
        }

        if let Some(driver) = driver {
            close(driver).await;
        }
        self.adapter = None;
        self.state.send_replace(ConnectionState::Disconnected);
        info!("disconnected");
        summary
    }
}

async fn close(driver: CommandDriver<BoxedTransport>) {
    if let Err(e) = driver.shutdown().await {
        warn!("closing transport failed: {e}");
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new(EcoDriveConfig::default())
    }
}
