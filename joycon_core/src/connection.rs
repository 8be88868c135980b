use crate::controller::calibration::Calibration;
use crate::controller::report::input::INPUT_REPORT_LEN;
use crate::controller::report::output::{OutputReport, PacketCounter};
use crate::controller::report::subcommand::{report_mode, Subcommand, SubcommandReply};
use crate::controller::rumble::RumbleData;
use crate::controller::spi_flash::SpiReadRequest;
use crate::controller::state::State;
use crate::controller::Side;
use crate::session::{BringUp, Decoder, Inbound, Request, DEFAULT_PLAYER_LIGHTS};
use crate::transport::{self, Transport};
use crate::{Error, Result};
use bytes::Bytes;
use joycon_shared::event::EventDispatcher;
use std::sync::Arc;
use std::time::Duration;
use strum::{Display, IntoStaticStr};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::{self, JoinHandle};
use tokio::time;
use tokio_util::sync::CancellationToken;

// Best-effort commands sent while closing, in order.
const TEARDOWN: [(Subcommand, u8); 3] = [
    (Subcommand::EnableVibration, 0x00),
    (Subcommand::SetInputReportMode, report_mode::SUBCOMMAND_ONLY),
    (Subcommand::EnableImu, 0x00),
];

#[derive(Clone, Debug)]
pub struct ConnectionConfig {
    /// Bound of a single blocking read in the reader loop.
    pub read_timeout: Duration,
    pub reply_timeout: Duration,
    pub teardown_timeout: Duration,
    pub join_timeout: Duration,
    pub player_lights: u8,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(8),
            reply_timeout: Duration::from_millis(300),
            teardown_timeout: Duration::from_millis(200),
            join_timeout: Duration::from_secs(1),
            player_lights: DEFAULT_PLAYER_LIGHTS,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, IntoStaticStr)]
pub enum ConnectionState {
    Created,
    Initializing,
    Ready,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub enum Event {
    Log(LogType),
    Warning(Error),
}

impl std::fmt::Display for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self {
            Self::Log(log) => write!(f, "event log: {:?}", log),
            Self::Warning(err) => write!(f, "event warn: {}", err),
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq, Hash, IntoStaticStr)]
pub enum LogType {
    Initializing,
    Ready,
    Closing,
    Closed,
}

struct Shared<T> {
    transport: T,
    side: Side,
    config: ConnectionConfig,
    decoder: Decoder,
    // Serializes writes so that at most one sub-command is in flight.
    counter: Mutex<PacketCounter>,
    replies: watch::Sender<Option<SubcommandReply>>,
    states: watch::Sender<Option<State>>,
    conn_state: watch::Sender<ConnectionState>,
    cancel: CancellationToken,
    events: EventDispatcher<Event>,
}

impl<T: Transport> Shared<T> {
    fn set_state(&self, state: ConnectionState) {
        tracing::debug!("connection state: {}", state);
        self.conn_state.send_replace(state);
    }

    fn log(&self, log: LogType) {
        self.events.dispatch(Event::Log(log));
    }

    async fn transact(
        &self,
        subcommand: Subcommand,
        payload: &[u8],
        timeout: Duration,
    ) -> Result<SubcommandReply> {
        let mut counter = self.counter.lock().await;
        // Drop whatever a previous exchange left behind.
        self.replies.send_replace(None);
        let mut replies = self.replies.subscribe();
        let report = OutputReport::with_subcommand(
            &mut counter,
            &RumbleData::NEUTRAL,
            subcommand,
            payload,
        );
        tracing::trace!("sending `{}`: {:02x?}", subcommand, report.data());
        transport::write_all(&self.transport, report.data())?;
        let reply = async {
            while replies.changed().await.is_ok() {
                if let Some(reply) = replies.borrow_and_update().clone() {
                    return Some(reply);
                }
            }
            None
        };
        match time::timeout(timeout, reply).await {
            Ok(Some(reply)) => Ok(reply),
            Ok(None) => Err(Error::ActionAbortedDueToClosing(subcommand.to_string())),
            Err(_) => Err(Error::Timeout {
                subcommand,
                timeout,
            }),
        }
    }

    async fn execute(&self, request: &Request) -> Result<Bytes> {
        let reply = self
            .transact(request.subcommand, &request.payload, self.config.reply_timeout)
            .await?;
        Ok(request.verify(&reply)?)
    }

    fn read_loop(&self) {
        let mut buf = [0u8; INPUT_REPORT_LEN];
        tracing::debug!("reader started");
        while !self.cancel.is_cancelled() {
            match self.transport.read_timeout(&mut buf, self.config.read_timeout) {
                Ok(0) => {}
                Ok(len) => self.dispatch(&buf[..len]),
                // The device is gone; nothing more will be published.
                Err(err) => {
                    tracing::error!("failed to read report, stopping reader: {}", err);
                    self.events.dispatch(Event::Warning(err.into()));
                    break;
                }
            }
        }
        tracing::debug!("reader stopped");
    }

    fn dispatch(&self, buf: &[u8]) {
        match self.decoder.feed(buf) {
            Ok(Inbound::Reply(reply)) => {
                tracing::trace!(
                    "reply to {:#04x}, ack {:#04x}",
                    reply.subcommand_id(),
                    reply.ack()
                );
                self.replies.send_replace(Some(reply));
            }
            Ok(Inbound::State { state, .. }) => {
                self.states.send_replace(Some(state));
            }
            Ok(Inbound::Uncalibrated { .. }) => {}
            Ok(Inbound::Ignored(id)) => {
                tracing::trace!("ignoring report {:#04x}", id);
            }
            Err(err) => {
                tracing::debug!("discarding report: {}", err);
                self.events.dispatch(Event::Warning(err.into()));
            }
        }
    }
}

/// Push-model driver: a blocking reader thread publishes replies and states
/// while sub-commands are sent from async callers.
///
/// Create with [`Connection::new`], subscribe to [`Connection::events`] if
/// needed, then [`Connection::open`] it. Must be used within a tokio runtime.
pub struct Connection<T: Transport> {
    shared: Arc<Shared<T>>,
    reader: Option<JoinHandle<()>>,
}

impl<T: Transport> Connection<T> {
    pub fn new(transport: T, side: Side, config: ConnectionConfig) -> Self {
        let shared = Shared {
            transport,
            side,
            config,
            decoder: Decoder::new(side),
            counter: Mutex::new(PacketCounter::new()),
            replies: watch::channel(None).0,
            states: watch::channel(None).0,
            conn_state: watch::channel(ConnectionState::Created).0,
            cancel: CancellationToken::new(),
            events: EventDispatcher::new(),
        };
        Self {
            shared: Arc::new(shared),
            reader: None,
        }
    }

    /// Starts the reader and runs the bring-up. On failure the connection is
    /// torn down before the error is returned.
    #[tracing::instrument(skip_all, fields(side = %self.shared.side))]
    pub async fn open(mut self) -> Result<Self> {
        self.shared.set_state(ConnectionState::Initializing);
        self.shared.log(LogType::Initializing);
        if let Err(err) = self.shared.transport.set_blocking(false) {
            self.close().await;
            return Err(err.into());
        }
        self.reader = Some(self.spawn_reader());
        match self.bring_up().await {
            Ok(()) => {
                self.shared.set_state(ConnectionState::Ready);
                self.shared.log(LogType::Ready);
                tracing::info!("{} ready", self.shared.side.name());
                Ok(self)
            }
            Err(err) => {
                tracing::error!("failed to initialize {}: {}", self.shared.side.name(), err);
                self.close().await;
                Err(err)
            }
        }
    }

    fn spawn_reader(&self) -> JoinHandle<()> {
        let shared = self.shared.clone();
        let span = tracing::info_span!("connection_reader", side = %shared.side);
        task::spawn_blocking(move || {
            let _enter = span.enter();
            shared.read_loop();
        })
    }

    async fn bring_up(&self) -> Result<()> {
        let mut bring_up = BringUp::new(self.shared.side, self.shared.config.player_lights);
        while let Some(request) = bring_up.next_request() {
            tracing::debug!("bring-up: {}", bring_up.step());
            let outcome = match self
                .shared
                .transact(
                    request.subcommand,
                    &request.payload,
                    self.shared.config.reply_timeout,
                )
                .await
            {
                Ok(reply) => bring_up.complete(&reply),
                Err(err) => Err(err),
            };
            match outcome {
                Ok(Some(calibration)) => {
                    tracing::debug!("calibration: {:?}", calibration);
                    self.shared.decoder.set_calibration(calibration);
                }
                Ok(None) => {}
                Err(err) if request.best_effort => {
                    tracing::warn!("`{}` failed, skipping: {}", request.subcommand, err);
                    self.shared.events.dispatch(Event::Warning(err));
                    bring_up.skip();
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    fn ensure_open(&self, action: &str) -> Result<()> {
        match self.state() {
            ConnectionState::Initializing | ConnectionState::Ready => Ok(()),
            _ => Err(Error::ActionAbortedDueToClosing(action.to_owned())),
        }
    }

    pub fn side(&self) -> Side {
        self.shared.side
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.conn_state.borrow()
    }

    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.conn_state.subscribe()
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.shared.decoder.calibration().copied()
    }

    /// The most recent state; older ones are overwritten, not queued.
    pub fn latest_state(&self) -> Option<State> {
        self.shared.states.borrow().clone()
    }

    pub fn states(&self) -> watch::Receiver<Option<State>> {
        self.shared.states.subscribe()
    }

    // Listen for the connection events.
    pub async fn events(&self) -> Result<mpsc::UnboundedReceiver<Event>> {
        Ok(self.shared.events.subscribe().await?)
    }

    /// Sends a sub-command and waits for a positive reply.
    pub async fn send_subcommand(
        &self,
        subcommand: Subcommand,
        payload: &[u8],
    ) -> Result<SubcommandReply> {
        self.ensure_open("send_subcommand")?;
        let reply = self
            .shared
            .transact(subcommand, payload, self.shared.config.reply_timeout)
            .await?;
        reply.expect(subcommand)?;
        Ok(reply)
    }

    pub async fn read_spi(&self, address: u32, length: u8) -> Result<Bytes> {
        self.ensure_open("read_spi")?;
        let request = Request::spi_read(SpiReadRequest::new(address, length)?);
        self.shared.execute(&request).await
    }

    pub async fn send_rumble(&self, rumble: RumbleData) -> Result<()> {
        self.ensure_open("send_rumble")?;
        let mut counter = self.shared.counter.lock().await;
        let report = OutputReport::with_rumble_only(&mut counter, &rumble);
        transport::write_all(&self.shared.transport, report.data())?;
        Ok(())
    }

    /// Restores the controller's default mode and releases the transport.
    /// Every step is bounded and failures are only logged.
    #[tracing::instrument(skip_all, fields(side = %self.shared.side))]
    pub async fn close(mut self) {
        let shared = self.shared.clone();
        shared.set_state(ConnectionState::Closing);
        shared.log(LogType::Closing);
        if self.reader.is_some() {
            for (subcommand, arg) in TEARDOWN {
                if let Err(err) = shared
                    .transact(subcommand, &[arg], shared.config.teardown_timeout)
                    .await
                {
                    tracing::warn!("teardown `{}` failed: {}", subcommand, err);
                }
            }
        }
        shared.cancel.cancel();
        if let Some(mut reader) = self.reader.take() {
            let join_timeout = shared.config.join_timeout;
            match time::timeout(join_timeout, &mut reader).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => tracing::warn!("reader task failed: {}", err),
                Err(_) => {
                    tracing::warn!("reader still running after {:?}", join_timeout);
                    if time::timeout(join_timeout, reader).await.is_err() {
                        tracing::error!("abandoning reader task");
                    }
                }
            }
        }
        shared.states.send_replace(None);
        shared.replies.send_replace(None);
        shared.set_state(ConnectionState::Closed);
        shared.log(LogType::Closed);
        tracing::info!("{} closed", shared.side.name());
    }
}

impl<T: Transport> Drop for Connection<T> {
    fn drop(&mut self) {
        // Stops the reader if the connection was dropped without closing.
        self.shared.cancel.cancel();
    }
}
