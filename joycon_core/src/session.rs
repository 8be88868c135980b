//! Sans-IO protocol engine.
//!
//! [`BringUp`] sequences the initialization commands, [`Decoder`] classifies
//! received reports and [`Session`] combines both into a tick driven state
//! machine for hosts that poll the device from their own loop.

use crate::controller::calibration::{Calibration, ImuCalibration, StickCalibration};
use crate::controller::report::input::{InputReport, INPUT_REPORT_LEN};
use crate::controller::report::output::{OutputReport, PacketCounter};
use crate::controller::report::subcommand::{
    report_mode, ProtocolError, Subcommand, SubcommandReply,
};
use crate::controller::report::ReportError;
use crate::controller::rumble::{Rumble, RumbleData};
use crate::controller::spi_flash::{self, SpiReadRequest};
use crate::controller::state::imu::ImuScale;
use crate::controller::state::State;
use crate::controller::Side;
use crate::transport::{self, Transport};
use crate::{Error, Result};
use bytes::Bytes;
use std::sync::OnceLock;
use std::time::{Duration, Instant};
use strum::Display;

pub const DEFAULT_PLAYER_LIGHTS: u8 = 0b0000_0001;

const PAIRING_STEPS: u8 = 3;

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum BringUpStep {
    SubcommandOnlyMode,
    StickUserCalibration,
    StickFactoryCalibration,
    StickParameters,
    ImuUserCalibration,
    ImuFactoryCalibration,
    ImuParameters,
    Pairing(u8),
    PlayerLights,
    EnableImu,
    StandardFullMode,
    EnableVibration,
    Done,
}

/// A sub-command to send together with what its reply must look like.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Request {
    pub subcommand: Subcommand,
    pub payload: Vec<u8>,
    pub spi: Option<SpiReadRequest>,
    /// Failures are logged and skipped instead of aborting the bring-up.
    pub best_effort: bool,
}

impl Request {
    pub fn new(subcommand: Subcommand, payload: &[u8]) -> Self {
        Self {
            subcommand,
            payload: payload.to_vec(),
            spi: None,
            best_effort: false,
        }
    }

    pub fn spi_read(request: SpiReadRequest) -> Self {
        Self {
            subcommand: Subcommand::SpiFlashRead,
            payload: request.to_payload().to_vec(),
            spi: Some(request),
            best_effort: false,
        }
    }

    fn best_effort(mut self) -> Self {
        self.best_effort = true;
        self
    }

    pub fn encode(&self, counter: &mut PacketCounter) -> OutputReport {
        OutputReport::with_subcommand(
            counter,
            &RumbleData::NEUTRAL,
            self.subcommand,
            &self.payload,
        )
    }

    /// Checks the reply against this request and returns its payload. Flash
    /// reads are returned without the echoed address header.
    pub fn verify(&self, reply: &SubcommandReply) -> std::result::Result<Bytes, ProtocolError> {
        let data = reply.expect(self.subcommand)?;
        match &self.spi {
            Some(spi) => Ok(data.slice_ref(spi.verify(data)?)),
            None => Ok(data.clone()),
        }
    }
}

/// Initialization sequence of a single controller.
///
/// Produces one request at a time; the driver sends it, waits for the reply
/// and hands it back through [`BringUp::complete`].
#[derive(Debug)]
pub struct BringUp {
    side: Side,
    player_lights: u8,
    step: BringUpStep,
    stick_calibration: Option<Bytes>,
    stick_parameters: Option<Bytes>,
    imu_calibration: Option<Bytes>,
}

impl BringUp {
    pub fn new(side: Side, player_lights: u8) -> Self {
        Self {
            side,
            player_lights,
            step: BringUpStep::SubcommandOnlyMode,
            stick_calibration: None,
            stick_parameters: None,
            imu_calibration: None,
        }
    }

    pub fn step(&self) -> BringUpStep {
        self.step
    }

    pub fn is_done(&self) -> bool {
        self.step == BringUpStep::Done
    }

    pub fn next_request(&self) -> Option<Request> {
        use BringUpStep::*;

        let side = self.side;
        let request = match self.step {
            SubcommandOnlyMode => Request::new(
                Subcommand::SetInputReportMode,
                &[report_mode::SUBCOMMAND_ONLY],
            ),
            StickUserCalibration => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::stick_user_calibration(side),
                spi_flash::STICK_CALIBRATION_LEN,
            )),
            StickFactoryCalibration => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::stick_factory_calibration(side),
                spi_flash::STICK_CALIBRATION_LEN,
            )),
            StickParameters => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::stick_parameters(side),
                spi_flash::STICK_PARAMETERS_LEN,
            )),
            ImuUserCalibration => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::IMU_USER_CALIBRATION,
                spi_flash::IMU_CALIBRATION_LEN,
            )),
            ImuFactoryCalibration => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::IMU_FACTORY_CALIBRATION,
                spi_flash::IMU_CALIBRATION_LEN,
            )),
            ImuParameters => Request::spi_read(SpiReadRequest::fixed(
                spi_flash::IMU_PARAMETERS,
                spi_flash::IMU_PARAMETERS_LEN,
            )),
            Pairing(step) => {
                Request::new(Subcommand::BluetoothManualPairing, &[step]).best_effort()
            }
            PlayerLights => Request::new(Subcommand::SetPlayerLights, &[self.player_lights]),
            EnableImu => Request::new(Subcommand::EnableImu, &[0x01]),
            StandardFullMode => Request::new(
                Subcommand::SetInputReportMode,
                &[report_mode::STANDARD_FULL],
            ),
            EnableVibration => Request::new(Subcommand::EnableVibration, &[0x01]),
            Done => return None,
        };
        Some(request)
    }

    /// Applies the reply to the current request and advances. Returns the
    /// calibration once every calibration region has been read.
    pub fn complete(&mut self, reply: &SubcommandReply) -> Result<Option<Calibration>> {
        use BringUpStep::*;

        let Some(request) = self.next_request() else {
            return Ok(None);
        };
        let data = request.verify(reply)?;
        let mut calibration = None;
        self.step = match self.step {
            SubcommandOnlyMode => StickUserCalibration,
            StickUserCalibration if spi_flash::is_unset(&data) => {
                tracing::debug!("no user stick calibration, falling back to factory");
                StickFactoryCalibration
            }
            StickUserCalibration | StickFactoryCalibration => {
                self.stick_calibration = Some(data);
                StickParameters
            }
            StickParameters => {
                self.stick_parameters = Some(data);
                ImuUserCalibration
            }
            ImuUserCalibration if spi_flash::is_unset(&data) => {
                tracing::debug!("no user imu calibration, falling back to factory");
                ImuFactoryCalibration
            }
            ImuUserCalibration | ImuFactoryCalibration => {
                self.imu_calibration = Some(data);
                ImuParameters
            }
            ImuParameters => {
                calibration = Some(self.build_calibration(&data)?);
                Pairing(1)
            }
            Pairing(step) => self.after_pairing(step),
            PlayerLights => EnableImu,
            EnableImu => StandardFullMode,
            StandardFullMode => EnableVibration,
            EnableVibration | Done => Done,
        };
        Ok(calibration)
    }

    /// Advances past the current request without a reply. Only allowed for
    /// best-effort requests.
    pub fn skip(&mut self) -> bool {
        match self.step {
            BringUpStep::Pairing(step) => {
                self.step = self.after_pairing(step);
                true
            }
            _ => false,
        }
    }

    fn after_pairing(&self, step: u8) -> BringUpStep {
        if step < PAIRING_STEPS {
            BringUpStep::Pairing(step + 1)
        } else {
            BringUpStep::PlayerLights
        }
    }

    fn build_calibration(&self, imu_parameters: &[u8]) -> Result<Calibration> {
        let stick = StickCalibration::parse(
            self.stick_calibration.as_deref().unwrap_or_default(),
            self.stick_parameters.as_deref().unwrap_or_default(),
            self.side,
        )?;
        let imu = ImuCalibration::parse(
            self.imu_calibration.as_deref().unwrap_or_default(),
            imu_parameters,
        )?;
        Ok(Calibration { stick, imu })
    }
}

#[derive(Clone, Debug)]
pub enum Inbound {
    Reply(SubcommandReply),
    State {
        state: State,
        imu_streaming: bool,
    },
    /// A full report received before calibration is known.
    Uncalibrated {
        imu_streaming: bool,
    },
    Ignored(u8),
}

/// Turns raw input reports into replies and calibrated states.
#[derive(Debug)]
pub struct Decoder {
    side: Side,
    calibration: OnceLock<(Calibration, ImuScale)>,
}

impl Decoder {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            calibration: OnceLock::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Returns `false` if a calibration was already set; it is never replaced.
    pub fn set_calibration(&self, calibration: Calibration) -> bool {
        let scale = ImuScale::new(&calibration.imu);
        self.calibration.set((calibration, scale)).is_ok()
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.calibration.get().map(|(calibration, _)| calibration)
    }

    /// Fails only for malformed reports; unknown report ids are ignored.
    pub fn feed(&self, buf: &[u8]) -> std::result::Result<Inbound, ReportError> {
        let report = match InputReport::parse(buf) {
            Ok(report) => report,
            Err(ReportError::UnsupportedReportId(id)) => return Ok(Inbound::Ignored(id)),
            Err(err) => return Err(err),
        };
        if let Some(reply) = report.subcommand_reply() {
            return Ok(Inbound::Reply(reply));
        }
        let imu_streaming = report.is_imu_streaming();
        let state = self.calibration.get().and_then(|(calibration, scale)| {
            State::from_report(&report, self.side, calibration, scale)
        });
        Ok(match state {
            Some(state) => Inbound::State {
                state,
                imu_streaming,
            },
            None => Inbound::Uncalibrated { imu_streaming },
        })
    }
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub read_timeout: Duration,
    /// Wait after the last resend before a request times out.
    pub reply_timeout: Duration,
    pub max_retries: u32,
    /// Spacing of resends, and of maintenance commands once ready.
    pub command_interval: Duration,
    /// Report mode is re-issued when no full report arrived for this long.
    pub watchdog_timeout: Duration,
    pub player_lights: u8,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_millis(8),
            reply_timeout: Duration::from_millis(300),
            max_retries: 5,
            command_interval: Duration::from_millis(100),
            watchdog_timeout: Duration::from_secs(2),
            player_lights: DEFAULT_PLAYER_LIGHTS,
        }
    }
}

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum SessionState {
    Initializing,
    Ready,
    Failed,
}

#[derive(Clone, Debug)]
pub enum SessionEvent {
    Calibrated(Calibration),
    Ready,
    State(State),
}

#[derive(Debug)]
struct Pending {
    request: Request,
    first_sent_at: Instant,
    sent_at: Instant,
    retries: u32,
}

// A request that was sent more than once; the device may still answer the
// extra sends after the step has moved on.
#[derive(Debug)]
struct Answered {
    request: Request,
    echoes: u32,
}

/// Pull-model driver.
///
/// The host calls [`Session::tick`] to get the next report to write and
/// [`Session::feed`] with every report it reads, or lets
/// [`Session::poll_once`] do both against a [`Transport`]. Nothing here
/// blocks or spawns.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    bring_up: BringUp,
    decoder: Decoder,
    counter: PacketCounter,
    pending: Option<Pending>,
    answered: Option<Answered>,
    failure: Option<Error>,
    last_standard: Option<Instant>,
    last_maintenance: Option<Instant>,
    imu_streaming: bool,
    latest: Option<State>,
}

impl Session {
    pub fn new(side: Side, config: SessionConfig) -> Self {
        let bring_up = BringUp::new(side, config.player_lights);
        Self {
            config,
            bring_up,
            decoder: Decoder::new(side),
            counter: PacketCounter::new(),
            pending: None,
            answered: None,
            failure: None,
            last_standard: None,
            last_maintenance: None,
            imu_streaming: false,
            latest: None,
        }
    }

    pub fn side(&self) -> Side {
        self.decoder.side()
    }

    pub fn state(&self) -> SessionState {
        if self.failure.is_some() {
            SessionState::Failed
        } else if self.bring_up.is_done() {
            SessionState::Ready
        } else {
            SessionState::Initializing
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn calibration(&self) -> Option<&Calibration> {
        self.decoder.calibration()
    }

    pub fn latest_state(&self) -> Option<&State> {
        self.latest.as_ref()
    }

    /// Starts the bring-up over, e.g. after a failure. The packet counter
    /// keeps running.
    pub fn restart(&mut self) {
        let side = self.side();
        self.bring_up = BringUp::new(side, self.config.player_lights);
        self.decoder = Decoder::new(side);
        self.pending = None;
        self.answered = None;
        self.failure = None;
        self.last_standard = None;
        self.last_maintenance = None;
        self.imu_streaming = false;
        self.latest = None;
    }

    /// Returns the next report to write, if any is due at `now`.
    pub fn tick(&mut self, now: Instant) -> Result<Option<Bytes>> {
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        if self.bring_up.is_done() {
            return Ok(self.tick_maintenance(now));
        }
        self.tick_bring_up(now)
    }

    fn tick_bring_up(&mut self, now: Instant) -> Result<Option<Bytes>> {
        if let Some(pending) = &mut self.pending {
            let can_retry = pending.retries < self.config.max_retries;
            let due = if can_retry {
                self.config.command_interval
            } else {
                self.config.reply_timeout
            };
            if now.saturating_duration_since(pending.sent_at) < due {
                return Ok(None);
            }
            if can_retry {
                pending.retries += 1;
                pending.sent_at = now;
                tracing::debug!(
                    "resending `{}`, retry {}",
                    pending.request.subcommand,
                    pending.retries
                );
                return Ok(Some(pending.request.encode(&mut self.counter).freeze()));
            }
            let subcommand = pending.request.subcommand;
            let waited = now.saturating_duration_since(pending.first_sent_at);
            let best_effort = pending.request.best_effort;
            let expired = self.pending.take();
            if !(best_effort && self.bring_up.skip()) {
                return Err(self.fail(Error::Timeout {
                    subcommand,
                    timeout: waited,
                }));
            }
            tracing::warn!("no reply for `{}`, skipping", subcommand);
            self.answered = expired.map(|expired| Answered {
                echoes: expired.retries + 1,
                request: expired.request,
            });
        }
        let Some(request) = self.bring_up.next_request() else {
            return Ok(None);
        };
        let report = request.encode(&mut self.counter).freeze();
        self.pending = Some(Pending {
            request,
            first_sent_at: now,
            sent_at: now,
            retries: 0,
        });
        Ok(Some(report))
    }

    fn tick_maintenance(&mut self, now: Instant) -> Option<Bytes> {
        if self
            .last_maintenance
            .is_some_and(|at| now.saturating_duration_since(at) < self.config.command_interval)
        {
            return None;
        }
        let stale = self.last_standard.map_or(true, |at| {
            now.saturating_duration_since(at) > self.config.watchdog_timeout
        });
        let request = if stale {
            tracing::debug!("full reports stalled, re-issuing report mode");
            self.last_standard = Some(now);
            Request::new(
                Subcommand::SetInputReportMode,
                &[report_mode::STANDARD_FULL],
            )
        } else if !self.imu_streaming {
            tracing::debug!("imu data missing, re-enabling imu");
            Request::new(Subcommand::EnableImu, &[0x01])
        } else {
            return None;
        };
        self.last_maintenance = Some(now);
        Some(request.encode(&mut self.counter).freeze())
    }

    pub fn feed(&mut self, buf: &[u8], now: Instant) -> Result<Option<SessionEvent>> {
        if self.failure.is_some() {
            return Ok(None);
        }
        match self.decoder.feed(buf)? {
            Inbound::Reply(reply) => self.on_reply(&reply, now),
            Inbound::State {
                state,
                imu_streaming,
            } => {
                self.last_standard = Some(now);
                self.imu_streaming = imu_streaming;
                self.latest = Some(state.clone());
                Ok(Some(SessionEvent::State(state)))
            }
            Inbound::Uncalibrated { imu_streaming } => {
                self.last_standard = Some(now);
                self.imu_streaming = imu_streaming;
                Ok(None)
            }
            Inbound::Ignored(id) => {
                tracing::trace!("ignoring report {:#04x}", id);
                Ok(None)
            }
        }
    }

    fn on_reply(&mut self, reply: &SubcommandReply, now: Instant) -> Result<Option<SessionEvent>> {
        if self.is_late_echo(reply) {
            return Ok(None);
        }
        let Some(pending) = self.pending.take() else {
            tracing::trace!("ignoring reply to {:#04x}", reply.subcommand_id());
            return Ok(None);
        };
        let event = match self.bring_up.complete(reply) {
            Ok(calibration) => calibration.map(|calibration| {
                self.decoder.set_calibration(calibration);
                SessionEvent::Calibrated(calibration)
            }),
            Err(err) => {
                if !(pending.request.best_effort && self.bring_up.skip()) {
                    return Err(self.fail(err));
                }
                tracing::warn!("`{}` failed, skipping: {}", pending.request.subcommand, err);
                None
            }
        };
        if pending.retries > 0 {
            self.answered = Some(Answered {
                echoes: pending.retries,
                request: pending.request,
            });
        }
        if self.bring_up.is_done() {
            tracing::info!("{} ready", self.side().name());
            self.last_standard = Some(now);
            return Ok(Some(SessionEvent::Ready));
        }
        Ok(event)
    }

    /// A reply that does not fit the pending request but answers a resend of
    /// the previous one is dropped, once per extra send.
    fn is_late_echo(&mut self, reply: &SubcommandReply) -> bool {
        let (Some(pending), Some(answered)) = (&self.pending, &mut self.answered) else {
            return false;
        };
        if pending.request.verify(reply).is_ok() || answered.request.verify(reply).is_err() {
            return false;
        }
        tracing::trace!("dropping late reply to `{}`", answered.request.subcommand);
        answered.echoes -= 1;
        if answered.echoes == 0 {
            self.answered = None;
        }
        true
    }

    /// Encodes a rumble-only report.
    pub fn rumble(&mut self, rumble: &Rumble) -> Bytes {
        OutputReport::with_rumble_only(&mut self.counter, &rumble.encode()).freeze()
    }

    /// Runs one tick and one bounded read against the transport.
    pub fn poll_once<T: Transport>(
        &mut self,
        transport: &T,
        now: Instant,
    ) -> Result<Option<SessionEvent>> {
        if let Some(report) = self.tick(now)? {
            transport::write_all(transport, &report)?;
        }
        let mut buf = [0u8; INPUT_REPORT_LEN];
        let len = transport.read_timeout(&mut buf, self.config.read_timeout)?;
        if len == 0 {
            return Ok(None);
        }
        match self.feed(&buf[..len], now) {
            Err(Error::Report(err)) => {
                tracing::trace!("discarding report: {}", err);
                Ok(None)
            }
            other => other,
        }
    }

    fn fail(&mut self, err: Error) -> Error {
        tracing::error!("bring-up failed: {}", err);
        self.pending = None;
        self.failure = Some(err.clone());
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration::tests::{
        FACTORY_LEFT_STICK, IMU_FACTORY, IMU_PARAMETERS, STICK_PARAMETERS,
    };
    use crate::controller::report::input::RawStick;
    use crate::controller::state::button::Button;
    use crate::mock::FakeJoyCon;

    fn spi_reply(address: u32, data: &[u8]) -> SubcommandReply {
        let mut payload = address.to_le_bytes().to_vec();
        payload.push(data.len() as u8);
        payload.extend_from_slice(data);
        SubcommandReply::new(0x90, 0x10, payload)
    }

    fn ack(subcommand: Subcommand) -> SubcommandReply {
        SubcommandReply::new(0x80, subcommand.to_byte(), vec![])
    }

    fn drive(session: &mut Session, device: &FakeJoyCon, step: Duration) -> Vec<SessionEvent> {
        let mut now = Instant::now();
        let mut events = vec![];
        for _ in 0..100 {
            if let Some(event) = session.poll_once(device, now).unwrap() {
                events.push(event);
            }
            if session.is_ready() {
                break;
            }
            now += step;
        }
        events
    }

    #[test]
    fn bring_up_prefers_user_calibration() {
        let mut bring_up = BringUp::new(Side::Left, DEFAULT_PLAYER_LIGHTS);
        let user = [0x00, 0x06, 0x60, 0x00, 0x08, 0x80, 0x00, 0x05, 0x50];

        assert!(bring_up
            .complete(&ack(Subcommand::SetInputReportMode))
            .unwrap()
            .is_none());
        let request = bring_up.next_request().unwrap();
        assert_eq!(request.payload, [0x12, 0x80, 0x00, 0x00, 0x09]);
        bring_up.complete(&spi_reply(0x8012, &user)).unwrap();
        assert_eq!(bring_up.step(), BringUpStep::StickParameters);
        bring_up
            .complete(&spi_reply(0x6086, &STICK_PARAMETERS))
            .unwrap();
        bring_up
            .complete(&spi_reply(0x8028, &[0xFF; 24]))
            .unwrap();
        assert_eq!(bring_up.step(), BringUpStep::ImuFactoryCalibration);
        bring_up.complete(&spi_reply(0x6020, &IMU_FACTORY)).unwrap();
        let calibration = bring_up
            .complete(&spi_reply(0x6080, &IMU_PARAMETERS))
            .unwrap()
            .unwrap();
        assert_eq!(
            calibration.stick,
            StickCalibration::parse(&user, &STICK_PARAMETERS, Side::Left).unwrap()
        );
        assert_eq!(bring_up.step(), BringUpStep::Pairing(1));
    }

    #[test]
    fn bring_up_rejects_mismatched_replies() {
        let mut bring_up = BringUp::new(Side::Right, DEFAULT_PLAYER_LIGHTS);
        bring_up
            .complete(&ack(Subcommand::SetInputReportMode))
            .unwrap();
        let err = bring_up
            .complete(&spi_reply(0x8012, &FACTORY_LEFT_STICK))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::SpiAddressMismatch {
                requested: 0x801D,
                echoed: 0x8012,
            })
        ));
        let err = bring_up.complete(&ack(Subcommand::EnableImu)).unwrap_err();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::UnexpectedReply {
                expected: Subcommand::SpiFlashRead,
                received: 0x40,
            })
        ));
        assert_eq!(bring_up.step(), BringUpStep::StickUserCalibration);
        assert!(!bring_up.skip());
    }

    #[test]
    fn session_runs_bring_up_in_order() {
        let device = FakeJoyCon::new(Side::Left);
        let mut session = Session::new(Side::Left, SessionConfig::default());
        let events = drive(&mut session, &device, Duration::from_millis(1));

        assert!(session.is_ready());
        assert!(matches!(events.last(), Some(SessionEvent::Ready)));
        assert!(events
            .iter()
            .any(|event| matches!(event, SessionEvent::Calibrated(_))));
        let ids: Vec<u8> = device.subcommands().iter().map(|(id, _)| *id).collect();
        assert_eq!(
            ids,
            [0x03, 0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x01, 0x01, 0x01, 0x30, 0x40, 0x03, 0x48]
        );
        let spi_addresses: Vec<u32> = device
            .subcommands()
            .iter()
            .filter(|(id, _)| *id == 0x10)
            .map(|(_, payload)| u32::from_le_bytes([payload[0], payload[1], payload[2], payload[3]]))
            .collect();
        assert_eq!(spi_addresses, [0x8012, 0x603D, 0x6086, 0x8028, 0x6020, 0x6080]);
        assert_eq!(
            session.calibration().unwrap().stick,
            StickCalibration::parse(&FACTORY_LEFT_STICK, &STICK_PARAMETERS, Side::Left).unwrap()
        );
    }

    #[test]
    fn session_publishes_states_when_ready() {
        let device = FakeJoyCon::new(Side::Left);
        let mut session = Session::new(Side::Left, SessionConfig::default());
        drive(&mut session, &device, Duration::from_millis(1));
        device.set_input(&[Button::A, Button::Zl], RawStick { x: 0xF00, y: 0x800 });

        let now = Instant::now();
        let state = (0..10)
            .find_map(|_| match session.poll_once(&device, now) {
                Ok(Some(SessionEvent::State(state))) => Some(state),
                _ => None,
            })
            .unwrap();
        assert!(state.is_pressed(Button::A));
        assert!(state.is_pressed(Button::Zl));
        assert_eq!(state.stick.x, 1.0);
        assert_eq!(state.stick.y, 0.0);
        assert_eq!(session.latest_state(), Some(&state));
    }

    #[test]
    fn session_times_out_after_retries() {
        let mut session = Session::new(Side::Right, SessionConfig::default());
        let start = Instant::now();
        let first = session.tick(start).unwrap().unwrap();
        assert_eq!(&first[10..], [0x03, 0x3F]);
        assert!(session.tick(start + Duration::from_millis(50)).unwrap().is_none());
        let resent = session.tick(start + Duration::from_millis(100)).unwrap().unwrap();
        assert_eq!(&resent[10..], [0x03, 0x3F]);
        assert_eq!(resent[1], first[1] + 1);
        for ms in [200, 300, 400, 500] {
            assert!(session
                .tick(start + Duration::from_millis(ms))
                .unwrap()
                .is_some());
        }
        // Out of retries; waits for the reply timeout before giving up.
        assert!(session.tick(start + Duration::from_millis(700)).unwrap().is_none());
        let err = session.tick(start + Duration::from_millis(800)).unwrap_err();
        assert!(matches!(
            err,
            Error::Timeout {
                subcommand: Subcommand::SetInputReportMode,
                timeout,
            } if timeout == Duration::from_millis(800)
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.tick(start + Duration::from_secs(5)).is_err());

        session.restart();
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(session.tick(start + Duration::from_secs(5)).unwrap().is_some());
    }

    fn send(session: &mut Session, device: &FakeJoyCon, now: Instant) {
        let report = session.tick(now).unwrap().unwrap();
        transport::write_all(device, &report).unwrap();
    }

    fn receive(
        session: &mut Session,
        device: &FakeJoyCon,
        now: Instant,
    ) -> Result<Option<SessionEvent>> {
        let mut buf = [0u8; INPUT_REPORT_LEN];
        let len = device.read_timeout(&mut buf, Duration::ZERO).unwrap();
        session.feed(&buf[..len], now)
    }

    #[test]
    fn session_drops_late_echoes_of_resent_requests() {
        let device = FakeJoyCon::new(Side::Left);
        let mut session = Session::new(Side::Left, SessionConfig::default());
        let start = Instant::now();
        let at = |ms| start + Duration::from_millis(ms);

        // Report mode is sent twice and both sends get answered.
        send(&mut session, &device, at(0));
        send(&mut session, &device, at(100));
        assert!(receive(&mut session, &device, at(120)).unwrap().is_none());
        send(&mut session, &device, at(120));
        assert!(receive(&mut session, &device, at(130)).unwrap().is_none());
        assert_eq!(session.state(), SessionState::Initializing);

        // The second answer to the user calibration read must not be taken
        // for the factory one.
        send(&mut session, &device, at(220));
        assert!(receive(&mut session, &device, at(230)).unwrap().is_none());
        send(&mut session, &device, at(230));
        assert!(receive(&mut session, &device, at(240)).unwrap().is_none());
        assert_eq!(session.state(), SessionState::Initializing);
        assert!(receive(&mut session, &device, at(250)).unwrap().is_none());

        drive(&mut session, &device, Duration::from_millis(1));
        assert!(session.is_ready());
        assert_eq!(
            session.calibration().unwrap().stick,
            StickCalibration::parse(&FACTORY_LEFT_STICK, &STICK_PARAMETERS, Side::Left).unwrap()
        );
    }

    #[test]
    fn session_skips_silent_pairing() {
        let device = FakeJoyCon::new(Side::Right);
        device.ignore(0x01);
        let mut session = Session::new(Side::Right, SessionConfig::default());
        drive(&mut session, &device, Duration::from_millis(400));

        assert!(session.is_ready());
        let pairing = device
            .subcommands()
            .iter()
            .filter(|(id, _)| *id == 0x01)
            .count();
        // One send and five retries per step.
        assert_eq!(pairing, 18);
    }

    #[test]
    fn session_fails_on_spi_address_mismatch() {
        let device = FakeJoyCon::new(Side::Left);
        device.corrupt_spi_address();
        let mut session = Session::new(Side::Left, SessionConfig::default());
        let now = Instant::now();
        let err = (0..10)
            .find_map(|_| session.poll_once(&device, now).err())
            .unwrap();
        assert!(matches!(
            err,
            Error::Protocol(ProtocolError::SpiAddressMismatch { .. })
        ));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(session.calibration().is_none());
    }

    #[test]
    fn session_watchdog_reissues_report_mode() {
        let device = FakeJoyCon::new(Side::Left);
        let mut session = Session::new(Side::Left, SessionConfig::default());
        drive(&mut session, &device, Duration::from_millis(1));

        let later = Instant::now() + Duration::from_secs(3);
        let report = session.tick(later).unwrap().unwrap();
        assert_eq!(&report[10..], [0x03, 0x30]);
        assert!(session
            .tick(later + Duration::from_millis(50))
            .unwrap()
            .is_none());

        // A full report without 6-axis data.
        let mut buf = vec![0u8; INPUT_REPORT_LEN];
        buf[0] = 0x30;
        buf[6..9].copy_from_slice(&RawStick { x: 0x800, y: 0x800 }.to_bytes());
        let fed_at = later + Duration::from_millis(150);
        assert!(matches!(
            session.feed(&buf, fed_at).unwrap(),
            Some(SessionEvent::State(_))
        ));
        let report = session.tick(fed_at).unwrap().unwrap();
        assert_eq!(&report[10..], [0x40, 0x01]);
    }

    #[test]
    fn rumble_report() {
        let mut session = Session::new(Side::Left, SessionConfig::default());
        let report = session.rumble(&Rumble::default());
        assert_eq!(report[0], 0x10);
        assert_eq!(&report[2..], RumbleData::NEUTRAL.as_bytes());
    }
}
