pub use crate::connection::{ConnectionConfig as JoyConConfig, ConnectionState, Event, LogType};
use crate::connection::Connection;
use crate::controller::calibration::Calibration;
use crate::controller::info::DeviceInfo;
use crate::controller::report::subcommand::{ImuSensitivity, Subcommand};
use crate::controller::rumble::{Rumble, RumbleData};
use crate::controller::state::State;
use crate::controller::Side;
use crate::transport::Transport;
use crate::{Error, Result};
use tokio::sync::{mpsc, watch};

/// A single initialized Joy-Con.
///
/// Owns the transport through its [`Connection`]; [`JoyCon::dispose`] restores
/// the controller and releases it.
pub struct JoyCon<T: Transport> {
    connection: Connection<T>,
}

impl<T: Transport> JoyCon<T> {
    /// Resolves the side from the USB product id and runs the bring-up.
    pub async fn create(transport: T, product_id: u16, config: JoyConConfig) -> Result<Self> {
        let side = Side::from_product_id(product_id).ok_or(Error::InvalidProductId(product_id))?;
        Self::with_side(transport, side, config).await
    }

    #[tracing::instrument(skip(transport, config))]
    pub async fn with_side(transport: T, side: Side, config: JoyConConfig) -> Result<Self> {
        tracing::info!("initializing {}", side.name());
        let connection = Connection::new(transport, side, config).open().await?;
        Ok(Self { connection })
    }

    pub fn side(&self) -> Side {
        self.connection.side()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn calibration(&self) -> Option<Calibration> {
        self.connection.calibration()
    }

    pub fn latest_state(&self) -> Option<State> {
        self.connection.latest_state()
    }

    /// Notified whenever a newer state replaces the latest one.
    pub fn states(&self) -> watch::Receiver<Option<State>> {
        self.connection.states()
    }

    pub async fn events(&self) -> Result<mpsc::UnboundedReceiver<Event>> {
        self.connection.events().await
    }

    pub async fn rumble(&self, rumble: Rumble) -> Result<()> {
        self.connection.send_rumble(rumble.encode()).await
    }

    pub async fn stop_rumble(&self) -> Result<()> {
        self.connection.send_rumble(RumbleData::NEUTRAL).await
    }

    pub async fn device_info(&self) -> Result<DeviceInfo> {
        let reply = self
            .connection
            .send_subcommand(Subcommand::RequestDeviceInfo, &[])
            .await?;
        Ok(DeviceInfo::parse(reply.data())?)
    }

    pub async fn set_player_lights(&self, pattern: u8) -> Result<()> {
        self.connection
            .send_subcommand(Subcommand::SetPlayerLights, &[pattern])
            .await?;
        Ok(())
    }

    /// `pattern` is the raw mini-cycle description of the HOME button LED.
    pub async fn set_home_light(&self, pattern: &[u8]) -> Result<()> {
        self.connection
            .send_subcommand(Subcommand::SetHomeLight, pattern)
            .await?;
        Ok(())
    }

    pub async fn set_imu_sensitivity(&self, sensitivity: ImuSensitivity) -> Result<()> {
        self.connection
            .send_subcommand(Subcommand::SetImuSensitivity, &sensitivity.to_bytes())
            .await?;
        Ok(())
    }

    pub async fn dispose(self) {
        tracing::info!("disposing {}", self.side().name());
        self.connection.close().await;
    }
}
