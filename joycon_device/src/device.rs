use crate::transport::HidTransport;
use hidapi::{HidApi, HidError};
use joycon_core::controller::{Side, VENDOR_ID};
use std::ffi::CString;
use thiserror::Error;

#[derive(Clone, Error, Debug)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("internal error: {0}")]
    Internal(DeviceInternalError),
}

#[derive(Clone, Error, Debug)]
pub enum DeviceInternalError {
    #[error("hidapi: {0}")]
    Hid(String),
}

impl From<HidError> for DeviceError {
    fn from(err: HidError) -> Self {
        Self::Internal(DeviceInternalError::Hid(err.to_string()))
    }
}

/// An enumerated Joy-Con that has not been opened yet.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct DeviceDescriptor {
    pub path: CString,
    pub serial_number: Option<String>,
    pub product_id: u16,
    pub side: Side,
}

impl DeviceDescriptor {
    pub fn path_lossy(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }
}

/// Only Joy-Con (L) and (R) are accepted; other Nintendo devices share the
/// vendor id.
pub fn side_of(vendor_id: u16, product_id: u16) -> Option<Side> {
    if vendor_id != VENDOR_ID {
        return None;
    }
    Side::from_product_id(product_id)
}

pub struct Devices {
    api: HidApi,
}

impl Devices {
    pub fn new() -> Result<Self, DeviceError> {
        Ok(Self {
            api: HidApi::new()?,
        })
    }

    pub fn refresh(&mut self) -> Result<(), DeviceError> {
        self.api.refresh_devices()?;
        Ok(())
    }

    pub fn discover(&self) -> Vec<DeviceDescriptor> {
        self.api
            .device_list()
            .filter_map(|info| {
                let side = side_of(info.vendor_id(), info.product_id())?;
                Some(DeviceDescriptor {
                    path: info.path().to_owned(),
                    serial_number: info.serial_number().map(str::to_owned),
                    product_id: info.product_id(),
                    side,
                })
            })
            .collect()
    }

    pub fn open(&self, descriptor: &DeviceDescriptor) -> Result<HidTransport, DeviceError> {
        tracing::debug!(
            "opening {} at {}",
            descriptor.side.name(),
            descriptor.path_lossy()
        );
        let device = self.api.open_path(&descriptor.path).map_err(|err| {
            tracing::warn!("failed to open {}: {}", descriptor.path_lossy(), err);
            DeviceError::from(err)
        })?;
        Ok(HidTransport::new(device))
    }

    /// Opens the first enumerated Joy-Con whose serial number matches.
    pub fn open_serial(
        &self,
        serial_number: &str,
    ) -> Result<(DeviceDescriptor, HidTransport), DeviceError> {
        let descriptor = self
            .discover()
            .into_iter()
            .find(|descriptor| descriptor.serial_number.as_deref() == Some(serial_number))
            .ok_or_else(|| DeviceError::NotFound(serial_number.to_owned()))?;
        let transport = self.open(&descriptor)?;
        Ok((descriptor, transport))
    }
}
