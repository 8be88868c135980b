use super::calibration::Calibration;
use super::report::input::{BatteryLevel, ConnectionInfo, InputReport};
use super::Side;
use button::{Button, ButtonMask};
use imu::{ImuSample, ImuScale};

pub mod button;
pub mod imu;
pub mod stick;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Calibrated snapshot of one full input report.
#[derive(Clone, Debug, PartialEq)]
pub struct State {
    pub buttons: ButtonMask,
    /// Normalized into `[-1, 1]` with the deadzone applied.
    pub stick: Vector2,
    /// Oldest first.
    pub imu_samples: [ImuSample; 3],
    pub battery: BatteryLevel,
    pub connection: ConnectionInfo,
}

impl State {
    /// Returns `None` for reports without 6-axis data.
    pub fn from_report(
        report: &InputReport<'_>,
        side: Side,
        calibration: &Calibration,
        scale: &ImuScale,
    ) -> Option<Self> {
        let frames = report.imu_frames()?;
        Some(Self {
            buttons: report.buttons(),
            stick: stick::normalize(report.stick(side), &calibration.stick),
            imu_samples: frames.map(|frame| scale.convert(&frame)),
            battery: report.battery(),
            connection: report.connection_info(),
        })
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.buttons.is_pressed(button)
    }

    pub fn latest_imu_sample(&self) -> &ImuSample {
        &self.imu_samples[2]
    }
}
