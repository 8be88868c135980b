use super::Vector3;
use crate::controller::calibration::ImuCalibration;
use crate::controller::report::input::RawImuFrame;

// Source: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/imu_sensor_notes.md#convert-to-basic-useful-data-using-spi-calibration
// acc  = raw * 4 / (coefficient - origin)          [g]
// gyro = (raw - offset) * 936 / (coefficient - offset)  [deg/s]

/// A single 6-axis sub-frame. The controller batches three of them, 5ms apart,
/// into every full report.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuSample {
    /// In g.
    pub acceleration: Vector3,
    /// In degrees per second.
    pub angular_velocity: Vector3,
}

/// Per-axis multipliers derived once from the calibration.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ImuScale {
    accel: [f32; 3],
    gyro: [f32; 3],
    gyro_offset: [i16; 3],
}

impl ImuScale {
    pub fn new(calibration: &ImuCalibration) -> Self {
        let axes = calibration.axes();
        Self {
            accel: axes.map(|axis| axis.accelerometer.scale()),
            gyro: axes.map(|axis| axis.gyroscope.scale()),
            gyro_offset: axes.map(|axis| axis.gyroscope.offset),
        }
    }

    pub fn accel(&self) -> [f32; 3] {
        self.accel
    }

    pub fn gyro(&self) -> [f32; 3] {
        self.gyro
    }

    pub fn convert(&self, frame: &RawImuFrame) -> ImuSample {
        let accel = |i: usize| f32::from(frame.accel[i]) * self.accel[i];
        let gyro = |i: usize| {
            (i32::from(frame.gyro[i]) - i32::from(self.gyro_offset[i])) as f32 * self.gyro[i]
        };
        ImuSample {
            acceleration: Vector3 {
                x: accel(0),
                y: accel(1),
                z: accel(2),
            },
            angular_velocity: Vector3 {
                x: gyro(0),
                y: gyro(1),
                z: gyro(2),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::calibration::{
        AccelerometerCalibration, GyroscopeCalibration, ImuAxisCalibration,
    };

    fn axis(origin: i16, accel_coeff: i16, offset: i16, gyro_coeff: i16) -> ImuAxisCalibration {
        ImuAxisCalibration {
            accelerometer: AccelerometerCalibration {
                origin,
                horizontal_offset: 0,
                coefficient: accel_coeff,
            },
            gyroscope: GyroscopeCalibration {
                offset,
                coefficient: gyro_coeff,
            },
        }
    }

    #[test]
    fn converts_frames() {
        let calibration = ImuCalibration {
            x: axis(0, 16384, 0, 1872),
            y: axis(100, 16484, -10, 926),
            z: axis(0, 0, 5, 5),
        };
        let scale = ImuScale::new(&calibration);
        let sample = scale.convert(&RawImuFrame {
            accel: [4096, -8192, 1234],
            gyro: [400, 90, 999],
        });
        // Accelerometer values are scaled without subtracting the origin.
        assert_eq!(sample.acceleration.x, 1.0);
        assert_eq!(sample.acceleration.y, -2.0);
        assert_eq!(sample.acceleration.z, 0.0);
        // Gyroscope values are offset first: 400 * 936 / 1872 and (90 + 10) * 936 / 936.
        assert_eq!(sample.angular_velocity.x, 200.0);
        assert_eq!(sample.angular_velocity.y, 100.0);
        assert_eq!(sample.angular_velocity.z, 0.0);
    }
}
