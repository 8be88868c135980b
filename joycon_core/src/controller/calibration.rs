use super::report::{ReportError, ReportResult};
use super::spi_flash::{
    IMU_CALIBRATION_LEN, IMU_PARAMETERS_LEN, STICK_CALIBRATION_LEN, STICK_PARAMETERS_LEN,
};
use super::Side;

/// Center and the reachable distance below/above it, in raw 12-bit units.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct StickAxisCalibration {
    pub center: u16,
    pub min: u16,
    pub max: u16,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct StickCalibration {
    pub x: StickAxisCalibration,
    pub y: StickAxisCalibration,
    pub deadzone: u16,
}

impl StickCalibration {
    /// Decodes a 9-byte calibration block and the 18-byte stick parameters.
    ///
    /// The right stick stores `center, min, max` while the left stick stores
    /// `max, center, min`, each as an X/Y pair of 12-bit values.
    pub fn parse(calibration: &[u8], parameters: &[u8], side: Side) -> ReportResult<Self> {
        check_len(calibration, STICK_CALIBRATION_LEN)?;
        check_len(parameters, STICK_PARAMETERS_LEN)?;
        let [v0, v1] = unpack_pair(&calibration[0..3]);
        let [v2, v3] = unpack_pair(&calibration[3..6]);
        let [v4, v5] = unpack_pair(&calibration[6..9]);
        let axis = |center, min, max| StickAxisCalibration { center, min, max };
        let (x, y) = match side {
            Side::Right => (axis(v0, v2, v4), axis(v1, v3, v5)),
            Side::Left => (axis(v2, v4, v0), axis(v3, v5, v1)),
        };
        let [deadzone, _] = unpack_pair(&parameters[3..6]);
        Ok(Self { x, y, deadzone })
    }

    /// Re-packs the axes into the 9-byte flash layout of the given side.
    pub fn to_bytes(&self, side: Side) -> [u8; 9] {
        let (x, y) = (&self.x, &self.y);
        let values = match side {
            Side::Right => [x.center, y.center, x.min, y.min, x.max, y.max],
            Side::Left => [x.max, y.max, x.center, y.center, x.min, y.min],
        };
        let mut buf = [0u8; 9];
        for (i, pair) in values.chunks(2).enumerate() {
            buf[i * 3..i * 3 + 3].copy_from_slice(&pack_pair(pair[0], pair[1]));
        }
        buf
    }
}

fn unpack_pair(bytes: &[u8]) -> [u16; 2] {
    let b0 = u16::from(bytes[0]);
    let b1 = u16::from(bytes[1]);
    let b2 = u16::from(bytes[2]);
    [((b1 << 8) & 0xF00) | b0, (b2 << 4) | (b1 >> 4)]
}

fn pack_pair(first: u16, second: u16) -> [u8; 3] {
    [
        (first & 0xFF) as u8,
        ((first >> 8) & 0x0F) as u8 | (((second & 0x0F) as u8) << 4),
        ((second >> 4) & 0xFF) as u8,
    ]
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct AccelerometerCalibration {
    pub origin: i16,
    pub horizontal_offset: i16,
    pub coefficient: i16,
}

impl AccelerometerCalibration {
    /// Raw units to g. A degenerate calibration yields zero.
    pub fn scale(&self) -> f32 {
        let denominator = i32::from(self.coefficient) - i32::from(self.origin);
        if denominator == 0 {
            return 0.0;
        }
        4.0 / denominator as f32
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct GyroscopeCalibration {
    pub offset: i16,
    pub coefficient: i16,
}

impl GyroscopeCalibration {
    /// Raw units (after removing the offset) to degrees per second. A
    /// degenerate calibration yields zero.
    pub fn scale(&self) -> f32 {
        let denominator = i32::from(self.coefficient) - i32::from(self.offset);
        if denominator == 0 {
            return 0.0;
        }
        936.0 / denominator as f32
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ImuAxisCalibration {
    pub accelerometer: AccelerometerCalibration,
    pub gyroscope: GyroscopeCalibration,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ImuCalibration {
    pub x: ImuAxisCalibration,
    pub y: ImuAxisCalibration,
    pub z: ImuAxisCalibration,
}

impl ImuCalibration {
    /// Decodes the 24-byte 6-axis calibration block and the 6-byte horizontal
    /// offsets.
    ///
    /// Layout: accel origin x3, accel coefficient x3, gyro offset x3, gyro
    /// coefficient x3, all little-endian i16.
    pub fn parse(calibration: &[u8], parameters: &[u8]) -> ReportResult<Self> {
        check_len(calibration, IMU_CALIBRATION_LEN)?;
        check_len(parameters, IMU_PARAMETERS_LEN)?;
        let value = |buf: &[u8], offset: usize| i16::from_le_bytes([buf[offset], buf[offset + 1]]);
        let axis = |i: usize| ImuAxisCalibration {
            accelerometer: AccelerometerCalibration {
                origin: value(calibration, 2 * i),
                horizontal_offset: value(parameters, 2 * i),
                coefficient: value(calibration, 6 + 2 * i),
            },
            gyroscope: GyroscopeCalibration {
                offset: value(calibration, 12 + 2 * i),
                coefficient: value(calibration, 18 + 2 * i),
            },
        };
        Ok(Self {
            x: axis(0),
            y: axis(1),
            z: axis(2),
        })
    }

    pub fn axes(&self) -> [&ImuAxisCalibration; 3] {
        [&self.x, &self.y, &self.z]
    }
}

/// Everything needed to turn raw reports into a `State`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct Calibration {
    pub stick: StickCalibration,
    pub imu: ImuCalibration,
}

fn check_len(buf: &[u8], expected: u8) -> ReportResult<()> {
    let expected = usize::from(expected);
    if buf.len() < expected {
        return Err(ReportError::DataTooShort {
            expected,
            actual: buf.len(),
        });
    }
    Ok(())
}
