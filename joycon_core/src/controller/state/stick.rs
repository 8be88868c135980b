use super::Vector2;
use crate::controller::calibration::{StickAxisCalibration, StickCalibration};
use crate::controller::report::input::RawStick;

/// Maps a raw stick reading into `[-1, 1]` on both axes.
pub fn normalize(raw: RawStick, calibration: &StickCalibration) -> Vector2 {
    Vector2 {
        x: normalize_axis(raw.x, &calibration.x, calibration.deadzone),
        y: normalize_axis(raw.y, &calibration.y, calibration.deadzone),
    }
}

/// Positive offsets are scaled by `max`, negative offsets by `min`. Offsets
/// within the deadzone, inclusive, are exactly zero.
pub fn normalize_axis(raw: u16, axis: &StickAxisCalibration, deadzone: u16) -> f32 {
    let diff = i32::from(raw) - i32::from(axis.center);
    if diff.unsigned_abs() <= u32::from(deadzone) {
        return 0.0;
    }
    let divisor = if diff > 0 { axis.max } else { axis.min };
    if divisor == 0 {
        return 0.0;
    }
    (diff as f32 / f32::from(divisor)).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calibration() -> StickCalibration {
        StickCalibration {
            x: StickAxisCalibration {
                center: 2048,
                min: 1000,
                max: 1500,
            },
            y: StickAxisCalibration {
                center: 2000,
                min: 1200,
                max: 1300,
            },
            deadzone: 200,
        }
    }

    #[test]
    fn deadzone_is_zero() {
        let cal = calibration();
        for offset in -200..=200 {
            let raw = RawStick {
                x: (2048 + offset) as u16,
                y: (2000 - offset) as u16,
            };
            assert_eq!(normalize(raw, &cal), Vector2 { x: 0.0, y: 0.0 });
        }
    }

    #[test]
    fn sign_selects_divisor() {
        let cal = calibration();
        assert_eq!(normalize_axis(2048 + 750, &cal.x, 0), 0.5);
        assert_eq!(normalize_axis(2048 - 500, &cal.x, 0), -0.5);
        assert_eq!(normalize_axis(2000 + 650, &cal.y, 0), 0.5);
        assert_eq!(normalize_axis(2000 - 600, &cal.y, 0), -0.5);
        // Just outside the deadzone.
        assert_eq!(normalize_axis(2048 + 201, &cal.x, 200), 201.0 / 1500.0);
    }

    #[test]
    fn zero_diff_ignores_divisor() {
        let axis = StickAxisCalibration {
            center: 2048,
            min: 0,
            max: 0,
        };
        assert_eq!(normalize_axis(2048, &axis, 0), 0.0);
        assert_eq!(normalize_axis(4000, &axis, 0), 0.0);
    }

    #[test]
    fn clamps_beyond_range() {
        let cal = calibration();
        assert_eq!(normalize_axis(0x0FFF, &cal.x, 0), 1.0);
        assert_eq!(normalize_axis(0, &cal.x, 0), -1.0);
    }
}
