// Ref: https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/rumble_data_table.md

const HIGH_FREQ_MIN: f32 = 81.75177;
const HIGH_FREQ_MAX: f32 = 1252.572266;
const LOW_FREQ_MIN: f32 = 40.875885;
const LOW_FREQ_MAX: f32 = 626.286133;
const HIGH_AMP_MAX: f32 = 1.0;
const LOW_AMP_MAX: f32 = 0.98;

/// The 8-byte rumble field embedded in every outgoing report: one 4-byte block
/// per motor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct RumbleData([u8; 8]);

impl RumbleData {
    /// 160Hz/320Hz at zero amplitude; keeps both motors idle.
    pub const NEUTRAL: Self = Self([0x00, 0x01, 0x40, 0x40, 0x00, 0x01, 0x40, 0x40]);

    /// Drives both motors with the same block.
    pub fn from_bytes(block: [u8; 4]) -> Self {
        let mut buf = [0u8; 8];
        buf[..4].copy_from_slice(&block);
        buf[4..].copy_from_slice(&block);
        Self(buf)
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl Default for RumbleData {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Haptic request for both frequency bands. Out of range values are clamped
/// during encoding.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Rumble {
    pub low_freq: f32,
    pub high_freq: f32,
    pub low_amp: f32,
    pub high_amp: f32,
}

impl Rumble {
    pub fn new(low_freq: f32, high_freq: f32, low_amp: f32, high_amp: f32) -> Self {
        Self {
            low_freq,
            high_freq,
            low_amp,
            high_amp,
        }
    }

    pub fn encode(&self) -> RumbleData {
        let high_freq = clamp(self.high_freq, HIGH_FREQ_MIN, HIGH_FREQ_MAX);
        let low_freq = clamp(self.low_freq, LOW_FREQ_MIN, LOW_FREQ_MAX);
        let high_amp = clamp(self.high_amp, 0.0, HIGH_AMP_MAX);
        let low_amp = clamp(self.low_amp, 0.0, LOW_AMP_MAX);

        let hf = ((encode_freq(high_freq) - 0x60) * 4) as u16;
        let lf = (encode_freq(low_freq) - 0x40) as u8;
        let high_amp_idx = encode_amp(high_amp);
        let low_amp_idx = encode_amp(low_amp);
        // Integer division drops the low bit of the low band amplitude index.
        let ha = (high_amp_idx * 2) as u16;
        let la = (low_amp_idx / 2 + 0x40) as u16;

        RumbleData::from_bytes([
            (hf & 0xFF) as u8,
            (((hf >> 8) & 0xFF) as u8).wrapping_add((ha & 0xFF) as u8),
            lf.wrapping_add(((la >> 8) & 0xFF) as u8),
            (la & 0xFF) as u8,
        ])
    }
}

impl Default for Rumble {
    fn default() -> Self {
        Self::new(160.0, 320.0, 0.0, 0.0)
    }
}

// NaN inputs fall to the lower bound.
fn clamp(value: f32, min: f32, max: f32) -> f32 {
    if value.is_nan() {
        return min;
    }
    value.clamp(min, max)
}

fn encode_freq(hz: f32) -> i32 {
    round_index((hz / 10.0).log2() * 32.0)
}

fn encode_amp(amp: f32) -> i32 {
    if amp > 0.23 {
        round_index((amp * 8.7).log2() * 32.0)
    } else if amp > 0.12 {
        round_index((amp * 17.0).log2() * 16.0)
    } else {
        0
    }
}

// Halves go to the even neighbour.
fn round_index(value: f32) -> i32 {
    value.round_ties_even() as i32
}

#[cfg(test)]
mod tests {
    use super::{round_index, Rumble, RumbleData};

    #[test]
    fn encode_is_deterministic() {
        let rumble = Rumble::new(160.0, 320.0, 0.6, 0.8);
        let first = rumble.encode();
        let second = rumble.encode();
        assert_eq!(first, second);
        let bytes = first.as_bytes();
        assert_eq!(bytes[..4], bytes[4..]);
    }

    #[test]
    fn encode_silent_rumble() {
        // 320Hz high band: round(log2(32) * 32) = 160 -> (160 - 0x60) * 4 = 0x100.
        // 160Hz low band: round(log2(16) * 32) = 128 -> 128 - 0x40 = 0x40.
        let data = Rumble::new(160.0, 320.0, 0.0, 0.0).encode();
        assert_eq!(data, RumbleData::NEUTRAL);
    }

    #[test]
    fn encode_amplitudes() {
        // High amp 1.0: round(log2(8.7) * 32) = 100 -> 200 added to the second byte.
        // Low amp 0.98: round(log2(8.526) * 32) = 99 -> 99 / 2 + 0x40 = 0x71.
        let data = Rumble::new(160.0, 320.0, 0.98, 1.0).encode();
        assert_eq!(&data.as_bytes()[..4], &[0x00, 0x01 + 200, 0x40, 0x71]);
        // Middle tier: round(log2(0.2 * 17) * 16) = 28.
        let data = Rumble::new(160.0, 320.0, 0.0, 0.2).encode();
        assert_eq!(data.as_bytes()[1], 0x01 + 56);
    }

    #[test]
    fn encode_clamps_inputs() {
        let clamped = Rumble::new(10_000.0, 10_000.0, 5.0, 5.0).encode();
        let limits = Rumble::new(626.286133, 1252.572266, 0.98, 1.0).encode();
        assert_eq!(clamped, limits);
        let low = Rumble::new(0.0, 0.0, -1.0, f32::NAN).encode();
        let floor = Rumble::new(40.875885, 81.75177, 0.0, 0.0).encode();
        assert_eq!(low, floor);
    }

    #[test]
    fn indices_round_half_to_even() {
        assert_eq!(round_index(98.5), 98);
        assert_eq!(round_index(99.5), 100);
        assert_eq!(round_index(27.4), 27);
        assert_eq!(round_index(27.6), 28);
    }

    #[test]
    fn neutral_is_default() {
        assert_eq!(RumbleData::default(), RumbleData::NEUTRAL);
        assert_eq!(
            RumbleData::from_bytes([0x00, 0x01, 0x40, 0x40]),
            RumbleData::NEUTRAL
        );
    }
}
