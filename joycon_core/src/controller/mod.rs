use strum::{Display, EnumString, IntoStaticStr};

pub mod calibration;
pub mod info;
pub mod report;
pub mod rumble;
pub mod spi_flash;
pub mod state;

pub const VENDOR_ID: u16 = 0x057E;
pub const PRODUCT_ID_LEFT: u16 = 0x2006;
pub const PRODUCT_ID_RIGHT: u16 = 0x2007;

#[derive(
    Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Display, EnumString, IntoStaticStr,
)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn from_product_id(product_id: u16) -> Option<Self> {
        match product_id {
            PRODUCT_ID_LEFT => Some(Self::Left),
            PRODUCT_ID_RIGHT => Some(Self::Right),
            _ => None,
        }
    }

    pub fn product_id(&self) -> u16 {
        match self {
            Self::Left => PRODUCT_ID_LEFT,
            Self::Right => PRODUCT_ID_RIGHT,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Left => "Joy-Con (L)",
            Self::Right => "Joy-Con (R)",
        }
    }
}

/// Controller kind as reported in the connection info nibble of every input
/// report.
#[derive(Clone, Copy, Default, Debug, Eq, PartialEq, PartialOrd, Ord, Hash, Display)]
pub enum ControllerKind {
    ProOrGrip,
    JoyCon,
    #[default]
    Unknown,
}

impl ControllerKind {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Self::ProOrGrip,
            3 => Self::JoyCon,
            _ => Self::Unknown,
        }
    }
}
