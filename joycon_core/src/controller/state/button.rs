use strum::{Display, EnumIter, IntoEnumIterator};

/**
 * Button bits of the 24-bit mask carried in bytes 3-5 of every input report:
 * https://github.com/dekuNukem/Nintendo_Switch_Reverse_Engineering/blob/master/bluetooth_hid_notes.md
 * Byte 	0 	    1 	    2 	    3 	    4 	    5 	    6 	    7
 * 3   	    Y 	    X 	    B 	    A 	    SR 	    SL 	    R 	    ZR
 * 4        Minus 	Plus 	R Stick L Stick Home 	Capture	-	    Grip
 * 5        Down 	Up 	    Right 	Left 	SL 	    SR 	    L 	    ZL
 */
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum Button {
    Y,
    X,
    B,
    A,
    RightSr,
    RightSl,
    R,
    Zr,
    Minus,
    Plus,
    RStick,
    LStick,
    Home,
    Capture,
    ChargingGrip,
    Down,
    Up,
    Right,
    Left,
    LeftSl,
    LeftSr,
    L,
    Zl,
}

impl Button {
    pub fn bit(&self) -> u32 {
        let index = match self {
            Self::Y => 0,
            Self::X => 1,
            Self::B => 2,
            Self::A => 3,
            Self::RightSr => 4,
            Self::RightSl => 5,
            Self::R => 6,
            Self::Zr => 7,
            Self::Minus => 8,
            Self::Plus => 9,
            Self::RStick => 10,
            Self::LStick => 11,
            Self::Home => 12,
            Self::Capture => 13,
            Self::ChargingGrip => 15,
            Self::Down => 16,
            Self::Up => 17,
            Self::Right => 18,
            Self::Left => 19,
            Self::LeftSl => 20,
            Self::LeftSr => 21,
            Self::L => 22,
            Self::Zl => 23,
        };
        1 << index
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct ButtonMask(u32);

impl ButtonMask {
    pub fn from_bits(bits: u32) -> Self {
        Self(bits & 0x00FF_FFFF)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_pressed(&self, button: Button) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn pressed(&self) -> impl Iterator<Item = Button> + '_ {
        Button::iter().filter(|button| self.is_pressed(*button))
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

impl FromIterator<Button> for ButtonMask {
    fn from_iter<I: IntoIterator<Item = Button>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, button| bits | button.bit()))
    }
}
