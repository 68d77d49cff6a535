//! Board profiles known to the uploaders.

/// How a board is put into its bootloader before the image is sent.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ResetMethod {
    /// The bootloader is already waiting, nothing to do.
    None,
    /// Drop then raise DTR, the auto-reset circuit of most Arduino boards.
    DtrPulse,
}

/// Line settings and reset method of a board's bootloader.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct BoardProfile {
    pub name: &'static str,
    /// Baud rate the bootloader listens at.
    pub baud_rate: u32,
    pub reset: ResetMethod,
}

pub const RASPBERRY_PI: BoardProfile = BoardProfile {
    name: "raspberry-pi",
    baud_rate: 230_400,
    reset: ResetMethod::None,
};

pub const ARDUINO_UNO: BoardProfile = BoardProfile {
    name: "arduino-uno",
    baud_rate: 115_200,
    reset: ResetMethod::DtrPulse,
};

pub const ARDUINO_MEGA: BoardProfile = BoardProfile {
    name: "arduino-mega",
    baud_rate: 115_200,
    reset: ResetMethod::DtrPulse,
};

pub const GENERIC: BoardProfile = BoardProfile {
    name: "generic",
    baud_rate: 115_200,
    reset: ResetMethod::None,
};

static BOARDS: [BoardProfile; 4] = [RASPBERRY_PI, ARDUINO_UNO, ARDUINO_MEGA, GENERIC];

/// All built-in board profiles.
pub fn boards() -> &'static [BoardProfile] {
    &BOARDS
}

/// Find a built-in profile by name, ignoring case.
pub fn board_by_name(name: &str) -> Option<&'static BoardProfile> {
    BOARDS.iter().find(|b| b.name.eq_ignore_ascii_case(name))
}

#[test]
fn lookup_by_name() {
    assert_eq!(board_by_name("Arduino-Uno"), Some(&ARDUINO_UNO));
    assert_eq!(board_by_name("raspberry-pi").map(|b| b.baud_rate), Some(230_400));
    assert!(board_by_name("esp32").is_none());
}

#[test]
fn names_are_unique() {
    for (i, a) in boards().iter().enumerate() {
        assert!(boards()[i + 1..].iter().all(|b| b.name != a.name));
    }
}
