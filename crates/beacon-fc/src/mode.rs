use std::fmt;

/// ArduCopter flight modes (custom_mode numbers).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlightMode {
    Stabilize,
    Acro,
    AltHold,
    Auto,
    Guided,
    Loiter,
    Rtl,
    Circle,
    Land,
    PosHold,
    Brake,
    SmartRtl,
    Other(u32),
}

impl FlightMode {
    pub fn from_custom_mode(n: u32) -> Self {
        match n {
            0 => Self::Stabilize,
            1 => Self::Acro,
            2 => Self::AltHold,
            3 => Self::Auto,
            4 => Self::Guided,
            5 => Self::Loiter,
            6 => Self::Rtl,
            7 => Self::Circle,
            9 => Self::Land,
            16 => Self::PosHold,
            17 => Self::Brake,
            21 => Self::SmartRtl,
            other => Self::Other(other),
        }
    }

    pub fn custom_mode(self) -> u32 {
        match self {
            Self::Stabilize => 0,
            Self::Acro => 1,
            Self::AltHold => 2,
            Self::Auto => 3,
            Self::Guided => 4,
            Self::Loiter => 5,
            Self::Rtl => 6,
            Self::Circle => 7,
            Self::Land => 9,
            Self::PosHold => 16,
            Self::Brake => 17,
            Self::SmartRtl => 21,
            Self::Other(n) => n,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Stabilize => "STABILIZE",
            Self::Acro => "ACRO",
            Self::AltHold => "ALT_HOLD",
            Self::Auto => "AUTO",
            Self::Guided => "GUIDED",
            Self::Loiter => "LOITER",
            Self::Rtl => "RTL",
            Self::Circle => "CIRCLE",
            Self::Land => "LAND",
            Self::PosHold => "POSHOLD",
            Self::Brake => "BRAKE",
            Self::SmartRtl => "SMART_RTL",
            Self::Other(_) => "UNKNOWN",
        }
    }
}

impl fmt::Display for FlightMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(n) => write!(f, "MODE({})", n),
            m => f.write_str(m.name()),
        }
    }
}
