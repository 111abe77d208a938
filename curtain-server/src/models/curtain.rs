use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A device report that does not name a known enum value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind}: {value:?}")]
pub struct InvalidValue {
    pub kind: &'static str,
    pub value: String,
}

macro_rules! wire_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = InvalidValue;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_lowercase().as_str() {
                    $($text => Ok($name::$variant),)+
                    _ => Err(InvalidValue { kind: $kind, value: s.to_string() }),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CurtainPosition {
    #[default]
    Unknown,
    Open,
    Closed,
    Partial,
    Opening,
    Closing,
}

wire_enum!(CurtainPosition, "position", {
    Unknown => "unknown",
    Open => "open",
    Closed => "closed",
    Partial => "partial",
    Opening => "opening",
    Closing => "closing",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MotorState {
    #[default]
    Stopped,
    Opening,
    Closing,
}

wire_enum!(MotorState, "motor state", {
    Stopped => "stopped",
    Opening => "opening",
    Closing => "closing",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SystemMode {
    #[default]
    Manual,
    Auto,
}

wire_enum!(SystemMode, "mode", {
    Manual => "manual",
    Auto => "auto",
});

/// Curtain state as last reported by the device. `position`, `motor_state`
/// and `mode` only change when the device says so.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurtainState {
    pub position: CurtainPosition,
    pub motor_state: MotorState,
    pub mode: SystemMode,
    /// Percentage
    pub motor_speed: u8,
    #[serde(with = "time::serde::rfc3339")]
    pub last_updated: OffsetDateTime,
}

impl CurtainState {
    pub fn new(motor_speed: u8) -> Self {
        Self {
            position: CurtainPosition::default(),
            motor_state: MotorState::default(),
            mode: SystemMode::default(),
            motor_speed,
            last_updated: OffsetDateTime::now_utc(),
        }
    }

    pub fn touch(&mut self) {
        self.last_updated = OffsetDateTime::now_utc();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemSettings {
    pub auto_mode_enabled: bool,
    pub threshold_dark: i32,
    pub threshold_bright: i32,
    pub hysteresis: i32,
    pub motor_speed: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("OPEN".parse::<CurtainPosition>().unwrap(), CurtainPosition::Open);
        assert_eq!(" closing ".parse::<MotorState>().unwrap(), MotorState::Closing);
        assert_eq!("Auto".parse::<SystemMode>().unwrap(), SystemMode::Auto);
    }

    #[test]
    fn test_rejects_unknown_values() {
        let error = "sideways".parse::<CurtainPosition>().unwrap_err();

        assert_eq!(error.to_string(), "Invalid position: \"sideways\"");
        assert!("running".parse::<MotorState>().is_err());
    }

    #[test]
    fn test_serialized_names_match_wire_names() {
        let state = CurtainState::new(80);
        let json = serde_json::to_value(&state).unwrap();

        assert_eq!(json["position"], "unknown");
        assert_eq!(json["motor_state"], "stopped");
        assert_eq!(json["mode"], "manual");
        assert_eq!(json["motor_speed"], 80);
    }
}
