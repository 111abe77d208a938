use std::fmt;
use std::str::FromStr;

use crate::error::LinkError;

/// Highest value the device ADC reports.
pub const LIGHT_MAX: u16 = 1023;

pub const SPEED_MAX: u8 = 100;

/// Outbound command. Encoded as `NAME` or `NAME:PARAM` plus `\n`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    OpenCurtain,
    CloseCurtain,
    StopMotor,
    SetOpenThreshold(u16),
    SetCloseThreshold(u16),
    SetSpeed(u8),
    CalibrateLight,
    ReadLight,
    GetStatus,
    Ping,
    AutoMode,
    ManualMode,
    Raw { name: String, param: Option<String> },
}

impl Command {
    pub fn set_open_threshold(value: i64) -> Result<Self, LinkError> {
        Ok(Command::SetOpenThreshold(light_level("SET_OPEN_THRESHOLD", value)?))
    }

    pub fn set_close_threshold(value: i64) -> Result<Self, LinkError> {
        Ok(Command::SetCloseThreshold(light_level("SET_CLOSE_THRESHOLD", value)?))
    }

    pub fn set_speed(value: i64) -> Result<Self, LinkError> {
        match u8::try_from(value) {
            Ok(speed) if speed <= SPEED_MAX => Ok(Command::SetSpeed(speed)),
            _ => Err(LinkError::InvalidParameter {
                command: "SET_SPEED",
                value: value.to_string(),
            }),
        }
    }

    /// Command outside the known set. The name is upper-cased.
    pub fn raw(name: &str, param: Option<&str>) -> Result<Self, LinkError> {
        let name = name.trim().to_uppercase();

        if name.is_empty() || name.contains([':', '\r', '\n']) {
            return Err(LinkError::InvalidCommand(name));
        }
        if param.is_some_and(|p| p.contains(['\r', '\n'])) {
            return Err(LinkError::InvalidCommand(name));
        }

        Ok(Command::Raw {
            name,
            param: param.map(str::to_string),
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Command::OpenCurtain => "OPEN_CURTAIN",
            Command::CloseCurtain => "CLOSE_CURTAIN",
            Command::StopMotor => "STOP_MOTOR",
            Command::SetOpenThreshold(_) => "SET_OPEN_THRESHOLD",
            Command::SetCloseThreshold(_) => "SET_CLOSE_THRESHOLD",
            Command::SetSpeed(_) => "SET_SPEED",
            Command::CalibrateLight => "CALIBRATE_LIGHT",
            Command::ReadLight => "READ_LIGHT",
            Command::GetStatus => "GET_STATUS",
            Command::Ping => "PING",
            Command::AutoMode => "AUTO_MODE",
            Command::ManualMode => "MANUAL_MODE",
            Command::Raw { name, .. } => name,
        }
    }

    pub fn param(&self) -> Option<String> {
        match self {
            Command::SetOpenThreshold(value) | Command::SetCloseThreshold(value) => {
                Some(value.to_string())
            }
            Command::SetSpeed(value) => Some(value.to_string()),
            Command::Raw { param, .. } => param.clone(),
            _ => None,
        }
    }

    /// Wire form including the terminator.
    pub fn encode(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.param() {
            Some(param) if !param.is_empty() => write!(f, "{}:{}", self.name(), param),
            _ => f.write_str(self.name()),
        }
    }
}

impl FromStr for Command {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, param) = match s.trim().split_once(':') {
            Some((name, param)) => (name.trim().to_uppercase(), Some(param.trim())),
            None => (s.trim().to_uppercase(), None),
        };

        let simple = |command: Command| match param {
            None => Ok(command),
            Some(_) => Err(LinkError::InvalidCommand(s.to_string())),
        };
        let number = |command: &'static str| -> Result<i64, LinkError> {
            param
                .and_then(|p| p.parse().ok())
                .ok_or_else(|| LinkError::InvalidParameter {
                    command,
                    value: param.unwrap_or_default().to_string(),
                })
        };

        match name.as_str() {
            "OPEN_CURTAIN" => simple(Command::OpenCurtain),
            "CLOSE_CURTAIN" => simple(Command::CloseCurtain),
            "STOP_MOTOR" => simple(Command::StopMotor),
            "CALIBRATE_LIGHT" => simple(Command::CalibrateLight),
            "READ_LIGHT" => simple(Command::ReadLight),
            "GET_STATUS" => simple(Command::GetStatus),
            "PING" => simple(Command::Ping),
            "AUTO_MODE" => simple(Command::AutoMode),
            "MANUAL_MODE" => simple(Command::ManualMode),
            "SET_OPEN_THRESHOLD" => Command::set_open_threshold(number("SET_OPEN_THRESHOLD")?),
            "SET_CLOSE_THRESHOLD" => Command::set_close_threshold(number("SET_CLOSE_THRESHOLD")?),
            "SET_SPEED" => Command::set_speed(number("SET_SPEED")?),
            _ => Command::raw(&name, param),
        }
    }
}

fn light_level(command: &'static str, value: i64) -> Result<u16, LinkError> {
    match u16::try_from(value) {
        Ok(level) if level <= LIGHT_MAX => Ok(level),
        _ => Err(LinkError::InvalidParameter {
            command,
            value: value.to_string(),
        }),
    }
}
