use std::fmt;

use crate::error::DecodeError;

/// Router key for inbound messages.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Light,
    Position,
    Motor,
    Mode,
    Calibration,
    Error,
    Status,
    Ready,
    Version,
    Uptime,
    Pong,
    Other(String),
}

impl MessageKind {
    pub fn from_token(token: &str) -> Self {
        let token = token.trim().to_uppercase();

        match token.as_str() {
            "LIGHT" => MessageKind::Light,
            "POSITION" => MessageKind::Position,
            "MOTOR" => MessageKind::Motor,
            "MODE" => MessageKind::Mode,
            "CALIBRATION" => MessageKind::Calibration,
            "ERROR" => MessageKind::Error,
            "STATUS" => MessageKind::Status,
            "READY" => MessageKind::Ready,
            "VERSION" => MessageKind::Version,
            "UPTIME" => MessageKind::Uptime,
            "PONG" => MessageKind::Pong,
            _ => MessageKind::Other(token),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MessageKind::Light => "LIGHT",
            MessageKind::Position => "POSITION",
            MessageKind::Motor => "MOTOR",
            MessageKind::Mode => "MODE",
            MessageKind::Calibration => "CALIBRATION",
            MessageKind::Error => "ERROR",
            MessageKind::Status => "STATUS",
            MessageKind::Ready => "READY",
            MessageKind::Version => "VERSION",
            MessageKind::Uptime => "UPTIME",
            MessageKind::Pong => "PONG",
            MessageKind::Other(token) => token,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fields present in a `CALIBRATION` report. Absent fields leave the
/// device status untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalibrationUpdate {
    pub calibrated: Option<bool>,
    pub light_min: Option<i32>,
    pub light_max: Option<i32>,
}

impl CalibrationUpdate {
    /// Parses `YES,MIN:100,MAX:900`. Unknown or malformed tokens are skipped.
    pub fn parse(payload: &str) -> Self {
        let mut update = CalibrationUpdate::default();

        for token in payload.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if token.eq_ignore_ascii_case("YES") {
                update.calibrated = Some(true);
                continue;
            }

            let Some((key, value)) = token.split_once(':') else {
                tracing::debug!("ignoring calibration token {:?}", token);
                continue;
            };

            let slot = match key.trim().to_uppercase().as_str() {
                "MIN" => &mut update.light_min,
                "MAX" => &mut update.light_max,
                _ => {
                    tracing::debug!("ignoring calibration token {:?}", token);
                    continue;
                }
            };

            match value.trim().parse::<i32>() {
                Ok(value) => *slot = Some(value),
                Err(_) => tracing::warn!("malformed calibration token {:?}", token),
            }
        }

        update
    }
}

/// The `TYPE:PAYLOAD` split of one line, before payload decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedMessage<'a> {
    pub kind: MessageKind,
    pub payload: &'a str,
}

impl<'a> DecodedMessage<'a> {
    /// Splits on the first `:`. Lines without one are noise.
    pub fn split(line: &'a str) -> Option<Self> {
        let (kind, payload) = line.split_once(':')?;

        if kind.trim().is_empty() {
            return None;
        }

        Some(Self {
            kind: MessageKind::from_token(kind),
            payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    Light(i32),
    /// Lower-cased; validated by the consumer.
    Position(String),
    /// Lower-cased; validated by the consumer.
    Motor(String),
    /// Case-folded, `auto` or `manual` from current firmware.
    Mode(String),
    Calibration(CalibrationUpdate),
    Error(String),
    Status(String),
    Ready(String),
    Version(String),
    Uptime(u64),
    Pong,
    Unknown { kind: String, payload: String },
}

impl DeviceMessage {
    /// `Ok(None)` is protocol noise; `Err` is a malformed payload for a
    /// known type.
    pub fn decode_line(line: &str) -> Result<Option<Self>, DecodeError> {
        match DecodedMessage::split(line) {
            Some(decoded) => Self::decode(&decoded).map(Some),
            None => Ok(None),
        }
    }

    pub fn decode(message: &DecodedMessage<'_>) -> Result<Self, DecodeError> {
        let payload = message.payload;

        Ok(match &message.kind {
            MessageKind::Light => DeviceMessage::Light(parse_integer("LIGHT", payload)?),
            MessageKind::Position => DeviceMessage::Position(payload.trim().to_lowercase()),
            MessageKind::Motor => DeviceMessage::Motor(payload.trim().to_lowercase()),
            MessageKind::Mode => DeviceMessage::Mode(payload.trim().to_lowercase()),
            MessageKind::Calibration => DeviceMessage::Calibration(CalibrationUpdate::parse(payload)),
            MessageKind::Error => DeviceMessage::Error(payload.to_string()),
            MessageKind::Status => DeviceMessage::Status(payload.to_string()),
            MessageKind::Ready => DeviceMessage::Ready(match payload.trim() {
                "" => String::from("unknown"),
                version => version.to_string(),
            }),
            MessageKind::Version => DeviceMessage::Version(payload.to_string()),
            MessageKind::Uptime => DeviceMessage::Uptime(parse_integer("UPTIME", payload)?),
            MessageKind::Pong => DeviceMessage::Pong,
            MessageKind::Other(kind) => DeviceMessage::Unknown {
                kind: kind.clone(),
                payload: payload.to_string(),
            },
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            DeviceMessage::Light(_) => MessageKind::Light,
            DeviceMessage::Position(_) => MessageKind::Position,
            DeviceMessage::Motor(_) => MessageKind::Motor,
            DeviceMessage::Mode(_) => MessageKind::Mode,
            DeviceMessage::Calibration(_) => MessageKind::Calibration,
            DeviceMessage::Error(_) => MessageKind::Error,
            DeviceMessage::Status(_) => MessageKind::Status,
            DeviceMessage::Ready(_) => MessageKind::Ready,
            DeviceMessage::Version(_) => MessageKind::Version,
            DeviceMessage::Uptime(_) => MessageKind::Uptime,
            DeviceMessage::Pong => MessageKind::Pong,
            DeviceMessage::Unknown { kind, .. } => MessageKind::Other(kind.clone()),
        }
    }
}

fn parse_integer<T: std::str::FromStr>(kind: &'static str, payload: &str) -> Result<T, DecodeError> {
    payload.trim().parse().map_err(|_| DecodeError::InvalidInteger {
        kind,
        value: payload.to_string(),
    })
}
