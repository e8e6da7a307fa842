use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// MQTT quality-of-service level used for publishing and subscribing.
///
/// - `AtMostOnce` (0): fire and forget, the default.
/// - `AtLeastOnce` (1): acknowledged with PUBACK.
/// - `ExactlyOnce` (2): four-way handshake, acknowledged with PUBCOMP.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl QoS {
    pub fn as_u8(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(format!("invalid qos level: {other} (expected 0, 1 or 2)")),
        }
    }
}

impl FromStr for QoS {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let level: u8 = s
            .trim()
            .parse()
            .map_err(|_| format!("invalid qos level: {s} (expected 0, 1 or 2)"))?;
        QoS::try_from(level)
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}
