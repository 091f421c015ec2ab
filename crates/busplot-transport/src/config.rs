use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Default line speed used by the firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default interval at which a blocked serial read wakes up to check for close.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Character size in bits. Written as a number (`5`-`8`) in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum DataBits {
    Five,
    Six,
    Seven,
    Eight,
}

/// Parity checking mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Parity {
    None,
    Odd,
    Even,
}

/// Number of stop bits. Written as a number (`1` or `2`) in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum StopBits {
    One,
    Two,
}

/// Flow control mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowControl {
    None,
    Hardware,
    Software,
}

/// Connection parameters for a serial device.
///
/// Missing fields fall back to [`SerialConfig::default`] when deserialized,
/// so a config file may only name the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Device path, e.g. `/dev/ttyUSB0`.
    pub device: PathBuf,
    /// Line speed in bits per second.
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// How often a blocked read wakes up to observe `close()`, in milliseconds.
    pub poll_interval_ms: u64,
}

impl SerialConfig {
    /// Config for `device` with default line settings (115200 8N1).
    pub fn new(device: impl Into<PathBuf>) -> Self {
        Self {
            device: device.into(),
            ..Self::default()
        }
    }

    /// Poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings that can never be applied to a device.
    pub fn validate(&self) -> Result<(), TransportError> {
        if self.device.as_os_str().is_empty() {
            return Err(TransportError::InvalidConfig(
                "device path must not be empty".to_string(),
            ));
        }
        if self.baud_rate == 0 {
            return Err(TransportError::InvalidConfig(
                "baud rate must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(TransportError::InvalidConfig(
                "poll interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::new(),
            baud_rate: DEFAULT_BAUD_RATE,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl DataBits {
    pub fn bits(self) -> u8 {
        match self {
            DataBits::Five => 5,
            DataBits::Six => 6,
            DataBits::Seven => 7,
            DataBits::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = TransportError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            5 => Ok(DataBits::Five),
            6 => Ok(DataBits::Six),
            7 => Ok(DataBits::Seven),
            8 => Ok(DataBits::Eight),
            other => Err(TransportError::InvalidConfig(format!(
                "character size must be 5-8, got {other}"
            ))),
        }
    }
}

impl From<DataBits> for u8 {
    fn from(bits: DataBits) -> Self {
        bits.bits()
    }
}

impl FromStr for DataBits {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bits = s.trim().parse::<u8>().map_err(|_| {
            TransportError::InvalidConfig(format!("character size must be 5-8, got {s:?}"))
        })?;
        Self::try_from(bits)
    }
}

impl fmt::Display for DataBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.bits())
    }
}

impl FromStr for Parity {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "n" => Ok(Parity::None),
            "odd" | "o" => Ok(Parity::Odd),
            "even" | "e" => Ok(Parity::Even),
            other => Err(TransportError::InvalidConfig(format!(
                "parity must be none, odd or even, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for Parity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Parity::None => "none",
            Parity::Odd => "odd",
            Parity::Even => "even",
        })
    }
}

impl TryFrom<u8> for StopBits {
    type Error = TransportError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            1 => Ok(StopBits::One),
            2 => Ok(StopBits::Two),
            other => Err(TransportError::InvalidConfig(format!(
                "stop bits must be 1 or 2, got {other}"
            ))),
        }
    }
}

impl From<StopBits> for u8 {
    fn from(bits: StopBits) -> Self {
        match bits {
            StopBits::One => 1,
            StopBits::Two => 2,
        }
    }
}

impl FromStr for StopBits {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "one" => Ok(StopBits::One),
            "2" | "two" => Ok(StopBits::Two),
            other => Err(TransportError::InvalidConfig(format!(
                "stop bits must be 1 or 2, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for StopBits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopBits::One => "1",
            StopBits::Two => "2",
        })
    }
}

impl FromStr for FlowControl {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" => Ok(FlowControl::None),
            "hardware" | "rtscts" => Ok(FlowControl::Hardware),
            "software" | "xonxoff" => Ok(FlowControl::Software),
            other => Err(TransportError::InvalidConfig(format!(
                "flow control must be none, hardware or software, got {other:?}"
            ))),
        }
    }
}

impl fmt::Display for FlowControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FlowControl::None => "none",
            FlowControl::Hardware => "hardware",
            FlowControl::Software => "software",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_115200_8n1() {
        let cfg = SerialConfig::new("/dev/ttyUSB0");
        assert_eq!(cfg.baud_rate, 115_200);
        assert_eq!(cfg.data_bits, DataBits::Eight);
        assert_eq!(cfg.parity, Parity::None);
        assert_eq!(cfg.stop_bits, StopBits::One);
        assert_eq!(cfg.flow_control, FlowControl::None);
        assert_eq!(cfg.poll_interval(), Duration::from_millis(100));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_device_and_zero_baud() {
        assert!(matches!(
            SerialConfig::default().validate(),
            Err(TransportError::InvalidConfig(_))
        ));

        let cfg = SerialConfig {
            baud_rate: 0,
            ..SerialConfig::new("/dev/ttyS0")
        };
        assert!(matches!(
            cfg.validate(),
            Err(TransportError::InvalidConfig(_))
        ));
    }

    #[test]
    fn parses_line_settings() {
        assert_eq!("7".parse::<DataBits>().unwrap(), DataBits::Seven);
        assert_eq!("E".parse::<Parity>().unwrap(), Parity::Even);
        assert_eq!("two".parse::<StopBits>().unwrap(), StopBits::Two);
        assert_eq!("rtscts".parse::<FlowControl>().unwrap(), FlowControl::Hardware);
        assert!("9".parse::<DataBits>().is_err());
        assert!("mark".parse::<Parity>().is_err());
    }

    #[test]
    fn config_file_uses_cli_spelling_for_bit_counts() {
        let cfg: SerialConfig = serde_json::from_str(
            r#"{"device": "/dev/ttyS0", "data_bits": 7, "stop_bits": 2, "parity": "odd"}"#,
        )
        .unwrap();
        assert_eq!(cfg.data_bits, DataBits::Seven);
        assert_eq!(cfg.stop_bits, StopBits::Two);
        assert_eq!(cfg.data_bits, "7".parse().unwrap());

        let json = serde_json::to_value(&cfg).unwrap();
        assert_eq!(json["data_bits"], 7);
        assert_eq!(json["stop_bits"], 2);
        assert_eq!(json["parity"], "odd");
    }

    #[test]
    fn config_file_rejects_out_of_range_bit_counts() {
        let err = serde_json::from_str::<SerialConfig>(r#"{"data_bits": 9}"#).unwrap_err();
        assert!(err.to_string().contains("character size must be 5-8"));
        assert!(serde_json::from_str::<SerialConfig>(r#"{"stop_bits": 3}"#).is_err());
        assert!(serde_json::from_str::<SerialConfig>(r#"{"data_bits": "eight"}"#).is_err());
    }

    #[test]
    fn display_roundtrips_through_from_str() {
        for parity in [Parity::None, Parity::Odd, Parity::Even] {
            assert_eq!(parity.to_string().parse::<Parity>().unwrap(), parity);
        }
        for stop in [StopBits::One, StopBits::Two] {
            assert_eq!(stop.to_string().parse::<StopBits>().unwrap(), stop);
        }
    }
}
