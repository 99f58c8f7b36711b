use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Data rate configuration, EU868-style indices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRate {
    /// SF12/125kHz
    SF12BW125,
    /// SF11/125kHz
    SF11BW125,
    /// SF10/125kHz
    SF10BW125,
    /// SF9/125kHz
    SF9BW125,
    /// SF8/125kHz
    SF8BW125,
    /// SF7/125kHz
    SF7BW125,
    /// SF7/250kHz
    SF7BW250,
}

/// A string or index that names no data rate
#[derive(Debug, Error, PartialEq)]
#[error("unknown data rate: {0}")]
pub struct UnknownDataRate(pub String);

impl DataRate {
    /// Convert from a data rate index
    pub fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(DataRate::SF12BW125),
            1 => Some(DataRate::SF11BW125),
            2 => Some(DataRate::SF10BW125),
            3 => Some(DataRate::SF9BW125),
            4 => Some(DataRate::SF8BW125),
            5 => Some(DataRate::SF7BW125),
            6 => Some(DataRate::SF7BW250),
            _ => None,
        }
    }

    /// Get the data rate index
    pub fn index(&self) -> u8 {
        match self {
            DataRate::SF12BW125 => 0,
            DataRate::SF11BW125 => 1,
            DataRate::SF10BW125 => 2,
            DataRate::SF9BW125 => 3,
            DataRate::SF8BW125 => 4,
            DataRate::SF7BW125 => 5,
            DataRate::SF7BW250 => 6,
        }
    }

    /// Get spreading factor
    pub fn spreading_factor(&self) -> u8 {
        match self {
            DataRate::SF12BW125 => 12,
            DataRate::SF11BW125 => 11,
            DataRate::SF10BW125 => 10,
            DataRate::SF9BW125 => 9,
            DataRate::SF8BW125 => 8,
            DataRate::SF7BW125 | DataRate::SF7BW250 => 7,
        }
    }

    /// Get bandwidth in Hz
    pub fn bandwidth(&self) -> u32 {
        match self {
            DataRate::SF7BW250 => 250_000,
            _ => 125_000,
        }
    }

    /// Packet-forwarder notation, e.g. "SF12BW125"
    pub fn as_str(&self) -> &'static str {
        match self {
            DataRate::SF12BW125 => "SF12BW125",
            DataRate::SF11BW125 => "SF11BW125",
            DataRate::SF10BW125 => "SF10BW125",
            DataRate::SF9BW125 => "SF9BW125",
            DataRate::SF8BW125 => "SF8BW125",
            DataRate::SF7BW125 => "SF7BW125",
            DataRate::SF7BW250 => "SF7BW250",
        }
    }
}

impl fmt::Display for DataRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataRate {
    type Err = UnknownDataRate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SF12BW125" => Ok(DataRate::SF12BW125),
            "SF11BW125" => Ok(DataRate::SF11BW125),
            "SF10BW125" => Ok(DataRate::SF10BW125),
            "SF9BW125" => Ok(DataRate::SF9BW125),
            "SF8BW125" => Ok(DataRate::SF8BW125),
            "SF7BW125" => Ok(DataRate::SF7BW125),
            "SF7BW250" => Ok(DataRate::SF7BW250),
            other => Err(UnknownDataRate(other.to_string())),
        }
    }
}
