use serde::{Deserialize, Serialize};

use crate::lorawan::region::DataRate;

/// Radio settings for one transmission or reception
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfConfig {
    /// Center frequency in MHz
    pub freq: f64,
    /// Data rate
    pub datr: DataRate,
    /// Coding rate, e.g. "4/5"
    pub codr: String,
}

/// Tunables of the MAC core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Radio settings of the RX2 window
    pub rx2_rf: RfConfig,
    /// Delay from join-request end to join-accept transmission, microseconds
    pub join_delay1: u32,
    /// Delay from uplink end to RX2 transmission, microseconds
    pub rx_delay2: u32,
}

impl Default for ServerConfig {
    /// EU868-flavored defaults: RX2 on 869.525 MHz at DR0, 5 s join
    /// accept delay, 2 s RX2 delay
    fn default() -> Self {
        Self {
            rx2_rf: RfConfig {
                freq: 869.525,
                datr: DataRate::SF12BW125,
                codr: "4/5".to_string(),
            },
            join_delay1: 5_000_000,
            rx_delay2: 2_000_000,
        }
    }
}
