//! LoRaWAN protocol implementation
//!
//! This module contains the server side of the protocol:
//! - PHY payload parsing and assembly
//! - The MAC engine processing forwarded frames
//! - The OTAA join handshake
//! - RX2 downlink planning
//! - MAC command handling
//! - Data-rate definitions

/// MAC command handling
pub mod commands;

/// MAC engine and frame processing
pub mod mac;

/// PHY payload layout
pub mod phy;

/// Data-rate definitions
pub mod region;

mod downlink;
mod join;

pub use mac::{GatewayStatus, MacError, MacLayer, RxQuality, TxPacket, MAX_FCNT_GAP};
pub use phy::{FCtrl, MType, FHDR};
