//! Network and server configuration
//!
//! This module contains the tunables of the MAC core:
//! - RX2 window radio settings
//! - Receive-window and join-accept delays

/// Server-side MAC configuration
pub mod server;

pub use server::{RfConfig, ServerConfig};
