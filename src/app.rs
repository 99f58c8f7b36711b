//! Application handler interface
//!
//! Decrypted uplinks leave the MAC through this seam, and downlink intents
//! come back through it. Handlers are external: an MQTT bridge, an HTTP
//! push, a local plugin. The MAC only depends on the contract below.

use thiserror::Error;

use crate::registry::DevAddr;

/// Failure reported by an application handler
#[derive(Debug, Error, PartialEq)]
#[error("application handler failure: {0}")]
pub struct HandlerError(pub String);

/// One accepted uplink, as delivered to the application
#[derive(Debug, Clone, PartialEq)]
pub struct RxData {
    /// FPort, when the frame carried a payload
    pub port: Option<u8>,
    /// Decrypted FRMPayload
    pub data: Vec<u8>,
    /// The previous confirmed downlink was never acknowledged
    pub last_lost: bool,
    /// The MAC will answer in the receive window even without app data
    pub shall_reply: bool,
}

/// Downlink requested by the application
#[derive(Debug, Clone, PartialEq)]
pub struct TxData {
    /// Request a confirmed downlink
    pub confirmed: bool,
    /// FPort; `None` or 0 sends no payload
    pub port: Option<u8>,
    /// Payload to encrypt and send
    pub data: Vec<u8>,
    /// Set the FPending bit to announce more queued data
    pub pending: bool,
}

/// Application verdict on an uplink
#[derive(Debug, Clone, PartialEq)]
pub enum RxDecision {
    /// Nothing to send; the MAC replies on its own if it must
    Ok,
    /// Resend the stored confirmed downlink verbatim
    Retransmit,
    /// Send a new downlink
    Send(TxData),
}

/// Contract between the MAC and application handlers
pub trait AppHandler: Send + Sync {
    /// A device joined and the session is committed
    fn handle_join(&self, dev_addr: DevAddr, app: &str, app_id: &str) -> Result<(), HandlerError>;

    /// An authenticated uplink arrived
    fn handle_rx(
        &self,
        dev_addr: DevAddr,
        app: &str,
        app_id: &str,
        rx: RxData,
    ) -> Result<RxDecision, HandlerError>;
}
