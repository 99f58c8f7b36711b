//! Durable stores for gateways, devices and activated sessions
//!
//! The MAC never owns storage. It speaks to an injected [`Registry`] with
//! two semantic tiers: single-key reads and writes for the hot uplink path,
//! and [`Transaction`]s for the read-modify-write sequences that must not
//! interleave (join activation, frame-counter commits). The backing engine
//! is free to be a database, an embedded KV store, or the in-memory
//! implementation shipped in [`memory`].

/// In-memory registry implementation
pub mod memory;

pub use memory::MemoryRegistry;

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lorawan::region::DataRate;

/// EUI-64 (8 bytes), canonical most-significant-byte-first order
pub type EUI64 = [u8; 8];
/// AES-128 key (16 bytes)
pub type AESKey = [u8; 16];
/// Device address (4 bytes), canonical most-significant-byte-first order
pub type DevAddr = [u8; 4];
/// Network identifier (3 bytes)
pub type NetID = [u8; 3];

/// Storage-layer failure
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The backing store failed or is unreachable
    #[error("registry storage failure: {0}")]
    Storage(String),
}

/// GPS position reported by a gateway
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPosition {
    /// Latitude in degrees
    pub lat: f64,
    /// Longitude in degrees
    pub lon: f64,
    /// Altitude in meters
    pub alt: i32,
}

/// A radio gateway known to the network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    /// Gateway MAC identifier
    pub mac: EUI64,
    /// NetID of the network this gateway serves
    pub netid: NetID,
    /// Last reported position, if any
    pub gps: Option<GpsPosition>,
}

/// ADR parameters: TX power index, data rate index, channel mask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdrParams {
    /// TX power index
    pub power: u8,
    /// Data rate index
    pub datr: u8,
    /// Enabled channel bitmask
    pub chans: u32,
}

impl Default for AdrParams {
    /// Initial in-use parameters of a fresh session: power 1, DR0,
    /// channels 0-2
    fn default() -> Self {
        Self {
            power: 1,
            datr: 0,
            chans: 7,
        }
    }
}

/// Battery and demodulation margin reported by the device
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DevStat {
    /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
    pub battery: u8,
    /// SNR margin of the last DevStatusReq, dB
    pub margin: i8,
}

/// A provisioned device, before or between activations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Device EUI
    pub dev_eui: EUI64,
    /// Application EUI carried in join-requests
    pub app_eui: EUI64,
    /// Application key for the OTAA handshake
    pub app_key: AESKey,
    /// Whether join-requests from this device are honored
    pub can_join: bool,
    /// Application handler name
    pub app: String,
    /// Opaque identifier passed to the application handler
    pub app_id: String,
    /// Whether the network steers this device via ADR
    pub adr_flag_set: bool,
    /// Desired ADR parameters for new sessions
    pub adr_set: AdrParams,
    /// Address assigned at the last activation
    pub link: Option<DevAddr>,
    /// When the device last joined
    pub last_join: Option<SystemTime>,
}

impl Device {
    /// Create an OTAA device record bound to an application handler
    pub fn new_otaa(
        dev_eui: EUI64,
        app_eui: EUI64,
        app_key: AESKey,
        app: impl Into<String>,
        app_id: impl Into<String>,
    ) -> Self {
        Self {
            dev_eui,
            app_eui,
            app_key,
            can_join: true,
            app: app.into(),
            app_id: app_id.into(),
            adr_flag_set: false,
            adr_set: AdrParams::default(),
            link: None,
            last_join: None,
        }
    }
}

/// An activated session, keyed by DevAddr
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    /// Session address
    pub dev_addr: DevAddr,
    /// Application handler name
    pub app: String,
    /// Opaque identifier passed to the application handler
    pub app_id: String,
    /// Network session key (MIC)
    pub nwk_skey: AESKey,
    /// Application session key (FRMPayload)
    pub app_skey: AESKey,
    /// Uplink frame counter, full 32 bits
    pub fcntup: u32,
    /// Downlink frame counter of the last frame sent, full 32 bits
    pub fcntdown: u32,
    /// ADR bit the device set in its last uplink
    pub adr_flag_use: bool,
    /// Whether the network steers this session via ADR
    pub adr_flag_set: bool,
    /// ADR parameters the device currently uses
    pub adr_use: AdrParams,
    /// ADR parameters the network wants the device to use
    pub adr_set: AdrParams,
    /// Last reported device status
    pub devstat: Option<DevStat>,
    /// When the last authenticated uplink arrived
    pub last_rx: Option<SystemTime>,
}

/// The last confirmed downlink sent to an address, kept for retransmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDownlink {
    /// Session address
    pub dev_addr: DevAddr,
    /// The PHY payload as transmitted
    pub phy_payload: Vec<u8>,
}

/// Address range whose traffic is silently dropped
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IgnoredLink {
    /// Base address
    pub dev_addr: DevAddr,
    /// Bits of the base address that must match
    pub mask: DevAddr,
}

impl IgnoredLink {
    /// Whether an address falls into this ignored range
    pub fn matches(&self, addr: &DevAddr) -> bool {
        (0..4).all(|i| addr[i] & self.mask[i] == self.dev_addr[i])
    }
}

/// Log entry appended for every authenticated uplink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxFrame {
    /// Monotonic identifier, assigned by the registry on append
    pub frame_id: u64,
    /// MAC of the receiving gateway
    pub mac: EUI64,
    /// Received signal strength, dBm
    pub rssi: i16,
    /// Signal-to-noise ratio, dB
    pub lsnr: f64,
    /// Uplink frequency, MHz
    pub freq: f64,
    /// Uplink data rate
    pub datr: DataRate,
    /// Uplink coding rate
    pub codr: String,
    /// Sender address
    pub dev_addr: DevAddr,
    /// Reconstructed uplink frame counter
    pub fcnt: u32,
    /// Device status at the time of reception
    pub devstat: Option<DevStat>,
}

/// Keyed access to the persistent MAC state
///
/// Single-key methods carry no transactional guarantee and serve the hot
/// uplink path. [`Registry::transaction`] runs its closure atomically and
/// discards every staged write when the closure errors; the store must not
/// run two transactions over the same keys concurrently.
pub trait Registry: Send + Sync {
    /// Look up a gateway by MAC
    fn gateway(&self, mac: &EUI64) -> Result<Option<Gateway>, RegistryError>;

    /// Overwrite a gateway record
    fn update_gateway(&self, gateway: &Gateway) -> Result<(), RegistryError>;

    /// Look up a device by DevEUI
    fn device(&self, dev_eui: &EUI64) -> Result<Option<Device>, RegistryError>;

    /// Look up a session by DevAddr
    fn link(&self, dev_addr: &DevAddr) -> Result<Option<Link>, RegistryError>;

    /// The unacknowledged confirmed downlink for an address, if any
    fn pending_downlink(&self, dev_addr: &DevAddr)
        -> Result<Option<PendingDownlink>, RegistryError>;

    /// Retain a confirmed downlink until it is acknowledged
    fn store_pending_downlink(&self, pending: &PendingDownlink) -> Result<(), RegistryError>;

    /// Drop the retained downlink for an address
    fn clear_pending_downlink(&self, dev_addr: &DevAddr) -> Result<(), RegistryError>;

    /// All configured ignored-address ranges
    fn ignored_links(&self) -> Result<Vec<IgnoredLink>, RegistryError>;

    /// Append an uplink to the frame log, returning the assigned frame id
    fn append_rx_frame(&self, frame: RxFrame) -> Result<u64, RegistryError>;

    /// Run `f` atomically against the store
    ///
    /// Writes staged by `f` become visible only when it returns `Ok`.
    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>;
}

/// Atomic read-modify-write view spanning Device and Link records
pub trait Transaction {
    /// Look up a device by DevEUI
    fn device(&mut self, dev_eui: &EUI64) -> Result<Option<Device>, RegistryError>;

    /// Stage a device write
    fn put_device(&mut self, device: &Device) -> Result<(), RegistryError>;

    /// Look up a session by DevAddr
    fn link(&mut self, dev_addr: &DevAddr) -> Result<Option<Link>, RegistryError>;

    /// Stage a session write
    fn put_link(&mut self, link: &Link) -> Result<(), RegistryError>;

    /// Stage removal of the retained downlink for an address
    fn clear_pending_downlink(&mut self, dev_addr: &DevAddr) -> Result<(), RegistryError>;
}

impl<R: Registry> Registry for std::sync::Arc<R> {
    fn gateway(&self, mac: &EUI64) -> Result<Option<Gateway>, RegistryError> {
        (**self).gateway(mac)
    }

    fn update_gateway(&self, gateway: &Gateway) -> Result<(), RegistryError> {
        (**self).update_gateway(gateway)
    }

    fn device(&self, dev_eui: &EUI64) -> Result<Option<Device>, RegistryError> {
        (**self).device(dev_eui)
    }

    fn link(&self, dev_addr: &DevAddr) -> Result<Option<Link>, RegistryError> {
        (**self).link(dev_addr)
    }

    fn pending_downlink(
        &self,
        dev_addr: &DevAddr,
    ) -> Result<Option<PendingDownlink>, RegistryError> {
        (**self).pending_downlink(dev_addr)
    }

    fn store_pending_downlink(&self, pending: &PendingDownlink) -> Result<(), RegistryError> {
        (**self).store_pending_downlink(pending)
    }

    fn clear_pending_downlink(&self, dev_addr: &DevAddr) -> Result<(), RegistryError> {
        (**self).clear_pending_downlink(dev_addr)
    }

    fn ignored_links(&self) -> Result<Vec<IgnoredLink>, RegistryError> {
        (**self).ignored_links()
    }

    fn append_rx_frame(&self, frame: RxFrame) -> Result<u64, RegistryError> {
        (**self).append_rx_frame(frame)
    }

    fn transaction<T, E, F>(&self, f: F) -> Result<T, E>
    where
        E: From<RegistryError>,
        F: FnOnce(&mut dyn Transaction) -> Result<T, E>,
    {
        (**self).transaction(f)
    }
}
