//! Server-side MAC engine
//!
//! [`MacLayer`] terminates the air interface for every frame a gateway
//! forwards: it authenticates uplinks, commits session state through the
//! registry, hands decrypted payloads to the application, and returns the
//! downlink (if any) the transport must radiate in the device's receive
//! window. Each call is independent; all shared state lives behind the
//! [`Registry`].

use std::time::SystemTime;

use thiserror::Error;
use tracing::debug;

use crate::app::{AppHandler, HandlerError};
use crate::codec;
use crate::config::server::{RfConfig, ServerConfig};
use crate::crypto::{self, Direction};
use crate::lorawan::commands::CommandHandler;
use crate::lorawan::downlink::UplinkContext;
use crate::lorawan::phy::{self, DataUplink, FrameError, MType};
use crate::registry::{
    DevAddr, Gateway, GpsPosition, Link, Registry, RegistryError, RxFrame, EUI64,
};

/// Largest tolerated jump of the 16-bit wire counter before a frame is
/// treated as replay or catastrophic loss
pub const MAX_FCNT_GAP: u32 = 16384;

/// MAC processing error
///
/// A rejected frame never mutates registry state.
#[derive(Debug, Error)]
pub enum MacError {
    /// The forwarding gateway is not provisioned
    #[error("unknown gateway MAC {}", codec::to_hex(.0))]
    UnknownMac(EUI64),
    /// The joining device is not provisioned
    #[error("unknown DevEUI {}", codec::to_hex(.0))]
    UnknownDevEui(EUI64),
    /// No session exists for the sender address
    #[error("unknown DevAddr {}", codec::to_hex(.0))]
    UnknownDevAddr(DevAddr),
    /// MIC verification failed
    #[error("MIC verification failed")]
    BadMic,
    /// The wire counter jumped too far ahead of the session counter
    #[error("frame counter gap {gap} exceeds limit")]
    FcntGapTooLarge {
        /// The reconstructed gap
        gap: u32,
    },
    /// No unused DevAddr was found for a joining device
    #[error("DevAddr allocation failed after {0} attempts")]
    AddrAllocation(u32),
    /// The frame does not parse
    #[error(transparent)]
    Frame(#[from] FrameError),
    /// The registry failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The application handler failed
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Reception metadata the gateway reports with an uplink
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RxQuality {
    /// Gateway timestamp of the end of reception, microseconds, wrapping
    pub tmst: u32,
    /// Received signal strength, dBm
    pub rssi: i16,
    /// Signal-to-noise ratio, dB
    pub lsnr: f64,
}

/// Periodic position report from a gateway
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GatewayStatus {
    /// Latitude in degrees
    pub lat: Option<f64>,
    /// Longitude in degrees
    pub lon: Option<f64>,
    /// Altitude in meters
    pub alt: Option<i32>,
}

/// A scheduled transmission for the gateway transport
///
/// `time` is a deadline on the gateway's `tmst` clock; a transport that
/// cannot meet it should drop the frame silently.
#[derive(Debug, Clone, PartialEq)]
pub struct TxPacket {
    /// Transmit deadline, microseconds on the gateway clock
    pub time: u32,
    /// Radio settings to transmit with
    pub rf: RfConfig,
    /// Complete PHY payload
    pub phy_payload: Vec<u8>,
}

/// Reconstruct the 32-bit frame counter from its 16-bit wire value
///
/// The gap between the wire value and the session counter's low half must
/// stay below [`MAX_FCNT_GAP`]; larger jumps are rejected as replay or
/// unrecoverable loss.
pub fn reconstruct_fcnt(fcntup: u32, wire: u16) -> Result<u32, MacError> {
    let last16 = fcntup & 0xFFFF;
    let wire = u32::from(wire);
    let gap = if wire >= last16 {
        wire - last16
    } else {
        0x10000 - last16 + wire
    };
    if gap >= MAX_FCNT_GAP {
        return Err(MacError::FcntGapTooLarge { gap });
    }
    Ok(fcntup.wrapping_add(gap))
}

/// The MAC engine
///
/// Generic over its three collaborators: the persistent [`Registry`], the
/// [`AppHandler`] receiving decrypted traffic, and the [`CommandHandler`]
/// mediating FOpts.
pub struct MacLayer<R, A, C> {
    pub(crate) registry: R,
    pub(crate) handler: A,
    pub(crate) commands: C,
    pub(crate) config: ServerConfig,
}

impl<R: Registry, A: AppHandler, C: CommandHandler> MacLayer<R, A, C> {
    /// Create a new MAC engine
    pub fn new(registry: R, handler: A, commands: C, config: ServerConfig) -> Self {
        Self {
            registry,
            handler,
            commands,
            config,
        }
    }

    /// The injected registry
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// The injected application handler
    pub fn handler(&self) -> &A {
        &self.handler
    }

    /// The active configuration
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Process one PHY payload forwarded by a gateway
    ///
    /// Returns `Ok(None)` when nothing must be transmitted,
    /// `Ok(Some(packet))` when the transport must radiate a response in
    /// the device's receive window, and an error when the frame is
    /// rejected. Rejected frames leave the registry untouched.
    pub fn process_frame(
        &self,
        gateway_mac: EUI64,
        rxq: &RxQuality,
        rf: &RfConfig,
        phy_payload: &[u8],
    ) -> Result<Option<TxPacket>, MacError> {
        let (msg, mic) = phy::split_mic(phy_payload)?;
        let gateway = self
            .registry
            .gateway(&gateway_mac)?
            .ok_or(MacError::UnknownMac(gateway_mac))?;

        match MType::from_mhdr(msg[0]) {
            Some(MType::JoinRequest) => self.process_join(&gateway, rxq, rf, msg, mic),
            Some(MType::UnconfirmedDataUp) => {
                self.process_uplink(&gateway, rxq, rf, msg, mic, false)
            }
            Some(MType::ConfirmedDataUp) => self.process_uplink(&gateway, rxq, rf, msg, mic, true),
            _ => Err(FrameError("unexpected message type").into()),
        }
    }

    /// Ingest a gateway status report
    pub fn process_status(
        &self,
        gateway_mac: EUI64,
        status: &GatewayStatus,
    ) -> Result<(), MacError> {
        let mut gateway = self
            .registry
            .gateway(&gateway_mac)?
            .ok_or(MacError::UnknownMac(gateway_mac))?;
        if let (Some(lat), Some(lon)) = (status.lat, status.lon) {
            gateway.gps = Some(GpsPosition {
                lat,
                lon,
                alt: status.alt.unwrap_or(0),
            });
        }
        self.registry.update_gateway(&gateway)?;
        Ok(())
    }

    /// The data-uplink pipeline of the frame processor
    fn process_uplink(
        &self,
        gateway: &Gateway,
        rxq: &RxQuality,
        rf: &RfConfig,
        msg: &[u8],
        mic: [u8; 4],
        confirmed: bool,
    ) -> Result<Option<TxPacket>, MacError> {
        let frame = DataUplink::parse(msg)?;
        let dev_addr = frame.fhdr.dev_addr;

        for entry in self.registry.ignored_links()? {
            if entry.matches(&dev_addr) {
                debug!(
                    devaddr = %codec::to_hex(&dev_addr),
                    "ignoring uplink from masked address"
                );
                return Ok(None);
            }
        }

        // Authenticate, then mutate: the counter check and MIC run against
        // a staged copy of the session inside the transaction, and nothing
        // is committed unless both pass. Concurrent uplinks for the same
        // address serialize here.
        let (link, fcnt32, fopts_out) =
            self.registry
                .transaction(|txn| -> Result<(Link, u32, Vec<u8>), MacError> {
                    let mut link = txn
                        .link(&dev_addr)?
                        .ok_or(MacError::UnknownDevAddr(dev_addr))?;
                    let fcnt32 = reconstruct_fcnt(link.fcntup, frame.fhdr.f_cnt)?;
                    let expected =
                        crypto::data_mic(&link.nwk_skey, Direction::Up, &dev_addr, fcnt32, msg);
                    if expected != mic {
                        return Err(MacError::BadMic);
                    }

                    let fopts_out = self.commands.handle_fopts(&mut link, &frame.fhdr.f_opts);
                    link.adr_flag_use = frame.fhdr.f_ctrl.adr;
                    link.fcntup = fcnt32;
                    link.last_rx = Some(SystemTime::now());
                    txn.put_link(&link)?;
                    Ok((link, fcnt32, fopts_out))
                })?;

        let data = match frame.f_port {
            Some(_) => crypto::payload_cipher(
                &link.app_skey,
                Direction::Up,
                &dev_addr,
                fcnt32,
                &frame.frm_payload,
            ),
            None => Vec::new(),
        };

        let frame_id = self.registry.append_rx_frame(RxFrame {
            frame_id: 0,
            mac: gateway.mac,
            rssi: rxq.rssi,
            lsnr: rxq.lsnr,
            freq: rf.freq,
            datr: rf.datr,
            codr: rf.codr.clone(),
            dev_addr,
            fcnt: fcnt32,
            devstat: link.devstat,
        })?;
        debug!(
            devaddr = %codec::to_hex(&dev_addr),
            fcnt = fcnt32,
            frame_id,
            "accepted data uplink"
        );

        self.plan_downlink(UplinkContext {
            link: &link,
            rxq,
            confirmed,
            ack: frame.fhdr.f_ctrl.ack,
            adr_ack_req: frame.fhdr.f_ctrl.adr_ack_req,
            f_port: frame.f_port,
            data,
            fopts_out,
        })
    }
}
