//! PHY payload layout
//!
//! A PHY payload is `MHDR (1) || MACPayload || MIC (4)`. The parsers here
//! turn the wire bytes into typed records and reverse the little-endian
//! identifier fields into canonical order; serialization reverses them
//! back. Nothing outside this module and [`crate::codec`] reorders bytes.

use thiserror::Error;

use crate::codec;
use crate::crypto::MIC_SIZE;
use crate::registry::{DevAddr, EUI64};

/// A frame that does not parse
#[derive(Debug, Error, PartialEq)]
#[error("malformed frame: {0}")]
pub struct FrameError(pub &'static str);

/// MAC header types
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(u8)]
pub enum MType {
    /// Join-request (uplink)
    JoinRequest = 0x00,
    /// Join-accept (downlink)
    JoinAccept = 0x20,
    /// Unconfirmed data uplink
    UnconfirmedDataUp = 0x40,
    /// Unconfirmed data downlink
    UnconfirmedDataDown = 0x60,
    /// Confirmed data uplink
    ConfirmedDataUp = 0x80,
    /// Confirmed data downlink
    ConfirmedDataDown = 0xA0,
}

impl MType {
    /// Extract the message type from an MHDR byte
    pub fn from_mhdr(mhdr: u8) -> Option<Self> {
        match mhdr & 0xE0 {
            0x00 => Some(MType::JoinRequest),
            0x20 => Some(MType::JoinAccept),
            0x40 => Some(MType::UnconfirmedDataUp),
            0x60 => Some(MType::UnconfirmedDataDown),
            0x80 => Some(MType::ConfirmedDataUp),
            0xA0 => Some(MType::ConfirmedDataDown),
            _ => None,
        }
    }
}

/// Frame header flags
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FCtrl {
    /// ADR bit
    pub adr: bool,
    /// ADRACKReq bit (uplink only)
    pub adr_ack_req: bool,
    /// ACK bit
    pub ack: bool,
    /// FPending bit (downlink only)
    pub f_pending: bool,
    /// Length of FOpts in bytes (0-15)
    pub f_opts_len: u8,
}

impl FCtrl {
    /// Pack into the wire byte
    pub fn to_byte(&self) -> u8 {
        let mut byte = self.f_opts_len & 0x0F;
        if self.adr {
            byte |= 0x80;
        }
        if self.adr_ack_req {
            byte |= 0x40;
        }
        if self.ack {
            byte |= 0x20;
        }
        if self.f_pending {
            byte |= 0x10;
        }
        byte
    }

    /// Unpack from the wire byte
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: (byte & 0x80) != 0,
            adr_ack_req: (byte & 0x40) != 0,
            ack: (byte & 0x20) != 0,
            f_pending: (byte & 0x10) != 0,
            f_opts_len: byte & 0x0F,
        }
    }
}

/// Frame header
#[derive(Debug, Clone, PartialEq)]
pub struct FHDR {
    /// Device address, canonical byte order
    pub dev_addr: DevAddr,
    /// Frame control flags
    pub f_ctrl: FCtrl,
    /// Low 16 bits of the frame counter
    pub f_cnt: u16,
    /// MAC commands piggybacked in the header
    pub f_opts: Vec<u8>,
}

impl FHDR {
    /// Serialize to wire order
    pub fn serialize(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(7 + self.f_opts.len());
        buffer.extend_from_slice(&codec::reverse4(&self.dev_addr));
        buffer.push(self.f_ctrl.to_byte());
        buffer.extend_from_slice(&self.f_cnt.to_le_bytes());
        buffer.extend_from_slice(&self.f_opts);
        buffer
    }
}

/// A parsed data uplink (MIC already split off)
#[derive(Debug, Clone, PartialEq)]
pub struct DataUplink {
    /// Confirmed or unconfirmed uplink
    pub mtype: MType,
    /// Frame header
    pub fhdr: FHDR,
    /// FPort, present when the frame carries FRMPayload
    pub f_port: Option<u8>,
    /// FRMPayload, still enciphered
    pub frm_payload: Vec<u8>,
}

impl DataUplink {
    /// Parse `MHDR || MACPayload` of a data uplink
    pub fn parse(msg: &[u8]) -> Result<Self, FrameError> {
        if msg.len() < 8 {
            return Err(FrameError("data frame header truncated"));
        }
        let mtype = match MType::from_mhdr(msg[0]) {
            Some(t @ (MType::UnconfirmedDataUp | MType::ConfirmedDataUp)) => t,
            _ => return Err(FrameError("not a data uplink")),
        };
        let mut dev_addr = [0u8; 4];
        dev_addr.copy_from_slice(&msg[1..5]);
        let dev_addr = codec::reverse4(&dev_addr);
        let f_ctrl = FCtrl::from_byte(msg[5]);
        let f_cnt = u16::from_le_bytes([msg[6], msg[7]]);

        let fopts_end = 8 + f_ctrl.f_opts_len as usize;
        if msg.len() < fopts_end {
            return Err(FrameError("FOpts length exceeds frame"));
        }
        let f_opts = msg[8..fopts_end].to_vec();

        let (f_port, frm_payload) = if msg.len() > fopts_end {
            (Some(msg[fopts_end]), msg[fopts_end + 1..].to_vec())
        } else {
            (None, Vec::new())
        };

        Ok(Self {
            mtype,
            fhdr: FHDR {
                dev_addr,
                f_ctrl,
                f_cnt,
                f_opts,
            },
            f_port,
            frm_payload,
        })
    }
}

/// A parsed join-request (MIC already split off)
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    /// Application EUI, canonical byte order
    pub app_eui: EUI64,
    /// Device EUI, canonical byte order
    pub dev_eui: EUI64,
    /// Device nonce, wire order
    pub dev_nonce: [u8; 2],
}

impl JoinRequest {
    /// Parse `MHDR || AppEUI || DevEUI || DevNonce`
    pub fn parse(msg: &[u8]) -> Result<Self, FrameError> {
        if msg.len() != 19 {
            return Err(FrameError("join-request must be 19 bytes before MIC"));
        }
        let mut app_eui = [0u8; 8];
        app_eui.copy_from_slice(&msg[1..9]);
        let mut dev_eui = [0u8; 8];
        dev_eui.copy_from_slice(&msg[9..17]);
        Ok(Self {
            app_eui: codec::reverse8(&app_eui),
            dev_eui: codec::reverse8(&dev_eui),
            dev_nonce: [msg[17], msg[18]],
        })
    }
}

/// Split a PHY payload into the authenticated message and its MIC
pub fn split_mic(phy_payload: &[u8]) -> Result<(&[u8], [u8; MIC_SIZE]), FrameError> {
    if phy_payload.len() < 1 + MIC_SIZE {
        return Err(FrameError("PHY payload shorter than MHDR plus MIC"));
    }
    let (msg, mic_bytes) = phy_payload.split_at(phy_payload.len() - MIC_SIZE);
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(mic_bytes);
    Ok((msg, mic))
}
