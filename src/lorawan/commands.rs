//! MAC-command handling at the FOpts seam
//!
//! The frame processor hands uplink FOpts bytes to a [`CommandHandler`]
//! and sends whatever the handler returns in the next downlink's FOpts.
//! The handler may rewrite the session's ADR and status fields; it runs
//! inside the uplink commit, so its changes are persisted atomically with
//! the frame counters.

use tracing::warn;

use crate::codec;
use crate::registry::{DevStat, Link};

/// Mediates MAC commands carried in FOpts
pub trait CommandHandler: Send + Sync {
    /// Consume uplink FOpts, returning the FOpts for the next downlink
    fn handle_fopts(&self, link: &mut Link, f_opts: &[u8]) -> Vec<u8>;
}

/// Pass-through handler: ignores uplink commands, queues nothing
#[derive(Debug, Default)]
pub struct NoopCommands;

impl CommandHandler for NoopCommands {
    fn handle_fopts(&self, _link: &mut Link, _f_opts: &[u8]) -> Vec<u8> {
        Vec::new()
    }
}

/// MAC command, the network-relevant subset
#[derive(Debug, Clone, PartialEq)]
pub enum MacCommand {
    /// Device probes connectivity
    LinkCheckReq,
    /// Device answers a LinkADRReq
    LinkADRAns {
        /// TX power accepted
        power_ack: bool,
        /// Data rate accepted
        data_rate_ack: bool,
        /// Channel mask accepted
        channel_mask_ack: bool,
    },
    /// Device confirms a duty-cycle change
    DutyCycleAns,
    /// Device answers an RXParamSetupReq
    RXParamSetupAns {
        /// RX1 data rate offset accepted
        rx1_dr_offset_ack: bool,
        /// RX2 data rate accepted
        rx2_data_rate_ack: bool,
        /// RX2 channel accepted
        channel_ack: bool,
    },
    /// Device reports battery and demodulation margin
    DevStatusAns {
        /// Battery level (0 = external power, 1-254 = level, 255 = unknown)
        battery: u8,
        /// SNR margin in dB
        margin: i8,
    },
    /// Device answers a NewChannelReq
    NewChannelAns {
        /// Channel frequency usable
        channel_freq_ok: bool,
        /// Data rate range usable
        data_rate_ok: bool,
    },
    /// Device confirms an RX timing change
    RXTimingSetupAns,
    /// Network steers data rate, power and channels
    LinkADRReq {
        /// Requested data rate index
        data_rate: u8,
        /// Requested TX power index
        tx_power: u8,
        /// Channel mask
        ch_mask: u16,
        /// Channel mask control
        ch_mask_cntl: u8,
        /// Number of transmissions per uplink
        nb_trans: u8,
    },
    /// Network requests battery and margin
    DevStatusReq,
}

impl MacCommand {
    /// Uplink payload length for a command identifier
    fn uplink_payload_len(cid: u8) -> Option<usize> {
        match cid {
            0x02 => Some(0),
            0x03 => Some(1),
            0x04 => Some(0),
            0x05 => Some(1),
            0x06 => Some(2),
            0x07 => Some(1),
            0x08 => Some(0),
            _ => None,
        }
    }

    /// Parse one uplink command from its identifier and payload
    fn from_bytes(cid: u8, payload: &[u8]) -> Option<Self> {
        match cid {
            0x02 => Some(MacCommand::LinkCheckReq),
            0x03 => Some(MacCommand::LinkADRAns {
                power_ack: (payload[0] & 0x04) != 0,
                data_rate_ack: (payload[0] & 0x02) != 0,
                channel_mask_ack: (payload[0] & 0x01) != 0,
            }),
            0x04 => Some(MacCommand::DutyCycleAns),
            0x05 => Some(MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack: (payload[0] & 0x04) != 0,
                rx2_data_rate_ack: (payload[0] & 0x02) != 0,
                channel_ack: (payload[0] & 0x01) != 0,
            }),
            0x06 => Some(MacCommand::DevStatusAns {
                battery: payload[0],
                margin: payload[1] as i8,
            }),
            0x07 => Some(MacCommand::NewChannelAns {
                channel_freq_ok: (payload[0] & 0x02) != 0,
                data_rate_ok: (payload[0] & 0x01) != 0,
            }),
            0x08 => Some(MacCommand::RXTimingSetupAns),
            _ => None,
        }
    }

    /// Parse a whole FOpts field; `None` if any command is malformed
    pub fn parse_fopts(mut f_opts: &[u8]) -> Option<Vec<MacCommand>> {
        let mut commands = Vec::new();
        while let Some((&cid, rest)) = f_opts.split_first() {
            let len = Self::uplink_payload_len(cid)?;
            if rest.len() < len {
                return None;
            }
            let (payload, tail) = rest.split_at(len);
            commands.push(Self::from_bytes(cid, payload)?);
            f_opts = tail;
        }
        Some(commands)
    }

    /// Serialize to identifier plus payload
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            MacCommand::LinkCheckReq => vec![0x02],
            MacCommand::LinkADRAns {
                power_ack,
                data_rate_ack,
                channel_mask_ack,
            } => {
                let mut status = 0u8;
                if *power_ack {
                    status |= 0x04;
                }
                if *data_rate_ack {
                    status |= 0x02;
                }
                if *channel_mask_ack {
                    status |= 0x01;
                }
                vec![0x03, status]
            }
            MacCommand::DutyCycleAns => vec![0x04],
            MacCommand::RXParamSetupAns {
                rx1_dr_offset_ack,
                rx2_data_rate_ack,
                channel_ack,
            } => {
                let mut status = 0u8;
                if *rx1_dr_offset_ack {
                    status |= 0x04;
                }
                if *rx2_data_rate_ack {
                    status |= 0x02;
                }
                if *channel_ack {
                    status |= 0x01;
                }
                vec![0x05, status]
            }
            MacCommand::DevStatusAns { battery, margin } => {
                vec![0x06, *battery, *margin as u8]
            }
            MacCommand::NewChannelAns {
                channel_freq_ok,
                data_rate_ok,
            } => {
                let mut status = 0u8;
                if *channel_freq_ok {
                    status |= 0x02;
                }
                if *data_rate_ok {
                    status |= 0x01;
                }
                vec![0x07, status]
            }
            MacCommand::RXTimingSetupAns => vec![0x08],
            MacCommand::LinkADRReq {
                data_rate,
                tx_power,
                ch_mask,
                ch_mask_cntl,
                nb_trans,
            } => {
                let mask = ch_mask.to_le_bytes();
                vec![
                    0x03,
                    (data_rate << 4) | (tx_power & 0x0F),
                    mask[0],
                    mask[1],
                    (ch_mask_cntl << 4) | (nb_trans & 0x0F),
                ]
            }
            MacCommand::DevStatusReq => vec![0x06],
        }
    }
}

/// Network-side command policy for Class-A sessions
///
/// Records device status reports, promotes the desired ADR parameters once
/// the device acknowledges them, and keeps probing: a DevStatusReq while
/// the session has no status yet, a LinkADRReq while the in-use ADR lags
/// the desired one.
#[derive(Debug, Default)]
pub struct StandardCommands;

impl CommandHandler for StandardCommands {
    fn handle_fopts(&self, link: &mut Link, f_opts: &[u8]) -> Vec<u8> {
        let commands = match MacCommand::parse_fopts(f_opts) {
            Some(commands) => commands,
            None => {
                warn!(
                    devaddr = %codec::to_hex(&link.dev_addr),
                    "malformed FOpts, skipping MAC commands"
                );
                return Vec::new();
            }
        };

        for command in &commands {
            match command {
                MacCommand::DevStatusAns { battery, margin } => {
                    link.devstat = Some(DevStat {
                        battery: *battery,
                        margin: *margin,
                    });
                }
                MacCommand::LinkADRAns {
                    power_ack: true,
                    data_rate_ack: true,
                    channel_mask_ack: true,
                } => {
                    link.adr_use = link.adr_set;
                }
                MacCommand::LinkADRAns { .. } => {
                    warn!(
                        devaddr = %codec::to_hex(&link.dev_addr),
                        "device rejected ADR request"
                    );
                }
                _ => {}
            }
        }

        let mut out = Vec::new();
        if link.devstat.is_none() {
            out.extend_from_slice(&MacCommand::DevStatusReq.to_bytes());
        }
        if link.adr_flag_set && link.adr_set != link.adr_use {
            out.extend_from_slice(
                &MacCommand::LinkADRReq {
                    data_rate: link.adr_set.datr,
                    tx_power: link.adr_set.power,
                    ch_mask: link.adr_set.chans as u16,
                    ch_mask_cntl: 0,
                    nb_trans: 1,
                }
                .to_bytes(),
            );
        }
        out
    }
}
