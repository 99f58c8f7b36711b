//! RX2 downlink planning and construction
//!
//! After an accepted uplink the device listens twice; this planner always
//! answers in RX2 with the configured frequency and data rate. RX1
//! selection is a transport/configuration policy and stays outside the
//! core. A response is built when the uplink was confirmed, when the
//! device asked for an ADR acknowledgement, when MAC commands are queued,
//! or when the application hands back data.

use tracing::{debug, warn};

use crate::app::{AppHandler, RxData, RxDecision, TxData};
use crate::codec;
use crate::crypto::{self, Direction};
use crate::lorawan::commands::CommandHandler;
use crate::lorawan::mac::{MacError, MacLayer, RxQuality, TxPacket};
use crate::lorawan::phy::{FCtrl, FrameError, MType, FHDR};
use crate::registry::{Link, PendingDownlink, Registry};

/// Everything the planner needs from one accepted uplink
pub(crate) struct UplinkContext<'a> {
    /// The committed session
    pub link: &'a Link,
    /// Reception metadata, source of the RX2 deadline
    pub rxq: &'a RxQuality,
    /// The uplink was a confirmed frame
    pub confirmed: bool,
    /// ACK bit of the uplink
    pub ack: bool,
    /// ADRACKReq bit of the uplink
    pub adr_ack_req: bool,
    /// FPort of the uplink
    pub f_port: Option<u8>,
    /// Decrypted FRMPayload
    pub data: Vec<u8>,
    /// FOpts queued by the command handler
    pub fopts_out: Vec<u8>,
}

impl<R: Registry, A: AppHandler, C: CommandHandler> MacLayer<R, A, C> {
    /// Decide whether and what to transmit in response to an uplink
    pub(crate) fn plan_downlink(
        &self,
        ctx: UplinkContext<'_>,
    ) -> Result<Option<TxPacket>, MacError> {
        let UplinkContext {
            link,
            rxq,
            confirmed,
            ack,
            adr_ack_req,
            f_port,
            data,
            fopts_out,
        } = ctx;
        let dev_addr = link.dev_addr;

        let pending = if ack {
            // previous confirmed downlink acknowledged
            self.registry.clear_pending_downlink(&dev_addr)?;
            None
        } else {
            self.registry.pending_downlink(&dev_addr)?
        };
        let last_lost = pending.is_some();
        let shall_reply = confirmed || adr_ack_req || !fopts_out.is_empty();

        let decision = self.handler.handle_rx(
            dev_addr,
            &link.app,
            &link.app_id,
            RxData {
                port: f_port,
                data,
                last_lost,
                shall_reply,
            },
        )?;

        match decision {
            RxDecision::Ok => {
                if shall_reply {
                    self.build_downlink(link, rxq, None, confirmed, fopts_out)
                        .map(Some)
                } else {
                    Ok(None)
                }
            }
            RxDecision::Retransmit => match pending {
                Some(pending) => {
                    debug!(
                        devaddr = %codec::to_hex(&dev_addr),
                        "retransmitting lost confirmed downlink"
                    );
                    Ok(Some(self.tx_at_rx2(rxq, pending.phy_payload)))
                }
                None => {
                    warn!(
                        devaddr = %codec::to_hex(&dev_addr),
                        "retransmit requested without a pending downlink"
                    );
                    Ok(None)
                }
            },
            RxDecision::Send(tx) => self
                .build_downlink(link, rxq, Some(tx), confirmed, fopts_out)
                .map(Some),
        }
    }

    /// Construct a data downlink and commit its frame counter
    fn build_downlink(
        &self,
        link: &Link,
        rxq: &RxQuality,
        tx: Option<TxData>,
        ack: bool,
        f_opts: Vec<u8>,
    ) -> Result<TxPacket, MacError> {
        if f_opts.len() > 15 {
            return Err(FrameError("FOpts exceed 15 bytes").into());
        }
        let dev_addr = link.dev_addr;
        let confirmed = tx.as_ref().map_or(false, |t| t.confirmed);
        let f_pending = tx.as_ref().map_or(false, |t| t.pending);

        // The increment commits together with the decision to send, so two
        // concurrent downlinks can never share a counter value.
        let fcntdown = self
            .registry
            .transaction(|txn| -> Result<u32, MacError> {
                let mut link = txn
                    .link(&dev_addr)?
                    .ok_or(MacError::UnknownDevAddr(dev_addr))?;
                link.fcntdown = link.fcntdown.wrapping_add(1);
                txn.put_link(&link)?;
                Ok(link.fcntdown)
            })?;

        let mtype = if confirmed {
            MType::ConfirmedDataDown
        } else {
            MType::UnconfirmedDataDown
        };
        let fhdr = FHDR {
            dev_addr,
            f_ctrl: FCtrl {
                adr: link.adr_flag_set,
                adr_ack_req: false,
                ack,
                f_pending,
                f_opts_len: f_opts.len() as u8,
            },
            f_cnt: fcntdown as u16,
            f_opts,
        };

        let mut msg = vec![mtype as u8];
        msg.extend_from_slice(&fhdr.serialize());
        if let Some(tx) = &tx {
            if let Some(port) = tx.port {
                if port > 0 {
                    msg.push(port);
                    msg.extend_from_slice(&crypto::payload_cipher(
                        &link.app_skey,
                        Direction::Down,
                        &dev_addr,
                        fcntdown,
                        &tx.data,
                    ));
                }
            }
        }
        let mic = crypto::data_mic(&link.nwk_skey, Direction::Down, &dev_addr, fcntdown, &msg);
        let mut phy_payload = msg;
        phy_payload.extend_from_slice(&mic);

        if confirmed {
            self.registry.store_pending_downlink(&PendingDownlink {
                dev_addr,
                phy_payload: phy_payload.clone(),
            })?;
        }
        debug!(
            devaddr = %codec::to_hex(&dev_addr),
            fcnt = fcntdown,
            confirmed,
            "scheduling downlink in RX2"
        );
        Ok(self.tx_at_rx2(rxq, phy_payload))
    }

    /// Wrap a PHY payload into the RX2 window of the triggering uplink
    fn tx_at_rx2(&self, rxq: &RxQuality, phy_payload: Vec<u8>) -> TxPacket {
        TxPacket {
            time: rxq.tmst.wrapping_add(self.config.rx_delay2),
            rf: self.config.rx2_rf.clone(),
            phy_payload,
        }
    }
}
