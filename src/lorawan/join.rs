//! Over-the-air activation
//!
//! The join handshake replaces a device's session wholesale: fresh nonces,
//! fresh keys, counters back to zero. Everything between re-reading the
//! device and committing the new link runs in one registry transaction so
//! two gateways forwarding the same join-request cannot race each other
//! into two sessions.

use std::time::SystemTime;

use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use crate::app::AppHandler;
use crate::codec;
use crate::config::server::RfConfig;
use crate::crypto;
use crate::lorawan::commands::CommandHandler;
use crate::lorawan::mac::{MacError, MacLayer, RxQuality, TxPacket};
use crate::lorawan::phy::{JoinRequest, MType};
use crate::lorawan::region::DataRate;
use crate::registry::{
    AdrParams, AESKey, DevAddr, Gateway, Link, NetID, Registry, Transaction,
};

/// Draws of a random DevAddr before a join is refused
const MAX_ADDR_ATTEMPTS: u32 = 8;

impl<R: Registry, A: AppHandler, C: CommandHandler> MacLayer<R, A, C> {
    /// Handle a join-request and schedule the join-accept
    pub(crate) fn process_join(
        &self,
        gateway: &Gateway,
        rxq: &RxQuality,
        rf: &RfConfig,
        msg: &[u8],
        mic: [u8; 4],
    ) -> Result<Option<TxPacket>, MacError> {
        let request = JoinRequest::parse(msg)?;
        let device = self
            .registry
            .device(&request.dev_eui)?
            .ok_or(MacError::UnknownDevEui(request.dev_eui))?;

        if !device.can_join {
            info!(
                deveui = %codec::to_hex(&request.dev_eui),
                "join disabled for device, ignoring request"
            );
            return Ok(None);
        }

        // The join-request MIC covers the whole message, header included,
        // under the application key.
        if crypto::cmac_mic(&device.app_key, msg) != mic {
            return Err(MacError::BadMic);
        }

        let mut app_nonce = [0u8; 3];
        OsRng.fill_bytes(&mut app_nonce);
        let netid = gateway.netid;
        let (nwk_skey, app_skey) =
            crypto::derive_session_keys(&device.app_key, &app_nonce, &netid, &request.dev_nonce);

        let (dev_addr, app, app_id) =
            self.registry
                .transaction(|txn| -> Result<(DevAddr, String, String), MacError> {
                    let mut device = txn
                        .device(&request.dev_eui)?
                        .ok_or(MacError::UnknownDevEui(request.dev_eui))?;

                    let dev_addr = match device.link {
                        Some(addr) => addr,
                        None => allocate_dev_addr(txn, &netid)?,
                    };
                    device.link = Some(dev_addr);
                    device.last_join = Some(SystemTime::now());
                    txn.put_device(&device)?;

                    txn.put_link(&Link {
                        dev_addr,
                        app: device.app.clone(),
                        app_id: device.app_id.clone(),
                        nwk_skey,
                        app_skey,
                        fcntup: 0,
                        fcntdown: 0,
                        adr_flag_use: false,
                        adr_flag_set: device.adr_flag_set,
                        adr_use: AdrParams::default(),
                        adr_set: device.adr_set,
                        devstat: None,
                        last_rx: None,
                    })?;

                    // the session is fresh, an unacknowledged downlink is void
                    txn.clear_pending_downlink(&dev_addr)?;
                    Ok((dev_addr, device.app, device.app_id))
                })?;

        self.handler.handle_join(dev_addr, &app, &app_id)?;
        info!(
            deveui = %codec::to_hex(&request.dev_eui),
            devaddr = %codec::to_hex(&dev_addr),
            "device joined"
        );

        let phy_payload = build_join_accept(
            &device.app_key,
            &app_nonce,
            &netid,
            &dev_addr,
            self.config.rx2_rf.datr,
        );
        Ok(Some(TxPacket {
            time: rxq.tmst.wrapping_add(self.config.join_delay1),
            rf: rf.clone(),
            phy_payload,
        }))
    }
}

/// Draw an unused DevAddr: NwkID (7 bits of the NetID), a zero bit, and
/// 24 random bits
fn allocate_dev_addr(txn: &mut dyn Transaction, netid: &NetID) -> Result<DevAddr, MacError> {
    let nwkid = netid[2] & 0x7F;
    for _ in 0..MAX_ADDR_ATTEMPTS {
        let mut tail = [0u8; 3];
        OsRng.fill_bytes(&mut tail);
        let dev_addr = [nwkid << 1, tail[0], tail[1], tail[2]];
        if txn.link(&dev_addr)?.is_none() {
            return Ok(dev_addr);
        }
    }
    Err(MacError::AddrAllocation(MAX_ADDR_ATTEMPTS))
}

/// Assemble the join-accept PHY payload
///
/// The MACPayload and MIC are run through AES-ECB *decrypt*: the device
/// only implements the encrypt primitive and encrypts the received body to
/// recover the plaintext.
fn build_join_accept(
    app_key: &AESKey,
    app_nonce: &[u8; 3],
    netid: &NetID,
    dev_addr: &DevAddr,
    rx2_datr: DataRate,
) -> Vec<u8> {
    let mhdr = MType::JoinAccept as u8;

    let mut mac_payload = Vec::with_capacity(12);
    mac_payload.extend_from_slice(app_nonce);
    mac_payload.extend_from_slice(netid);
    mac_payload.extend_from_slice(&codec::reverse4(dev_addr));
    // DLSettings: RFU | RX1DRoffset (0) | RX2 data rate
    mac_payload.push(rx2_datr.index() & 0x0F);
    // RxDelay
    mac_payload.push(1);

    let mut msg = Vec::with_capacity(1 + mac_payload.len());
    msg.push(mhdr);
    msg.extend_from_slice(&mac_payload);
    let mic = crypto::cmac_mic(app_key, &msg);

    let mut body = mac_payload;
    body.extend_from_slice(&mic);

    let mut phy = vec![mhdr];
    phy.extend_from_slice(&crypto::aes_ecb_decrypt(app_key, &body));
    phy
}
