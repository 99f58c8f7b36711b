use lorawan_ns::codec;
use lorawan_ns::crypto::{self, Direction};
use lorawan_ns::lorawan::mac::{reconstruct_fcnt, MacError, MAX_FCNT_GAP};
use lorawan_ns::lorawan::phy::{split_mic, DataUplink, FCtrl, JoinRequest, MType};
use lorawan_ns::lorawan::region::DataRate;
use lorawan_ns::registry::{AESKey, IgnoredLink};

fn key_from_hex(s: &str) -> AESKey {
    let bytes = codec::from_hex(s).unwrap();
    let mut key = [0u8; 16];
    key.copy_from_slice(&bytes);
    key
}

#[test]
fn test_cmac_rfc4493_vectors() {
    // RFC 4493 test vectors, truncated to the 4-byte MIC
    let key = key_from_hex("2b7e151628aed2a6abf7158809cf4f3c");

    let mic = crypto::cmac_mic(&key, &[]);
    assert_eq!(&mic, &codec::from_hex("bb1d6929").unwrap()[..]);

    let one_block = codec::from_hex("6bc1bee22e409f96e93d7e117393172a").unwrap();
    let mic = crypto::cmac_mic(&key, &one_block);
    assert_eq!(&mic, &codec::from_hex("070a16b4").unwrap()[..]);

    // 40 bytes exercises the incomplete-final-block path
    let forty = codec::from_hex(
        "6bc1bee22e409f96e93d7e117393172aae2d8a571e03ac9c9eb76fac45af8e5130c81c46a35ce411",
    )
    .unwrap();
    let mic = crypto::cmac_mic(&key, &forty);
    assert_eq!(&mic, &codec::from_hex("dfa66747").unwrap()[..]);
}

#[test]
fn test_aes_ecb_fips197_vector() {
    let key = key_from_hex("000102030405060708090a0b0c0d0e0f");
    let plain = codec::from_hex("00112233445566778899aabbccddeeff").unwrap();
    let cipher = crypto::aes_ecb_encrypt(&key, &plain);
    assert_eq!(
        cipher,
        codec::from_hex("69c4e0d86a7b0430d8cdb78070b4c55a").unwrap()
    );
    assert_eq!(crypto::aes_ecb_decrypt(&key, &cipher), plain);
}

#[test]
fn test_aes_ecb_pads_to_whole_blocks() {
    let key = [0x2B; 16];
    let out = crypto::aes_ecb_encrypt(&key, &[1, 2, 3]);
    assert_eq!(out.len(), 16);
    // the decrypted block starts with the input, zero-padded
    let back = crypto::aes_ecb_decrypt(&key, &out);
    assert_eq!(&back[..3], &[1, 2, 3]);
    assert!(back[3..].iter().all(|&b| b == 0));
}

#[test]
fn test_payload_cipher_symmetry() {
    let key = [0x2B; 16];
    let dev_addr = [0x01, 0x02, 0x03, 0x04];

    for len in [1usize, 5, 15, 16, 17, 37, 64] {
        let payload: Vec<u8> = (0..len as u8).collect();
        let enc = crypto::payload_cipher(&key, Direction::Up, &dev_addr, 7, &payload);
        assert_eq!(enc.len(), payload.len());
        assert_ne!(enc, payload);
        let dec = crypto::payload_cipher(&key, Direction::Up, &dev_addr, 7, &enc);
        assert_eq!(dec, payload);
    }
}

#[test]
fn test_payload_cipher_distinguishes_context() {
    let key = [0x2B; 16];
    let dev_addr = [0x01, 0x02, 0x03, 0x04];
    let payload = b"frame counter matters";

    let up = crypto::payload_cipher(&key, Direction::Up, &dev_addr, 1, payload);
    let down = crypto::payload_cipher(&key, Direction::Down, &dev_addr, 1, payload);
    let later = crypto::payload_cipher(&key, Direction::Up, &dev_addr, 2, payload);
    assert_ne!(up, down);
    assert_ne!(up, later);
}

#[test]
fn test_data_mic_binds_header_fields() {
    let key = [0x2B; 16];
    let dev_addr = [0x01, 0x02, 0x03, 0x04];
    let msg = b"Test Data";

    let mic = crypto::data_mic(&key, Direction::Up, &dev_addr, 1, msg);
    assert_ne!(mic, crypto::data_mic(&key, Direction::Up, &dev_addr, 2, msg));
    assert_ne!(
        mic,
        crypto::data_mic(&key, Direction::Down, &dev_addr, 1, msg)
    );
    assert_ne!(
        mic,
        crypto::data_mic(&key, Direction::Up, &[0x01, 0x02, 0x03, 0x05], 1, msg)
    );
}

#[test]
fn test_session_key_derivation() {
    let app_key = [0x2B; 16];
    let app_nonce = [0x01, 0x02, 0x03];
    let net_id = [0x00, 0x00, 0x24];
    let dev_nonce = [0xCD, 0xAB];

    let (nwk_skey, app_skey) =
        crypto::derive_session_keys(&app_key, &app_nonce, &net_id, &dev_nonce);
    assert_ne!(nwk_skey, app_skey);

    // the derivation is one AES block over the tagged, padded nonce layout
    let mut block = vec![0x01];
    block.extend_from_slice(&app_nonce);
    block.extend_from_slice(&net_id);
    block.extend_from_slice(&dev_nonce);
    let expected = crypto::aes_ecb_encrypt(&app_key, &block);
    assert_eq!(&nwk_skey[..], &expected[..]);

    block[0] = 0x02;
    let expected = crypto::aes_ecb_encrypt(&app_key, &block);
    assert_eq!(&app_skey[..], &expected[..]);

    let again = crypto::derive_session_keys(&app_key, &app_nonce, &net_id, &dev_nonce);
    assert_eq!(again.0, nwk_skey);
    assert_eq!(again.1, app_skey);
}

#[test]
fn test_fcnt_gap_boundaries() {
    // a gap of MAX_FCNT_GAP - 1 is accepted, MAX_FCNT_GAP is not
    let ok = reconstruct_fcnt(0, (MAX_FCNT_GAP - 1) as u16).unwrap();
    assert_eq!(ok, MAX_FCNT_GAP - 1);
    assert!(matches!(
        reconstruct_fcnt(0, MAX_FCNT_GAP as u16),
        Err(MacError::FcntGapTooLarge { gap }) if gap == MAX_FCNT_GAP
    ));
}

#[test]
fn test_fcnt_wire_wrap() {
    // the wire counter wrapping past 0xFFFF continues the 32-bit counter
    assert_eq!(reconstruct_fcnt(0xFFFF, 5).unwrap(), 0x10004);
    assert_eq!(reconstruct_fcnt(0x0001_FFFE, 3).unwrap(), 0x0002_0003);
    // equal values are a zero gap (device retransmission)
    assert_eq!(reconstruct_fcnt(42, 42).unwrap(), 42);
}

#[test]
fn test_fcnt_replay_rejected() {
    // prior counter 20000, wire says 1: the reconstruction would have to
    // jump almost a full epoch
    let err = reconstruct_fcnt(20000, 1);
    assert!(matches!(
        err,
        Err(MacError::FcntGapTooLarge { gap }) if gap == 0x10000 - 20000 + 1
    ));
}

#[test]
fn test_codec_reverse_and_pad() {
    assert_eq!(codec::reverse(&[1, 2, 3]), vec![3, 2, 1]);
    assert_eq!(codec::reverse4(&[1, 2, 3, 4]), [4, 3, 2, 1]);
    assert_eq!(
        codec::reverse8(&[1, 2, 3, 4, 5, 6, 7, 8]),
        [8, 7, 6, 5, 4, 3, 2, 1]
    );
    assert_eq!(codec::pad16(&[0xFF; 16]).len(), 16);
    assert_eq!(codec::pad16(&[0xFF; 17]).len(), 32);
    let padded = codec::pad16(&[1, 2, 3]);
    assert_eq!(&padded[..3], &[1, 2, 3]);
    assert!(padded[3..].iter().all(|&b| b == 0));
}

#[test]
fn test_codec_hex_case_insensitive() {
    assert_eq!(
        codec::from_hex("DEADbeef").unwrap(),
        vec![0xDE, 0xAD, 0xBE, 0xEF]
    );
    assert_eq!(codec::to_hex(&[0xDE, 0xAD, 0xBE, 0xEF]), "deadbeef");
    assert!(codec::from_hex("not hex").is_err());
}

#[test]
fn test_data_rate_table() {
    let table = [
        (0u8, "SF12BW125", 12u8, 125_000u32),
        (1, "SF11BW125", 11, 125_000),
        (2, "SF10BW125", 10, 125_000),
        (3, "SF9BW125", 9, 125_000),
        (4, "SF8BW125", 8, 125_000),
        (5, "SF7BW125", 7, 125_000),
        (6, "SF7BW250", 7, 250_000),
    ];
    for (index, name, sf, bw) in table {
        let dr = DataRate::from_index(index).unwrap();
        assert_eq!(dr.index(), index);
        assert_eq!(dr.as_str(), name);
        assert_eq!(dr.to_string(), name);
        assert_eq!(name.parse::<DataRate>().unwrap(), dr);
        assert_eq!(dr.spreading_factor(), sf);
        assert_eq!(dr.bandwidth(), bw);
    }
    assert!(DataRate::from_index(7).is_none());
    assert!("SF6BW125".parse::<DataRate>().is_err());
}

#[test]
fn test_fctrl_roundtrip() {
    let f_ctrl = FCtrl {
        adr: true,
        adr_ack_req: false,
        ack: true,
        f_pending: false,
        f_opts_len: 5,
    };
    let byte = f_ctrl.to_byte();
    assert_eq!(byte, 0x80 | 0x20 | 5);
    assert_eq!(FCtrl::from_byte(byte), f_ctrl);
}

#[test]
fn test_data_uplink_parse() {
    // MHDR | DevAddr(LE) | FCtrl | FCnt(LE) | FOpts | FPort | FRMPayload
    let msg = [
        0x40, 0x04, 0x03, 0x02, 0x01, 0x02, 0x2A, 0x00, 0x06, 0x0B, 0x0A, 0x0D,
    ];
    let frame = DataUplink::parse(&msg).unwrap();
    assert_eq!(frame.mtype, MType::UnconfirmedDataUp);
    assert_eq!(frame.fhdr.dev_addr, [0x01, 0x02, 0x03, 0x04]);
    assert_eq!(frame.fhdr.f_cnt, 0x2A);
    assert_eq!(frame.fhdr.f_opts, vec![0x06, 0x0B]);
    assert_eq!(frame.f_port, Some(0x0A));
    assert_eq!(frame.frm_payload, vec![0x0D]);

    // no port, no payload
    let bare = [0x80, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00];
    let frame = DataUplink::parse(&bare).unwrap();
    assert_eq!(frame.mtype, MType::ConfirmedDataUp);
    assert_eq!(frame.f_port, None);
    assert!(frame.frm_payload.is_empty());
}

#[test]
fn test_data_uplink_parse_rejects_garbage() {
    // FOptsLen claims more bytes than the frame has
    let overrun = [0x40, 0x04, 0x03, 0x02, 0x01, 0x0F, 0x01, 0x00];
    assert!(DataUplink::parse(&overrun).is_err());

    // header truncated
    assert!(DataUplink::parse(&[0x40, 0x01, 0x02]).is_err());

    // downlink MType is not a data uplink
    let downlink = [0x60, 0x04, 0x03, 0x02, 0x01, 0x00, 0x01, 0x00];
    assert!(DataUplink::parse(&downlink).is_err());
}

#[test]
fn test_join_request_parse() {
    // AppEUI 70b3d57ed0000000 and DevEUI 0004a30b001a5f30, both
    // little-endian on the wire, DevNonce abcd
    let mut msg = vec![0x00];
    msg.extend_from_slice(&codec::from_hex("000000d07ed5b370").unwrap());
    msg.extend_from_slice(&codec::from_hex("305f1a000ba30400").unwrap());
    msg.extend_from_slice(&[0xCD, 0xAB]);

    let request = JoinRequest::parse(&msg).unwrap();
    assert_eq!(
        request.app_eui.to_vec(),
        codec::from_hex("70b3d57ed0000000").unwrap()
    );
    assert_eq!(
        request.dev_eui.to_vec(),
        codec::from_hex("0004a30b001a5f30").unwrap()
    );
    assert_eq!(request.dev_nonce, [0xCD, 0xAB]);

    assert!(JoinRequest::parse(&msg[..10]).is_err());
}

#[test]
fn test_split_mic() {
    let payload = [0x40, 1, 2, 3, 4, 5, 0xAA, 0xBB, 0xCC, 0xDD];
    let (msg, mic) = split_mic(&payload).unwrap();
    assert_eq!(msg, &payload[..6]);
    assert_eq!(mic, [0xAA, 0xBB, 0xCC, 0xDD]);

    assert!(split_mic(&[0x40, 1, 2, 3]).is_err());
}

#[test]
fn test_ignored_link_matches() {
    let ignored = IgnoredLink {
        dev_addr: [0x02, 0x00, 0x00, 0x00],
        mask: [0xFF, 0x00, 0x00, 0x00],
    };
    assert!(ignored.matches(&[0x02, 0xAA, 0xBB, 0xCC]));
    assert!(!ignored.matches(&[0x03, 0xAA, 0xBB, 0xCC]));
}

mod standard_commands {
    use lorawan_ns::lorawan::commands::{CommandHandler, MacCommand, StandardCommands};
    use lorawan_ns::registry::{AdrParams, DevStat, Link};

    fn link() -> Link {
        Link {
            dev_addr: [0x01, 0x02, 0x03, 0x04],
            app: "test".to_string(),
            app_id: "1".to_string(),
            nwk_skey: [0x2B; 16],
            app_skey: [0x3C; 16],
            fcntup: 0,
            fcntdown: 0,
            adr_flag_use: false,
            adr_flag_set: false,
            adr_use: AdrParams::default(),
            adr_set: AdrParams::default(),
            devstat: Some(DevStat {
                battery: 254,
                margin: 10,
            }),
            last_rx: None,
        }
    }

    #[test]
    fn records_device_status() {
        let mut link = link();
        link.devstat = None;
        let out = StandardCommands.handle_fopts(&mut link, &[0x06, 200, 0x05]);
        assert_eq!(
            link.devstat,
            Some(DevStat {
                battery: 200,
                margin: 5
            })
        );
        // status already known after this uplink, nothing left to ask
        assert!(out.is_empty());
    }

    #[test]
    fn polls_for_missing_status() {
        let mut link = link();
        link.devstat = None;
        let out = StandardCommands.handle_fopts(&mut link, &[]);
        assert_eq!(out, MacCommand::DevStatusReq.to_bytes());
    }

    #[test]
    fn steers_adr_until_acknowledged() {
        let mut link = link();
        link.adr_flag_set = true;
        link.adr_set = AdrParams {
            power: 3,
            datr: 5,
            chans: 7,
        };

        let out = StandardCommands.handle_fopts(&mut link, &[]);
        assert_eq!(
            out,
            MacCommand::LinkADRReq {
                data_rate: 5,
                tx_power: 3,
                ch_mask: 7,
                ch_mask_cntl: 0,
                nb_trans: 1,
            }
            .to_bytes()
        );

        // the device acknowledges all three fields
        let out = StandardCommands.handle_fopts(&mut link, &[0x03, 0x07]);
        assert_eq!(link.adr_use, link.adr_set);
        assert!(out.is_empty());
    }

    #[test]
    fn malformed_fopts_are_dropped() {
        let mut link = link();
        // DevStatusAns wants two payload bytes, only one present
        let out = StandardCommands.handle_fopts(&mut link, &[0x06, 200]);
        assert!(out.is_empty());
        assert_eq!(
            link.devstat,
            Some(DevStat {
                battery: 254,
                margin: 10
            })
        );
    }

    #[test]
    fn parse_fopts_walks_multiple_commands() {
        let commands = MacCommand::parse_fopts(&[0x02, 0x03, 0x07, 0x06, 0xFF, 0x00]).unwrap();
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0], MacCommand::LinkCheckReq);
        assert_eq!(
            commands[1],
            MacCommand::LinkADRAns {
                power_ack: true,
                data_rate_ack: true,
                channel_mask_ack: true,
            }
        );
        assert_eq!(
            commands[2],
            MacCommand::DevStatusAns {
                battery: 255,
                margin: 0,
            }
        );
        assert!(MacCommand::parse_fopts(&[0x7F]).is_none());
    }
}
