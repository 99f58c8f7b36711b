//! LoRaWAN cryptographic operations
//!
//! This module provides the cryptographic functions the MAC relies on:
//! - Message Integrity Code (MIC) computation, AES-CMAC truncated to 4 bytes
//! - Payload encryption/decryption in LoRaWAN's counter mode
//! - AES-ECB block operations for join-accept framing
//! - Session key derivation from the join nonces

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;

use crate::codec;
use crate::registry::{AESKey, DevAddr, NetID};

/// MIC size in bytes
pub const MIC_SIZE: usize = 4;

/// Block size for AES-128
const BLOCK_SIZE: usize = 16;

/// Direction identifiers for cryptographic operations
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Direction {
    /// Uplink (device to network)
    Up = 0,
    /// Downlink (network to device)
    Down = 1,
}

/// Double a CMAC subkey in GF(2^128), per RFC 4493
fn dbl(block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let mut out = [0u8; BLOCK_SIZE];
    for i in 0..BLOCK_SIZE {
        out[i] = block[i] << 1;
        if i < BLOCK_SIZE - 1 {
            out[i] |= block[i + 1] >> 7;
        }
    }
    if block[0] & 0x80 != 0 {
        out[BLOCK_SIZE - 1] ^= 0x87;
    }
    out
}

/// Full AES-CMAC (RFC 4493) over an arbitrary message
fn cmac(key: &AESKey, msg: &[u8]) -> [u8; BLOCK_SIZE] {
    let cipher = Aes128::new(key.into());

    let mut l = [0u8; BLOCK_SIZE];
    cipher.encrypt_block((&mut l).into());
    let k1 = dbl(&l);
    let k2 = dbl(&k1);

    let n = if msg.is_empty() {
        1
    } else {
        (msg.len() + BLOCK_SIZE - 1) / BLOCK_SIZE
    };
    let complete = !msg.is_empty() && msg.len() % BLOCK_SIZE == 0;

    let mut x = [0u8; BLOCK_SIZE];
    for block in 0..n - 1 {
        for j in 0..BLOCK_SIZE {
            x[j] ^= msg[block * BLOCK_SIZE + j];
        }
        cipher.encrypt_block((&mut x).into());
    }

    let tail = &msg[(n - 1) * BLOCK_SIZE..];
    let mut last = [0u8; BLOCK_SIZE];
    if complete {
        for j in 0..BLOCK_SIZE {
            last[j] = tail[j] ^ k1[j];
        }
    } else {
        last[..tail.len()].copy_from_slice(tail);
        last[tail.len()] = 0x80;
        for j in 0..BLOCK_SIZE {
            last[j] ^= k2[j];
        }
    }
    for j in 0..BLOCK_SIZE {
        x[j] ^= last[j];
    }
    cipher.encrypt_block((&mut x).into());
    x
}

/// AES-CMAC truncated to the 4-byte MIC
///
/// # Arguments
/// * `key` - AES key for MIC computation
/// * `msg` - Message to authenticate
pub fn cmac_mic(key: &AESKey, msg: &[u8]) -> [u8; MIC_SIZE] {
    let full = cmac(key, msg);
    let mut mic = [0u8; MIC_SIZE];
    mic.copy_from_slice(&full[..MIC_SIZE]);
    mic
}

/// B0 block prefixed to data frames for MIC computation
fn b0(dir: Direction, dev_addr: &DevAddr, fcnt: u32, len: usize) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = 0x49;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&codec::reverse4(dev_addr));
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = len as u8;
    block
}

/// Compute the MIC of a data frame: AES-CMAC over `B0 || msg`
///
/// # Arguments
/// * `key` - Network session key
/// * `dir` - Message direction
/// * `dev_addr` - Device address, canonical byte order
/// * `fcnt` - Full 32-bit frame counter
/// * `msg` - MHDR and MACPayload as they appear on the wire
pub fn data_mic(
    key: &AESKey,
    dir: Direction,
    dev_addr: &DevAddr,
    fcnt: u32,
    msg: &[u8],
) -> [u8; MIC_SIZE] {
    let mut buf = Vec::with_capacity(BLOCK_SIZE + msg.len());
    buf.extend_from_slice(&b0(dir, dev_addr, fcnt, msg.len()));
    buf.extend_from_slice(msg);
    cmac_mic(key, &buf)
}

/// Counter nonce block for FRMPayload encryption, 1-indexed
fn ai(dir: Direction, dev_addr: &DevAddr, fcnt: u32, i: u8) -> [u8; BLOCK_SIZE] {
    let mut block = [0u8; BLOCK_SIZE];
    block[0] = 0x01;
    block[5] = dir as u8;
    block[6..10].copy_from_slice(&codec::reverse4(dev_addr));
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    block[15] = i;
    block
}

/// Encrypt or decrypt an FRMPayload
///
/// XORs the payload with the AES keystream `S_i = AES(key, A_i)`. The
/// operation is its own inverse, so the same call deciphers.
///
/// # Arguments
/// * `key` - Application (or network) session key
/// * `dir` - Message direction
/// * `dev_addr` - Device address, canonical byte order
/// * `fcnt` - Full 32-bit frame counter
/// * `payload` - Data to encrypt/decrypt
pub fn payload_cipher(
    key: &AESKey,
    dir: Direction,
    dev_addr: &DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let mut out = Vec::with_capacity(payload.len());

    for (i, chunk) in payload.chunks(BLOCK_SIZE).enumerate() {
        let mut s = ai(dir, dev_addr, fcnt, (i + 1) as u8);
        cipher.encrypt_block((&mut s).into());
        for (j, &byte) in chunk.iter().enumerate() {
            out.push(byte ^ s[j]);
        }
    }
    out
}

/// AES-ECB encrypt, zero-padding the input to whole blocks
pub fn aes_ecb_encrypt(key: &AESKey, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let mut out = codec::pad16(data);
    for chunk in out.chunks_mut(BLOCK_SIZE) {
        cipher.encrypt_block(GenericArray::from_mut_slice(chunk));
    }
    out
}

/// AES-ECB decrypt, zero-padding the input to whole blocks
///
/// The join-accept is built with this on the server side: the device only
/// carries the encrypt primitive and re-encrypts to recover the plaintext.
pub fn aes_ecb_decrypt(key: &AESKey, data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(key.into());
    let mut out = codec::pad16(data);
    for chunk in out.chunks_mut(BLOCK_SIZE) {
        cipher.decrypt_block(GenericArray::from_mut_slice(chunk));
    }
    out
}

/// Derive network and application session keys from the join nonces
///
/// # Arguments
/// * `app_key` - Application key
/// * `app_nonce` - Server-generated application nonce, wire order
/// * `net_id` - Network identifier
/// * `dev_nonce` - Device nonce from the join-request, wire order
pub fn derive_session_keys(
    app_key: &AESKey,
    app_nonce: &[u8; 3],
    net_id: &NetID,
    dev_nonce: &[u8; 2],
) -> (AESKey, AESKey) {
    let cipher = Aes128::new(app_key.into());

    let mut nwk_skey = [0u8; BLOCK_SIZE];
    nwk_skey[0] = 0x01;
    nwk_skey[1..4].copy_from_slice(app_nonce);
    nwk_skey[4..7].copy_from_slice(net_id);
    nwk_skey[7..9].copy_from_slice(dev_nonce);
    cipher.encrypt_block((&mut nwk_skey).into());

    let mut app_skey = [0u8; BLOCK_SIZE];
    app_skey[0] = 0x02;
    app_skey[1..4].copy_from_slice(app_nonce);
    app_skey[4..7].copy_from_slice(net_id);
    app_skey[7..9].copy_from_slice(dev_nonce);
    cipher.encrypt_block((&mut app_skey).into());

    (nwk_skey, app_skey)
}
