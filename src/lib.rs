//! Server-side LoRaWAN MAC in Rust
//!
//! This crate implements the network-server half of the LoRaWAN 1.0.1
//! Class-A MAC layer: it terminates the air interface between end-devices
//! and application handlers, mediated by packet-forwarding gateways. It
//! authenticates and decrypts uplinks, maintains per-device sessions
//! (keys, frame counters, ADR state) in a pluggable registry, performs the
//! OTAA join handshake, and schedules correctly-timed RX2 downlinks.
//!
//! # Features
//! - Bit-exact LoRaWAN 1.0.1 framing with AES-CMAC integrity
//! - OTAA activation with transactional DevAddr allocation
//! - Replay defense through bounded frame-counter reconstruction
//! - Confirmed-downlink retention and retransmission
//! - Storage, application dispatch and MAC-command policy behind traits
//!
//! # Example
//! ```ignore
//! use lorawan_ns::{
//!     config::ServerConfig,
//!     lorawan::commands::StandardCommands,
//!     lorawan::mac::{MacLayer, RxQuality},
//!     registry::MemoryRegistry,
//! };
//!
//! let registry = MemoryRegistry::new();
//! // ... provision gateways and devices ...
//!
//! let mac = MacLayer::new(registry, handler, StandardCommands, ServerConfig::default());
//!
//! // For every frame the gateway transport forwards:
//! match mac.process_frame(gateway_mac, &rxq, &rf, &phy_payload)? {
//!     Some(tx) => transport.send(tx),
//!     None => {}
//! }
//! ```

#![warn(missing_docs)]

/// Application handler interface
pub mod app;

/// Byte-order and encoding helpers
pub mod codec;

/// Network and server configuration
pub mod config;

/// Cryptographic functions
pub mod crypto;

/// LoRaWAN protocol implementation
pub mod lorawan;

/// Persistent device, session and gateway stores
pub mod registry;
