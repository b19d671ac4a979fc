//! # Radio Web Gateway
//!
//! Bridges a multicast radio receiver daemon to browser clients.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────────────────── RADIO DAEMON ────────────────────────────┐
//! │   status group (TLV records)            audio group (RTP)           │
//! └───────┬───────────────────▲─────────────────────┬────────────────────┘
//!         │ status            │ commands            │ audio
//!         ▼                   │                     ▼
//! ┌───────────────────────────┼──────────────────────────────────────────┐
//! │  ┌──────────────────┐  ┌──┴───────────┐  ┌────────────────────┐     │
//! │  │   Status loop    │  │   Control    │  │    Audio relay     │     │
//! │  │ (gateway::bridge)│  │  (one lock)  │  │  (gateway::audio)  │     │
//! │  └───────┬──────────┘  └──▲───────▲───┘  └─────────┬──────────┘     │
//! │          │                │       │                │                │
//! │          │   ┌────────────┴──┐  ┌─┴──────────────┐ │                │
//! │          │   │ Spectrum      │  │ Client         │ │                │
//! │          │   │ pollers       │  │ commands       │ │                │
//! │          │   │ (one/session) │  │ (S A F M Z)    │ │                │
//! │          │   └───────────────┘  └─▲──────────────┘ │                │
//! │          ▼                        │                ▼                │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │           Session registry (session::Registry)               │  │
//! │  │   SSRC 1000/1001   SSRC 1002/1003   SSRC 1004/1005   ...     │  │
//! │  └──────────────────────────────┬───────────────────────────────┘  │
//! │                                 │ status, spectrum, audio frames   │
//! │                   GATEWAY       ▼                                   │
//! │  ┌──────────────────────────────────────────────────────────────┐  │
//! │  │              Web server and WebSockets (ui)                   │  │
//! │  └──────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod gateway;
pub mod network;
pub mod protocol;
pub mod session;
pub mod ui;

pub use error::{Error, Result};

/// Application-wide constants
pub mod constants {
    /// Most bins a spectrum frame can carry
    pub const MAX_BINS: usize = 1620;

    /// First SSRC handed to a session; sessions take even values
    pub const START_SSRC: u32 = 1000;

    /// RTP payload type of outbound status frames
    pub const PT_STATUS: u8 = 0x7E;

    /// RTP payload type of outbound spectrum frames
    pub const PT_SPECTRUM: u8 = 0x7F;

    /// Receive buffer for one datagram
    pub const MAX_DATAGRAM: usize = 65536;

    /// Default HTTP port for the web interface
    pub const DEFAULT_HTTP_PORT: u16 = 8081;

    pub const DEFAULT_TTL: i32 = 1;

    /// DSCP AF12 shifted into the TOS byte
    pub const DEFAULT_TOS: i32 = 48;
}
