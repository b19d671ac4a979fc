//! Error types for the radio web gateway

use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Wire format errors (TLV records and RTP headers)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Packet too short: {0} bytes")]
    TooShort(usize),

    #[error("Field {field} declares {declared} bytes but only {available} remain")]
    Truncated {
        field: u8,
        declared: usize,
        available: usize,
    },

    #[error("Unsupported RTP version: {0}")]
    BadVersion(u8),

    #[error("Value of {0} bytes cannot be length-encoded")]
    TooLong(usize),

    #[error("Bin count {declared} does not match {actual} bins of data")]
    BinCountMismatch { declared: usize, actual: usize },

    #[error("Bin count {0} exceeds the protocol maximum")]
    TooManyBins(usize),

    #[error("Record belongs to SSRC {found}, expected {expected}")]
    WrongSsrc { expected: u32, found: u32 },

    #[error("Record is not a spectrum reply (demod type {0})")]
    NotSpectrum(i32),

    #[error("Filter geometry not known yet")]
    NoFilterGeometry,
}

/// Network errors
#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Cannot resolve {target}: {reason}")]
    ResolveFailed { target: String, reason: String },

    #[error("Not a multicast address: {0}")]
    NotMulticast(String),

    #[error("Socket bind failed: {0}")]
    BindFailed(String),

    #[error("Multicast join failed: {0}")]
    JoinFailed(String),

    #[error("Interface not found: {0}")]
    InterfaceNotFound(String),

    #[error("No loopback interface found")]
    NoLoopback,

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    #[error("Unsupported address family")]
    UnsupportedFamily,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Session registry errors
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Session not found: {0}")]
    NotFound(u32),

    #[error("No session for connection {0}")]
    UnknownConnection(uuid::Uuid),

    #[error("SSRC space exhausted")]
    SsrcExhausted,

    #[error("Failed to spawn spectrum poller: {0}")]
    PollerSpawn(String),
}

/// Client transport errors (delivering frames to a browser connection)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Client connection closed")]
    Closed,

    #[error("Client queue full, frame dropped")]
    QueueFull,
}

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;
