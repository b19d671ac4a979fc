//! Daemon wire protocol
//!
//! Datagrams exchanged with the radio daemon are one packet-kind byte
//! followed by a TLV record terminated by [`StatusType::Eol`]. Audio and
//! browser-bound frames are RTP framed.

pub mod fields;
pub mod rtp;
pub mod status;
pub mod tlv;

pub use fields::{DemodType, PacketKind, StatusType};
pub use rtp::{RtpHeader, RtpPacket};
pub use status::{decode_status, Channel, DaemonState, Frontend};

/// Split a daemon datagram into its kind and TLV record
pub fn split_packet(datagram: &[u8]) -> Option<(PacketKind, &[u8])> {
    let (&kind, record) = datagram.split_first()?;
    Some((PacketKind::from_u8(kind)?, record))
}
