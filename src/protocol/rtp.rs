//! RTP header framing
//!
//! Audio from the daemon arrives RTP-framed, and every binary frame the
//! gateway sends to a browser (status and spectrum) starts with an RTP
//! header so the client can demultiplex by payload type.

use bytes::BufMut;

use crate::error::ProtocolError;

/// Only RTP version 2 exists in practice
pub const RTP_VERSION: u8 = 2;

/// Fixed header size before CSRCs and extension
pub const RTP_MIN_SIZE: usize = 12;

/// Maximum number of contributing sources (4-bit count)
pub const MAX_CSRC: usize = 15;

/// RTP header, host representation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RtpHeader {
    pub version: u8,
    pub pad: bool,
    pub extension: bool,
    pub marker: bool,
    pub payload_type: u8,
    pub seq: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub csrc: Vec<u32>,
}

impl RtpHeader {
    /// Header for an outbound frame with no CSRCs and no extension
    pub fn new(payload_type: u8, seq: u16, timestamp: u32, ssrc: u32) -> Self {
        Self {
            version: RTP_VERSION,
            payload_type: payload_type & 0x7f,
            seq,
            timestamp,
            ssrc,
            ..Default::default()
        }
    }

    pub fn with_marker(mut self, marker: bool) -> Self {
        self.marker = marker;
        self
    }

    /// Bytes this header occupies when encoded (the extension is never written)
    pub fn encoded_len(&self) -> usize {
        RTP_MIN_SIZE + 4 * self.csrc.len().min(MAX_CSRC)
    }

    /// Write the header in network byte order. At most 15 CSRCs are written.
    pub fn encode<B: BufMut>(&self, buf: &mut B) -> usize {
        let cc = self.csrc.len().min(MAX_CSRC) as u32;
        let word = (RTP_VERSION as u32) << 30
            | (self.pad as u32) << 29
            | (self.extension as u32) << 28
            | cc << 24
            | (self.marker as u32) << 23
            | ((self.payload_type & 0x7f) as u32) << 16
            | self.seq as u32;
        buf.put_u32(word);
        buf.put_u32(self.timestamp);
        buf.put_u32(self.ssrc);
        for &c in self.csrc.iter().take(MAX_CSRC) {
            buf.put_u32(c);
        }
        self.encoded_len()
    }

    /// Parse a header. Returns the header and the offset of the payload,
    /// past any CSRCs and extension block.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), ProtocolError> {
        if data.len() < RTP_MIN_SIZE {
            return Err(ProtocolError::TooShort(data.len()));
        }
        let word = be32(data, 0);
        let version = (word >> 30) as u8;
        if version != RTP_VERSION {
            return Err(ProtocolError::BadVersion(version));
        }
        let cc = ((word >> 24) & 0xf) as usize;
        let extension = (word >> 28) & 1 != 0;

        let mut offset = RTP_MIN_SIZE;
        if data.len() < offset + 4 * cc {
            return Err(ProtocolError::TooShort(data.len()));
        }
        let csrc = (0..cc).map(|i| be32(data, offset + 4 * i)).collect();
        offset += 4 * cc;

        if extension {
            if data.len() < offset + 4 {
                return Err(ProtocolError::TooShort(data.len()));
            }
            let words = (be32(data, offset) & 0xffff) as usize;
            offset += 4 + 4 * words;
            if data.len() < offset {
                return Err(ProtocolError::TooShort(data.len()));
            }
        }

        let header = Self {
            version,
            pad: (word >> 29) & 1 != 0,
            extension,
            marker: (word >> 23) & 1 != 0,
            payload_type: ((word >> 16) & 0x7f) as u8,
            seq: word as u16,
            timestamp: be32(data, 4),
            ssrc: be32(data, 8),
            csrc,
        };
        Ok((header, offset))
    }
}

fn be32(data: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
}

/// A parsed RTP packet borrowing its payload from the receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpPacket<'a> {
    pub header: RtpHeader,
    pub payload: &'a [u8],
}

impl<'a> RtpPacket<'a> {
    /// Parse a packet and strip trailing padding when the pad bit is set.
    ///
    /// A pad count larger than the payload leaves an empty payload.
    pub fn parse(data: &'a [u8]) -> Result<Self, ProtocolError> {
        let (header, offset) = RtpHeader::decode(data)?;
        let mut payload = &data[offset..];
        if header.pad {
            let pad = payload.last().copied().unwrap_or(0) as usize;
            payload = &payload[..payload.len().saturating_sub(pad)];
        }
        Ok(Self { header, payload })
    }
}
