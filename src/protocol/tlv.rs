//! Type-Length-Value codec for daemon status and command records
//!
//! Each field is `[type:1][length:1 or 1+N][value:length]`. A length byte
//! with the top bit clear is the literal length (0-127); with the top bit
//! set, its low 7 bits count the big-endian length bytes that follow.
//!
//! Integers of every width go through one encoder that strips leading zero
//! bytes, so zero is sent as a bare `[type][0]`. Floats and doubles are sent
//! as their IEEE-754 bit patterns through the same encoder; NaN is never sent
//! at all, so a missing field means "unspecified".

use bytes::BufMut;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};

use super::fields::StatusType;

/// Write a length prefix, using the extended form for lengths of 128 and up
fn encode_length<B: BufMut>(buf: &mut B, len: usize) -> usize {
    if len < 128 {
        buf.put_u8(len as u8);
        1
    } else if len < 1 << 16 {
        buf.put_u8(0x80 | 2);
        buf.put_u16(len as u16);
        3
    } else if len < 1 << 24 {
        buf.put_u8(0x80 | 3);
        buf.put_u8((len >> 16) as u8);
        buf.put_u16(len as u16);
        4
    } else {
        buf.put_u8(0x80 | 4);
        buf.put_u32(len as u32);
        5
    }
}

/// Terminate a record
pub fn encode_eol<B: BufMut>(buf: &mut B) -> usize {
    buf.put_u8(StatusType::Eol as u8);
    1
}

/// Encode an unsigned integer with leading zero bytes stripped.
///
/// Returns the number of bytes written.
pub fn encode_int64<B: BufMut>(buf: &mut B, ty: StatusType, x: u64) -> usize {
    buf.put_u8(ty as u8);
    if x == 0 {
        buf.put_u8(0);
        return 2;
    }
    let bytes = x.to_be_bytes();
    let skip = (x.leading_zeros() / 8) as usize;
    let value = &bytes[skip..];
    buf.put_u8(value.len() as u8);
    buf.put_slice(value);
    2 + value.len()
}

pub fn encode_byte<B: BufMut>(buf: &mut B, ty: StatusType, x: u8) -> usize {
    encode_int64(buf, ty, x as u64)
}

pub fn encode_int16<B: BufMut>(buf: &mut B, ty: StatusType, x: u16) -> usize {
    encode_int64(buf, ty, x as u64)
}

pub fn encode_int32<B: BufMut>(buf: &mut B, ty: StatusType, x: u32) -> usize {
    encode_int64(buf, ty, x as u64)
}

/// Encode a signed integer. Negative values are sign-extended to 64 bits,
/// matching what the daemon does with its own `int` fields.
pub fn encode_int<B: BufMut>(buf: &mut B, ty: StatusType, x: i32) -> usize {
    encode_int64(buf, ty, x as i64 as u64)
}

pub fn encode_bool<B: BufMut>(buf: &mut B, ty: StatusType, x: bool) -> usize {
    encode_int64(buf, ty, x as u64)
}

/// Encode a float. NaN writes nothing and returns 0.
pub fn encode_float<B: BufMut>(buf: &mut B, ty: StatusType, x: f32) -> usize {
    if x.is_nan() {
        return 0;
    }
    encode_int32(buf, ty, x.to_bits())
}

/// Encode a double. NaN writes nothing and returns 0.
pub fn encode_double<B: BufMut>(buf: &mut B, ty: StatusType, x: f64) -> usize {
    if x.is_nan() {
        return 0;
    }
    encode_int64(buf, ty, x.to_bits())
}

/// Encode raw bytes (strings are sent without a terminator)
pub fn encode_bytes<B: BufMut>(buf: &mut B, ty: StatusType, value: &[u8]) -> usize {
    buf.put_u8(ty as u8);
    let header = encode_length(buf, value.len());
    buf.put_slice(value);
    1 + header + value.len()
}

pub fn encode_string<B: BufMut>(buf: &mut B, ty: StatusType, value: &str) -> usize {
    encode_bytes(buf, ty, value.as_bytes())
}

/// Encode an array of floats, each as a 4-byte big-endian bit pattern
pub fn encode_vector<B: BufMut>(buf: &mut B, ty: StatusType, values: &[f32]) -> usize {
    buf.put_u8(ty as u8);
    let len = values.len() * 4;
    let header = encode_length(buf, len);
    for v in values {
        buf.put_u32(v.to_bits());
    }
    1 + header + len
}

/// Encode a socket address.
///
/// IPv4 is 4 address bytes then the port. IPv6 carries only the first 8 of
/// its 16 address bytes then the port; the daemon reads it that way, so the
/// truncation is part of the wire format.
pub fn encode_socket<B: BufMut>(buf: &mut B, ty: StatusType, addr: &SocketAddr) -> usize {
    buf.put_u8(ty as u8);
    match addr {
        SocketAddr::V4(v4) => {
            buf.put_u8(6);
            buf.put_slice(&v4.ip().octets());
            buf.put_u16(v4.port());
            8
        }
        SocketAddr::V6(v6) => {
            buf.put_u8(10);
            buf.put_slice(&v6.ip().octets()[..8]);
            buf.put_u16(v6.port());
            12
        }
    }
}

/// Accumulate up to 8 big-endian bytes. An empty value decodes to 0.
pub fn decode_int64(value: &[u8]) -> u64 {
    value.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

pub fn decode_int32(value: &[u8]) -> u32 {
    decode_int64(value) as u32
}

pub fn decode_int16(value: &[u8]) -> u16 {
    decode_int64(value) as u16
}

pub fn decode_int8(value: &[u8]) -> u8 {
    decode_int64(value) as u8
}

pub fn decode_int(value: &[u8]) -> i32 {
    decode_int64(value) as i32
}

pub fn decode_bool(value: &[u8]) -> bool {
    decode_int64(value) != 0
}

/// Decode a float. An 8-byte value is taken as a double and narrowed.
pub fn decode_float(value: &[u8]) -> f32 {
    match value.len() {
        0 => 0.0,
        8 => decode_double(value) as f32,
        _ => f32::from_bits(decode_int32(value)),
    }
}

/// Decode a double. A 4-byte value is taken as a float and widened.
pub fn decode_double(value: &[u8]) -> f64 {
    match value.len() {
        0 => 0.0,
        4 => decode_float(value) as f64,
        _ => f64::from_bits(decode_int64(value)),
    }
}

/// Decode a string field. Invalid UTF-8 is replaced rather than rejected.
pub fn decode_string(value: &[u8]) -> String {
    String::from_utf8_lossy(value).into_owned()
}

/// Decode a socket address field of 6 (IPv4) or 10 (truncated IPv6) bytes
pub fn decode_socket(value: &[u8]) -> Option<SocketAddr> {
    match value.len() {
        6 => {
            let ip = Ipv4Addr::new(value[0], value[1], value[2], value[3]);
            let port = u16::from_be_bytes([value[4], value[5]]);
            Some(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        10 => {
            let mut octets = [0u8; 16];
            octets[..8].copy_from_slice(&value[..8]);
            let port = u16::from_be_bytes([value[8], value[9]]);
            Some(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0)))
        }
        _ => None,
    }
}

/// One field of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    /// Raw type byte; may be a code this build does not know
    pub code: u8,
    pub value: &'a [u8],
}

impl<'a> Field<'a> {
    pub fn kind(&self) -> Option<StatusType> {
        StatusType::from_u8(self.code)
    }
}

/// Iterator over the fields of a record.
///
/// Stops at the end-of-list marker, at the end of the buffer, or at the first
/// field whose declared length runs past the buffer. Nothing beyond the
/// buffer is ever read.
#[derive(Debug, Clone)]
pub struct Fields<'a> {
    buf: &'a [u8],
    pos: usize,
    truncated: bool,
}

impl<'a> Fields<'a> {
    pub fn new(record: &'a [u8]) -> Self {
        Self {
            buf: record,
            pos: 0,
            truncated: false,
        }
    }

    /// True if iteration ended on a malformed field rather than EOL or the end of the buffer
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    fn stop(&mut self, truncated: bool) -> Option<Field<'a>> {
        self.pos = self.buf.len();
        self.truncated = truncated;
        None
    }
}

impl<'a> Iterator for Fields<'a> {
    type Item = Field<'a>;

    fn next(&mut self) -> Option<Field<'a>> {
        let code = *self.buf.get(self.pos)?;
        if code == StatusType::Eol as u8 {
            return self.stop(false);
        }
        let Some(&len_byte) = self.buf.get(self.pos + 1) else {
            return self.stop(true);
        };
        let mut cursor = self.pos + 2;
        let mut len = len_byte as usize;
        if len_byte & 0x80 != 0 {
            let count = (len_byte & 0x7f) as usize;
            if count > 4 || cursor + count > self.buf.len() {
                return self.stop(true);
            }
            len = self.buf[cursor..cursor + count]
                .iter()
                .fold(0usize, |acc, &b| (acc << 8) | b as usize);
            cursor += count;
        }
        let end = match cursor.checked_add(len) {
            Some(end) if end <= self.buf.len() => end,
            _ => return self.stop(true),
        };
        self.pos = end;
        Some(Field {
            code,
            value: &self.buf[cursor..end],
        })
    }
}

/// Find the first field of the given type without decoding the rest
pub fn find_field(record: &[u8], ty: StatusType) -> Option<&[u8]> {
    Fields::new(record)
        .find(|f| f.code == ty as u8)
        .map(|f| f.value)
}

/// The record's output SSRC, used to route a datagram before full decoding
pub fn get_ssrc(record: &[u8]) -> Option<u32> {
    find_field(record, StatusType::OutputSsrc).map(decode_int32)
}

/// The record's command tag
pub fn get_tag(record: &[u8]) -> Option<u32> {
    find_field(record, StatusType::CommandTag).map(decode_int32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn one_field(bytes: &[u8]) -> (u8, Vec<u8>) {
        let field = Fields::new(bytes).next().unwrap();
        (field.code, field.value.to_vec())
    }

    #[test]
    fn test_zero_is_empty_field() {
        let mut buf = Vec::new();
        assert_eq!(encode_int32(&mut buf, StatusType::OutputSsrc, 0), 2);
        assert_eq!(buf, vec![StatusType::OutputSsrc as u8, 0]);

        let (_, value) = one_field(&buf);
        assert!(value.is_empty());
        assert_eq!(decode_int32(&value), 0);
        assert_eq!(decode_float(&value), 0.0);
        assert_eq!(decode_double(&value), 0.0);
    }

    #[test]
    fn test_leading_zeros_stripped() {
        let mut buf = Vec::new();
        encode_int32(&mut buf, StatusType::BinCount, 300);
        assert_eq!(buf, vec![StatusType::BinCount as u8, 2, 0x01, 0x2C]);
    }

    #[test]
    fn test_negative_int_is_sign_extended() {
        let mut buf = Vec::new();
        assert_eq!(encode_int(&mut buf, StatusType::RfAgc, -1), 10);
        let (_, value) = one_field(&buf);
        assert_eq!(value, vec![0xff; 8]);
        assert_eq!(decode_int(&value), -1);
    }

    #[test]
    fn test_nan_omitted() {
        let mut buf = Vec::new();
        assert_eq!(encode_float(&mut buf, StatusType::LowEdge, f32::NAN), 0);
        assert_eq!(encode_double(&mut buf, StatusType::RadioFrequency, f64::NAN), 0);
        assert!(buf.is_empty());

        // A record with the NaN field dropped simply lacks it
        encode_float(&mut buf, StatusType::HighEdge, 3000.0);
        encode_eol(&mut buf);
        assert!(find_field(&buf, StatusType::LowEdge).is_none());
        assert!(find_field(&buf, StatusType::HighEdge).is_some());
    }

    #[test]
    fn test_float_double_width_crossover() {
        let mut buf = Vec::new();
        encode_double(&mut buf, StatusType::RadioFrequency, 14_074_000.0);
        let (_, value) = one_field(&buf);
        assert_eq!(value.len(), 8);
        assert_eq!(decode_float(&value), 14_074_000.0f32);

        let mut buf = Vec::new();
        encode_float(&mut buf, StatusType::RadioFrequency, -2.5);
        let (_, value) = one_field(&buf);
        assert_eq!(value.len(), 4);
        assert_eq!(decode_double(&value), -2.5f64);
    }

    #[test]
    fn test_extended_length_boundaries() {
        for (len, header) in [(127usize, 1usize), (128, 3), (65_535, 3), (65_536, 4)] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = Vec::new();
            let written = encode_bytes(&mut buf, StatusType::Description, &payload);
            assert_eq!(written, 1 + header + len);
            assert_eq!(buf.len(), written);
            if len >= 128 {
                assert_eq!(buf[1], 0x80 | (header as u8 - 1));
            }
            let (code, value) = one_field(&buf);
            assert_eq!(code, StatusType::Description as u8);
            assert_eq!(value, payload);
        }
    }

    #[test]
    fn test_ipv4_socket() {
        let addr: SocketAddr = "239.1.2.3:5004".parse().unwrap();
        let mut buf = Vec::new();
        encode_socket(&mut buf, StatusType::OutputDataDestSocket, &addr);
        assert_eq!(buf[1], 6);
        let (_, value) = one_field(&buf);
        assert_eq!(decode_socket(&value), Some(addr));
    }

    #[test]
    fn test_ipv6_socket_keeps_only_eight_address_bytes() {
        // Intentional: the daemon's wire format truncates IPv6 addresses to
        // their first 8 bytes. This must stay bit-compatible.
        let addr: SocketAddr = "[ff02:1:2:3:4:5:6:7]:5006".parse().unwrap();
        let mut buf = Vec::new();
        encode_socket(&mut buf, StatusType::StatusDestSocket, &addr);
        assert_eq!(buf[1], 10);
        let (_, value) = one_field(&buf);
        let decoded = decode_socket(&value).unwrap();
        assert_eq!(decoded.port(), 5006);
        assert_eq!(decoded.ip(), "ff02:1:2:3::".parse::<std::net::IpAddr>().unwrap());
        assert_ne!(decoded, addr);
    }

    #[test]
    fn test_get_ssrc_skips_other_fields() {
        let record = [
            StatusType::CommandTag as u8, 4, 0x00, 0x00, 0x00, 0x01,
            StatusType::OutputSsrc as u8, 4, 0x00, 0x00, 0x03, 0xE8,
            StatusType::Eol as u8,
        ];
        assert_eq!(get_ssrc(&record), Some(1000));
        assert_eq!(get_tag(&record), Some(1));
    }

    #[test]
    fn test_scan_stops_at_eol() {
        let mut buf = Vec::new();
        encode_int32(&mut buf, StatusType::CommandTag, 7);
        encode_eol(&mut buf);
        encode_int32(&mut buf, StatusType::OutputSsrc, 1000);
        assert_eq!(get_ssrc(&buf), None);
        assert_eq!(Fields::new(&buf).count(), 1);
    }

    #[test]
    fn test_scan_stops_at_overlong_field() {
        let record = [
            StatusType::CommandTag as u8, 1, 0x05,
            StatusType::OutputSsrc as u8, 40, 0x00, 0x00, 0x03,
        ];
        let mut fields = Fields::new(&record);
        assert_eq!(fields.next().map(|f| f.value.to_vec()), Some(vec![0x05]));
        assert!(fields.next().is_none());
        assert!(fields.truncated());
        assert_eq!(get_ssrc(&record), None);
    }

    #[test]
    fn test_scan_stops_at_missing_length_bytes() {
        let record = [StatusType::Description as u8, 0x82, 0x01];
        let mut fields = Fields::new(&record);
        assert!(fields.next().is_none());
        assert!(fields.truncated());
    }

    #[test]
    fn test_vector_layout() {
        let mut buf = Vec::new();
        encode_vector(&mut buf, StatusType::BinData, &[1.0, 0.5]);
        let (_, value) = one_field(&buf);
        assert_eq!(value.len(), 8);
        assert_eq!(decode_float(&value[..4]), 1.0);
        assert_eq!(decode_float(&value[4..]), 0.5);
    }

    proptest! {
        #[test]
        fn prop_int64_round_trip(x: u64) {
            let mut buf = Vec::new();
            encode_int64(&mut buf, StatusType::InputSamples, x);
            let (_, value) = one_field(&buf);
            prop_assert!(value.len() <= 8);
            prop_assert_eq!(decode_int64(&value), x);
        }

        #[test]
        fn prop_narrow_widths_round_trip(a: u8, b: u16, c: u32, d: i32) {
            let mut buf = Vec::new();
            encode_byte(&mut buf, StatusType::OutputTtl, a);
            encode_int16(&mut buf, StatusType::RfAgc, b);
            encode_int32(&mut buf, StatusType::OutputSsrc, c);
            encode_int(&mut buf, StatusType::DemodType, d);
            encode_eol(&mut buf);
            let values: Vec<Vec<u8>> = Fields::new(&buf).map(|f| f.value.to_vec()).collect();
            prop_assert_eq!(values.len(), 4);
            prop_assert_eq!(decode_int8(&values[0]), a);
            prop_assert_eq!(decode_int16(&values[1]), b);
            prop_assert_eq!(decode_int32(&values[2]), c);
            prop_assert_eq!(decode_int(&values[3]), d);
        }

        #[test]
        fn prop_float_round_trip(x in any::<f32>().prop_filter("not NaN", |v| !v.is_nan())) {
            let mut buf = Vec::new();
            encode_float(&mut buf, StatusType::LowEdge, x);
            let (_, value) = one_field(&buf);
            prop_assert_eq!(decode_float(&value).to_bits(), x.to_bits());
        }

        #[test]
        fn prop_double_round_trip(x in any::<f64>().prop_filter("not NaN", |v| !v.is_nan())) {
            let mut buf = Vec::new();
            encode_double(&mut buf, StatusType::RadioFrequency, x);
            let (_, value) = one_field(&buf);
            // 4-byte values are read back as floats, so only compare when
            // the zero-stripped encoding kept more than 4 bytes
            if value.len() != 4 {
                prop_assert_eq!(decode_double(&value).to_bits(), x.to_bits());
            }
        }

        #[test]
        fn prop_string_round_trip(s in "\\PC{0,300}") {
            let mut buf = Vec::new();
            encode_string(&mut buf, StatusType::Preset, &s);
            let (_, value) = one_field(&buf);
            prop_assert_eq!(decode_string(&value), s);
        }
    }
}
