//! Spectrum frames
//!
//! The daemon answers a spectrum poll on the session's companion SSRC with
//! linear bin powers in FFT order. They are turned into one browser frame:
//!
//! ```text
//! RTP header (PT 0x7F)
//! bins, centre, frequency, bin width          u32 big-endian
//! telemetry trailer                           little-endian, fixed layout
//! bins in display order                       1, 2 or 4 bytes each
//! ```
//!
//! Display order puts the upper half of the FFT output (negative
//! frequencies) first, so the bins ascend in frequency across the centre.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::constants::{MAX_BINS, PT_SPECTRUM};
use crate::error::ProtocolError;
use crate::protocol::status::power_to_db;
use crate::protocol::tlv::{decode_float, decode_int, decode_int32, Fields};
use crate::protocol::{DaemonState, DemodType, RtpHeader, StatusType};
use crate::session::{RenderState, Tuning};

/// dB reported for a zero-power bin at 2 and 4 bytes
pub const FLOOR_DB: f32 = -120.0;

/// dB used for a zero-power bin at 1 byte
pub const FLOOR_DB_BYTE: f32 = -127.0;

/// Largest magnitude a centi-dB `i16` can carry
pub const FIXED_POINT_LIMIT_DB: f32 = 327.67;

/// Bytes per bin on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum BinPrecision {
    /// Auto-ranged 0..=255
    Byte,
    /// Signed centi-dB
    Short,
    /// dB as IEEE float
    #[default]
    Float,
}

impl From<i32> for BinPrecision {
    /// Anything other than 1 or 2 is full precision
    fn from(bytes: i32) -> Self {
        match bytes {
            1 => BinPrecision::Byte,
            2 => BinPrecision::Short,
            _ => BinPrecision::Float,
        }
    }
}

impl From<BinPrecision> for i32 {
    fn from(precision: BinPrecision) -> i32 {
        precision.bytes() as i32
    }
}

impl BinPrecision {
    pub fn bytes(self) -> usize {
        match self {
            BinPrecision::Byte => 1,
            BinPrecision::Short => 2,
            BinPrecision::Float => 4,
        }
    }
}

/// Bin powers pulled from one spectrum reply
#[derive(Debug, Clone, PartialEq)]
pub struct Powers {
    /// Linear, FFT order
    pub bins: Vec<f32>,
    pub min_db: f32,
    pub max_db: f32,
    /// IF power carried by the reply, dB
    pub if_power: Option<f32>,
}

/// Pull the bins out of a spectrum reply for `companion`.
///
/// The reply is refused when it belongs to another SSRC or demodulator, when
/// its bin count disagrees with its bin data, when it carries more than
/// [`MAX_BINS`], or while `fft_size` (the daemon's `L + M - 1`) is still 0.
pub fn extract_powers(
    record: &[u8],
    companion: u32,
    fft_size: i64,
) -> Result<Powers, ProtocolError> {
    let mut declared = None;
    let mut data = None;
    let mut if_power = None;

    for field in Fields::new(record) {
        match field.kind() {
            Some(StatusType::OutputSsrc) => {
                let found = decode_int32(field.value);
                if found != companion {
                    return Err(ProtocolError::WrongSsrc {
                        expected: companion,
                        found,
                    });
                }
            }
            Some(StatusType::DemodType) => {
                let demod = decode_int(field.value);
                if demod != DemodType::Spectrum as i32 {
                    return Err(ProtocolError::NotSpectrum(demod));
                }
            }
            Some(StatusType::BinCount) => declared = Some(decode_int(field.value)),
            Some(StatusType::BinData) => data = Some(field.value),
            Some(StatusType::IfPower) => if_power = Some(decode_float(field.value)),
            _ => {}
        }
    }
    if fft_size == 0 {
        return Err(ProtocolError::NoFilterGeometry);
    }

    let declared = declared.unwrap_or(0).max(0) as usize;
    let data = data.unwrap_or_default();
    let actual = data.len() / 4;
    if data.is_empty() || declared != actual {
        return Err(ProtocolError::BinCountMismatch { declared, actual });
    }
    if actual > MAX_BINS {
        return Err(ProtocolError::TooManyBins(actual));
    }

    let bins: Vec<f32> = data
        .chunks_exact(4)
        .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    let (min, max) = bins
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &p| {
            (lo.min(p), hi.max(p))
        });

    Ok(Powers {
        min_db: power_to_db(min, FLOOR_DB),
        max_db: power_to_db(max, FLOOR_DB),
        bins,
        if_power,
    })
}

/// FFT-order bins in ascending frequency order
pub fn display_order(bins: &[f32]) -> impl Iterator<Item = &f32> {
    let (low, high) = bins.split_at(bins.len() / 2);
    high.iter().chain(low.iter())
}

/// Rescale the 8-bit range if the last frame's bounds need it.
///
/// A rescale happens when a bin would clip at either end, or when the bins
/// fill less than half of a range wider than 41 dB. Returns true if the
/// offset and gain changed.
pub fn update_autorange(render: &mut RenderState) -> bool {
    let span = 255.0 * render.autorange_gain;
    let clips = render.min_db < render.autorange_offset
        || render.max_db > render.autorange_offset + span;
    let sparse = render.max_db - render.min_db < 0.5 * span && span > 41.0;
    if !(clips || sparse) {
        return false;
    }

    let offset = 10.0 * (render.min_db / 10.0 - 1.0).floor();
    let mut gain = (10.0 * (render.max_db / 10.0 + 1.0).ceil() - offset) / 255.0;
    if gain == 0.0 {
        gain = 1.0;
    }
    render.autorange_offset = offset;
    render.autorange_gain = gain;
    true
}

/// One linear power as a wire bin
fn quantize<B: BufMut>(buf: &mut B, power: f32, precision: BinPrecision, render: &RenderState) {
    match precision {
        BinPrecision::Float => buf.put_f32_le(power_to_db(power, FLOOR_DB)),
        BinPrecision::Short => {
            let db = power_to_db(power, FLOOR_DB).clamp(-FIXED_POINT_LIMIT_DB, FIXED_POINT_LIMIT_DB);
            buf.put_i16_le((db * 100.0) as i16);
        }
        BinPrecision::Byte => {
            let db = power_to_db(power, FLOOR_DB_BYTE);
            let level = (db - render.autorange_offset) / render.autorange_gain;
            buf.put_u8(level.clamp(0.0, 255.0) as u8);
        }
    }
}

/// Size of a spectrum frame after the RTP header, before the bins
pub const SPECTRUM_HEADER_LEN: usize = 16 + 4 + 4 + 8 * 5 + 4 * 5 + 4 + 4 + 4 + 4;

/// Write the fixed header, trailer and bins
pub fn encode_spectrum<B: BufMut>(
    buf: &mut B,
    tuning: &Tuning,
    daemon: &DaemonState,
    render: &RenderState,
    precision: BinPrecision,
    bins: &[f32],
) {
    let fe = &daemon.frontend;

    buf.put_u32(tuning.bins);
    buf.put_u32(tuning.center_frequency);
    buf.put_u32(tuning.frequency);
    buf.put_u32(tuning.bin_width);

    buf.put_u32_le(fe.samprate as u32);
    buf.put_i32_le(fe.rf_agc);
    buf.put_u64_le(fe.samples);
    buf.put_u64_le(fe.overranges);
    buf.put_u64_le(fe.samp_since_over);
    buf.put_u64_le(fe.timestamp as u64);
    buf.put_u64_le(daemon.channel.status.blocks_since_poll);
    buf.put_f32_le(fe.rf_atten);
    buf.put_f32_le(fe.rf_gain);
    buf.put_f32_le(fe.rf_level_cal);
    buf.put_f32_le(render.if_power);
    buf.put_f32_le(render.noise_density);
    buf.put_i32_le(tuning.zoom_index);
    buf.put_i32_le(precision.bytes() as i32);
    buf.put_f32_le(render.autorange_offset);
    buf.put_f32_le(render.autorange_gain);

    for &power in display_order(bins) {
        quantize(buf, power, precision, render);
    }
}

/// A complete spectrum frame for session `ssrc`
pub fn spectrum_frame(
    ssrc: u32,
    seq: u16,
    tuning: &Tuning,
    daemon: &DaemonState,
    render: &RenderState,
    precision: BinPrecision,
    bins: &[f32],
) -> Bytes {
    let header = RtpHeader::new(PT_SPECTRUM, seq, 0, ssrc).with_marker(true);
    let mut buf = BytesMut::with_capacity(
        header.encoded_len() + SPECTRUM_HEADER_LEN + bins.len() * precision.bytes(),
    );
    header.encode(&mut buf);
    encode_spectrum(&mut buf, tuning, daemon, render, precision, bins);
    buf.freeze()
}
