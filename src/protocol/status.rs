//! Daemon status model
//!
//! The daemon describes itself and each of its channels with TLV status
//! records. [`decode_status`] applies one record onto a [`DaemonState`],
//! field by field; fields this build does not track are skipped.

use serde::Serialize;
use std::net::SocketAddr;

use super::fields::StatusType;
use super::tlv::{self, Fields};

/// Convert a dB value to a power ratio
pub fn db_to_power(db: f32) -> f32 {
    10f32.powf(db / 10.0)
}

/// Convert a dB value to a voltage ratio
pub fn db_to_voltage(db: f32) -> f32 {
    10f32.powf(db / 20.0)
}

/// Convert a power ratio to dB, with zero mapped to `floor` instead of -inf
pub fn power_to_db(power: f32, floor: f32) -> f32 {
    if power == 0.0 {
        floor
    } else {
        10.0 * power.log10()
    }
}

/// Radio front end (the SDR hardware as the daemon sees it)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Frontend {
    pub description: String,
    pub samprate: i32,
    /// GPS time of the last status, nanoseconds
    pub timestamp: i64,
    /// First LO frequency, Hz
    pub frequency: f64,
    pub samples: u64,
    pub overranges: u64,
    pub samp_since_over: u64,
    /// Filter block size
    pub l: i32,
    /// Filter impulse length
    pub m: i32,
    pub min_if: f32,
    pub max_if: f32,
    pub isreal: bool,
    pub bits_per_sample: i32,
    /// Linear power
    pub if_power: f32,
    pub rf_gain: f32,
    pub rf_atten: f32,
    pub rf_level_cal: f32,
    pub rf_agc: i32,
    pub metadata_dest: Option<SocketAddr>,
}

impl Frontend {
    /// `L + M - 1`, zero until the daemon has reported its filter
    pub fn fft_size(&self) -> i64 {
        if self.l == 0 && self.m == 0 {
            0
        } else {
            self.l as i64 + self.m as i64 - 1
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Tune {
    pub freq: f64,
    pub second_lo: f64,
    pub shift: f64,
    pub doppler: f64,
    pub doppler_rate: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Output {
    pub ssrc: u32,
    pub samprate: i32,
    pub channels: i32,
    pub dest_socket: Option<SocketAddr>,
    pub source_socket: Option<SocketAddr>,
    pub rtp_pt: i32,
    pub encoding: i32,
    pub ttl: u8,
    /// Linear power
    pub power: f32,
    /// Voltage ratio
    pub gain: f32,
    /// Voltage ratio
    pub headroom: f32,
    pub samples: u64,
    pub data_packets: u64,
    pub errors: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChannelStatus {
    pub tag: u32,
    pub packets_in: u32,
    pub packets_out: u64,
    pub blocks_since_poll: u64,
    pub output_interval: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpectrumParams {
    pub bin_bw: f32,
    pub bin_count: i32,
}

/// One daemon channel (demodulator instance), as last reported
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channel {
    pub tune: Tune,
    /// Filter passband edges relative to the tuned frequency, Hz
    pub min_if: f32,
    pub max_if: f32,
    pub demod_type: i32,
    pub preset: String,
    pub clocktime: i64,
    /// Baseband power, linear
    pub bb_power: f32,
    /// Noise spectral density, linear
    pub n0: f32,
    pub freq_offset: f32,
    pub pll_lock: bool,
    pub pll_enable: bool,
    /// Linear
    pub pll_snr: f32,
    pub snr_squelch: bool,
    /// Linear
    pub squelch_open: f32,
    /// Linear
    pub squelch_close: f32,
    pub output: Output,
    pub status: ChannelStatus,
    pub spectrum: SpectrumParams,
}

/// Everything the gateway knows about the daemon
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DaemonState {
    pub frontend: Frontend,
    pub channel: Channel,
}

/// Apply one status record onto `state`.
///
/// Stops at the end-of-list marker or at the first malformed field; fields
/// before that point stay applied. Returns the number of fields recognised.
pub fn decode_status(record: &[u8], state: &mut DaemonState) -> usize {
    let mut applied = 0;
    for field in Fields::new(record) {
        let Some(kind) = field.kind() else {
            continue;
        };
        if apply_field(kind, field.value, state) {
            applied += 1;
        }
    }
    applied
}

fn apply_field(kind: StatusType, v: &[u8], state: &mut DaemonState) -> bool {
    let fe = &mut state.frontend;
    let ch = &mut state.channel;
    match kind {
        StatusType::CommandTag => ch.status.tag = tlv::decode_int32(v),
        StatusType::CmdCnt => ch.status.packets_in = tlv::decode_int32(v),
        StatusType::Description => fe.description = tlv::decode_string(v),
        StatusType::StatusDestSocket => fe.metadata_dest = tlv::decode_socket(v),
        StatusType::GpsTime => {
            ch.clocktime = tlv::decode_int64(v) as i64;
            fe.timestamp = ch.clocktime;
        }
        StatusType::InputSamprate => fe.samprate = tlv::decode_int(v),
        StatusType::InputSamples => fe.samples = tlv::decode_int64(v),
        StatusType::AdOver => fe.overranges = tlv::decode_int64(v),
        StatusType::SamplesSinceOver => fe.samp_since_over = tlv::decode_int64(v),
        StatusType::OutputDataSourceSocket => ch.output.source_socket = tlv::decode_socket(v),
        StatusType::OutputDataDestSocket => ch.output.dest_socket = tlv::decode_socket(v),
        StatusType::OutputSsrc => ch.output.ssrc = tlv::decode_int32(v),
        StatusType::OutputTtl => ch.output.ttl = tlv::decode_int8(v),
        StatusType::OutputSamprate => ch.output.samprate = tlv::decode_int(v),
        StatusType::OutputDataPackets => ch.output.data_packets = tlv::decode_int64(v),
        StatusType::OutputMetadataPackets => ch.status.packets_out = tlv::decode_int64(v),
        StatusType::OutputErrors => ch.output.errors = tlv::decode_int64(v),
        StatusType::OutputChannels => ch.output.channels = tlv::decode_int(v),
        StatusType::OutputSamples => ch.output.samples = tlv::decode_int64(v),
        StatusType::OutputLevel => ch.output.power = db_to_power(tlv::decode_float(v)),
        StatusType::OutputEncoding => ch.output.encoding = tlv::decode_int(v),
        StatusType::RtpPt => ch.output.rtp_pt = tlv::decode_int(v),
        StatusType::Gain => ch.output.gain = db_to_voltage(tlv::decode_float(v)),
        StatusType::Headroom => ch.output.headroom = db_to_voltage(tlv::decode_float(v)),
        StatusType::FilterBlocksize => fe.l = tlv::decode_int(v),
        StatusType::FilterFirLength => fe.m = tlv::decode_int(v),
        StatusType::LowEdge => ch.min_if = tlv::decode_float(v),
        StatusType::HighEdge => ch.max_if = tlv::decode_float(v),
        StatusType::FeLowEdge => fe.min_if = tlv::decode_float(v),
        StatusType::FeHighEdge => fe.max_if = tlv::decode_float(v),
        StatusType::FeIsreal => fe.isreal = tlv::decode_bool(v),
        StatusType::AdBitsPerSample => fe.bits_per_sample = tlv::decode_int(v),
        StatusType::IfPower => fe.if_power = db_to_power(tlv::decode_float(v)),
        StatusType::BasebandPower => ch.bb_power = db_to_power(tlv::decode_float(v)),
        StatusType::NoiseDensity => ch.n0 = db_to_power(tlv::decode_float(v)),
        StatusType::FreqOffset => ch.freq_offset = tlv::decode_float(v),
        StatusType::PllLock => ch.pll_lock = tlv::decode_bool(v),
        StatusType::PllEnable => ch.pll_enable = tlv::decode_bool(v),
        StatusType::PllSnr => ch.pll_snr = db_to_power(tlv::decode_float(v)),
        StatusType::SnrSquelch => ch.snr_squelch = tlv::decode_bool(v),
        StatusType::SquelchOpen => ch.squelch_open = db_to_power(tlv::decode_float(v)),
        StatusType::SquelchClose => ch.squelch_close = db_to_power(tlv::decode_float(v)),
        StatusType::RadioFrequency => ch.tune.freq = tlv::decode_double(v),
        StatusType::SecondLoFrequency => ch.tune.second_lo = tlv::decode_double(v),
        StatusType::ShiftFrequency => ch.tune.shift = tlv::decode_double(v),
        StatusType::FirstLoFrequency => fe.frequency = tlv::decode_double(v),
        StatusType::DopplerFrequency => ch.tune.doppler = tlv::decode_double(v),
        StatusType::DopplerFrequencyRate => ch.tune.doppler_rate = tlv::decode_double(v),
        StatusType::DemodType => ch.demod_type = tlv::decode_int(v),
        StatusType::Preset => ch.preset = tlv::decode_string(v),
        StatusType::NoncoherentBinBw => ch.spectrum.bin_bw = tlv::decode_float(v),
        StatusType::BinCount => ch.spectrum.bin_count = tlv::decode_int(v),
        StatusType::RfAgc => fe.rf_agc = tlv::decode_int(v),
        StatusType::RfGain => fe.rf_gain = tlv::decode_float(v),
        StatusType::RfAtten => fe.rf_atten = tlv::decode_float(v),
        StatusType::RfLevelCal => fe.rf_level_cal = tlv::decode_float(v),
        StatusType::BlocksSincePoll => ch.status.blocks_since_poll = tlv::decode_int64(v),
        StatusType::StatusInterval => ch.status.output_interval = tlv::decode_int(v),
        // Bin data is extracted separately by the spectrum builder
        _ => return false,
    }
    true
}
