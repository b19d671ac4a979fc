//! Per-session tuning and render state

use serde::Serialize;

use super::zoom::{clamp_zoom, ZOOM_TABLE};
use crate::constants::MAX_BINS;

pub const DEFAULT_FREQUENCY: u32 = 10_000_000;
pub const DEFAULT_CENTER: u32 = 16_200_000;
pub const DEFAULT_ZOOM: i32 = 1;
pub const DEFAULT_PRESET: &str = "am";

/// What the client asked the daemon for.
///
/// Guarded by the session's spectrum lock; the poller reads it every period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Tuning {
    /// Middle of the displayed span, Hz
    pub center_frequency: u32,
    /// Tuned (demodulated) frequency, Hz
    pub frequency: u32,
    /// Hz per bin
    pub bin_width: u32,
    pub bins: u32,
    pub zoom_index: i32,
    pub requested_preset: String,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            center_frequency: DEFAULT_CENTER,
            frequency: DEFAULT_FREQUENCY,
            bin_width: ZOOM_TABLE[DEFAULT_ZOOM as usize].bin_width,
            bins: MAX_BINS as u32,
            zoom_index: DEFAULT_ZOOM,
            requested_preset: DEFAULT_PRESET.to_string(),
        }
    }
}

impl Tuning {
    /// Displayed span in Hz
    pub fn span(&self) -> i64 {
        self.bin_width as i64 * self.bins as i64
    }

    /// Lowest and highest displayed frequency
    pub fn range(&self) -> (i64, i64) {
        let half = self.span() / 2;
        let center = self.center_frequency as i64;
        (center - half, center + half)
    }

    /// Set the tuned frequency from a kHz value; the sign is ignored
    pub fn set_frequency_khz(&mut self, khz: f64) -> u32 {
        self.frequency = (khz * 1000.0).abs() as u32;
        self.frequency
    }

    pub fn zoom_to(&mut self, level: i32, samprate: i32) {
        let index = clamp_zoom(level, samprate);
        let zoom = ZOOM_TABLE[index];
        self.zoom_index = index as i32;
        self.bin_width = zoom.bin_width;
        self.bins = zoom.bin_count;
    }

    pub fn zoom(&mut self, shift: i32, samprate: i32) {
        self.zoom_to(self.zoom_index.saturating_add(shift), samprate);
    }

    /// Keep the tuned frequency on screen and the span inside `[0, Nyquist]`.
    ///
    /// Recentres on the tuned frequency when it has left the span, then
    /// shifts the span up off zero or down under half the sample rate. An
    /// unknown (zero) sample rate skips the upper bound.
    pub fn check_frequency(&mut self, samprate: i32) {
        let half = self.span() / 2;
        let frequency = self.frequency as i64;
        let mut center = self.center_frequency as i64;

        if frequency < center - half || frequency > center + half {
            center = frequency;
        }
        let nyquist = samprate as i64 / 2;
        if center - half < 0 {
            center = half;
        } else if samprate > 0 && center + half > nyquist {
            center = nyquist - half;
        }
        self.center_frequency = center.clamp(0, u32::MAX as i64) as u32;
    }
}

/// Spectrum rendering state carried between frames
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderState {
    /// Weakest bin of the last frame, dB
    pub min_db: f32,
    /// Strongest bin of the last frame, dB
    pub max_db: f32,
    /// dB value of 8-bit bin 0
    pub autorange_offset: f32,
    /// dB per 8-bit step
    pub autorange_gain: f32,
    pub description_sent: bool,
    /// IF power from the last spectrum reply
    pub if_power: f32,
    /// Noise density from the last channel status, dB
    pub noise_density: f32,
}

impl Default for RenderState {
    fn default() -> Self {
        Self {
            min_db: -120.0,
            max_db: 0.0,
            autorange_offset: -130.0,
            autorange_gain: 0.1,
            description_sent: false,
            if_power: 0.0,
            noise_density: 0.0,
        }
    }
}
