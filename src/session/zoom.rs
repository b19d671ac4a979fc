//! Spectrum zoom levels
//!
//! Each level is a bin width at a fixed bin count, widest span first.

use crate::constants::MAX_BINS;

/// One display span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomLevel {
    /// Hz per bin
    pub bin_width: u32,
    pub bin_count: u32,
}

impl ZoomLevel {
    const fn new(bin_width: u32) -> Self {
        Self {
            bin_width,
            bin_count: MAX_BINS as u32,
        }
    }

    /// Total displayed span in Hz
    pub fn span(&self) -> i64 {
        self.bin_width as i64 * self.bin_count as i64
    }
}

pub const ZOOM_TABLE: [ZoomLevel; 16] = [
    ZoomLevel::new(40_000),
    ZoomLevel::new(20_000),
    ZoomLevel::new(16_000),
    ZoomLevel::new(8_000),
    ZoomLevel::new(4_000),
    ZoomLevel::new(2_000),
    ZoomLevel::new(1_000),
    ZoomLevel::new(800),
    ZoomLevel::new(400),
    ZoomLevel::new(200),
    ZoomLevel::new(120),
    ZoomLevel::new(80),
    ZoomLevel::new(40),
    ZoomLevel::new(20),
    ZoomLevel::new(10),
    ZoomLevel::new(5),
];

/// At or below this input sample rate the widest level would exceed Nyquist
pub const WIDE_ZOOM_MIN_SAMPRATE: i32 = 64_800_000;

/// Clamp a requested level to the table.
///
/// Level 0 is refused (raised to 1) when the front end's sample rate is
/// [`WIDE_ZOOM_MIN_SAMPRATE`] or less.
pub fn clamp_zoom(level: i32, samprate: i32) -> usize {
    let last = ZOOM_TABLE.len() as i32 - 1;
    let mut index = level.clamp(0, last);
    if samprate <= WIDE_ZOOM_MIN_SAMPRATE && index <= 0 {
        index = 1;
    }
    index as usize
}
