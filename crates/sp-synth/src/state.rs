//! Shared display state and telemetry
//!
//! Read-side surfaces for the display/DMX collaborators: the last consumed
//! line's colors, and atomic pre-limit peak / clip counters. Neither has
//! any ordering requirement with the audio path.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::RgbLine;

/// The displayable copy of the last consumed line, one mutex for all three
/// channels.
pub struct DisplayBuffers {
    inner: Mutex<RgbLine>,
}

impl DisplayBuffers {
    pub fn new(line_len: usize) -> Self {
        Self {
            inner: Mutex::new(RgbLine::new(line_len)),
        }
    }

    /// Called by the synthesis driver after each consumed line.
    pub fn update(&self, line: &RgbLine) {
        self.inner.lock().copy_from(line);
    }

    /// Copy out the current colors (display/DMX side).
    pub fn read_into(&self, dst: &mut RgbLine) {
        dst.copy_from(&self.inner.lock());
    }
}

/// Pre-limit peaks and clip counts, sampled by diagnostics at ≈1 Hz.
/// Cache-line aligned; the synthesis thread is the only writer.
#[derive(Debug, Default)]
#[repr(align(64))]
pub struct SynthMeters {
    pre_peak_left: AtomicU32,
    pre_peak_right: AtomicU32,
    clipped_samples: AtomicU64,
    lines_processed: AtomicU64,
}

impl SynthMeters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_line(&self, pre_peak_left: f32, pre_peak_right: f32, clipped: u64) {
        self.pre_peak_left
            .store(pre_peak_left.to_bits(), Ordering::Relaxed);
        self.pre_peak_right
            .store(pre_peak_right.to_bits(), Ordering::Relaxed);
        if clipped > 0 {
            self.clipped_samples.fetch_add(clipped, Ordering::Relaxed);
        }
        self.lines_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn pre_peak_left(&self) -> f32 {
        f32::from_bits(self.pre_peak_left.load(Ordering::Relaxed))
    }

    pub fn pre_peak_right(&self) -> f32 {
        f32::from_bits(self.pre_peak_right.load(Ordering::Relaxed))
    }

    pub fn clipped_samples(&self) -> u64 {
        self.clipped_samples.load(Ordering::Relaxed)
    }

    pub fn lines_processed(&self) -> u64 {
        self.lines_processed.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_round_trip() {
        let display = DisplayBuffers::new(8);
        let mut line = RgbLine::new(8);
        line.fill(1, 2, 3);
        display.update(&line);

        let mut out = RgbLine::new(8);
        display.read_into(&mut out);
        assert_eq!(out.red[7], 1);
        assert_eq!(out.green[0], 2);
        assert_eq!(out.blue[3], 3);
    }

    #[test]
    fn test_meters_accumulate() {
        let meters = SynthMeters::new();
        meters.record_line(0.5, 0.25, 3);
        meters.record_line(0.8, 0.1, 0);
        assert_eq!(meters.pre_peak_left(), 0.8);
        assert_eq!(meters.pre_peak_right(), 0.1);
        assert_eq!(meters.clipped_samples(), 3);
        assert_eq!(meters.lines_processed(), 2);
    }
}
