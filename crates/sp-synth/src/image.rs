//! Image line double-buffer
//!
//! The handoff point between the ingest collaborator (UDP reassembler) and
//! the synthesis thread. The producer deposits a completed RGB line and
//! signals; the consumer waits with a short timeout so audio keeps flowing
//! when the image stream stalls, replaying the persisted last valid line.

use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use sp_core::LogRateLimiter;

/// One RGB line, planar u8 channels of equal length.
#[derive(Debug, Clone)]
pub struct RgbLine {
    pub red: Box<[u8]>,
    pub green: Box<[u8]>,
    pub blue: Box<[u8]>,
}

impl RgbLine {
    pub fn new(len: usize) -> Self {
        Self {
            red: vec![0; len].into_boxed_slice(),
            green: vec![0; len].into_boxed_slice(),
            blue: vec![0; len].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.red.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.red.is_empty()
    }

    pub fn copy_from(&mut self, other: &RgbLine) {
        self.red.copy_from_slice(&other.red);
        self.green.copy_from_slice(&other.green);
        self.blue.copy_from_slice(&other.blue);
    }

    /// Solid fill, mostly a test/fallback aid.
    pub fn fill(&mut self, r: u8, g: u8, b: u8) {
        self.red.fill(r);
        self.green.fill(g);
        self.blue.fill(b);
    }
}

/// Rec.601 luminance, widened to 16 bits.
pub fn rgb_to_gray16(line: &RgbLine, out: &mut [u16]) {
    debug_assert_eq!(out.len(), line.len());
    for i in 0..out.len() {
        let luma = 0.299 * line.red[i] as f32
            + 0.587 * line.green[i] as f32
            + 0.114 * line.blue[i] as f32;
        // 8-bit luma scaled so 255 maps exactly to 65535.
        out[i] = (luma * 257.0 + 0.5).min(65535.0) as u16;
    }
}

struct ImageSlots {
    active: RgbLine,
    processing: RgbLine,
    last_valid: RgbLine,
    ready: bool,
    has_valid: bool,
}

/// The shared double buffer.
pub struct ImageLineBuffer {
    inner: Mutex<ImageSlots>,
    ready_cond: Condvar,
    line_len: usize,
    bad_input_log: LogRateLimiter,
}

impl ImageLineBuffer {
    pub fn new(line_len: usize) -> Self {
        Self {
            inner: Mutex::new(ImageSlots {
                active: RgbLine::new(line_len),
                processing: RgbLine::new(line_len),
                last_valid: RgbLine::new(line_len),
                ready: false,
                has_valid: false,
            }),
            ready_cond: Condvar::new(),
            line_len,
            bad_input_log: LogRateLimiter::per_second(),
        }
    }

    #[inline]
    pub fn line_len(&self) -> usize {
        self.line_len
    }

    /// Producer side: deposit one completed line.
    ///
    /// Copies into the active slot, swaps it into the processing slot,
    /// refreshes the persisted last-valid copy and signals the consumer.
    /// A line of the wrong length is dropped (logged at a bounded rate).
    pub fn publish_line(&self, r: &[u8], g: &[u8], b: &[u8]) {
        if r.len() != self.line_len || g.len() != self.line_len || b.len() != self.line_len {
            sp_core::warn_limited!(
                self.bad_input_log,
                "Dropped image line with bad length {} (expected {})",
                r.len(),
                self.line_len
            );
            return;
        }
        let mut slots = self.inner.lock();
        slots.active.red.copy_from_slice(r);
        slots.active.green.copy_from_slice(g);
        slots.active.blue.copy_from_slice(b);

        // Swap, then persist the freshly swapped-in line.
        let ImageSlots {
            active,
            processing,
            last_valid,
            ..
        } = &mut *slots;
        std::mem::swap(active, processing);
        last_valid.copy_from(processing);

        slots.ready = true;
        slots.has_valid = true;
        drop(slots);
        self.ready_cond.notify_one();
    }

    /// Consumer side: wait up to `timeout` for a fresh line.
    ///
    /// On success copies the processing slot into `dst`, clears the ready
    /// flag and returns true. On timeout returns false and `dst` is left
    /// untouched.
    pub fn wait_line(&self, timeout: Duration, dst: &mut RgbLine) -> bool {
        let mut slots = self.inner.lock();
        if !slots.ready {
            let _ = self.ready_cond.wait_for(&mut slots, timeout);
        }
        if !slots.ready {
            return false;
        }
        dst.copy_from(&slots.processing);
        slots.ready = false;
        true
    }

    /// The persisted last valid line, for timeout replay. False when no
    /// line has ever arrived.
    pub fn get_last_valid_for_audio(&self, dst: &mut RgbLine) -> bool {
        let slots = self.inner.lock();
        if !slots.has_valid {
            return false;
        }
        dst.copy_from(&slots.last_valid);
        true
    }

    /// Whether an unconsumed line is pending.
    pub fn has_line_ready(&self) -> bool {
        self.inner.lock().ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEN: usize = 64;

    #[test]
    fn test_gray_conversion_extremes() {
        let mut line = RgbLine::new(4);
        let mut gray = [0u16; 4];
        line.fill(0, 0, 0);
        rgb_to_gray16(&line, &mut gray);
        assert_eq!(gray, [0; 4]);

        line.fill(255, 255, 255);
        rgb_to_gray16(&line, &mut gray);
        assert_eq!(gray, [65535; 4]);
    }

    #[test]
    fn test_gray_weights_order() {
        let mut line = RgbLine::new(1);
        let mut g_red = [0u16; 1];
        let mut g_green = [0u16; 1];
        let mut g_blue = [0u16; 1];
        line.fill(255, 0, 0);
        rgb_to_gray16(&line, &mut g_red);
        line.fill(0, 255, 0);
        rgb_to_gray16(&line, &mut g_green);
        line.fill(0, 0, 255);
        rgb_to_gray16(&line, &mut g_blue);
        // Rec.601: green > red > blue.
        assert!(g_green[0] > g_red[0]);
        assert!(g_red[0] > g_blue[0]);
    }

    #[test]
    fn test_publish_then_wait() {
        let buf = ImageLineBuffer::new(LEN);
        let r = vec![10u8; LEN];
        let g = vec![20u8; LEN];
        let b = vec![30u8; LEN];
        buf.publish_line(&r, &g, &b);
        assert!(buf.has_line_ready());

        let mut line = RgbLine::new(LEN);
        assert!(buf.wait_line(Duration::from_millis(1), &mut line));
        assert_eq!(line.red[0], 10);
        assert_eq!(line.green[0], 20);
        assert_eq!(line.blue[0], 30);
        assert!(!buf.has_line_ready());
    }

    #[test]
    fn test_timeout_without_producer() {
        let buf = ImageLineBuffer::new(LEN);
        let mut line = RgbLine::new(LEN);
        let start = std::time::Instant::now();
        assert!(!buf.wait_line(Duration::from_millis(10), &mut line));
        assert!(start.elapsed() >= Duration::from_millis(9));
    }

    #[test]
    fn test_last_valid_survives_consumption() {
        let buf = ImageLineBuffer::new(LEN);
        let mut line = RgbLine::new(LEN);
        assert!(!buf.get_last_valid_for_audio(&mut line));

        buf.publish_line(&[5; LEN], &[6; LEN], &[7; LEN]);
        assert!(buf.wait_line(Duration::from_millis(1), &mut line));

        let mut replay = RgbLine::new(LEN);
        assert!(buf.get_last_valid_for_audio(&mut replay));
        assert_eq!(replay.red[0], 5);
        assert_eq!(replay.blue[0], 7);
    }

    #[test]
    fn test_bad_length_dropped() {
        let buf = ImageLineBuffer::new(LEN);
        buf.publish_line(&[0; 10], &[0; 10], &[0; 10]);
        assert!(!buf.has_line_ready());
    }

    #[test]
    fn test_newer_line_overwrites_unconsumed() {
        let buf = ImageLineBuffer::new(LEN);
        buf.publish_line(&[1; LEN], &[1; LEN], &[1; LEN]);
        buf.publish_line(&[2; LEN], &[2; LEN], &[2; LEN]);
        let mut line = RgbLine::new(LEN);
        assert!(buf.wait_line(Duration::from_millis(1), &mut line));
        assert_eq!(line.red[0], 2);
    }
}
