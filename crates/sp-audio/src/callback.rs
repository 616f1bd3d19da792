//! Real-time audio callback
//!
//! Pull model: the host audio driver asks for N frames; the callback drains
//! the audio double buffer in chunks of whatever remains of the current
//! slot, applies the mix levels and master volume, adds the reverb return
//! and hard-limits. A slot that is not ready plays as silence for that
//! chunk; the callback never blocks, never allocates, never logs.
//!
//! Mix levels are re-sampled from the shared controls once every
//! `CONTROL_REFRESH_INTERVAL` invocations (~1 ms at 48 kHz), not per sample.

use std::sync::Arc;

use sp_core::Sample;
use sp_dsp::limit_sample;

use crate::{
    AudioDoubleBuffer, ControlSnapshot, MixControls, ReverbTap, CONTROL_REFRESH_INTERVAL,
};

/// Largest host request serviced per internal pass; bigger requests are
/// processed in slices of this size through the preallocated scratch.
const MAX_FRAMES_PER_PASS: usize = 4096;

/// Consumer-side state of the audio handoff plus the mix stage.
pub struct AudioCallback {
    buffer: Arc<AudioDoubleBuffer>,
    controls: Arc<MixControls>,
    reverb: Option<ReverbTap>,
    cached: ControlSnapshot,
    refresh_countdown: u32,
    /// Slot the callback drains; always the opposite of the write index.
    read_index: usize,
    /// Position within the current slot, in [0, B).
    read_offset: usize,
    /// Block-sized silence played when a slot is not ready.
    underruns: u64,
    /// Scratch for the interleaved entry point.
    scratch_l: Box<[Sample]>,
    scratch_r: Box<[Sample]>,
}

impl AudioCallback {
    pub fn new(
        buffer: Arc<AudioDoubleBuffer>,
        controls: Arc<MixControls>,
        reverb: Option<ReverbTap>,
    ) -> Self {
        Self {
            buffer,
            controls,
            reverb,
            cached: ControlSnapshot::default(),
            refresh_countdown: 0,
            read_index: 0,
            read_offset: 0,
            underruns: 0,
            scratch_l: vec![0.0; MAX_FRAMES_PER_PASS].into_boxed_slice(),
            scratch_r: vec![0.0; MAX_FRAMES_PER_PASS].into_boxed_slice(),
        }
    }

    /// Silent blocks emitted because the producer had not delivered.
    pub fn underruns(&self) -> u64 {
        self.underruns
    }

    /// Planar entry point: one full pull of `out_left.len()` frames.
    pub fn render_planar(&mut self, out_left: &mut [Sample], out_right: &mut [Sample]) {
        let frames = out_left.len().min(out_right.len());
        if frames == 0 {
            return;
        }

        if self.refresh_countdown == 0 {
            self.cached = self.controls.snapshot();
            self.refresh_countdown = CONTROL_REFRESH_INTERVAL;
        }
        self.refresh_countdown -= 1;

        let block = self.buffer.block_size();
        let mut done = 0;
        while done < frames {
            let n = (frames - done).min(block - self.read_offset);
            let ready = self.buffer.slot_ready(self.read_index);
            if ready {
                // SAFETY: ready observed; the borrow ends before release.
                let (slot_l, slot_r) = unsafe { self.buffer.slot_data(self.read_index) };
                mix_chunk(
                    self.cached,
                    &mut self.reverb,
                    &slot_l[self.read_offset..self.read_offset + n],
                    &slot_r[self.read_offset..self.read_offset + n],
                    &mut out_left[done..done + n],
                    &mut out_right[done..done + n],
                );
            } else {
                self.underruns += 1;
                mix_silence(
                    self.cached,
                    &mut self.reverb,
                    &mut out_left[done..done + n],
                    &mut out_right[done..done + n],
                );
            }

            self.read_offset += n;
            done += n;
            if self.read_offset == block {
                self.buffer.release_slot(self.read_index);
                self.read_index = 1 - self.read_index;
                self.read_offset = 0;
            }
        }
    }

    /// Interleaved stereo entry point (frame-major LRLR...).
    pub fn render_interleaved(&mut self, out: &mut [Sample]) {
        let mut frame = 0;
        let total = out.len() / 2;
        while frame < total {
            let n = (total - frame).min(MAX_FRAMES_PER_PASS);
            // Split the borrows: scratch is disjoint from out.
            let (mut sl, mut sr) = (std::mem::take(&mut self.scratch_l), std::mem::take(&mut self.scratch_r));
            self.render_planar(&mut sl[..n], &mut sr[..n]);
            for i in 0..n {
                out[(frame + i) * 2] = sl[i];
                out[(frame + i) * 2 + 1] = sr[i];
            }
            self.scratch_l = sl;
            self.scratch_r = sr;
            frame += n;
        }
    }

    /// Raw host contract: `out` points at planar [L..; R..] when `planar`,
    /// interleaved LRLR otherwise. Returns 0 on success, -1 on bad input.
    ///
    /// # Safety
    /// `out` must be valid for `frames * 2` writes.
    pub unsafe fn render_raw(&mut self, out: *mut Sample, frames: u32, planar: bool) -> i32 {
        if out.is_null() || frames == 0 {
            return -1;
        }
        let frames = frames as usize;
        if planar {
            let left = std::slice::from_raw_parts_mut(out, frames);
            let right = std::slice::from_raw_parts_mut(out.add(frames), frames);
            self.render_planar(left, right);
        } else {
            let data = std::slice::from_raw_parts_mut(out, frames * 2);
            self.render_interleaved(data);
        }
        0
    }

}

#[inline]
fn mix_chunk(
    cached: ControlSnapshot,
    reverb: &mut Option<ReverbTap>,
    slot_l: &[Sample],
    slot_r: &[Sample],
    out_l: &mut [Sample],
    out_r: &mut [Sample],
) {
    let mix = cached.mix_level_additive;
    let master = cached.master_volume;
    let send = cached.reverb_send_additive;
    for i in 0..slot_l.len() {
        let synth_l = slot_l[i] * mix;
        let synth_r = slot_r[i] * mix;

        let (mut wet_l, mut wet_r) = (0.0, 0.0);
        if let Some(tap) = reverb.as_mut() {
            if send > 0.0 {
                tap.write_dry((synth_l + synth_r) * 0.5 * send);
            }
            tap.read_wet(&mut wet_l, &mut wet_r);
        }

        out_l[i] = limit_sample(master * (synth_l + wet_l));
        out_r[i] = limit_sample(master * (synth_r + wet_r));
    }
}

#[inline]
fn mix_silence(
    cached: ControlSnapshot,
    reverb: &mut Option<ReverbTap>,
    out_l: &mut [Sample],
    out_r: &mut [Sample],
) {
    let master = cached.master_volume;
    for i in 0..out_l.len() {
        let (mut wet_l, mut wet_r) = (0.0, 0.0);
        if let Some(tap) = reverb.as_mut() {
            tap.read_wet(&mut wet_l, &mut wet_r);
        }
        out_l[i] = limit_sample(master * wet_l);
        out_r[i] = limit_sample(master * wet_r);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reverb_bus;
    use approx::assert_relative_eq;

    const BLOCK: usize = 32;

    fn setup() -> (Arc<AudioDoubleBuffer>, Arc<MixControls>, AudioCallback) {
        let buffer = Arc::new(AudioDoubleBuffer::new(BLOCK));
        let controls = Arc::new(MixControls::new());
        let cb = AudioCallback::new(Arc::clone(&buffer), Arc::clone(&controls), None);
        (buffer, controls, cb)
    }

    #[test]
    fn test_underrun_plays_silence() {
        let (_buffer, _controls, mut cb) = setup();
        let mut l = vec![1.0; BLOCK];
        let mut r = vec![1.0; BLOCK];
        cb.render_planar(&mut l, &mut r);
        assert!(l.iter().all(|&s| s == 0.0));
        assert!(r.iter().all(|&s| s == 0.0));
        assert!(cb.underruns() > 0);
    }

    #[test]
    fn test_pulls_produced_block() {
        let (buffer, _controls, mut cb) = setup();
        let left = vec![0.5; BLOCK];
        let right = vec![-0.5; BLOCK];
        buffer.write_block(&left, &right);

        let mut l = vec![0.0; BLOCK];
        let mut r = vec![0.0; BLOCK];
        cb.render_planar(&mut l, &mut r);
        for i in 0..BLOCK {
            assert_relative_eq!(l[i], 0.5);
            assert_relative_eq!(r[i], -0.5);
        }
        // Slot is handed back once fully drained.
        assert!(!buffer.slot_ready(0));
    }

    #[test]
    fn test_partial_reads_span_slots() {
        let (buffer, _controls, mut cb) = setup();
        buffer.write_block(&vec![0.1; BLOCK], &vec![0.1; BLOCK]);
        buffer.write_block(&vec![0.2; BLOCK], &vec![0.2; BLOCK]);

        // 1.5 blocks in one request: crosses the slot boundary.
        let frames = BLOCK + BLOCK / 2;
        let mut l = vec![0.0; frames];
        let mut r = vec![0.0; frames];
        cb.render_planar(&mut l, &mut r);
        assert_relative_eq!(l[0], 0.1);
        assert_relative_eq!(l[BLOCK - 1], 0.1);
        assert_relative_eq!(l[BLOCK], 0.2);

        // Remaining half of the second slot.
        let mut l2 = vec![0.0; BLOCK / 2];
        let mut r2 = vec![0.0; BLOCK / 2];
        cb.render_planar(&mut l2, &mut r2);
        assert!(l2.iter().all(|&s| (s - 0.2).abs() < 1e-6));
    }

    #[test]
    fn test_master_volume_and_limit() {
        let (buffer, controls, mut cb) = setup();
        controls.set_master_volume(0.5);
        buffer.write_block(&vec![0.8; BLOCK], &vec![4.0; BLOCK]);

        let mut l = vec![0.0; BLOCK];
        let mut r = vec![0.0; BLOCK];
        cb.render_planar(&mut l, &mut r);
        // Control refresh happens on the first render call.
        assert_relative_eq!(l[0], 0.4);
        // 4.0 * 0.5 = 2.0, hard-limited to 1.0.
        assert_relative_eq!(r[0], 1.0);
    }

    #[test]
    fn test_reverb_return_mixed_in() {
        let buffer = Arc::new(AudioDoubleBuffer::new(BLOCK));
        let controls = Arc::new(MixControls::new());
        let (tap, mut port) = reverb_bus(256);
        let mut cb = AudioCallback::new(Arc::clone(&buffer), controls, Some(tap));

        buffer.write_block(&vec![0.0; BLOCK], &vec![0.0; BLOCK]);
        for _ in 0..BLOCK {
            port.write_wet(0.25, -0.25);
        }

        let mut l = vec![0.0; BLOCK];
        let mut r = vec![0.0; BLOCK];
        cb.render_planar(&mut l, &mut r);
        assert_relative_eq!(l[0], 0.25);
        assert_relative_eq!(r[0], -0.25);
    }

    #[test]
    fn test_interleaved_matches_planar_layout() {
        let (buffer, _controls, mut cb) = setup();
        let left: Vec<f32> = (0..BLOCK).map(|i| i as f32 / BLOCK as f32).collect();
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        buffer.write_block(&left, &right);

        let mut out = vec![0.0; BLOCK * 2];
        cb.render_interleaved(&mut out);
        for i in 0..BLOCK {
            assert_relative_eq!(out[i * 2], left[i]);
            assert_relative_eq!(out[i * 2 + 1], right[i]);
        }
    }

    #[test]
    fn test_raw_rejects_null() {
        let (_buffer, _controls, mut cb) = setup();
        let status = unsafe { cb.render_raw(std::ptr::null_mut(), 16, true) };
        assert_eq!(status, -1);
    }
}
