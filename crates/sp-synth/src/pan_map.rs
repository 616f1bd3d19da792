//! Color → stereo pan mapper with lock-free publication
//!
//! Once per line (not per buffer) the driver averages each note's pixel
//! colors, maps them to pan gains and publishes the whole array atomically.
//! Publication is a two-snapshot seqlock: writers fill the inactive
//! snapshot and bump the generation; readers copy and retry if the
//! generation moved under them. The worker precompute latches one entry per
//! note per buffer and ramps toward it inside the block.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicUsize, Ordering};

use sp_dsp::{note_pan_from_color, NotePan, StereoParams};

use crate::RgbLine;

/// Two full snapshots of per-note pan state plus a generation counter.
///
/// The snapshot indexed by `generation & 1` is current; the other one is
/// the writer's scratch. An in-progress write is only ever visible as a
/// generation change, never as a half-updated array.
pub struct PanSnapshot {
    slots: [UnsafeCell<Box<[NotePan]>>; 2],
    generation: AtomicUsize,
}

// SAFETY: the writer mutates only the inactive slot (generation & 1 ^ 1)
// and publishes it with a release increment; readers copy from the active
// slot and validate the generation afterwards, retrying on any movement.
// A torn read is therefore detected and discarded, never returned.
unsafe impl Send for PanSnapshot {}
unsafe impl Sync for PanSnapshot {}

impl PanSnapshot {
    pub fn new(note_count: usize) -> Self {
        let make = || {
            UnsafeCell::new(vec![NotePan::default(); note_count].into_boxed_slice())
        };
        Self {
            slots: [make(), make()],
            generation: AtomicUsize::new(0),
        }
    }

    pub fn note_count(&self) -> usize {
        // SAFETY: lengths are fixed at construction and never change.
        unsafe { (&*self.slots[0].get()).len() }
    }

    /// Publish a full per-note array. Single writer (the synthesis thread,
    /// though a display/MIDI writer is equally valid as long as there is
    /// only one at a time).
    pub fn publish(&self, pans: &[NotePan]) {
        let generation = self.generation.load(Ordering::Relaxed);
        let inactive = (generation & 1) ^ 1;
        // SAFETY: `inactive` is not the slot readers use at this
        // generation; it becomes visible only through the release store.
        unsafe {
            let slot = &mut *self.slots[inactive].get();
            let n = slot.len().min(pans.len());
            slot[..n].copy_from_slice(&pans[..n]);
        }
        self.generation
            .store(generation.wrapping_add(1), Ordering::Release);
    }

    /// Copy the current snapshot into `out`, retrying while the writer
    /// publishes. Wait-free in the absence of writes.
    pub fn read_into(&self, out: &mut [NotePan]) {
        loop {
            let g1 = self.generation.load(Ordering::Acquire);
            let active = g1 & 1;
            // SAFETY: readers may race the writer on the other slot only;
            // the generation check below rejects a slot that flipped.
            unsafe {
                let slot = &*self.slots[active].get();
                let n = slot.len().min(out.len());
                out[..n].copy_from_slice(&slot[..n]);
            }
            if self.generation.load(Ordering::Acquire) == g1 {
                return;
            }
        }
    }

    /// Latch a single note's pan state.
    pub fn read_note(&self, note: usize) -> NotePan {
        loop {
            let g1 = self.generation.load(Ordering::Acquire);
            let active = g1 & 1;
            // SAFETY: as in `read_into`.
            let pan = unsafe {
                let slot = &*self.slots[active].get();
                slot.get(note).copied().unwrap_or_default()
            };
            if self.generation.load(Ordering::Acquire) == g1 {
                return pan;
            }
        }
    }
}

/// Mean color of each note's pixel block mapped to pan state, written to
/// `out[0..note_count]`.
pub fn compute_line_pan(
    line: &RgbLine,
    pixels_per_note: usize,
    params: &StereoParams,
    out: &mut [NotePan],
) {
    let ppn = pixels_per_note.max(1);
    let scale = 1.0 / (ppn as f32 * 255.0);
    for (n, pan) in out.iter_mut().enumerate() {
        let start = n * ppn;
        let end = ((n + 1) * ppn).min(line.len());
        if start >= end {
            *pan = NotePan::default();
            continue;
        }
        let mut r = 0u32;
        let mut g = 0u32;
        let mut b = 0u32;
        for i in start..end {
            r += line.red[i] as u32;
            g += line.green[i] as u32;
            b += line.blue[i] as u32;
        }
        *pan = note_pan_from_color(
            r as f32 * scale,
            g as f32 * scale,
            b as f32 * scale,
            params,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sp_core::SynthConfig;
    use std::sync::Arc;

    fn stereo() -> StereoParams {
        StereoParams::from_config(&SynthConfig::default())
    }

    #[test]
    fn test_snapshot_starts_centered() {
        let snap = PanSnapshot::new(8);
        let pan = snap.read_note(3);
        assert_relative_eq!(pan.position, 0.0);
        assert_relative_eq!(pan.left, pan.right);
    }

    #[test]
    fn test_publish_then_read() {
        let snap = PanSnapshot::new(4);
        let pans = vec![
            NotePan {
                left: 0.9,
                right: 0.1,
                position: -0.8,
            };
            4
        ];
        snap.publish(&pans);
        let mut out = vec![NotePan::default(); 4];
        snap.read_into(&mut out);
        assert_relative_eq!(out[2].left, 0.9);
        assert_relative_eq!(out[2].position, -0.8);
        assert_relative_eq!(snap.read_note(0).right, 0.1);
    }

    #[test]
    fn test_out_of_range_note_reads_default() {
        let snap = PanSnapshot::new(2);
        let pan = snap.read_note(99);
        assert_relative_eq!(pan.position, 0.0);
    }

    #[test]
    fn test_concurrent_reads_see_consistent_snapshots() {
        // Publish arrays where every entry equals the generation stamp; a
        // torn read would mix stamps within one copy.
        let snap = Arc::new(PanSnapshot::new(64));
        let writer = {
            let snap = Arc::clone(&snap);
            std::thread::spawn(move || {
                for gen in 0..2000u32 {
                    let stamp = gen as f32;
                    let pans = vec![
                        NotePan {
                            left: stamp,
                            right: stamp,
                            position: stamp,
                        };
                        64
                    ];
                    snap.publish(&pans);
                }
            })
        };
        let mut out = vec![NotePan::default(); 64];
        for _ in 0..2000 {
            snap.read_into(&mut out);
            let first = out[0].left;
            assert!(out.iter().all(|p| p.left == first), "torn snapshot");
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_blue_line_pans_right_red_line_left() {
        let mut line = RgbLine::new(16);
        line.fill(0, 0, 255);
        let mut out = vec![NotePan::default(); 4];
        compute_line_pan(&line, 4, &stereo(), &mut out);
        for pan in &out {
            assert!(pan.position > 0.0);
            assert!(pan.right > pan.left);
        }

        line.fill(255, 0, 0);
        compute_line_pan(&line, 4, &stereo(), &mut out);
        for pan in &out {
            assert!(pan.position < 0.0);
            assert!(pan.left > pan.right);
        }
    }

    #[test]
    fn test_split_color_line() {
        let mut line = RgbLine::new(8);
        // Left half red, right half blue.
        for i in 0..4 {
            line.red[i] = 255;
        }
        for i in 4..8 {
            line.blue[i] = 255;
        }
        let mut out = vec![NotePan::default(); 2];
        compute_line_pan(&line, 4, &stereo(), &mut out);
        assert!(out[0].position < 0.0);
        assert!(out[1].position > 0.0);
    }
}
