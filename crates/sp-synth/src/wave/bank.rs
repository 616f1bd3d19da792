//! Oscillator bank
//!
//! One oscillator per note. The immutable half (frequency, table region,
//! stride, envelope coefficients) lives in `NoteDescriptor`; the mutable
//! half (phase, volumes, pan gains) in `NoteState`. The bank is partitioned
//! into contiguous chunks at init, one per worker, so every mutable slot
//! has exactly one writer.

use std::ops::Range;

use sp_core::{SpError, SpResult, SynthConfig, VOLUME_AMP_RESOLUTION};
use sp_dsp::{EnvelopeParams, NotePan};

use super::WaveTable;

/// Divisor applied to the legacy ramp seed; kept only for the
/// smoother-disabled fill path.
const LEGACY_RAMP_DIVISOR: f32 = 16.0;

/// Floor keeping the legacy ramp moving even where the seed sample is tiny.
const LEGACY_RAMP_MIN: f32 = 1e-4;

/// Immutable per-note parameters, fixed at init except for the envelope
/// coefficients, which are recomputed on any change to the configured time
/// constants.
#[derive(Debug, Clone, Copy)]
pub struct NoteDescriptor {
    /// Global note index.
    pub index: usize,
    /// Oscillator frequency in Hz.
    pub frequency: f32,
    /// Period length of the reference region, in samples.
    pub area_size: u32,
    /// Integer stride realizing this note's octave (2^octave).
    pub octave_coeff: u32,
    /// Reserved sub-octave divider; 1 for every note the builder emits.
    pub octave_divider: u32,
    /// First sample of the reference period in the shared table.
    pub region_offset: usize,
    /// Attack envelope coefficient.
    pub alpha_up: f32,
    /// Frequency-weighted release envelope coefficient.
    pub alpha_down_weighted: f32,
    /// Legacy linear ramp steps (smoother-disabled path only).
    pub volume_increment: f32,
    pub volume_decrement: f32,
}

/// Mutable per-note state. Written only by the worker owning the note's
/// chunk (and by the driver's serial precompute, under the same job lock).
#[derive(Debug, Clone)]
pub struct NoteState {
    /// Phase position inside the reference period; always < area_size.
    pub current_idx: u32,
    /// Smoothed envelope amplitude in [0, 1].
    pub current_volume: f32,
    /// Instantaneous target from the last preprocessed line.
    pub target_volume: f32,
    /// Pan gains latched from the snapshot for the current buffer.
    pub pan: NotePan,
    /// Gains actually applied at the end of the previous buffer; the ramp
    /// start of the next one.
    pub last_left_gain: f32,
    pub last_right_gain: f32,
}

impl Default for NoteState {
    fn default() -> Self {
        let pan = NotePan::default();
        Self {
            current_idx: 0,
            current_volume: 0.0,
            target_volume: 0.0,
            last_left_gain: pan.left,
            last_right_gain: pan.right,
            pan,
        }
    }
}

/// The full bank: descriptors for every note, states still attached.
/// `into_chunks` consumes it and hands each worker its disjoint slice.
#[derive(Debug)]
pub struct OscillatorBank {
    descriptors: Vec<NoteDescriptor>,
    states: Vec<NoteState>,
}

impl OscillatorBank {
    /// Assign every note its frequency, region and stride.
    ///
    /// Note n = c + o * (K*C) plays comma c at octave o: frequency
    /// `f(c) * 2^o`, the comma's region and area_size, stride `2^o`.
    pub fn new(config: &SynthConfig, table: &WaveTable) -> SpResult<Self> {
        let note_count = config.note_count();
        if note_count == 0 {
            return Err(SpError::InvalidParam(
                "configuration yields zero notes".into(),
            ));
        }
        let commas = table.comma_count();
        let envelope = EnvelopeParams::from_config(config);
        let f0 = config.start_frequency as f64;

        let mut descriptors = Vec::with_capacity(note_count);
        for n in 0..note_count {
            let comma = n % commas;
            let octave = (n / commas) as u32;
            let region = table.region(comma);
            let frequency =
                (f0 * 2f64.powf(comma as f64 / commas as f64) * 2f64.powi(octave as i32)) as f32;
            let octave_coeff = 1u32 << octave;

            // Legacy ramp seed: first strided sample over the volume
            // resolution, scaled down by the ramp divisor.
            let first_stride = table
                .sample(region.offset, octave_coeff % region.len as u32)
                .abs()
                / VOLUME_AMP_RESOLUTION;
            let ramp = (first_stride / LEGACY_RAMP_DIVISOR).max(LEGACY_RAMP_MIN);

            descriptors.push(NoteDescriptor {
                index: n,
                frequency,
                area_size: region.len as u32,
                octave_coeff,
                octave_divider: 1,
                region_offset: region.offset,
                alpha_up: envelope.alpha_up(),
                alpha_down_weighted: envelope.alpha_down_for(frequency),
                volume_increment: ramp,
                volume_decrement: ramp,
            });
        }

        log::info!(
            "Oscillator bank: {} notes over {} octaves, {:.2} Hz .. {:.2} Hz",
            note_count,
            note_count.div_ceil(commas),
            descriptors[0].frequency,
            descriptors[note_count - 1].frequency
        );

        Ok(Self {
            states: vec![NoteState::default(); note_count],
            descriptors,
        })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptors(&self) -> &[NoteDescriptor] {
        &self.descriptors
    }

    /// Recompute the envelope coefficients after a config change.
    pub fn set_envelope(&mut self, envelope: &EnvelopeParams) {
        for d in &mut self.descriptors {
            d.alpha_up = envelope.alpha_up();
            d.alpha_down_weighted = envelope.alpha_down_for(d.frequency);
        }
    }

    /// Contiguous near-equal ranges, one per worker. The first
    /// `len % workers` ranges take one extra note.
    pub fn partition(&self, workers: usize) -> Vec<Range<usize>> {
        partition_notes(self.len(), workers)
    }

    /// Consume the bank into per-worker (descriptors, states) chunks
    /// matching `partition(workers)`.
    pub fn into_chunks(
        mut self,
        workers: usize,
    ) -> Vec<(Vec<NoteDescriptor>, Vec<NoteState>)> {
        let ranges = self.partition(workers);
        let mut chunks = Vec::with_capacity(workers);
        for range in ranges.into_iter().rev() {
            let descs = self.descriptors.split_off(range.start);
            let states = self.states.split_off(range.start);
            chunks.push((descs, states));
        }
        chunks.reverse();
        chunks
    }
}

/// Split `count` notes into `workers` contiguous near-equal ranges.
pub fn partition_notes(count: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let base = count / workers;
    let extra = count % workers;
    let mut ranges = Vec::with_capacity(workers);
    let mut start = 0;
    for w in 0..workers {
        let len = base + usize::from(w < extra);
        ranges.push(start..start + len);
        start += len;
    }
    ranges
}
