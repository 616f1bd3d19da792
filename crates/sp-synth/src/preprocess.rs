//! Per-line preprocessing: pixels to per-note target volumes
//!
//! Each note owns a contiguous block of pixels; its target is the block's
//! mean 16-bit luminance, normalized to the volume range. Safe to call in
//! parallel on disjoint note ranges (each worker preprocesses its own
//! range).

use std::ops::Range;

use sp_core::{Sample, SynthConfig, LUMA_FULL_SCALE, VOLUME_AMP_RESOLUTION};

/// The preprocessing slice of the configuration, copied per line so the
/// workers never reach back into shared config.
#[derive(Debug, Clone, Copy)]
pub struct PreprocessParams {
    pub pixels_per_note: usize,
    pub invert_intensity: bool,
    pub relative_mode: bool,
    /// 1.0 disables the gamma mapping.
    pub gamma: f32,
}

impl PreprocessParams {
    pub fn from_config(config: &SynthConfig) -> Self {
        Self {
            pixels_per_note: config.pixels_per_note,
            invert_intensity: config.invert_intensity,
            relative_mode: config.relative_mode,
            gamma: config.gamma_value,
        }
    }
}

/// Compute targets for the notes in `range`; `out[k]` receives the target
/// of note `range.start + k`.
///
/// Pipeline per note: block mean → normalize → optional invert → clamp →
/// note 0 forced silent → optional relative (consecutive difference within
/// the range) → optional gamma.
pub fn compute_note_targets(
    gray: &[u16],
    range: Range<usize>,
    params: &PreprocessParams,
    out: &mut [Sample],
) {
    debug_assert_eq!(out.len(), range.len());
    let ppn = params.pixels_per_note.max(1);
    let u = VOLUME_AMP_RESOLUTION;
    let block_scale = 1.0 / (ppn as f32 * LUMA_FULL_SCALE) * u;

    for (k, n) in range.clone().enumerate() {
        let start = n * ppn;
        let end = ((n + 1) * ppn).min(gray.len());
        if start >= end {
            out[k] = 0.0;
            continue;
        }
        let sum: u32 = gray[start..end].iter().map(|&v| v as u32).sum();
        let mut value = sum as f32 * block_scale;

        if params.invert_intensity {
            value = u - value;
        }
        value = value.clamp(0.0, u);
        // The lowest bin stays silent (historical bias correction).
        if n == 0 {
            value = 0.0;
        }
        out[k] = value;
    }

    if params.relative_mode {
        // Consecutive difference emphasizes edges; clipped to [0, U]. The
        // first note of the range keeps its absolute value so disjoint
        // ranges stay independent.
        for k in (1..out.len()).rev() {
            out[k] = (out[k] - out[k - 1]).clamp(0.0, u);
        }
    }

    if (params.gamma - 1.0).abs() > 1e-6 {
        let inv_u = 1.0 / u;
        for v in out.iter_mut() {
            *v = (*v * inv_u).powf(params.gamma) * u;
        }
    }
}
