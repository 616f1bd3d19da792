//! Color temperature and stereo pan laws
//!
//! Maps the mean color of a note's pixel block to a stereo position
//! (blue = warm = right-positive, red = cold = left-negative by default
//! weighting) and converts positions to channel gains. The per-sample ramp
//! kernels interpolate gains across one synthesis block so a pan jump
//! between two image lines never steps discontinuously.

use sp_core::{Sample, SynthConfig};

/// Pan law selection (runtime, from configuration).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PanLaw {
    /// L = cos((t+1)π/4), R = sin((t+1)π/4); L² + R² constant.
    #[default]
    ConstantPower,
    /// L = (1-t)/2, R = (1+t)/2; L + R constant.
    Linear,
}

/// Per-note pan state published by the mapper and latched by the workers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NotePan {
    pub left: Sample,
    pub right: Sample,
    /// Position in [-1, +1], kept for display collaborators.
    pub position: Sample,
}

impl Default for NotePan {
    fn default() -> Self {
        // Center under the constant-power law.
        let g = std::f32::consts::FRAC_1_SQRT_2;
        Self {
            left: g,
            right: g,
            position: 0.0,
        }
    }
}

/// Stereo mapping parameters, a copy of the relevant configuration slice.
#[derive(Debug, Clone, Copy)]
pub struct StereoParams {
    pub blue_red_weight: f32,
    pub cyan_yellow_weight: f32,
    pub amplification: f32,
    pub curve_exponent: f32,
    pub law: PanLaw,
    pub center_threshold: f32,
    pub center_boost: f32,
}

impl StereoParams {
    pub fn from_config(config: &SynthConfig) -> Self {
        Self {
            blue_red_weight: config.stereo_blue_red_weight,
            cyan_yellow_weight: config.stereo_cyan_yellow_weight,
            amplification: config.stereo_temperature_amplification,
            curve_exponent: config.stereo_temperature_curve_exponent,
            law: if config.stereo_pan_law_constant_power {
                PanLaw::ConstantPower
            } else {
                PanLaw::Linear
            },
            center_threshold: config.stereo_center_compensation_threshold,
            center_boost: config.stereo_center_boost_factor,
        }
    }
}

/// Color temperature of one note, in [-1, +1].
///
/// Inputs are channel means normalized to [0, 1]. Blue pushes positive,
/// red negative; the second axis weighs cyan against yellow. The amplified
/// temperature is shaped by an odd power (sign-preserving for fractional
/// exponents) and clamped.
pub fn color_temperature(r: f32, g: f32, b: f32, params: &StereoParams) -> f32 {
    let blue_red = b - r;
    let cyan_yellow = (g + b) * 0.5 - (r + g) * 0.5;
    let raw = params.blue_red_weight * blue_red + params.cyan_yellow_weight * cyan_yellow;
    let amplified = raw * params.amplification;
    let shaped = amplified.signum() * amplified.abs().powf(params.curve_exponent);
    shaped.clamp(-1.0, 1.0)
}

/// Convert a temperature to (left, right) gains under the configured law,
/// with the near-center boost applied and the result clamped to [0, 1].
pub fn pan_gains(t: f32, params: &StereoParams) -> (Sample, Sample) {
    let t = t.clamp(-1.0, 1.0);
    let (mut l, mut r) = match params.law {
        PanLaw::ConstantPower => {
            let angle = (t + 1.0) * std::f32::consts::FRAC_PI_4;
            (angle.cos(), angle.sin())
        }
        PanLaw::Linear => ((1.0 - t) * 0.5, (1.0 + t) * 0.5),
    };
    if t.abs() < params.center_threshold {
        l *= params.center_boost;
        r *= params.center_boost;
    }
    (l.clamp(0.0, 1.0), r.clamp(0.0, 1.0))
}

/// Full mapping: mean color of a note's pixel block to its pan state.
pub fn note_pan_from_color(r: f32, g: f32, b: f32, params: &StereoParams) -> NotePan {
    let t = color_temperature(r, g, b, params);
    let (left, right) = pan_gains(t, params);
    NotePan {
        left,
        right,
        position: t,
    }
}

/// Per-sample pan ramp: linearly interpolate gains from (gl0, gr0) to
/// (gl1, gr1) across the block and multiply by the mono input.
pub fn apply_stereo_pan_ramp(
    mono: &[Sample],
    left_out: &mut [Sample],
    right_out: &mut [Sample],
    gl0: Sample,
    gr0: Sample,
    gl1: Sample,
    gr1: Sample,
) {
    debug_assert!(left_out.len() == mono.len() && right_out.len() == mono.len());
    let len = mono.len();
    if len == 0 {
        return;
    }
    let inv = 1.0 / len as f32;
    let dl = (gl1 - gl0) * inv;
    let dr = (gr1 - gr0) * inv;
    let mut gl = gl0;
    let mut gr = gr0;
    for i in 0..len {
        gl += dl;
        gr += dr;
        left_out[i] = mono[i] * gl;
        right_out[i] = mono[i] * gr;
    }
}

/// Accumulating variant used by the workers: `l_acc += mono * ramp(l)`,
/// `r_acc += mono * ramp(r)`.
pub fn pan_ramp_add(
    mono: &[Sample],
    left_acc: &mut [Sample],
    right_acc: &mut [Sample],
    gl0: Sample,
    gr0: Sample,
    gl1: Sample,
    gr1: Sample,
) {
    debug_assert!(left_acc.len() == mono.len() && right_acc.len() == mono.len());
    let len = mono.len();
    if len == 0 {
        return;
    }
    let inv = 1.0 / len as f32;
    let dl = (gl1 - gl0) * inv;
    let dr = (gr1 - gr0) * inv;
    let mut gl = gl0;
    let mut gr = gr0;
    for i in 0..len {
        gl += dl;
        gr += dr;
        left_acc[i] += mono[i] * gl;
        right_acc[i] += mono[i] * gr;
    }
}
