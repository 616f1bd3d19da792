//! Per-oscillator envelope smoother ("gap limiter")
//!
//! One-pole attack/release smoothing of per-note volumes, the stage that
//! keeps sharp image transitions from clicking. Attack and release carry
//! independent time constants; the release coefficient is additionally
//! weighted by oscillator frequency so the treble can taper on its own
//! schedule without touching the bass.
//!
//! The recurrence `v += alpha * (target - v)` is inherently serial and
//! stays scalar.

use sp_core::{Sample, SynthConfig};

/// One-pole coefficient reaching ~63% of the target in `tau_secs`.
#[inline]
pub fn one_pole_alpha(tau_secs: f32, sample_rate: f32) -> f32 {
    let samples = tau_secs * sample_rate;
    if samples <= 0.0 {
        1.0
    } else {
        1.0 - (-1.0 / samples).exp()
    }
}

/// Precomputed envelope coefficients, shared by every note.
///
/// Rebuilt whenever the configured time constants change; the per-note
/// release weight is then re-derived through `alpha_down_for`.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeParams {
    /// Attack coefficient, identical for all notes.
    alpha_up: f32,
    /// Release coefficient before frequency weighting.
    alpha_down_base: f32,
    freq_ref: f32,
    beta: f32,
    weight_min: f32,
    weight_max: f32,
    alpha_min: f32,
}

impl EnvelopeParams {
    pub fn from_config(config: &SynthConfig) -> Self {
        let fs = config.sampling_frequency as f32;
        Self {
            alpha_up: one_pole_alpha(config.tau_up_secs(), fs),
            alpha_down_base: one_pole_alpha(config.tau_down_secs(), fs),
            freq_ref: config.decay_freq_ref_hz,
            beta: config.decay_freq_beta,
            weight_min: config.decay_freq_min,
            weight_max: config.decay_freq_max,
            alpha_min: config.alpha_min,
        }
    }

    /// Attack coefficient, clamped to the configured floor.
    #[inline]
    pub fn alpha_up(&self) -> f32 {
        self.alpha_up.clamp(self.alpha_min, 1.0)
    }

    /// Frequency-weighted release coefficient for one oscillator.
    ///
    /// `g(f) = clamp((f / f_ref)^-beta, [w_min, w_max])`, applied to the
    /// base release coefficient and clamped to [alpha_min, 1].
    pub fn alpha_down_for(&self, frequency: f32) -> f32 {
        let weight = (frequency / self.freq_ref)
            .powf(-self.beta)
            .clamp(self.weight_min, self.weight_max);
        (self.alpha_down_base * weight).clamp(self.alpha_min, 1.0)
    }
}

/// Run the clamped one-pole recurrence over a buffer.
///
/// Writes the smoothed trajectory from `v0` toward `target` into `dst`,
/// clamping to [lo, hi], and returns the final value (which the caller
/// persists into the oscillator).
pub fn apply_envelope_ramp(
    dst: &mut [Sample],
    v0: Sample,
    target: Sample,
    alpha: Sample,
    lo: Sample,
    hi: Sample,
) -> Sample {
    let mut v = v0;
    for s in dst.iter_mut() {
        v += alpha * (target - v);
        v = v.clamp(lo, hi);
        *s = v;
    }
    v
}

/// Instant-attack fill: jump straight to the target.
#[inline]
pub fn fill_instant(dst: &mut [Sample], target: Sample) -> Sample {
    dst.fill(target);
    target
}

/// Legacy linear volume ramp, used only when the smoother is disabled.
///
/// Steps toward the target by at most `increment` (rising) or `decrement`
/// (falling) per sample, then holds.
pub fn apply_legacy_ramp(
    dst: &mut [Sample],
    v0: Sample,
    target: Sample,
    increment: Sample,
    decrement: Sample,
    lo: Sample,
    hi: Sample,
) -> Sample {
    let mut v = v0;
    for s in dst.iter_mut() {
        if v < target {
            v = (v + increment).min(target);
        } else if v > target {
            v = (v - decrement).max(target);
        }
        v = v.clamp(lo, hi);
        *s = v;
    }
    v
}
