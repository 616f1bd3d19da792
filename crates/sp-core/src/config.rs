//! Engine configuration
//!
//! The full option set read at init. The host (CLI / config file reader)
//! owns parsing; this type owns defaults, validation and derived values.

use serde::{Deserialize, Serialize};

use crate::{SpError, SpResult, MAX_NOTES};

/// Complete configuration of the synthesis core.
///
/// Every field has a sensible default; `validate()` must pass before the
/// engine is constructed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    // ── Audio format ────────────────────────────────────────────────────
    /// Output sample rate in Hz.
    pub sampling_frequency: u32,
    /// Synthesis block size B, in frames. One image line produces exactly
    /// one block per channel.
    pub audio_buffer_size: usize,

    // ── Image geometry ──────────────────────────────────────────────────
    /// Pixels per scanned line (P).
    pub pixels_per_image: usize,
    /// Contiguous pixels averaged into one oscillator. The number of notes
    /// is `pixels_per_image / pixels_per_note`, capped by `MAX_NOTES`.
    pub pixels_per_note: usize,

    // ── Scale layout ────────────────────────────────────────────────────
    /// Frequency of note 0, in Hz.
    pub start_frequency: f32,
    /// Semitones per octave (K).
    pub semitones_per_octave: u32,
    /// Commas per semitone (C). One oscillator per comma, K*C per octave.
    pub commas_per_semitone: u32,

    // ── Preprocessing ───────────────────────────────────────────────────
    /// Dark pixels loud instead of bright pixels loud.
    pub invert_intensity: bool,
    /// Gamma applied to note targets; 1.0 disables.
    pub gamma_value: f32,
    /// Consecutive-difference edge emphasis.
    pub relative_mode: bool,

    // ── Envelope smoother ───────────────────────────────────────────────
    /// Attack time constant, in ms.
    pub tau_up_base_ms: f32,
    /// Release time constant, in ms, before frequency weighting.
    pub tau_down_base_ms: f32,
    /// Reference frequency of the release weighting curve, in Hz.
    pub decay_freq_ref_hz: f32,
    /// Exponent of the release weighting curve.
    pub decay_freq_beta: f32,
    /// Lower clamp of the release weighting factor.
    pub decay_freq_min: f32,
    /// Upper clamp of the release weighting factor.
    pub decay_freq_max: f32,
    /// Lower clamp of the final envelope coefficients.
    pub alpha_min: f32,
    /// Jump straight to the target on attack; release path unchanged.
    pub instant_attack: bool,
    /// Disable to fall back to the legacy linear volume ramp.
    pub gap_limiter_enabled: bool,

    // ── Stereo ──────────────────────────────────────────────────────────
    /// Duplicate the mono pre-output on both channels when false.
    pub stereo_mode_enabled: bool,
    /// Weight of the blue-minus-red axis in the color temperature.
    pub stereo_blue_red_weight: f32,
    /// Weight of the cyan-minus-yellow axis in the color temperature.
    pub stereo_cyan_yellow_weight: f32,
    /// Gain applied to the raw temperature before shaping.
    pub stereo_temperature_amplification: f32,
    /// Odd power applied to the amplified temperature for contrast.
    pub stereo_temperature_curve_exponent: f32,
    /// Equal-power pan law when true, linear when false.
    pub stereo_pan_law_constant_power: bool,
    /// |temperature| below which the center boost applies.
    pub stereo_center_compensation_threshold: f32,
    /// Gain boost applied to both channels near center.
    pub stereo_center_boost_factor: f32,

    // ── Output shaping ──────────────────────────────────────────────────
    /// Grayscale sampling stride of the contrast estimator.
    pub additive_contrast_stride: usize,
    /// Floor of the contrast factor (the gamma_min of the mix stage).
    pub additive_contrast_min: f32,
    /// Response power of the contrast estimator.
    pub additive_contrast_adjustment_power: f32,
    /// Exponent p of the volume weighting `sum += (v/U)^p * U`.
    pub volume_weighting_exponent: f32,
    /// Merged buffers are scaled by the reciprocal. Defaults by a runtime
    /// platform probe; hosts with a non-amplifying stack should set 1.
    pub platform_amplification_divisor: f32,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sampling_frequency: 48_000,
            audio_buffer_size: 256,
            pixels_per_image: 3456,
            pixels_per_note: 4,
            start_frequency: 65.41,
            semitones_per_octave: 12,
            commas_per_semitone: 12,
            invert_intensity: false,
            gamma_value: 1.0,
            relative_mode: false,
            tau_up_base_ms: 3.0,
            tau_down_base_ms: 60.0,
            decay_freq_ref_hz: 440.0,
            decay_freq_beta: 0.4,
            decay_freq_min: 0.25,
            decay_freq_max: 4.0,
            alpha_min: 1e-5,
            instant_attack: false,
            gap_limiter_enabled: true,
            stereo_mode_enabled: true,
            stereo_blue_red_weight: 0.7,
            stereo_cyan_yellow_weight: 0.3,
            stereo_temperature_amplification: 2.0,
            stereo_temperature_curve_exponent: 3.0,
            stereo_pan_law_constant_power: true,
            stereo_center_compensation_threshold: 0.1,
            stereo_center_boost_factor: 1.1,
            additive_contrast_stride: 16,
            additive_contrast_min: 0.5,
            additive_contrast_adjustment_power: 0.5,
            volume_weighting_exponent: 1.0,
            platform_amplification_divisor: default_amplification_divisor(),
        }
    }
}

/// Runtime probe for the platform amplification constant.
///
/// Linux-style audio stacks are known to amplify the merged buffers; the
/// historical compensation is 1/3. Never decided by a build macro: the host
/// may override the probed value at init.
pub fn default_amplification_divisor() -> f32 {
    if cfg!(target_os = "linux") {
        3.0
    } else {
        1.0
    }
}

impl SynthConfig {
    /// Number of oscillators derived from the image geometry.
    #[inline]
    pub fn note_count(&self) -> usize {
        (self.pixels_per_image / self.pixels_per_note).min(MAX_NOTES)
    }

    /// Oscillators per octave (K * C).
    #[inline]
    pub fn commas_per_octave(&self) -> u32 {
        self.semitones_per_octave * self.commas_per_semitone
    }

    /// Attack time constant in seconds.
    #[inline]
    pub fn tau_up_secs(&self) -> f32 {
        self.tau_up_base_ms * 1e-3
    }

    /// Release time constant in seconds.
    #[inline]
    pub fn tau_down_secs(&self) -> f32 {
        self.tau_down_base_ms * 1e-3
    }

    /// Check the option set before engine construction.
    pub fn validate(&self) -> SpResult<()> {
        if self.sampling_frequency == 0 {
            return Err(SpError::InvalidSampleRate(self.sampling_frequency));
        }
        if self.audio_buffer_size == 0 {
            return Err(SpError::InvalidParam("audio_buffer_size must be > 0".into()));
        }
        if self.pixels_per_note == 0 {
            return Err(SpError::InvalidParam("pixels_per_note must be > 0".into()));
        }
        if self.pixels_per_image == 0 || self.pixels_per_image % self.pixels_per_note != 0 {
            return Err(SpError::InvalidParam(format!(
                "pixels_per_image ({}) must be a nonzero multiple of pixels_per_note ({})",
                self.pixels_per_image, self.pixels_per_note
            )));
        }
        if self.start_frequency <= 0.0 || !self.start_frequency.is_finite() {
            return Err(SpError::InvalidParam(format!(
                "start_frequency must be positive, got {}",
                self.start_frequency
            )));
        }
        if self.commas_per_octave() == 0 {
            return Err(SpError::InvalidParam(
                "semitones_per_octave * commas_per_semitone must be > 0".into(),
            ));
        }
        if self.tau_up_base_ms <= 0.0 || self.tau_down_base_ms <= 0.0 {
            return Err(SpError::InvalidParam(
                "envelope time constants must be positive".into(),
            ));
        }
        if self.decay_freq_ref_hz <= 0.0 {
            return Err(SpError::InvalidParam(
                "decay_freq_ref_hz must be positive".into(),
            ));
        }
        if self.decay_freq_min > self.decay_freq_max {
            return Err(SpError::InvalidParam(
                "decay_freq_min must not exceed decay_freq_max".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.alpha_min) {
            return Err(SpError::InvalidParam("alpha_min must be in [0, 1]".into()));
        }
        if self.additive_contrast_stride == 0 {
            return Err(SpError::InvalidParam(
                "additive_contrast_stride must be > 0".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.additive_contrast_min) {
            return Err(SpError::InvalidParam(
                "additive_contrast_min must be in [0, 1]".into(),
            ));
        }
        if self.platform_amplification_divisor < 1.0 {
            return Err(SpError::InvalidParam(
                "platform_amplification_divisor must be >= 1".into(),
            ));
        }
        Ok(())
    }
}
