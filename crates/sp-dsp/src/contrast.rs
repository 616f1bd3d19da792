//! Image contrast factor
//!
//! The mix stage scales its output by a per-line contrast factor: a flat
//! image (all pixels alike) plays at the configured floor, a high-contrast
//! image at full level. Estimated from a strided sample of the processed
//! grayscale so the cost stays negligible next to synthesis.

use sp_core::LUMA_FULL_SCALE;

/// Maximum possible variance of values in [0, 1] (all mass at 0 and 1).
const MAX_VARIANCE: f32 = 0.25;

/// Contrast factor in [floor, 1] from a strided variance estimate.
///
/// NaN/Inf anywhere in the computation falls back to 1.0 (full level), per
/// the numerical-guard policy: a broken estimate must never mute the
/// engine.
pub fn contrast_factor(gray: &[u16], stride: usize, floor: f32, power: f32) -> f32 {
    let stride = stride.max(1);
    let mut count = 0u32;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;
    let mut i = 0;
    while i < gray.len() {
        let v = (gray[i] as f32 / LUMA_FULL_SCALE) as f64;
        sum += v;
        sum_sq += v * v;
        count += 1;
        i += stride;
    }
    if count < 2 {
        return 1.0;
    }
    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0) as f32;

    let normalized = (variance / MAX_VARIANCE).clamp(0.0, 1.0);
    let shaped = normalized.powf(power);
    if !shaped.is_finite() {
        return 1.0;
    }
    shaped.clamp(floor, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_flat_image_hits_floor() {
        let gray = vec![30000u16; 1024];
        assert_relative_eq!(contrast_factor(&gray, 16, 0.5, 0.5), 0.5);
    }

    #[test]
    fn test_max_contrast_hits_one() {
        // Alternating black/white at stride 1: variance = 0.25 exactly.
        let gray: Vec<u16> = (0..1024)
            .map(|i| if i % 2 == 0 { 0 } else { 65535 })
            .collect();
        assert_relative_eq!(contrast_factor(&gray, 1, 0.5, 0.5), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_result_always_in_range() {
        let gray: Vec<u16> = (0..4096).map(|i| (i * 16) as u16).collect();
        for stride in [1, 7, 16, 255] {
            let c = contrast_factor(&gray, stride, 0.3, 0.8);
            assert!((0.3..=1.0).contains(&c), "stride {stride} gave {c}");
        }
    }

    #[test]
    fn test_degenerate_inputs_fall_back_to_full() {
        assert_eq!(contrast_factor(&[], 16, 0.5, 0.5), 1.0);
        assert_eq!(contrast_factor(&[100], 16, 0.5, 0.5), 1.0);
        // Stride larger than the buffer leaves a single sample.
        assert_eq!(contrast_factor(&[1, 2, 3], 100, 0.5, 0.5), 1.0);
    }

    #[test]
    fn test_zero_stride_treated_as_one() {
        let gray = vec![100u16; 64];
        let c = contrast_factor(&gray, 0, 0.5, 0.5);
        assert_relative_eq!(c, 0.5);
    }
}
