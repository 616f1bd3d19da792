//! Shared waveform table
//!
//! One contiguous float array holding one period of the reference waveform
//! per comma of the reference octave. Higher octaves never store samples:
//! an oscillator strides through its reference period with an integer
//! coefficient (2^octave), which halves the effective period per octave.
//!
//! Written only at init; afterwards read-only and shared by all workers
//! without synchronization.

use sp_core::{Sample, SpError, SpResult, SynthConfig, MAX_WAVE_TABLE_SAMPLES};

/// One comma's period within the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaveRegion {
    /// First sample of the period.
    pub offset: usize,
    /// Period length in samples (the area_size of every note on this comma).
    pub len: usize,
}

/// The shared table plus its per-comma regions.
#[derive(Debug)]
pub struct WaveTable {
    samples: Box<[Sample]>,
    regions: Box<[WaveRegion]>,
}

impl WaveTable {
    /// Build the reference-octave table for the configured scale.
    ///
    /// For comma c of K*C: `f(c) = f0 * 2^(c / (K*C))`,
    /// `area_size = round(Fs / f(c))`, one period of
    /// `sin(2π x / area_size) * 0.5` appended to the table.
    ///
    /// Fails with `SpError::RamOverflow` when the table would exceed the
    /// compile-time cap; the caller must abort.
    pub fn build(config: &SynthConfig) -> SpResult<Self> {
        let fs = config.sampling_frequency as f64;
        let commas = config.commas_per_octave() as usize;
        let f0 = config.start_frequency as f64;

        let mut samples: Vec<Sample> = Vec::new();
        let mut regions = Vec::with_capacity(commas);

        for c in 0..commas {
            let freq = f0 * 2f64.powf(c as f64 / commas as f64);
            let area_size = (fs / freq).round().max(2.0) as usize;

            if samples.len() + area_size > MAX_WAVE_TABLE_SAMPLES {
                log::error!(
                    "Waveform table overflow at comma {}: {} + {} samples exceeds cap {}",
                    c,
                    samples.len(),
                    area_size,
                    MAX_WAVE_TABLE_SAMPLES
                );
                return Err(SpError::RamOverflow {
                    requested: samples.len() + area_size,
                    cap: MAX_WAVE_TABLE_SAMPLES,
                });
            }

            let offset = samples.len();
            for x in 0..area_size {
                let phase = 2.0 * std::f64::consts::PI * x as f64 / area_size as f64;
                samples.push((phase.sin() * 0.5) as Sample);
            }
            regions.push(WaveRegion {
                offset,
                len: area_size,
            });
        }

        log::info!(
            "Waveform table built: {} commas, {} samples ({} KiB)",
            commas,
            samples.len(),
            samples.len() * std::mem::size_of::<Sample>() / 1024
        );

        Ok(Self {
            samples: samples.into_boxed_slice(),
            regions: regions.into_boxed_slice(),
        })
    }

    /// Total table length in samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Number of commas (regions) in the reference octave.
    #[inline]
    pub fn comma_count(&self) -> usize {
        self.regions.len()
    }

    /// The period region of one comma.
    #[inline]
    pub fn region(&self, comma: usize) -> WaveRegion {
        self.regions[comma]
    }

    /// Read one sample of a note's period.
    ///
    /// `idx` must be inside the region (`idx < region.len`), which the
    /// modulo phase advance guarantees.
    #[inline]
    pub fn sample(&self, region_offset: usize, idx: u32) -> Sample {
        debug_assert!(region_offset + (idx as usize) < self.samples.len());
        self.samples[region_offset + idx as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn table() -> WaveTable {
        WaveTable::build(&SynthConfig::default()).unwrap()
    }

    #[test]
    fn test_region_layout_is_contiguous() {
        let t = table();
        let mut expected_offset = 0;
        for c in 0..t.comma_count() {
            let r = t.region(c);
            assert_eq!(r.offset, expected_offset);
            expected_offset += r.len;
        }
        assert_eq!(expected_offset, t.len());
    }

    #[test]
    fn test_area_sizes_decrease_with_frequency() {
        let t = table();
        for c in 1..t.comma_count() {
            assert!(t.region(c).len <= t.region(c - 1).len);
        }
    }

    #[test]
    fn test_first_region_matches_start_frequency() {
        let config = SynthConfig::default();
        let t = WaveTable::build(&config).unwrap();
        let expected =
            (config.sampling_frequency as f64 / config.start_frequency as f64).round() as usize;
        assert_eq!(t.region(0).len, expected);
    }

    #[test]
    fn test_period_is_half_scale_sine() {
        let t = table();
        let r = t.region(0);
        // sin(0) = 0 at the period start.
        assert_relative_eq!(t.sample(r.offset, 0), 0.0, epsilon = 1e-6);
        // Quarter period is the positive peak, 0.5 in normalized form.
        let quarter = (r.len / 4) as u32;
        assert_relative_eq!(t.sample(r.offset, quarter), 0.5, epsilon = 1e-2);
        // Everything bounded by the half-scale amplitude.
        for x in 0..r.len as u32 {
            assert!(t.sample(r.offset, x).abs() <= 0.5 + 1e-6);
        }
    }

    #[test]
    fn test_overflow_is_fatal() {
        // A very low start frequency at a high sample rate makes each period
        // enormous; enough commas overflow the cap.
        let config = SynthConfig {
            start_frequency: 0.001,
            ..Default::default()
        };
        match WaveTable::build(&config) {
            Err(SpError::RamOverflow { requested, cap }) => {
                assert!(requested > cap);
            }
            other => panic!("expected RamOverflow, got {:?}", other.map(|t| t.len())),
        }
    }
}
