//! Synthesis driver
//!
//! One call per image line (or per 10 ms timeout): grayscale conversion,
//! freeze/fade blend, pan publication, contrast estimation, worker
//! dispatch/merge, normalization, the mono and stereo mix stages and the
//! handoff into the audio double buffer. Runs on its own thread; the audio
//! callback never calls into it.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use sp_audio::{set_realtime_priority, AudioDoubleBuffer};
use sp_core::{
    LogRateLimiter, Sample, SpResult, SynthConfig, SUM_VOLUME_EPSILON, SYNTH_WORKERS,
    VOLUME_AMP_RESOLUTION, WAVE_AMP_RESOLUTION,
};
use sp_dsp::{contrast_factor, hard_limit, scale, EnvelopeParams, NotePan, StereoParams};

use crate::{
    compute_line_pan, rgb_to_gray16, DisplayBuffers, FreezeControl, LineJob, MergedOutputs,
    NoteDescriptor, OscillatorBank, PanSnapshot, RenderParams, RgbLine, StageTimings, SynthMeters,
    WaveTable, WorkerPool,
};

/// How long the synthesis thread waits for a fresh line before replaying
/// the last valid one.
pub const IMAGE_WAIT_TIMEOUT: Duration = Duration::from_millis(10);

/// The per-line orchestrator.
pub struct SynthesisDriver {
    config: SynthConfig,
    render: RenderParams,
    stereo: StereoParams,
    /// Read-only copy for frequency queries; the workers own the live
    /// (mutable) per-note state.
    descriptors: Vec<NoteDescriptor>,
    pool: WorkerPool,
    pan_snapshot: Arc<PanSnapshot>,
    freeze: Arc<FreezeControl>,
    display: Arc<DisplayBuffers>,
    meters: Arc<SynthMeters>,
    audio_out: Arc<AudioDoubleBuffer>,

    // Per-line scratch, allocated once.
    gray: Box<[u16]>,
    processed: Box<[u16]>,
    pans: Box<[NotePan]>,
    merged: MergedOutputs,
    mono: Box<[Sample]>,
    out_left: Box<[Sample]>,
    out_right: Box<[Sample]>,

    /// Lines between telemetry emissions (≈1 Hz).
    telemetry_interval: u64,
    lines_since_telemetry: u64,
    timings: StageTimings,
    /// Wall-clock budget of one block (B / Fs).
    block_budget: Duration,
    starvation_log: LogRateLimiter,
    bad_input_log: LogRateLimiter,
}

impl SynthesisDriver {
    /// Build the table, the bank and the worker pool. Any failure here is
    /// fatal: the host must not start the engine.
    pub fn new(config: SynthConfig, audio_out: Arc<AudioDoubleBuffer>) -> SpResult<Self> {
        config.validate()?;
        let block = config.audio_buffer_size;
        let pixels = config.pixels_per_image;

        let table = Arc::new(WaveTable::build(&config)?);
        let bank = OscillatorBank::new(&config, &table)?;
        let descriptors = bank.descriptors().to_vec();
        let note_count = bank.len();
        let pool = WorkerPool::spawn(bank.into_chunks(SYNTH_WORKERS), table, block)?;
        let simd = sp_dsp::simd_level();
        log::info!("DSP kernels: {} ({} f32 lanes)", simd.name(), simd.lanes());

        // One telemetry line per second of produced audio.
        let telemetry_interval =
            (config.sampling_frequency as u64 / block as u64).max(1);

        Ok(Self {
            render: RenderParams::from_config(&config),
            stereo: StereoParams::from_config(&config),
            descriptors,
            pool,
            pan_snapshot: Arc::new(PanSnapshot::new(note_count)),
            freeze: Arc::new(FreezeControl::new(pixels)),
            display: Arc::new(DisplayBuffers::new(pixels)),
            meters: Arc::new(SynthMeters::new()),
            audio_out,
            gray: vec![0; pixels].into_boxed_slice(),
            processed: vec![0; pixels].into_boxed_slice(),
            pans: vec![NotePan::default(); note_count].into_boxed_slice(),
            merged: MergedOutputs::new(block),
            mono: vec![0.0; block].into_boxed_slice(),
            out_left: vec![0.0; block].into_boxed_slice(),
            out_right: vec![0.0; block].into_boxed_slice(),
            telemetry_interval,
            lines_since_telemetry: 0,
            timings: StageTimings::new(),
            block_budget: Duration::from_micros(
                block as u64 * 1_000_000 / config.sampling_frequency as u64,
            ),
            starvation_log: LogRateLimiter::per_second(),
            bad_input_log: LogRateLimiter::per_second(),
            config,
        })
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn note_count(&self) -> usize {
        self.descriptors.len()
    }

    /// Frequency of one oscillator (None past the bank).
    pub fn note_frequency(&self, note: usize) -> Option<f32> {
        self.descriptors.get(note).map(|d| d.frequency)
    }

    pub fn freeze_control(&self) -> Arc<FreezeControl> {
        Arc::clone(&self.freeze)
    }

    pub fn display_buffers(&self) -> Arc<DisplayBuffers> {
        Arc::clone(&self.display)
    }

    pub fn meters(&self) -> Arc<SynthMeters> {
        Arc::clone(&self.meters)
    }

    pub fn pan_snapshot(&self) -> Arc<PanSnapshot> {
        Arc::clone(&self.pan_snapshot)
    }

    /// Re-derive the envelope coefficients after a time-constant change.
    pub fn set_envelope_times(&mut self, tau_up_ms: f32, tau_down_ms: f32) {
        self.config.tau_up_base_ms = tau_up_ms;
        self.config.tau_down_base_ms = tau_down_ms;
        let envelope = EnvelopeParams::from_config(&self.config);
        self.pool.update_envelopes(&envelope);
        for d in &mut self.descriptors {
            d.alpha_up = envelope.alpha_up();
            d.alpha_down_weighted = envelope.alpha_down_for(d.frequency);
        }
        log::info!(
            "Envelope updated: tau_up {} ms, tau_down {} ms",
            tau_up_ms,
            tau_down_ms
        );
    }

    /// Process one line into one audio block and hand it to the callback.
    ///
    /// Returns false when the audio double buffer was shut down mid-write
    /// (engine teardown).
    pub fn process_line(&mut self, line: &RgbLine) -> bool {
        if line.len() != self.config.pixels_per_image {
            sp_core::warn_limited!(
                self.bad_input_log,
                "Synthesis got a line of {} pixels (expected {}); emitting silence",
                line.len(),
                self.config.pixels_per_image
            );
            self.out_left.fill(0.0);
            self.out_right.fill(0.0);
            return self.audio_out.write_block(&self.out_left, &self.out_right);
        }

        let line_start = Instant::now();

        // a) RGB → 16-bit grayscale.
        rgb_to_gray16(line, &mut self.gray);

        // b) Freeze/fade blend selects the grayscale synthesis sees.
        self.freeze.apply(&self.gray, &mut self.processed);

        // c) Per-note pan from the line's colors, published atomically.
        compute_line_pan(
            line,
            self.config.pixels_per_note,
            &self.stereo,
            &mut self.pans,
        );
        self.pan_snapshot.publish(&self.pans);

        // d) Contrast factor from the processed grayscale.
        let contrast = contrast_factor(
            &self.processed,
            self.config.additive_contrast_stride,
            self.config.additive_contrast_min,
            self.config.additive_contrast_adjustment_power,
        );

        // e) Workers: precompute, parallel render, merge.
        let job = Arc::new(LineJob {
            gray: self.processed.clone(),
            params: self.render,
        });
        let t = Instant::now();
        self.pool.dispatch(&job, &self.pan_snapshot);
        self.timings.precompute.record(t.elapsed());
        let t = Instant::now();
        self.pool.wait_done();
        self.timings.render.record(t.elapsed());
        let t = Instant::now();
        self.pool.merge_outputs(&mut self.merged);
        self.timings.merge.record(t.elapsed());

        // f) Platform normalization.
        let divisor = self.config.platform_amplification_divisor;
        if divisor > 1.0 {
            let inv = 1.0 / divisor;
            scale(&mut self.merged.additive, inv);
            scale(&mut self.merged.sum_volume, inv);
            scale(&mut self.merged.max_volume, inv);
            scale(&mut self.merged.left, inv);
            scale(&mut self.merged.right, inv);
        }

        // g/h) Mono pre-output and stereo mix share the denominator
        // sum_volume * U/2; starved samples are zeroed, never dithered.
        let t = Instant::now();
        self.mix_outputs(contrast);
        self.timings.mix.record(t.elapsed());

        // i) Telemetry at ≈1 Hz.
        self.timings.record_line(line_start.elapsed());
        self.collect_telemetry();

        // Display copy for the visual collaborators.
        self.display.update(line);

        // j) Hand off to the audio callback.
        self.audio_out.write_block(&self.out_left, &self.out_right)
    }

    /// Drive one block from an all-black line (used before any image has
    /// ever arrived).
    pub fn process_silence(&mut self) -> bool {
        let line = RgbLine::new(self.config.pixels_per_image);
        self.process_line(&line)
    }

    fn mix_outputs(&mut self, contrast: f32) {
        let block = self.mono.len();
        let half_u = VOLUME_AMP_RESOLUTION * 0.5;
        let inv_wave = 1.0 / WAVE_AMP_RESOLUTION;
        let stereo_on = self.config.stereo_mode_enabled;

        for i in 0..block {
            let denom = self.merged.sum_volume[i] * half_u;
            if denom < SUM_VOLUME_EPSILON {
                self.mono[i] = 0.0;
                self.out_left[i] = 0.0;
                self.out_right[i] = 0.0;
                continue;
            }
            let norm = self.merged.max_volume[i] / denom * inv_wave;
            self.mono[i] = self.merged.additive[i] * norm;
            if stereo_on {
                self.out_left[i] = self.merged.left[i] * norm * contrast;
                self.out_right[i] = self.merged.right[i] * norm * contrast;
            } else {
                self.out_left[i] = self.mono[i];
                self.out_right[i] = self.mono[i];
            }
        }

        // Pre-limit peaks and clip count feed the meters; then the hard
        // limiter guarantees [-1, +1].
        let mut peak_l = 0.0f32;
        let mut peak_r = 0.0f32;
        let mut clipped = 0u64;
        for i in 0..block {
            let l = self.out_left[i].abs();
            let r = self.out_right[i].abs();
            peak_l = peak_l.max(l);
            peak_r = peak_r.max(r);
            if l > 1.0 || r > 1.0 {
                clipped += 1;
            }
        }
        self.meters.record_line(peak_l, peak_r, clipped);
        hard_limit(&mut self.out_left, -1.0, 1.0);
        hard_limit(&mut self.out_right, -1.0, 1.0);
    }

    fn collect_telemetry(&mut self) {
        self.lines_since_telemetry += 1;
        if self.lines_since_telemetry >= self.telemetry_interval {
            self.lines_since_telemetry = 0;
            log::debug!(
                "synth: pre-limit peaks L {:.1} dBFS R {:.1} dBFS, clipped {} samples, {} lines",
                sp_core::Decibels::from_gain(self.meters.pre_peak_left()).0,
                sp_core::Decibels::from_gain(self.meters.pre_peak_right()).0,
                self.meters.clipped_samples(),
                self.meters.lines_processed()
            );
            self.timings.log_and_reset(self.block_budget);
        }
    }

    /// The synthesis thread loop: timed wait on the image buffer, replay of
    /// the last valid line on starvation, silence before first light.
    /// Always produces audio; returns when `running` clears or the audio
    /// buffer shuts down.
    pub fn run(mut self, image: Arc<crate::ImageLineBuffer>, running: Arc<AtomicBool>) {
        set_realtime_priority();
        let mut line = RgbLine::new(self.config.pixels_per_image);
        while running.load(Ordering::Relaxed) {
            let produced = if image.wait_line(IMAGE_WAIT_TIMEOUT, &mut line) {
                self.process_line(&line)
            } else if image.get_last_valid_for_audio(&mut line) {
                sp_core::warn_limited!(
                    self.starvation_log,
                    "No image line for {} ms; replaying last valid line",
                    IMAGE_WAIT_TIMEOUT.as_millis()
                );
                self.process_line(&line)
            } else {
                self.process_silence()
            };
            if !produced {
                break;
            }
        }
        log::info!("Synthesis thread stopped");
    }
}
