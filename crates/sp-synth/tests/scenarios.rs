//! End-to-end scenarios: image lines in, limited stereo blocks out.
//!
//! Each test drives the synthesis driver synchronously (one line produces
//! one block) and drains the audio double buffer through the real-time
//! callback, so the whole pipeline from pixels to limited output is under
//! test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use sp_audio::{AudioCallback, AudioDoubleBuffer, MixControls};
use sp_core::SynthConfig;
use sp_synth::{RgbLine, SynthEngine, SynthesisDriver};

/// Full-size geometry with platform normalization pinned to 1 so the
/// numbers match on every OS.
fn scenario_config() -> SynthConfig {
    SynthConfig {
        platform_amplification_divisor: 1.0,
        ..Default::default()
    }
}

struct TestRig {
    driver: SynthesisDriver,
    callback: AudioCallback,
    block: usize,
}

impl TestRig {
    fn new(config: SynthConfig) -> Self {
        let block = config.audio_buffer_size;
        let audio = Arc::new(AudioDoubleBuffer::new(block));
        let driver = SynthesisDriver::new(config, Arc::clone(&audio)).unwrap();
        let callback = AudioCallback::new(audio, Arc::new(MixControls::new()), None);
        Self {
            driver,
            callback,
            block,
        }
    }

    /// One line in, one rendered block out.
    fn step(&mut self, line: &RgbLine) -> (Vec<f32>, Vec<f32>) {
        assert!(self.driver.process_line(line));
        let mut left = vec![0.0; self.block];
        let mut right = vec![0.0; self.block];
        self.callback.render_planar(&mut left, &mut right);
        (left, right)
    }

    /// Run `lines` identical lines, discarding the audio (settling aid).
    fn settle(&mut self, line: &RgbLine, lines: usize) {
        for _ in 0..lines {
            self.step(line);
        }
    }

    /// Capture `lines` blocks of both channels back to back.
    fn capture(&mut self, line: &RgbLine, lines: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = Vec::with_capacity(lines * self.block);
        let mut right = Vec::with_capacity(lines * self.block);
        for _ in 0..lines {
            let (l, r) = self.step(line);
            left.extend_from_slice(&l);
            right.extend_from_slice(&r);
        }
        (left, right)
    }
}

fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

/// Magnitude of the discrete correlation against a complex exponential at
/// `freq` (a one-bin DFT, windowless).
fn tone_magnitude(samples: &[f32], freq: f32, sample_rate: f32) -> f32 {
    let w = 2.0 * std::f64::consts::PI * freq as f64 / sample_rate as f64;
    let mut re = 0.0f64;
    let mut im = 0.0f64;
    for (i, &s) in samples.iter().enumerate() {
        let phase = w * i as f64;
        re += s as f64 * phase.cos();
        im += s as f64 * phase.sin();
    }
    ((re * re + im * im).sqrt() / samples.len() as f64) as f32
}

fn band_line(pixels: usize, note: usize, pixels_per_note: usize) -> RgbLine {
    let mut line = RgbLine::new(pixels);
    for i in note * pixels_per_note..(note + 1) * pixels_per_note {
        line.red[i] = 255;
        line.green[i] = 255;
        line.blue[i] = 255;
    }
    line
}

// ── Scenario 1: silence in, silence out ─────────────────────────────────

#[test]
fn silence_in_silence_out() {
    let config = scenario_config();
    let mut rig = TestRig::new(config.clone());
    let black = RgbLine::new(config.pixels_per_image);

    rig.settle(&black, 5);
    let (left, right) = rig.capture(&black, 10);
    assert!(left.iter().all(|&s| s.abs() < 1e-6));
    assert!(right.iter().all(|&s| s.abs() < 1e-6));
}

#[test]
fn inverted_white_is_silent() {
    let config = SynthConfig {
        invert_intensity: true,
        ..scenario_config()
    };
    let mut rig = TestRig::new(config.clone());
    let mut white = RgbLine::new(config.pixels_per_image);
    white.fill(255, 255, 255);

    rig.settle(&white, 5);
    let (left, right) = rig.capture(&white, 10);
    assert!(left.iter().all(|&s| s.abs() < 1e-6));
    assert!(right.iter().all(|&s| s.abs() < 1e-6));
}

// ── Scenario 2: full white, steady tone ─────────────────────────────────

#[test]
fn full_white_settles_to_steady_signal() {
    let config = scenario_config();
    let mut rig = TestRig::new(config.clone());
    let mut white = RgbLine::new(config.pixels_per_image);
    white.fill(255, 255, 255);

    // Attack is bounded by a few tau_up; 40 blocks is far past settle.
    rig.settle(&white, 40);
    let (left, right) = rig.capture(&white, 16);

    assert!(rms(&left) > 2e-3, "left RMS {} too low", rms(&left));
    assert!(rms(&right) > 2e-3, "right RMS {} too low", rms(&right));
    assert!(left.iter().chain(right.iter()).all(|&s| s.abs() <= 1.0));
}

#[test]
fn mono_mode_duplicates_channels_exactly() {
    let config = SynthConfig {
        stereo_mode_enabled: false,
        ..scenario_config()
    };
    let mut rig = TestRig::new(config.clone());
    let line = half_color_line(config.pixels_per_image, (255, 0, 0), (0, 0, 255));

    rig.settle(&line, 20);
    let (left, right) = rig.capture(&line, 8);
    assert_eq!(left, right);
    assert!(rms(&left) > 1e-3);
}

// ── Scenario 3: single bright band lands on its note's frequency ────────

#[test]
fn single_band_produces_tone_at_note_frequency() {
    let config = scenario_config();
    let note = 200;
    let mut rig = TestRig::new(config.clone());
    let line = band_line(config.pixels_per_image, note, config.pixels_per_note);

    rig.settle(&line, 40);
    let (left, _right) = rig.capture(&line, 16);

    let fs = config.sampling_frequency as f32;
    let target = rig.driver.note_frequency(note).unwrap();
    let lower = rig.driver.note_frequency(note - 50).unwrap();
    let upper = rig.driver.note_frequency(note + 50).unwrap();

    let mag_target = tone_magnitude(&left, target, fs);
    let mag_lower = tone_magnitude(&left, lower, fs);
    let mag_upper = tone_magnitude(&left, upper, fs);

    assert!(mag_target > 1e-2, "target magnitude {} too weak", mag_target);
    assert!(
        mag_target > 4.0 * mag_lower,
        "peak not dominant: {} vs lower {}",
        mag_target,
        mag_lower
    );
    assert!(
        mag_target > 4.0 * mag_upper,
        "peak not dominant: {} vs upper {}",
        mag_target,
        mag_upper
    );
}

// ── Scenario 4: warm/cold image splits the stereo field ─────────────────

fn half_color_line(pixels: usize, left_rgb: (u8, u8, u8), right_rgb: (u8, u8, u8)) -> RgbLine {
    let mut line = RgbLine::new(pixels);
    for i in 0..pixels {
        let (r, g, b) = if i < pixels / 2 { left_rgb } else { right_rgb };
        line.red[i] = r;
        line.green[i] = g;
        line.blue[i] = b;
    }
    line
}

#[test]
fn red_left_blue_right_biases_left_channel() {
    let config = scenario_config();
    let mut rig = TestRig::new(config.clone());
    let line = half_color_line(config.pixels_per_image, (255, 0, 0), (0, 0, 255));

    rig.settle(&line, 40);
    let (left, right) = rig.capture(&line, 16);

    // Red notes pan hard left and carry more Rec.601 luminance than blue,
    // so the left channel must dominate.
    let (l_rms, r_rms) = (rms(&left), rms(&right));
    assert!(
        l_rms > 1.5 * r_rms,
        "expected left bias, got L {} R {}",
        l_rms,
        r_rms
    );
}

#[test]
fn swapping_colors_swaps_the_bias() {
    let config = scenario_config();
    let mut rig = TestRig::new(config.clone());
    let line = half_color_line(config.pixels_per_image, (0, 0, 255), (255, 0, 0));

    rig.settle(&line, 40);
    let (left, right) = rig.capture(&line, 16);

    let (l_rms, r_rms) = (rms(&left), rms(&right));
    assert!(
        r_rms > 1.5 * l_rms,
        "expected right bias, got L {} R {}",
        l_rms,
        r_rms
    );
}

// ── Scenario 5: freeze keeps the sound alive and smooth ─────────────────

#[test]
fn freeze_holds_level_and_stays_continuous() {
    let config = scenario_config();
    let note = 120;
    let mut rig = TestRig::new(config.clone());
    let band = band_line(config.pixels_per_image, note, config.pixels_per_note);
    let black = RgbLine::new(config.pixels_per_image);

    rig.settle(&band, 60);
    let (pre_left, _) = rig.capture(&band, 8);
    let pre_rms = rms(&pre_left);
    assert!(pre_rms > 1e-3);

    // Freeze, capture the band into the snapshot, then starve the image.
    rig.driver.freeze_control().freeze();
    let (trans_left, _) = rig.capture(&band, 1);
    let (post_left, _) = rig.capture(&black, 20);
    let post_rms = rms(&post_left[post_left.len() - 8 * config.audio_buffer_size..]);

    // Within ±0.5 dB of the pre-freeze level.
    let ratio = post_rms / pre_rms;
    assert!(
        (0.944..=1.059).contains(&ratio),
        "freeze level drifted: ratio {}",
        ratio
    );

    // No sample-to-sample discontinuity larger than 0.02.
    let mut stream = pre_left;
    stream.extend_from_slice(&trans_left);
    stream.extend_from_slice(&post_left);
    for w in stream.windows(2) {
        assert!(
            (w[1] - w[0]).abs() <= 0.02,
            "discontinuity {}",
            (w[1] - w[0]).abs()
        );
    }
}

#[test]
fn frozen_output_is_bit_exact_across_engines() {
    let config = scenario_config();
    let line = band_line(config.pixels_per_image, 64, config.pixels_per_note);

    let run = || {
        let mut rig = TestRig::new(config.clone());
        rig.driver.freeze_control().freeze();
        rig.settle(&line, 10);
        rig.capture(&line, 4)
    };
    let (l1, r1) = run();
    let (l2, r2) = run();
    assert_eq!(l1, l2);
    assert_eq!(r1, r2);
}

// ── Clip safety on hostile input ────────────────────────────────────────

#[test]
fn output_never_exceeds_full_scale() {
    let config = scenario_config();
    let mut rig = TestRig::new(config.clone());

    let mut line = RgbLine::new(config.pixels_per_image);
    for i in 0..line.len() {
        // Alternating saturated colors: maximal contrast and hard pans.
        let (r, g, b) = match i % 3 {
            0 => (255, 0, 0),
            1 => (0, 0, 255),
            _ => (255, 255, 255),
        };
        line.red[i] = r;
        line.green[i] = g;
        line.blue[i] = b;
    }

    rig.settle(&line, 30);
    let (left, right) = rig.capture(&line, 10);
    assert!(left.iter().all(|&s| s.abs() <= 1.0));
    assert!(right.iter().all(|&s| s.abs() <= 1.0));
}

// ── Scenario 6: ingest starvation never stops the audio ─────────────────

#[test]
fn starved_engine_keeps_producing_from_last_image() {
    let config = SynthConfig {
        pixels_per_image: 96,
        pixels_per_note: 4,
        audio_buffer_size: 64,
        platform_amplification_divisor: 1.0,
        ..Default::default()
    };
    let engine = SynthEngine::start(config.clone()).unwrap();
    let image = engine.image_buffer();
    let audio = engine.audio_buffer();
    let mut callback = AudioCallback::new(audio, Arc::new(MixControls::new()), None);

    let bright_r = vec![255u8; config.pixels_per_image];
    let bright_g = vec![255u8; config.pixels_per_image];
    let bright_b = vec![255u8; config.pixels_per_image];

    let stop_feeding = Arc::new(AtomicBool::new(false));
    let feeder = {
        let image = Arc::clone(&image);
        let stop = Arc::clone(&stop_feeding);
        std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                image.publish_line(&bright_r, &bright_g, &bright_b);
                std::thread::sleep(Duration::from_millis(5));
            }
        })
    };

    // Feed for 300 ms while draining, then cut the feed entirely.
    let mut drain = |duration: Duration| -> Vec<f32> {
        let mut nonsilent = Vec::new();
        let mut l = vec![0.0f32; config.audio_buffer_size];
        let mut r = vec![0.0f32; config.audio_buffer_size];
        let until = Instant::now() + duration;
        while Instant::now() < until {
            callback.render_planar(&mut l, &mut r);
            nonsilent.push(rms(&l));
            std::thread::sleep(Duration::from_millis(1));
        }
        nonsilent
    };

    drain(Duration::from_millis(300));
    stop_feeding.store(true, Ordering::Relaxed);
    feeder.join().unwrap();

    // Fully starved for half a second: the engine must keep producing
    // blocks from the persisted last valid line.
    let starved = drain(Duration::from_millis(500));
    let tail = &starved[starved.len().saturating_sub(100)..];
    assert!(
        tail.iter().any(|&r| r > 1e-4),
        "no audio while starved (max tail RMS {:?})",
        tail.iter().cloned().fold(0.0f32, f32::max)
    );

    engine.stop();
}
