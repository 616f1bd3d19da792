//! Feed the engine a synthetic moving band and print what comes out.
//!
//! No sound card needed: the audio double buffer is drained directly, the
//! way a host callback would.
//!
//! ```sh
//! RUST_LOG=debug cargo run -p sp-synth --example scan_tone
//! ```

use std::sync::Arc;
use std::time::Duration;

use sp_audio::{AudioCallback, MixControls};
use sp_core::SynthConfig;
use sp_synth::{RgbLine, SynthEngine};

fn main() {
    env_logger::init();

    let config = SynthConfig {
        platform_amplification_divisor: 1.0,
        ..Default::default()
    };
    let block = config.audio_buffer_size;
    let pixels = config.pixels_per_image;
    let ppn = config.pixels_per_note;

    let engine = SynthEngine::start(config).expect("engine start");
    let image = engine.image_buffer();
    let mut callback = AudioCallback::new(engine.audio_buffer(), Arc::new(MixControls::new()), None);

    let feeder = std::thread::spawn(move || {
        // A white band sweeping upward through the note range.
        let mut line = RgbLine::new(pixels);
        for step in 0..400usize {
            line.fill(0, 0, 0);
            let note = 100 + (step / 4) % 500;
            for i in note * ppn..(note + 1) * ppn {
                line.red[i] = 255;
                line.green[i] = 255;
                line.blue[i] = 255;
            }
            image.publish_line(&line.red, &line.green, &line.blue);
            std::thread::sleep(Duration::from_millis(5));
        }
    });

    let mut left = vec![0.0f32; block];
    let mut right = vec![0.0f32; block];
    for second in 0..2 {
        let mut peak = 0.0f32;
        let mut energy = 0.0f64;
        let mut samples = 0usize;
        while samples < 48_000 {
            callback.render_planar(&mut left, &mut right);
            for &s in &left {
                peak = peak.max(s.abs());
                energy += (s as f64) * (s as f64);
            }
            samples += block;
            std::thread::sleep(Duration::from_millis(2));
        }
        let rms = (energy / samples as f64).sqrt();
        println!(
            "t={}s  peak {:.4}  rms {:.5}  underruns {}",
            second + 1,
            peak,
            rms,
            callback.underruns()
        );
    }

    feeder.join().expect("feeder");
    engine.stop();
}
