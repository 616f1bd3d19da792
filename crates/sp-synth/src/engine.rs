//! Engine facade
//!
//! Ties the collaborator-facing surfaces together: the image line buffer
//! the ingest thread feeds, the synthesis thread driving the worker pool,
//! and the audio double buffer the callback drains. The host wires the
//! audio side (cpal stream or its own pull loop) to `audio_buffer()`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use sp_audio::AudioDoubleBuffer;
use sp_core::{SpResult, SynthConfig};

use crate::{
    DisplayBuffers, FreezeControl, ImageLineBuffer, SynthMeters, SynthesisDriver,
};

/// A running synthesis core.
pub struct SynthEngine {
    image: Arc<ImageLineBuffer>,
    audio_out: Arc<AudioDoubleBuffer>,
    freeze: Arc<FreezeControl>,
    display: Arc<DisplayBuffers>,
    meters: Arc<SynthMeters>,
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl SynthEngine {
    /// Build every core resource and start the synthesis thread. Audio is
    /// continuous from this point on, image traffic or not.
    pub fn start(config: SynthConfig) -> SpResult<Self> {
        let audio_out = Arc::new(AudioDoubleBuffer::new(config.audio_buffer_size));
        let image = Arc::new(ImageLineBuffer::new(config.pixels_per_image));
        let driver = SynthesisDriver::new(config, Arc::clone(&audio_out))?;

        let freeze = driver.freeze_control();
        let display = driver.display_buffers();
        let meters = driver.meters();
        let running = Arc::new(AtomicBool::new(true));

        let thread = {
            let image = Arc::clone(&image);
            let running = Arc::clone(&running);
            std::thread::Builder::new()
                .name("sp3ctra-synth".into())
                .spawn(move || driver.run(image, running))?
        };

        Ok(Self {
            image,
            audio_out,
            freeze,
            display,
            meters,
            running,
            thread: Some(thread),
        })
    }

    /// The buffer the ingest collaborator publishes lines into.
    pub fn image_buffer(&self) -> Arc<ImageLineBuffer> {
        Arc::clone(&self.image)
    }

    /// The buffer the audio callback drains.
    pub fn audio_buffer(&self) -> Arc<AudioDoubleBuffer> {
        Arc::clone(&self.audio_out)
    }

    pub fn freeze(&self) {
        self.freeze.freeze();
    }

    pub fn unfreeze(&self) {
        self.freeze.unfreeze();
    }

    pub fn is_frozen(&self) -> bool {
        self.freeze.is_frozen()
    }

    pub fn display_buffers(&self) -> Arc<DisplayBuffers> {
        Arc::clone(&self.display)
    }

    pub fn meters(&self) -> Arc<SynthMeters> {
        Arc::clone(&self.meters)
    }

    /// Stop the synthesis thread and join it. The audio stream must
    /// already be stopped (the callback side is the consumer that would
    /// otherwise free slots).
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        self.audio_out.shutdown();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for SynthEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
