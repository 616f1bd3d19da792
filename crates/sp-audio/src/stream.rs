//! Audio stream management
//!
//! Wires the core callback to a cpal output stream. The contract stays "a
//! pull callback producing float frames at a fixed sample rate"; this
//! module is only the default way of honoring it on a real device.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig};
use std::sync::Arc;

use crate::{
    get_default_output_device, get_output_device_by_name, set_realtime_priority, AudioCallback,
    AudioDoubleBuffer, AudioError, AudioResult, MixControls, ReverbTap,
};

/// Stream parameters, a slice of the engine configuration.
#[derive(Debug, Clone, Copy)]
pub struct StreamParams {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// Output-side engine facade: owns the device stream and the shared
/// controls. Dropping it tears the stream down.
pub struct AudioEngine {
    stream: Stream,
    controls: Arc<MixControls>,
}

impl AudioEngine {
    /// Build an output stream on the default device, pulling from the audio
    /// double buffer through `AudioCallback`. The reverb tap, if any, moves
    /// into the device callback.
    pub fn new(
        params: StreamParams,
        buffer: Arc<AudioDoubleBuffer>,
        controls: Arc<MixControls>,
        reverb: Option<ReverbTap>,
    ) -> AudioResult<Self> {
        let device = get_default_output_device()?;
        let stream = build_output_stream(&device, params, buffer, Arc::clone(&controls), reverb)?;
        Ok(Self { stream, controls })
    }

    /// Same as `new`, on a device selected by name.
    pub fn with_device(
        device_name: &str,
        params: StreamParams,
        buffer: Arc<AudioDoubleBuffer>,
        controls: Arc<MixControls>,
        reverb: Option<ReverbTap>,
    ) -> AudioResult<Self> {
        let device = get_output_device_by_name(device_name)?;
        let stream = build_output_stream(&device, params, buffer, Arc::clone(&controls), reverb)?;
        Ok(Self { stream, controls })
    }

    /// Start pulling audio.
    pub fn audio_start(&self) -> AudioResult<()> {
        self.stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))
    }

    /// Stop the device stream. The producer side must be shut down first so
    /// it is not left blocked on a slot nobody will drain.
    pub fn audio_stop(&self) -> AudioResult<()> {
        self.stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))
    }

    pub fn set_master_volume(&self, volume: f32) {
        self.controls.set_master_volume(volume);
    }

    pub fn controls(&self) -> &Arc<MixControls> {
        &self.controls
    }
}

fn build_output_stream(
    device: &Device,
    params: StreamParams,
    buffer: Arc<AudioDoubleBuffer>,
    controls: Arc<MixControls>,
    reverb: Option<ReverbTap>,
) -> AudioResult<Stream> {
    let supported = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?
        .find(|c| {
            c.channels() >= 2
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate().0 <= params.sample_rate
                && c.max_sample_rate().0 >= params.sample_rate
        })
        .ok_or(AudioError::UnsupportedSampleRate(params.sample_rate))?
        .with_sample_rate(cpal::SampleRate(params.sample_rate));

    let channels = supported.channels() as usize;
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: supported.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(params.block_size as u32),
    };

    let mut callback = AudioCallback::new(buffer, controls, reverb);
    let mut priority_set = false;

    let stream = device
        .build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                if !priority_set {
                    set_realtime_priority();
                    sp_dsp::set_denormals_zero();
                    priority_set = true;
                }
                if channels == 2 {
                    callback.render_interleaved(data);
                } else {
                    // Fill the first stereo pair of each frame, zero the rest.
                    data.fill(0.0);
                    let frames = data.len() / channels;
                    let mut pair = [0.0f32; 2];
                    for f in 0..frames {
                        let (l, r) = pair.split_at_mut(1);
                        callback.render_planar(l, r);
                        data[f * channels] = pair[0];
                        data[f * channels + 1] = pair[1];
                    }
                }
            },
            move |err| {
                log::error!("Audio output stream error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    log::info!(
        "Audio output stream ready: {} Hz, block {} frames, {} channels",
        params.sample_rate,
        params.block_size,
        channels
    );
    Ok(stream)
}
