//! Lock-free mix controls
//!
//! The MIDI controller surface (a collaborator) writes these; the audio
//! callback samples them at a bounded rate. Values are f32 bit-stored in
//! atomics so both sides stay wait-free.

use std::sync::atomic::{AtomicU32, Ordering};

use sp_core::Sample;

/// How many callback invocations share one sampling of the controls
/// (~1 ms at 48 kHz with small device buffers).
pub const CONTROL_REFRESH_INTERVAL: u32 = 64;

/// Shared mix/master levels. Cache-line aligned; written rarely, read at
/// the refresh interval, never under a lock.
#[derive(Debug)]
#[repr(align(64))]
pub struct MixControls {
    master_volume: AtomicU32,
    mix_level_additive: AtomicU32,
    mix_level_polyphonic: AtomicU32,
    reverb_send_additive: AtomicU32,
    reverb_send_polyphonic: AtomicU32,
}

impl Default for MixControls {
    fn default() -> Self {
        Self {
            master_volume: AtomicU32::new(1.0f32.to_bits()),
            mix_level_additive: AtomicU32::new(1.0f32.to_bits()),
            mix_level_polyphonic: AtomicU32::new(0.0f32.to_bits()),
            reverb_send_additive: AtomicU32::new(0.0f32.to_bits()),
            reverb_send_polyphonic: AtomicU32::new(0.0f32.to_bits()),
        }
    }
}

macro_rules! control_accessors {
    ($get:ident, $set:ident, $field:ident) => {
        #[inline]
        pub fn $get(&self) -> Sample {
            f32::from_bits(self.$field.load(Ordering::Relaxed))
        }

        pub fn $set(&self, value: Sample) {
            self.$field
                .store(value.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
        }
    };
}

impl MixControls {
    pub fn new() -> Self {
        Self::default()
    }

    control_accessors!(master_volume, set_master_volume, master_volume);
    control_accessors!(mix_level_additive, set_mix_level_additive, mix_level_additive);
    control_accessors!(
        mix_level_polyphonic,
        set_mix_level_polyphonic,
        mix_level_polyphonic
    );
    control_accessors!(
        reverb_send_additive,
        set_reverb_send_additive,
        reverb_send_additive
    );
    control_accessors!(
        reverb_send_polyphonic,
        set_reverb_send_polyphonic,
        reverb_send_polyphonic
    );

    /// One coherent sampling of all levels, for the callback's cache.
    pub fn snapshot(&self) -> ControlSnapshot {
        ControlSnapshot {
            master_volume: self.master_volume(),
            mix_level_additive: self.mix_level_additive(),
            reverb_send_additive: self.reverb_send_additive(),
        }
    }
}

/// The callback-side cache of the control values.
#[derive(Debug, Clone, Copy)]
pub struct ControlSnapshot {
    pub master_volume: Sample,
    pub mix_level_additive: Sample,
    pub reverb_send_additive: Sample,
}

impl Default for ControlSnapshot {
    fn default() -> Self {
        MixControls::default().snapshot()
    }
}
