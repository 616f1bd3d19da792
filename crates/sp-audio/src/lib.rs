//! sp-audio: Audio output path of the Sp3ctra engine
//!
//! Owns everything between the synthesis driver and the sound card:
//! - `double_buffer` - the two-slot block handoff (producer may park,
//!   consumer is wait-free)
//! - `callback` - the real-time pull callback with the mix/limit stage
//! - `controls` - lock-free mix levels written by the MIDI collaborator
//! - `reverb_bus` - non-blocking SPSC dry/wet rings to the reverb thread
//! - `stream` - cpal wiring and the `audio_start`/`audio_stop` facade
//! - `thread_priority` - real-time scheduling and worker core pinning
//!
//! CRITICAL: nothing on the callback path locks, allocates or logs.

mod callback;
mod controls;
mod device;
mod double_buffer;
mod error;
mod reverb_bus;
mod stream;
mod thread_priority;

pub use callback::*;
pub use controls::*;
pub use device::*;
pub use double_buffer::*;
pub use error::*;
pub use reverb_bus::*;
pub use stream::*;
pub use thread_priority::*;
