//! sp-dsp: DSP kernels for the Sp3ctra additive engine
//!
//! Small, allocation-free building blocks shared by the synthesis workers
//! and the mix stage:
//! - `kernels` - fill/scale/add/mul, hard limiting, volume weighting
//!   (scalar reference + 128-bit SIMD fast paths)
//! - `envelope` - per-oscillator attack/release one-pole smoother
//! - `pan` - color temperature, pan laws, per-sample pan ramps
//! - `contrast` - image contrast factor for the output stage
//! - `simd` - capability detection and per-thread denormal flushing
//!
//! All kernels are pure on their output regions. The inherently serial
//! recurrences (envelope) stay scalar; the elementwise kernels use
//! `wide::f32x4`, which lowers to NEON on aarch64 and SSE on x86_64.

pub mod contrast;
pub mod envelope;
pub mod kernels;
pub mod pan;
pub mod simd;

pub use contrast::*;
pub use envelope::*;
pub use kernels::*;
pub use pan::*;
pub use simd::*;
