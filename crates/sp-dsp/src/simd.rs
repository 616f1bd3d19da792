//! SIMD capability detection and denormal protection
//!
//! The elementwise kernels are vectorized with fixed 128-bit `wide` types;
//! this module covers the two runtime concerns around them:
//! - Detection happens once at startup (engine logs what it got)
//! - Denormal flushing is set per audio/worker thread
//!
//! Denormals matter more than vector width here: decaying envelopes spend
//! most of their life in the e-20 range, and a single denormal multiply
//! can cost a hundred cycles on x86.

use std::sync::OnceLock;

/// Detected vector capability of the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum SimdLevel {
    /// No vector unit; scalar remainder loops only.
    Scalar = 0,
    /// SSE2 and friends (128-bit, 4 f32 lanes).
    Sse = 1,
    /// AVX2 + FMA (256-bit; the kernels still issue 128-bit ops).
    Avx2 = 2,
    /// ARM NEON (128-bit, 4 f32 lanes).
    Neon = 3,
}

impl SimdLevel {
    /// Vector width in f32 lanes.
    pub const fn lanes(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse | SimdLevel::Neon => 4,
            SimdLevel::Avx2 => 8,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar",
            SimdLevel::Sse => "SSE2",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Neon => "NEON",
        }
    }
}

static DETECTED_SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Best available SIMD level, detected once and cached.
pub fn simd_level() -> SimdLevel {
    *DETECTED_SIMD_LEVEL.get_or_init(|| {
        let level = detect();
        log::debug!("SIMD detection: {}", level.name());
        level
    })
}

fn detect() -> SimdLevel {
    #[cfg(target_arch = "x86_64")]
    {
        if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
            return SimdLevel::Avx2;
        }
        // SSE2 is part of the x86_64 baseline.
        SimdLevel::Sse
    }

    #[cfg(target_arch = "aarch64")]
    {
        // NEON is mandatory on aarch64.
        SimdLevel::Neon
    }

    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        SimdLevel::Scalar
    }
}

/// Set DAZ + FTZ on the current thread so denormals flush to zero.
///
/// Call once at the start of every audio and worker thread. Affects the
/// calling thread only.
pub fn set_denormals_zero() {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: only flips the DAZ (bit 6) and FTZ (bit 15) bits of the
        // calling thread's MXCSR; float semantics outside denormals are
        // unchanged.
        unsafe {
            use std::arch::x86_64::{_mm_getcsr, _mm_setcsr};
            let mxcsr = _mm_getcsr();
            _mm_setcsr(mxcsr | 0x8040);
        }
    }
    // aarch64 flushes denormals by default in the common configuration;
    // there is no stable intrinsic to force FPCR.FZ from Rust yet.
}

/// Whether denormals currently flush to zero on this thread.
pub fn denormals_are_zero() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        // SAFETY: read-only MXCSR access.
        unsafe {
            use std::arch::x86_64::_mm_getcsr;
            (_mm_getcsr() & 0x8040) == 0x8040
        }
    }

    #[cfg(not(target_arch = "x86_64"))]
    {
        true
    }
}
