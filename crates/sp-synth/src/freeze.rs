//! Freeze/fade state machine
//!
//! Holds the last grayscale line constant (freeze) and cross-fades back to
//! live data over a fixed duration (fade). Requests arrive from outside
//! (IMU auto-volume, UI toggle); the synthesis thread samples the state
//! once per line under the mutex and performs the actual blend.

use std::time::Instant;

use parking_lot::Mutex;

use sp_core::FREEZE_FADE_SECS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FreezePhase {
    Live,
    /// Freeze requested; the snapshot is captured on the next line.
    Pending,
    Frozen,
    Fading,
}

#[derive(Debug)]
struct FreezeInner {
    phase: FreezePhase,
    snapshot: Box<[u16]>,
    fade_started: Option<Instant>,
}

/// Shared freeze control.
#[derive(Debug)]
pub struct FreezeControl {
    inner: Mutex<FreezeInner>,
}

impl FreezeControl {
    pub fn new(line_len: usize) -> Self {
        Self {
            inner: Mutex::new(FreezeInner {
                phase: FreezePhase::Live,
                snapshot: vec![0; line_len].into_boxed_slice(),
                fade_started: None,
            }),
        }
    }

    /// Request a freeze. The grayscale of the next processed line becomes
    /// the snapshot. No-op while already frozen.
    pub fn freeze(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.phase, FreezePhase::Live | FreezePhase::Fading) {
            inner.phase = FreezePhase::Pending;
            inner.fade_started = None;
            log::info!("Image freeze requested");
        }
    }

    /// Release a freeze: start the timed cross-fade back to live data.
    pub fn unfreeze(&self) {
        let mut inner = self.inner.lock();
        if matches!(inner.phase, FreezePhase::Frozen | FreezePhase::Pending) {
            inner.phase = FreezePhase::Fading;
            inner.fade_started = Some(Instant::now());
            log::info!("Image freeze released, fading to live");
        }
    }

    pub fn is_frozen(&self) -> bool {
        matches!(
            self.inner.lock().phase,
            FreezePhase::Pending | FreezePhase::Frozen
        )
    }

    /// Blend the live grayscale with the frozen snapshot into `out`.
    ///
    /// Live: copy through. Frozen: replay the snapshot. Fading:
    /// `alpha * live + (1 - alpha) * snapshot`, alpha = elapsed / fade
    /// duration; at alpha >= 1 the state clears back to Live.
    pub fn apply(&self, live: &[u16], out: &mut [u16]) {
        debug_assert_eq!(live.len(), out.len());
        let mut inner = self.inner.lock();
        match inner.phase {
            FreezePhase::Live => out.copy_from_slice(live),
            FreezePhase::Pending => {
                inner.snapshot.copy_from_slice(live);
                inner.phase = FreezePhase::Frozen;
                out.copy_from_slice(live);
            }
            FreezePhase::Frozen => out.copy_from_slice(&inner.snapshot),
            FreezePhase::Fading => {
                let elapsed = inner
                    .fade_started
                    .map(|t| t.elapsed().as_secs_f32())
                    .unwrap_or(FREEZE_FADE_SECS);
                let alpha = (elapsed / FREEZE_FADE_SECS).clamp(0.0, 1.0);
                if alpha >= 1.0 {
                    inner.phase = FreezePhase::Live;
                    inner.fade_started = None;
                    out.copy_from_slice(live);
                } else {
                    for i in 0..out.len() {
                        let blended = alpha * live[i] as f32
                            + (1.0 - alpha) * inner.snapshot[i] as f32;
                        out[i] = blended as u16;
                    }
                }
            }
        }
    }
}
