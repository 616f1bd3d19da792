//! Real-time scheduling helpers
//!
//! Two concerns: elevating the audio/synthesis threads above normal
//! timesharing, and pinning the three synthesis workers to dedicated cores
//! on Linux. Both degrade gracefully: a refused request leaves the thread
//! on default scheduling and the engine fully functional.

use std::sync::atomic::{AtomicBool, Ordering};

/// One elevation attempt per process; repeat callers get `AlreadySet`.
static PRIORITY_SET: AtomicBool = AtomicBool::new(false);

/// Outcome of a scheduling request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedOutcome {
    /// Real-time class granted.
    Elevated,
    /// A previous call already elevated this process.
    AlreadySet,
    /// The OS refused (missing CAP_SYS_NICE or equivalent); non-fatal.
    Refused,
    /// No real-time scheduling on this platform.
    Unsupported,
}

/// Elevate the current thread to the platform's real-time class.
///
/// Call once from the audio callback thread when the stream starts, and
/// once from the synthesis thread.
pub fn set_realtime_priority() -> SchedOutcome {
    if PRIORITY_SET.swap(true, Ordering::SeqCst) {
        return SchedOutcome::AlreadySet;
    }
    let outcome = platform_elevate();
    match outcome {
        SchedOutcome::Elevated => log::info!("Audio thread elevated to real-time priority"),
        SchedOutcome::Refused => {
            log::warn!("Real-time priority refused; running at default priority");
            PRIORITY_SET.store(false, Ordering::SeqCst); // allow retry
        }
        SchedOutcome::Unsupported => {
            log::debug!("Real-time scheduling not supported on this platform")
        }
        SchedOutcome::AlreadySet => {}
    }
    outcome
}

/// Pin the current thread to one CPU core. Linux only; returns false
/// (and changes nothing) elsewhere or on refusal.
pub fn pin_to_core(core: usize) -> bool {
    let pinned = platform_pin(core);
    if pinned {
        log::debug!("Thread pinned to core {}", core);
    }
    pinned
}

#[cfg(target_os = "linux")]
fn platform_elevate() -> SchedOutcome {
    // SCHED_FIFO at a priority below kernel threads; SCHED_RR as fallback.
    let mut param = libc::sched_param { sched_priority: 70 };
    // SAFETY: affects scheduling of the calling thread only.
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) } == 0 {
        return SchedOutcome::Elevated;
    }
    param.sched_priority = 60;
    if unsafe { libc::sched_setscheduler(0, libc::SCHED_RR, &param) } == 0 {
        return SchedOutcome::Elevated;
    }
    SchedOutcome::Refused
}

#[cfg(target_os = "linux")]
fn platform_pin(core: usize) -> bool {
    // SAFETY: cpu_set_t is POD; the set is built and consumed locally.
    unsafe {
        let mut set: libc::cpu_set_t = std::mem::zeroed();
        libc::CPU_ZERO(&mut set);
        libc::CPU_SET(core, &mut set);
        libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &set) == 0
    }
}

#[cfg(target_os = "macos")]
fn platform_elevate() -> SchedOutcome {
    // Highest non-realtime QoS; the time-constraint policy is left to the
    // host audio stack, which already runs its callback thread real-time.
    const QOS_CLASS_USER_INTERACTIVE: u32 = 0x21;
    extern "C" {
        fn pthread_set_qos_class_self_np(qos_class: u32, relative_priority: i32) -> i32;
    }
    // SAFETY: affects QoS of the calling thread only.
    if unsafe { pthread_set_qos_class_self_np(QOS_CLASS_USER_INTERACTIVE, 0) } == 0 {
        SchedOutcome::Elevated
    } else {
        SchedOutcome::Refused
    }
}

#[cfg(target_os = "macos")]
fn platform_pin(_core: usize) -> bool {
    // macOS offers no thread-to-core binding API worth using here.
    false
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_elevate() -> SchedOutcome {
    SchedOutcome::Unsupported
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn platform_pin(_core: usize) -> bool {
    false
}

/// Reset the elevation gate (test aid).
#[doc(hidden)]
pub fn reset_priority_state() {
    PRIORITY_SET.store(false, Ordering::SeqCst);
}
