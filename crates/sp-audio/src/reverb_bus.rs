//! Reverb send/return bus
//!
//! The reverb processor itself is a collaborator running on its own thread;
//! the core only owns the plumbing: a dry ring (callback → reverb) and a
//! wet ring (reverb → callback), both SPSC and non-blocking. A full dry
//! ring drops samples, an empty wet ring reports "no return" and the
//! callback mixes nothing; the audio thread never waits.

use rtrb::{Consumer, Producer, RingBuffer};

use sp_core::Sample;

/// Callback-side endpoints.
pub struct ReverbTap {
    dry: Producer<Sample>,
    wet: Consumer<(Sample, Sample)>,
}

impl ReverbTap {
    /// Push one dry sample toward the reverb thread. Returns false when the
    /// ring is full (the sample is dropped, never blocked on).
    #[inline]
    pub fn write_dry(&mut self, sample: Sample) -> bool {
        self.dry.push(sample).is_ok()
    }

    /// Pull one wet frame if available.
    #[inline]
    pub fn read_wet(&mut self, left: &mut Sample, right: &mut Sample) -> bool {
        match self.wet.pop() {
            Ok((l, r)) => {
                *left = l;
                *right = r;
                true
            }
            Err(_) => false,
        }
    }
}

/// Reverb-thread-side endpoints.
pub struct ReverbPort {
    dry: Consumer<Sample>,
    wet: Producer<(Sample, Sample)>,
}

impl ReverbPort {
    /// Pull one dry sample to process.
    #[inline]
    pub fn read_dry(&mut self) -> Option<Sample> {
        self.dry.pop().ok()
    }

    /// Push one processed wet frame back. Returns false when the callback
    /// has fallen behind and the ring is full.
    #[inline]
    pub fn write_wet(&mut self, left: Sample, right: Sample) -> bool {
        self.wet.push((left, right)).is_ok()
    }

    /// Number of dry samples waiting.
    pub fn dry_backlog(&self) -> usize {
        self.dry.slots()
    }
}

/// Build the two rings. `capacity` is per ring, in samples/frames.
pub fn reverb_bus(capacity: usize) -> (ReverbTap, ReverbPort) {
    let (dry_tx, dry_rx) = RingBuffer::new(capacity);
    let (wet_tx, wet_rx) = RingBuffer::new(capacity);
    (
        ReverbTap {
            dry: dry_tx,
            wet: wet_rx,
        },
        ReverbPort {
            dry: dry_rx,
            wet: wet_tx,
        },
    )
}
