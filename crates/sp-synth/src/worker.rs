//! Fixed three-worker synthesis pool
//!
//! Three persistent workers, each owning one contiguous third of the
//! oscillator range: its note descriptors and states, its precompute
//! scratch and its output accumulators. Everything a worker touches per
//! buffer lives inside its job mutex, so the driver's serial precompute
//! pass and the worker's processing pass alternate on the same lock and
//! the per-note state has exactly one writer at any time.
//!
//! Handshake per buffer:
//! 1. Driver takes each job lock in turn, walks the strided phase path of
//!    every note into the index/wave scratch, latches pan gains from the
//!    snapshot, sets `work_ready`, signals.
//! 2. Workers run in parallel; each processes its notes in ascending order
//!    and posts `done` (an atomic the driver polls with a ~100 µs passive
//!    sleep).
//! 3. Driver merges: accumulators by summation, max_volume pointwise.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use sp_audio::pin_to_core;
use sp_core::{Sample, SpError, SpResult, SynthConfig, SYNTH_WORKERS};
use sp_dsp::{
    add_assign, apply_envelope_ramp, apply_legacy_ramp, apply_volume_weighting, fill_instant,
    max_assign, mul, pan_ramp_add,
};

use crate::{
    compute_note_targets, NoteDescriptor, NoteState, PanSnapshot, PreprocessParams, WaveTable,
};

/// Per-line rendering parameters, copied into the job so workers never
/// reach back into shared configuration.
#[derive(Debug, Clone, Copy)]
pub struct RenderParams {
    pub preprocess: PreprocessParams,
    pub weighting_exponent: f32,
    pub instant_attack: bool,
    pub gap_limiter_enabled: bool,
}

impl RenderParams {
    pub fn from_config(config: &SynthConfig) -> Self {
        Self {
            preprocess: PreprocessParams::from_config(config),
            weighting_exponent: config.volume_weighting_exponent,
            instant_attack: config.instant_attack,
            gap_limiter_enabled: config.gap_limiter_enabled,
        }
    }
}

/// One line's immutable inputs, shared by the three workers.
pub struct LineJob {
    /// Freeze-blended 16-bit grayscale, length P.
    pub gray: Box<[u16]>,
    pub params: RenderParams,
}

/// Preallocated per-worker scratch (owned for the worker's lifetime).
pub struct WorkerScratch {
    /// Strided phase path, notes × block.
    pub indices: Box<[u32]>,
    /// Gathered waveform samples, notes × block.
    pub waves: Box<[Sample]>,
    /// Envelope output for the current note.
    pub volume: Box<[Sample]>,
    /// wave × volume product for the current note.
    pub wav_vol: Box<[Sample]>,
    /// Per-note targets of the current line (captured for debugging).
    pub targets: Box<[Sample]>,
    /// Per-note final envelope values (captured for debugging).
    pub settled: Box<[Sample]>,
}

impl WorkerScratch {
    fn new(notes: usize, block: usize) -> Self {
        Self {
            indices: vec![0; notes * block].into_boxed_slice(),
            waves: vec![0.0; notes * block].into_boxed_slice(),
            volume: vec![0.0; block].into_boxed_slice(),
            wav_vol: vec![0.0; block].into_boxed_slice(),
            targets: vec![0.0; notes].into_boxed_slice(),
            settled: vec![0.0; notes].into_boxed_slice(),
        }
    }
}

/// Per-worker output accumulators, length B each.
pub struct WorkerOutput {
    pub additive: Box<[Sample]>,
    pub sum_volume: Box<[Sample]>,
    pub max_volume: Box<[Sample]>,
    pub left: Box<[Sample]>,
    pub right: Box<[Sample]>,
}

impl WorkerOutput {
    fn new(block: usize) -> Self {
        Self {
            additive: vec![0.0; block].into_boxed_slice(),
            sum_volume: vec![0.0; block].into_boxed_slice(),
            max_volume: vec![0.0; block].into_boxed_slice(),
            left: vec![0.0; block].into_boxed_slice(),
            right: vec![0.0; block].into_boxed_slice(),
        }
    }

    fn clear(&mut self) {
        self.additive.fill(0.0);
        self.sum_volume.fill(0.0);
        self.max_volume.fill(0.0);
        self.left.fill(0.0);
        self.right.fill(0.0);
    }
}

/// A worker's note range: descriptors plus the only mutable copy of the
/// per-note state.
pub struct NoteChunk {
    pub start: usize,
    pub descriptors: Box<[NoteDescriptor]>,
    pub states: Box<[NoteState]>,
}

struct WorkerJob {
    work_ready: bool,
    shutdown: bool,
    line: Option<Arc<LineJob>>,
    chunk: NoteChunk,
    scratch: WorkerScratch,
    output: WorkerOutput,
}

struct WorkerShared {
    job: Mutex<WorkerJob>,
    work_cond: Condvar,
    done: AtomicBool,
}

/// Merged accumulators across all workers.
pub struct MergedOutputs {
    pub additive: Box<[Sample]>,
    pub sum_volume: Box<[Sample]>,
    pub max_volume: Box<[Sample]>,
    pub left: Box<[Sample]>,
    pub right: Box<[Sample]>,
}

impl MergedOutputs {
    pub fn new(block: usize) -> Self {
        Self {
            additive: vec![0.0; block].into_boxed_slice(),
            sum_volume: vec![0.0; block].into_boxed_slice(),
            max_volume: vec![0.0; block].into_boxed_slice(),
            left: vec![0.0; block].into_boxed_slice(),
            right: vec![0.0; block].into_boxed_slice(),
        }
    }

    fn clear(&mut self) {
        self.additive.fill(0.0);
        self.sum_volume.fill(0.0);
        self.max_volume.fill(0.0);
        self.left.fill(0.0);
        self.right.fill(0.0);
    }
}

/// The fixed pool. Dropping it broadcasts shutdown and joins the threads.
pub struct WorkerPool {
    workers: Vec<Arc<WorkerShared>>,
    handles: Vec<JoinHandle<()>>,
    table: Arc<WaveTable>,
    block_size: usize,
}

impl WorkerPool {
    /// Spawn the three persistent workers over the given chunks.
    pub fn spawn(
        chunks: Vec<(Vec<NoteDescriptor>, Vec<NoteState>)>,
        table: Arc<WaveTable>,
        block_size: usize,
    ) -> SpResult<Self> {
        debug_assert_eq!(chunks.len(), SYNTH_WORKERS);
        let mut workers = Vec::with_capacity(chunks.len());
        let mut handles = Vec::with_capacity(chunks.len());

        for (i, (descriptors, states)) in chunks.into_iter().enumerate() {
            let start = descriptors.first().map(|d| d.index).unwrap_or(0);
            let notes = descriptors.len();
            let shared = Arc::new(WorkerShared {
                job: Mutex::new(WorkerJob {
                    work_ready: false,
                    shutdown: false,
                    line: None,
                    chunk: NoteChunk {
                        start,
                        descriptors: descriptors.into_boxed_slice(),
                        states: states.into_boxed_slice(),
                    },
                    scratch: WorkerScratch::new(notes, block_size),
                    output: WorkerOutput::new(block_size),
                }),
                work_cond: Condvar::new(),
                done: AtomicBool::new(true),
            });

            let thread_shared = Arc::clone(&shared);
            let handle = std::thread::Builder::new()
                .name(format!("sp3ctra-worker-{i}"))
                .spawn(move || worker_main(thread_shared, i))
                .map_err(|e| SpError::WorkerPool(format!("failed to spawn worker {i}: {e}")))?;

            workers.push(shared);
            handles.push(handle);
        }

        log::info!(
            "Worker pool started: {} workers, block {} frames",
            workers.len(),
            block_size
        );
        Ok(Self {
            workers,
            handles,
            table,
            block_size,
        })
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Serial precompute + dispatch.
    ///
    /// For every note of every worker: walk B strided indices from the
    /// committed phase, gather the table samples, latch the pan target from
    /// the snapshot. The per-worker job lock serializes this against the
    /// worker exactly as a bank-wide mutex would.
    pub fn dispatch(&self, line: &Arc<LineJob>, pan: &PanSnapshot) {
        // Phase 1: serial precompute over every worker's range.
        for shared in &self.workers {
            shared.done.store(false, Ordering::Release);
            let mut job = shared.job.lock();
            let WorkerJob {
                chunk, scratch, ..
            } = &mut *job;

            for (k, desc) in chunk.descriptors.iter().enumerate() {
                let state = &mut chunk.states[k];
                let base = k * self.block_size;
                let mut idx = state.current_idx;
                let coeff = desc.octave_coeff;
                let area = desc.area_size;
                let divider = desc.octave_divider.max(1);
                for s in 0..self.block_size {
                    if divider == 1 || (s as u32) % divider == 0 {
                        idx = (idx + coeff) % area;
                    }
                    scratch.indices[base + s] = idx;
                    scratch.waves[base + s] = self.table.sample(desc.region_offset, idx);
                }
                state.pan = pan.read_note(desc.index);
            }

            job.line = Some(Arc::clone(line));
            job.work_ready = true;
        }

        // Phase 2: wake all three; they render in parallel.
        for shared in &self.workers {
            shared.work_cond.notify_one();
        }
    }

    /// Passive wait for all `done` flags (~100 µs sleep per poll).
    pub fn wait_done(&self) {
        for shared in &self.workers {
            while !shared.done.load(Ordering::Acquire) {
                std::thread::sleep(Duration::from_micros(100));
            }
        }
    }

    /// Merge worker outputs: summation for the accumulators, pointwise max
    /// for max_volume. No cross-worker ordering is assumed.
    pub fn merge_outputs(&self, merged: &mut MergedOutputs) {
        merged.clear();
        for shared in &self.workers {
            let job = shared.job.lock();
            add_assign(&mut merged.additive, &job.output.additive);
            add_assign(&mut merged.sum_volume, &job.output.sum_volume);
            add_assign(&mut merged.left, &job.output.left);
            add_assign(&mut merged.right, &job.output.right);
            max_assign(&mut merged.max_volume, &job.output.max_volume);
        }
    }

    /// Visit every note's (descriptor, state) pair, ascending. Diagnostic
    /// and test aid; takes each job lock in turn.
    pub fn for_each_note<F>(&self, mut f: F)
    where
        F: FnMut(&NoteDescriptor, &NoteState),
    {
        for shared in &self.workers {
            let job = shared.job.lock();
            for (desc, state) in job.chunk.descriptors.iter().zip(job.chunk.states.iter()) {
                f(desc, state);
            }
        }
    }

    /// Copy the per-note targets and settled envelope values captured
    /// during the last buffer into `targets`/`volumes` (debug surface;
    /// both slices are indexed by global note).
    pub fn capture_note_debug(&self, targets: &mut [Sample], volumes: &mut [Sample]) {
        for shared in &self.workers {
            let job = shared.job.lock();
            let start = job.chunk.start;
            let n = job.chunk.descriptors.len();
            for k in 0..n {
                if let Some(t) = targets.get_mut(start + k) {
                    *t = job.scratch.targets[k];
                }
                if let Some(v) = volumes.get_mut(start + k) {
                    *v = job.scratch.settled[k];
                }
            }
        }
    }

    /// Update the envelope coefficients of every note (config change).
    pub fn update_envelopes(&self, envelope: &sp_dsp::EnvelopeParams) {
        for shared in &self.workers {
            let mut job = shared.job.lock();
            for d in job.chunk.descriptors.iter_mut() {
                d.alpha_up = envelope.alpha_up();
                d.alpha_down_weighted = envelope.alpha_down_for(d.frequency);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for shared in &self.workers {
            let mut job = shared.job.lock();
            job.shutdown = true;
            drop(job);
            shared.work_cond.notify_one();
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
        log::debug!("Worker pool joined");
    }
}

fn worker_main(shared: Arc<WorkerShared>, index: usize) {
    // Decaying envelopes live deep in the denormal range.
    sp_dsp::set_denormals_zero();
    // Core 0 is left to the ingest/driver threads.
    if cfg!(target_os = "linux") {
        pin_to_core(index + 1);
    }

    loop {
        let mut job = shared.job.lock();
        while !job.work_ready && !job.shutdown {
            shared.work_cond.wait(&mut job);
        }
        if job.shutdown {
            break;
        }
        job.work_ready = false;
        if let Some(line) = job.line.take() {
            process_range(&mut job, &line);
        }
        drop(job);
        shared.done.store(true, Ordering::Release);
    }
}

/// The worker body: per note, ascending. Preprocess, envelope, accumulate.
fn process_range(job: &mut WorkerJob, line: &LineJob) {
    let WorkerJob {
        chunk,
        scratch,
        output,
        ..
    } = job;
    let block = output.additive.len();
    let notes = chunk.descriptors.len();
    output.clear();

    let range = chunk.start..chunk.start + notes;
    compute_note_targets(
        &line.gray,
        range,
        &line.params.preprocess,
        &mut scratch.targets,
    );

    for k in 0..notes {
        let desc = &chunk.descriptors[k];
        let state = &mut chunk.states[k];
        let target = scratch.targets[k];
        state.target_volume = target;

        // Envelope into the volume scratch, persisting the final value.
        let settled = if !line.params.gap_limiter_enabled {
            apply_legacy_ramp(
                &mut scratch.volume,
                state.current_volume,
                target,
                desc.volume_increment,
                desc.volume_decrement,
                0.0,
                1.0,
            )
        } else if line.params.instant_attack && target > state.current_volume {
            fill_instant(&mut scratch.volume, target)
        } else {
            let alpha = if target > state.current_volume {
                desc.alpha_up
            } else {
                desc.alpha_down_weighted
            };
            apply_envelope_ramp(
                &mut scratch.volume,
                state.current_volume,
                target,
                alpha,
                0.0,
                1.0,
            )
        };
        state.current_volume = settled;
        scratch.settled[k] = settled;

        // wave × volume, then the four accumulators.
        let wave_row = &scratch.waves[k * block..(k + 1) * block];
        mul(wave_row, &scratch.volume, &mut scratch.wav_vol);
        add_assign(&mut output.additive, &scratch.wav_vol);
        apply_volume_weighting(
            &mut output.sum_volume,
            &scratch.volume,
            line.params.weighting_exponent,
        );
        max_assign(&mut output.max_volume, &scratch.volume);
        pan_ramp_add(
            &scratch.wav_vol,
            &mut output.left,
            &mut output.right,
            state.last_left_gain,
            state.last_right_gain,
            state.pan.left,
            state.pan.right,
        );
        state.last_left_gain = state.pan.left;
        state.last_right_gain = state.pan.right;

        // Commit the phase so the next buffer continues where this one
        // ended.
        state.current_idx = scratch.indices[k * block + block - 1];
    }
}
