use crate::{
    constants::{HASH_HEX_SIZE, PROGRESS_BUFFER, PROGRESS_INTERVAL},
    pow::meets_difficulty,
    Block, Candidate, MineError,
};
use rayon::ThreadPoolBuilder;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Cooperative cancellation shared with the caller. Workers poll it between
/// attempts; cancelling never interrupts a hash in flight.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// The nonces one worker tries: `start, start + step, start + 2*step, ...` up to
/// and including `last`. Lanes `0..step` with the same step are disjoint and
/// together cover `0..=last`.
#[derive(Clone, Copy, Debug)]
pub struct NonceLane {
    next: Option<u64>,
    step: u64,
    last: u64,
}

impl NonceLane {
    pub fn new(worker: usize, workers: usize, last: u64) -> Self {
        let start = worker as u64;
        Self {
            next: (start <= last).then_some(start),
            step: workers.max(1) as u64,
            last,
        }
    }
}

impl Iterator for NonceLane {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        let current = self.next?;
        self.next = current
            .checked_add(self.step)
            .filter(|nonce| *nonce <= self.last);
        Some(current)
    }
}

/// Lossy progress reporting. A full buffer drops the report instead of
/// stalling the worker, so observers must not expect every update.
#[derive(Clone, Debug)]
pub struct ProgressSender(SyncSender<u64>);

impl ProgressSender {
    /// Returns false when the report was dropped.
    pub fn report(&self, nonce: u64) -> bool {
        self.0.try_send(nonce).is_ok()
    }
}

#[derive(Debug)]
pub struct ProgressReceiver {
    rx: Receiver<u64>,
    high_water: HighWater,
}

impl ProgressReceiver {
    /// Blocks until a nonce above everything seen so far arrives. Returns `None`
    /// once every sender is gone, which happens when `Miner::mine` returns.
    pub fn next_increase(&mut self) -> Option<u64> {
        while let Ok(nonce) = self.rx.recv() {
            if let Some(nonce) = self.high_water.observe(nonce) {
                return Some(nonce);
            }
        }
        None
    }

    pub fn high_water(&self) -> Option<u64> {
        self.high_water.get()
    }
}

impl Iterator for ProgressReceiver {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        self.next_increase()
    }
}

/// Largest nonce observed. Workers report out of order; only increases pass.
#[derive(Clone, Copy, Debug, Default)]
pub struct HighWater(Option<u64>);

impl HighWater {
    pub fn observe(&mut self, nonce: u64) -> Option<u64> {
        match self.0 {
            Some(max) if nonce <= max => None,
            _ => {
                self.0 = Some(nonce);
                Some(nonce)
            }
        }
    }

    pub fn get(&self) -> Option<u64> {
        self.0
    }
}

pub fn progress_channel(capacity: usize) -> (ProgressSender, ProgressReceiver) {
    let (tx, rx) = mpsc::sync_channel(capacity.max(1));
    (
        ProgressSender(tx),
        ProgressReceiver {
            rx,
            high_water: HighWater::default(),
        },
    )
}

/// Progress channel with the default buffer size.
pub fn default_progress_channel() -> (ProgressSender, ProgressReceiver) {
    progress_channel(PROGRESS_BUFFER)
}

#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Number of parallel workers, at least 1.
    pub workers: usize,
    /// Attempts per worker between progress reports.
    pub progress_interval: u64,
    /// Highest nonce any worker will try.
    pub nonce_limit: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus::get().max(1),
            progress_interval: PROGRESS_INTERVAL,
            nonce_limit: u64::MAX,
        }
    }
}

impl MinerConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_progress_interval(mut self, interval: u64) -> Self {
        self.progress_interval = interval.max(1);
        self
    }

    pub fn with_nonce_limit(mut self, limit: u64) -> Self {
        self.nonce_limit = limit;
        self
    }
}

/// Outcome of a successful search.
#[derive(Clone, Debug)]
pub struct Mined {
    pub block: Block,
    /// Hashes computed across all workers, including wasted work after the win.
    pub attempts: u64,
    pub workers: usize,
    pub elapsed: Duration,
}

#[derive(Clone, Debug, Default)]
pub struct Miner {
    config: MinerConfig,
}

impl Miner {
    pub fn new(config: MinerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MinerConfig {
        &self.config
    }

    /// Searches nonces in parallel until a hash of `candidate` has
    /// `candidate.difficulty` leading '0' characters.
    ///
    /// Worker `k` of `W` tries `k, k+W, k+2W, ...`. The first worker to find a
    /// match stores the sealed block and stops the others; this call returns
    /// only after every worker has exited, so no search outlives it.
    pub fn mine(
        &self,
        candidate: Candidate,
        progress: Option<ProgressSender>,
        cancel: &CancelToken,
    ) -> Result<Mined, MineError> {
        let difficulty = candidate.difficulty;
        if difficulty as usize > HASH_HEX_SIZE {
            return Err(MineError::Unreachable {
                difficulty,
                max: HASH_HEX_SIZE,
            });
        }

        let workers = self.config.workers.max(1);
        let search = Search {
            candidate: &candidate,
            interval: self.config.progress_interval.max(1),
            winner: OnceLock::new(),
            stop: AtomicBool::new(false),
            attempts: AtomicU64::new(0),
            cancel,
        };

        info!(index = candidate.index, difficulty, workers, "mining started");
        let started = Instant::now();

        // A scoped pool joins its threads before `build_scoped` returns, so
        // neither the tasks nor the OS threads outlive this call.
        ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("miner-{i}"))
            .build_scoped(
                |thread| thread.run(),
                |pool| {
                    pool.scope(|s| {
                        for worker in 0..workers {
                            let search = &search;
                            let progress = progress.clone();
                            let lane = NonceLane::new(worker, workers, self.config.nonce_limit);
                            s.spawn(move |_| {
                                let tried = search.run_lane(lane, progress.as_ref());
                                search.attempts.fetch_add(tried, Ordering::Relaxed);
                                debug!(worker, tried, "worker exited");
                            });
                        }
                    })
                },
            )?;
        drop(progress);

        let elapsed = started.elapsed();
        let attempts = search.attempts.load(Ordering::Relaxed);
        match search.winner.into_inner() {
            Some(block) => {
                info!(
                    "Mined block {} with nonce {} and hash {} in {:?}",
                    block.index, block.nonce, block.hash, elapsed
                );
                Ok(Mined {
                    block,
                    attempts,
                    workers,
                    elapsed,
                })
            }
            None if cancel.is_cancelled() => Err(MineError::Cancelled),
            None => Err(MineError::Exhausted {
                difficulty,
                attempts,
            }),
        }
    }
}

/// State shared by the workers of one `Miner::mine` call.
struct Search<'a> {
    candidate: &'a Candidate,
    interval: u64,
    winner: OnceLock<Block>,
    stop: AtomicBool,
    attempts: AtomicU64,
    cancel: &'a CancelToken,
}

impl Search<'_> {
    fn halted(&self) -> bool {
        self.stop.load(Ordering::Acquire) || self.cancel.is_cancelled()
    }

    /// Runs one worker's lane and returns how many hashes it computed.
    fn run_lane(&self, lane: NonceLane, progress: Option<&ProgressSender>) -> u64 {
        let mut tried = 0u64;
        for nonce in lane {
            if self.halted() {
                break;
            }
            let hash = self.candidate.hash_with(nonce);
            tried += 1;
            if meets_difficulty(&hash, self.candidate.difficulty) {
                // A near-simultaneous second winner finds the slot taken.
                let _ = self
                    .winner
                    .set(self.candidate.seal_with_hash(nonce, hash));
                self.stop.store(true, Ordering::Release);
                break;
            }
            if tried % self.interval == 0 {
                if let Some(progress) = progress {
                    progress.report(nonce);
                }
            }
        }
        tried
    }
}

/// Mines the block after `previous` (or a genesis block) with the default
/// miner configuration.
pub fn mine(
    data: &str,
    previous: Option<&Block>,
    difficulty: u32,
    progress: Option<ProgressSender>,
) -> Result<Block, MineError> {
    let candidate = Candidate::next(previous, data, difficulty);
    Miner::default()
        .mine(candidate, progress, &CancelToken::new())
        .map(|mined| mined.block)
}
