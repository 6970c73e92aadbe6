//! Avatar info synchronization engine
//!
//! Runs once per game tick over a read-only avatar repository and produces
//! one framed packet per registered observer. A tick goes through these
//! phases, each finished before the next starts:
//!
//! 1. prepare: every observer computes its visibility plan (parallel)
//! 2. demand: count how many observers read each shared block (serial)
//! 3. precompute: encode each needed shared block once (parallel)
//! 4. encode: write, frame and commit each observer's packet (parallel)
//! 5. audit: every shared buffer must have been released by its readers
//!
//! Failures stay local to the observer they happen in. They are collected and
//! reported as one [`ProcessingFailure`] after all tasks have run.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{debug, info, warn};

use crate::config::{Execution, SyncConfig};
use crate::crypto::StreamCipher;
use crate::error::{BufferError, ConfigError, ObserverFailure, ProcessingFailure, SyncError};
use crate::game::avatar::AvatarRepository;
use crate::game::info::{EncoderSet, HuffmanCodec, InfoKind, Latin1Codec, Revision};
use crate::net::pool::{BufferLease, BufferPool, PrecomputedBuffer};

use super::encoder::{self, PacketEncoder};
use super::visibility::{ObserverState, TickPlan, VisibilitySettings};
use super::worker::{ProtocolWorker, RayonWorker, SerialWorker, Task};

type SharedBuffers = HashMap<(u16, InfoKind), Result<PrecomputedBuffer, SyncError>>;

/// Counters for one processed tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Observers registered when the tick started
    pub observers: usize,
    /// Shared blocks encoded this tick
    pub precomputed_blocks: usize,
    /// Shared blocks that could not be encoded
    pub precompute_failures: usize,
    /// Total framed bytes produced
    pub bytes_written: usize,
    /// Readers the audit had to force-release
    pub leaked_readers: usize,
    pub elapsed: Duration,
}

/// Everything one tick produced
#[derive(Debug, Clone)]
pub struct TickOutput {
    pub tick: u64,
    /// Framed packets by connection, for every observer that succeeded
    pub packets: BTreeMap<u64, Bytes>,
    /// Observers that got no packet this tick
    pub failure: Option<ProcessingFailure>,
    pub stats: TickStats,
}

impl TickOutput {
    pub fn packet(&self, connection: u64) -> Option<&Bytes> {
        self.packets.get(&connection)
    }

    /// Whether every observer received a packet
    pub fn is_complete(&self) -> bool {
        self.failure.is_none()
    }
}

/// Per-tick avatar info synchronization for one protocol revision
pub struct InfoSyncEngine {
    settings: VisibilitySettings,
    opcode: u8,
    encoders: Arc<EncoderSet>,
    huffman: Arc<dyn HuffmanCodec>,
    pool: Arc<BufferPool>,
    worker: Box<dyn ProtocolWorker>,
    observers: BTreeMap<u64, ObserverState>,
    tick: u64,
}

impl InfoSyncEngine {
    /// Build an engine from validated configuration
    pub fn new(config: &SyncConfig) -> Result<Self, ConfigError> {
        config.check()?;
        let revision = config.revision()?;
        let encoders = EncoderSet::for_revision(revision)?;

        let worker: Box<dyn ProtocolWorker> = match config.execution {
            Execution::Serial => Box::new(SerialWorker),
            Execution::Pool => Box::new(RayonWorker::new(config.worker_threads)?),
        };

        info!(
            revision = %revision,
            worker = worker.name(),
            view_distance = config.view_distance,
            pool_buffers = config.pool_buffers,
            "Avatar info engine created"
        );

        Ok(Self {
            settings: VisibilitySettings {
                view_distance: config.view_distance,
                max_high_resolution: config.max_high_resolution,
                ..VisibilitySettings::default()
            },
            opcode: config.opcode()?,
            encoders,
            huffman: Arc::new(Latin1Codec),
            pool: BufferPool::new(config.pool_buffers, config.buffer_capacity),
            worker,
            observers: BTreeMap::new(),
            tick: 0,
        })
    }

    /// Replace the execution strategy
    pub fn with_worker(mut self, worker: Box<dyn ProtocolWorker>) -> Self {
        self.worker = worker;
        self
    }

    /// Replace the chat text codec
    pub fn with_huffman(mut self, huffman: Arc<dyn HuffmanCodec>) -> Self {
        self.huffman = huffman;
        self
    }

    /// Replace the encoder set, which must be for the configured revision
    pub fn with_encoders(mut self, encoders: Arc<EncoderSet>) -> Result<Self, ConfigError> {
        if encoders.revision() != self.encoders.revision() {
            return Err(ConfigError::Invalid(format!(
                "Encoder set for revision {} does not match engine revision {}",
                encoders.revision(),
                self.encoders.revision()
            )));
        }
        self.encoders = encoders;
        Ok(self)
    }

    /// Share a buffer pool with other users
    pub fn with_pool(mut self, pool: Arc<BufferPool>) -> Self {
        self.pool = pool;
        self
    }

    /// Start synchronizing a connection whose own avatar is `avatar`
    pub fn register(&mut self, connection: u64, avatar: u16, cipher: Box<dyn StreamCipher>) {
        let state = ObserverState::new(connection, avatar, cipher);
        if self.observers.insert(connection, state).is_some() {
            warn!(connection = connection, "Observer re-registered, tracking reset");
        }
        debug!(connection = connection, avatar = avatar, "Observer registered");
    }

    pub fn unregister(&mut self, connection: u64) -> Option<ObserverState> {
        let removed = self.observers.remove(&connection);
        if removed.is_some() {
            debug!(connection = connection, "Observer unregistered");
        }
        removed
    }

    pub fn observer(&self, connection: u64) -> Option<&ObserverState> {
        self.observers.get(&connection)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    pub fn revision(&self) -> Revision {
        self.encoders.revision()
    }

    pub fn encoders(&self) -> &Arc<EncoderSet> {
        &self.encoders
    }

    pub fn opcode(&self) -> u8 {
        self.opcode
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    pub fn settings(&self) -> VisibilitySettings {
        self.settings
    }

    /// Ticks processed so far
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Process a tick, then reset the repository's per-tick extended info
    pub fn run_tick(&mut self, repo: &mut AvatarRepository) -> TickOutput {
        let output = self.process_tick(repo);
        repo.end_tick();
        output
    }

    /// Produce this tick's packet for every observer
    ///
    /// The repository is only read. Call [`AvatarRepository::end_tick`]
    /// afterwards, or use [`InfoSyncEngine::run_tick`].
    pub fn process_tick(&mut self, repo: &AvatarRepository) -> TickOutput {
        let started = Instant::now();
        let tick = self.tick;
        self.tick += 1;

        let count = self.observers.len();
        let mut failed: Vec<Option<SyncError>> = vec![None; count];

        // Prepare
        let mut prepared: Vec<Option<Result<(), SyncError>>> = vec![None; count];
        {
            let settings = self.settings;
            let tasks: Vec<Task<'_>> = self
                .observers
                .values_mut()
                .zip(prepared.iter_mut())
                .map(|(state, slot)| {
                    Box::new(move || {
                        *slot = Some(run_guarded(|| state.prepare(repo, &settings)));
                    }) as Task<'_>
                })
                .collect();
            self.worker.execute(tasks);
        }
        for (failure, slot) in failed.iter_mut().zip(prepared) {
            if let Err(error) = slot.unwrap_or(Err(SyncError::TaskNotRun)) {
                *failure = Some(error);
            }
        }

        // Demand; dirty shared blocks are encoded even with no reader
        let mut demand: BTreeMap<(u16, InfoKind), usize> = BTreeMap::new();
        for avatar in repo.iter() {
            for kind in avatar.info.dirty().kinds().filter(|kind| kind.is_precomputed()) {
                demand.insert((avatar.index(), kind), 0);
            }
        }
        for (state, failure) in self.observers.values().zip(&failed) {
            if failure.is_some() {
                continue;
            }
            if let Some(plan) = state.plan() {
                for need in plan.precomputed_needs() {
                    *demand.entry(need).or_default() += 1;
                }
            }
        }

        // Precompute
        let needs: Vec<((u16, InfoKind), usize)> = demand.into_iter().collect();
        let mut computed: Vec<Option<Result<PrecomputedBuffer, SyncError>>> =
            (0..needs.len()).map(|_| None).collect();
        {
            let encoders = self.encoders.as_ref();
            let huffman = self.huffman.as_ref();
            let pool = &self.pool;
            let tasks: Vec<Task<'_>> = needs
                .iter()
                .zip(computed.iter_mut())
                .map(|(&((index, kind), readers), slot)| {
                    Box::new(move || {
                        *slot = Some(run_guarded(|| {
                            let avatar = repo
                                .get(index)
                                .ok_or(SyncError::AvatarVanished { index })?;
                            encoder::precompute(encoders, huffman, pool, avatar, kind, readers)
                        }));
                    }) as Task<'_>
                })
                .collect();
            self.worker.execute(tasks);
        }

        let mut stats = TickStats {
            observers: count,
            ..TickStats::default()
        };
        let shared: SharedBuffers = needs
            .iter()
            .zip(computed)
            .map(|(&(need, _), slot)| {
                let result = slot.unwrap_or(Err(SyncError::TaskNotRun));
                match &result {
                    Ok(_) => stats.precomputed_blocks += 1,
                    Err(error) => {
                        stats.precompute_failures += 1;
                        warn!(
                            tick = tick,
                            avatar = need.0,
                            kind = need.1.name(),
                            error = %error,
                            "Failed to precompute extended info block"
                        );
                    }
                }
                (need, result)
            })
            .collect();

        // Encode
        let mut encoded: Vec<Option<Result<Bytes, SyncError>>> = vec![None; count];
        {
            let packets = PacketEncoder::new(&self.encoders, self.huffman.as_ref(), self.opcode);
            let packets = &packets;
            let shared = &shared;
            let tasks: Vec<Task<'_>> = self
                .observers
                .values_mut()
                .zip(encoded.iter_mut())
                .zip(&failed)
                .filter(|(_, failure)| failure.is_none())
                .map(|((state, slot), _)| {
                    Box::new(move || {
                        *slot = Some(run_guarded(|| encode_observer(state, repo, shared, packets)));
                    }) as Task<'_>
                })
                .collect();
            self.worker.execute(tasks);
        }

        // Collect
        let mut packets = BTreeMap::new();
        let mut failures = Vec::new();
        for ((state, failure), slot) in self.observers.values_mut().zip(failed).zip(encoded) {
            let result = match failure {
                Some(error) => Err(error),
                None => slot.unwrap_or(Err(SyncError::TaskNotRun)),
            };
            match result {
                Ok(frame) => {
                    stats.bytes_written += frame.len();
                    packets.insert(state.connection(), frame);
                }
                Err(error) => {
                    state.discard_plan();
                    warn!(
                        tick = tick,
                        connection = state.connection(),
                        error = %error,
                        "Observer missed its avatar info packet"
                    );
                    failures.push(ObserverFailure {
                        connection: state.connection(),
                        error,
                    });
                }
            }
        }

        // Audit
        for (&(avatar, kind), buffer) in &shared {
            let Ok(buffer) = buffer else {
                continue;
            };
            let outstanding = buffer.force_release();
            if outstanding > 0 {
                stats.leaked_readers += outstanding;
                warn!(
                    tick = tick,
                    avatar = avatar,
                    kind = kind.name(),
                    error = %BufferError::Leaked { outstanding },
                    "Precomputed buffer audit failed"
                );
            }
        }

        stats.elapsed = started.elapsed();
        debug!(
            tick = tick,
            observers = stats.observers,
            precomputed = stats.precomputed_blocks,
            bytes = stats.bytes_written,
            failures = failures.len(),
            elapsed_us = stats.elapsed.as_micros() as u64,
            "Avatar info tick processed"
        );

        TickOutput {
            tick,
            packets,
            failure: (!failures.is_empty()).then_some(ProcessingFailure { tick, failures }),
            stats,
        }
    }
}

impl std::fmt::Debug for InfoSyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InfoSyncEngine")
            .field("revision", &self.revision())
            .field("worker", &self.worker.name())
            .field("observers", &self.observers.len())
            .field("tick", &self.tick)
            .finish()
    }
}

fn encode_observer(
    state: &mut ObserverState,
    repo: &AvatarRepository,
    shared: &SharedBuffers,
    packets: &PacketEncoder<'_>,
) -> Result<Bytes, SyncError> {
    // Prepare stores a plan for every observer that reaches this point
    let plan = state.plan().ok_or(SyncError::TaskNotRun)?;
    let leases = lease_all(plan, shared)?;
    let payload = packets.encode_payload(plan, state.avatar(), repo, &leases)?;
    drop(leases);

    let frame = packets.frame(payload.as_bytes(), state.cipher_mut())?;
    state.commit();
    Ok(frame)
}

/// Lease every shared buffer the plan reads
///
/// Every lease is attempted even after a failure so that the buffers' reader
/// counts still settle when the taken leases drop.
fn lease_all(
    plan: &TickPlan,
    shared: &SharedBuffers,
) -> Result<HashMap<(u16, InfoKind), BufferLease>, SyncError> {
    let mut leases = HashMap::new();
    let mut first_error = None;

    for need in plan.precomputed_needs() {
        let (avatar, kind) = need;
        let leased = match shared.get(&need) {
            Some(Ok(buffer)) => buffer.lease().map_err(|cause| SyncError::BufferUnavailable {
                avatar,
                kind: kind.name(),
                cause,
            }),
            Some(Err(error)) => Err(error.clone()),
            None => Err(SyncError::BufferUnavailable {
                avatar,
                kind: kind.name(),
                cause: BufferError::AlreadyReleased,
            }),
        };
        match leased {
            Ok(lease) => {
                leases.insert(need, lease);
            }
            Err(error) => {
                first_error.get_or_insert(error);
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(leases),
    }
}

/// Run a task body, turning a panic into an error
fn run_guarded<T>(body: impl FnOnce() -> Result<T, SyncError>) -> Result<T, SyncError> {
    panic::catch_unwind(AssertUnwindSafe(body))
        .unwrap_or_else(|payload| Err(SyncError::Panicked(panic_message(payload.as_ref()))))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
