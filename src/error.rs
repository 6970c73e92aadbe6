//! Error handling module
//!
//! Defines custom error types for the Rustscape protocol library.

use std::fmt;

use thiserror::Error;

/// Main error type for the protocol library
#[derive(Error, Debug)]
pub enum RustscapeError {
    /// Wire format errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Pooled buffer errors
    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    /// Per-observer synchronization errors
    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    /// Aggregated tick failure
    #[error("Processing failure: {0}")]
    Processing(#[from] ProcessingFailure),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Avatar repository errors
    #[error("Game error: {0}")]
    Game(#[from] GameError),
}

/// Wire format errors raised while encoding or decoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Value out of range for {field}: {value}")]
    ValueOutOfRange { field: &'static str, value: i64 },

    #[error("Expected {expected} block, got {actual}")]
    BlockMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Invalid string encoding")]
    InvalidStringEncoding,

    #[error("Bit access overflow: {bits} bits requested")]
    BitOverflow { bits: usize },
}

/// Pooled buffer lifecycle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BufferError {
    #[error("Buffer pool exhausted ({capacity} buffers outstanding)")]
    PoolExhausted { capacity: usize },

    #[error("Buffer leased more times than its {readers} expected readers")]
    LeaseOverflow { readers: usize },

    #[error("Buffer already released")]
    AlreadyReleased,

    #[error("Buffer leaked with {outstanding} unreleased readers")]
    Leaked { outstanding: usize },
}

/// Configuration errors, fatal at setup
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unsupported protocol revision: {0}")]
    UnsupportedRevision(u32),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Avatar repository errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GameError {
    #[error("Avatar repository full ({capacity} slots)")]
    RepositoryFull { capacity: usize },

    #[error("Avatar not found: {0}")]
    AvatarNotFound(u16),

    #[error("Invalid coordinate: ({x}, {z}, {level})")]
    InvalidCoordinate { x: u32, z: u32, level: u32 },
}

/// Errors that fail a single observer's packet for one tick
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Observer avatar {index} is not in the repository")]
    ObserverAvatarMissing { index: u16 },

    #[error("Avatar {index} vanished during the tick")]
    AvatarVanished { index: u16 },

    #[error("Precomputed {kind} buffer for avatar {avatar} is unavailable: {cause}")]
    BufferUnavailable {
        avatar: u16,
        kind: &'static str,
        cause: BufferError,
    },

    #[error("Encoding failed: {0}")]
    Encode(#[from] ProtocolError),

    #[error("Buffer failure: {0}")]
    Buffer(#[from] BufferError),

    #[error("Encode task panicked: {0}")]
    Panicked(String),

    #[error("Worker returned without running the task")]
    TaskNotRun,
}

/// One observer's failure within a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObserverFailure {
    /// Connection the observer belongs to
    pub connection: u64,
    /// What went wrong
    pub error: SyncError,
}

impl fmt::Display for ObserverFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "connection {}: {}", self.connection, self.error)
    }
}

/// All observer failures of one tick, reported together after every task ran
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{} observer(s) failed during tick {tick}", failures.len())]
pub struct ProcessingFailure {
    /// Tick number
    pub tick: u64,
    /// Failed observers, in observer order
    pub failures: Vec<ObserverFailure>,
}

impl ProcessingFailure {
    /// Connections that failed this tick
    pub fn connections(&self) -> impl Iterator<Item = u64> + '_ {
        self.failures.iter().map(|f| f.connection)
    }

    /// Check whether a connection is among the failures
    pub fn contains(&self, connection: u64) -> bool {
        self.failures.iter().any(|f| f.connection == connection)
    }
}

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, RustscapeError>;
