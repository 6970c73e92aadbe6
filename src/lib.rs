//! Rustscape Protocol Library
//!
//! Server-side avatar information synchronization for RS revision servers.
//! Once per game tick the engine works out which avatars every connected
//! observer can see, encodes their movement and extended info into the
//! revision's avatar info packet and shares identical encoded blocks between
//! observers.
//!
//! ## Modules
//!
//! - `config` - Engine configuration management
//! - `crypto` - Stream ciphers for opcode obfuscation (ISAAC)
//! - `error` - Error types and result definitions
//! - `game` - Avatars, coordinates, extended info and synchronization
//! - `net` - Packet buffers, bit access and buffer pooling

pub mod config;
pub mod crypto;
pub mod error;
pub mod game;
pub mod net;

// Re-export commonly used types
pub use config::SyncConfig;
pub use error::{Result, RustscapeError};
pub use game::info::Revision;
pub use game::sync::{InfoSyncEngine, TickOutput};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
