//! Avatar info synchronization module
//!
//! Builds the per-tick avatar info packet for every connected observer:
//! - Tracking which avatars each observer sees (high and low resolution)
//! - Encoding the bit-packed resolution changes and extended info
//! - Sharing encoded blocks across observers through pooled buffers
//! - Running observer tasks serially or on a worker pool

pub mod decoder;
pub mod encoder;
pub mod engine;
pub mod visibility;
pub mod worker;

pub use decoder::{decode_payload, split_frame, DecodedPacket, Placement};
pub use encoder::{PacketEncoder, Step};
pub use engine::{InfoSyncEngine, TickOutput, TickStats};
pub use visibility::{ObserverState, TickPlan, VisibilitySettings};
pub use worker::{ProtocolWorker, RayonWorker, SerialWorker, Task};
