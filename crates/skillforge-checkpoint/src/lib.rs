//! # skillforge-checkpoint — durable run-state persistence
//!
//! Every orchestrator tick produces a new [`Checkpoint`] — a snapshot of a
//! run's [`RunState`] (data store, active skill, step history, status) keyed
//! by `(thread_id, checkpoint_ns, checkpoint_id)` and ordered by `ts`. The
//! orchestrator is never allowed to advance past a planner decision until the
//! checkpoint recording that decision has durably landed; that guarantee is
//! this crate's entire reason to exist.
//!
//! ## Backends
//!
//! - [`InMemoryCheckpointSaver`] — reference implementation, not durable
//!   across restarts. Used in tests and for local experimentation.
//! - [`SqliteCheckpointSaver`] — the durable backend: a single `INSERT`
//!   per checkpoint, `put` only returns once `sqlx` confirms the row landed.
//! - [`BufferedCheckpointSaver`] — wraps either of the above with a bounded
//!   write buffer, for callers willing to trade a small durability window
//!   for fewer round-trips; `flush()` closes that window on demand.
//!
//! ## Pub/sub
//!
//! [`BroadcastPubSub`] and [`PollingPubSub`] notify watchers when a thread's
//! latest checkpoint changes, without requiring every caller to poll
//! `get_tuple` directly. See [`mod@pubsub`] for which to reach for.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use skillforge_checkpoint::{
//!     InMemoryCheckpointSaver, CheckpointSaver, CheckpointConfig,
//!     Checkpoint, CheckpointMetadata, RunState,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let saver = InMemoryCheckpointSaver::new();
//!     let config = CheckpointConfig::new().with_thread_id("thread-123".to_string());
//!
//!     let state = RunState::new();
//!     let checkpoint = Checkpoint::new("cp-1".to_string(), state.into_channel_values());
//!     let saved = saver.put(&config, checkpoint, CheckpointMetadata::new()).await?;
//!
//!     if let Some(tuple) = saver.get_tuple(&saved).await? {
//!         println!("latest checkpoint: {:?}", tuple.checkpoint.id);
//!     }
//!     Ok(())
//! }
//! ```

pub mod buffered;
pub mod checkpoint;
pub mod error;
pub mod memory;
pub mod pubsub;
pub mod serializer;
pub mod sqlite;
pub mod traits;

pub use buffered::BufferedCheckpointSaver;
pub use checkpoint::{
    Checkpoint, CheckpointConfig, CheckpointId, CheckpointMetadata, CheckpointSource,
    CheckpointTuple, PendingWrite, RunState, RunStatus, END_SENTINEL,
};
pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointSaver;
pub use pubsub::{BroadcastPubSub, PollingPubSub, PubSub, RunEvent, RunEventMetadata};
pub use serializer::{BincodeSerializer, JsonSerializer, SerializerProtocol};
pub use sqlite::SqliteCheckpointSaver;
pub use traits::{CheckpointSaver, CheckpointStream};
