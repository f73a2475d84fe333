//! Run-event pub/sub: publishing a change on one checkpoint write and
//! letting status-watchers react without polling the checkpointer directly.
//!
//! Two backends are provided, standing in for the two archetypes a
//! production deployment chooses between:
//!
//! - [`BroadcastPubSub`] — in-process push via [`tokio::sync::broadcast`].
//!   At-most-once, ephemeral: a subscriber that isn't listening when a
//!   message is published simply misses it, exactly like a Redis pub/sub
//!   channel with no replay.
//! - [`PollingPubSub`] — polls a [`CheckpointSaver`]'s latest checkpoint per
//!   thread on an interval and synthesizes an event when the checkpoint id
//!   changes. This is the fallback path of a NOTIFY/LISTEN-style backend
//!   when push notifications aren't wired up, not a full NOTIFY/LISTEN
//!   implementation.
//!
//! Both guarantee per-channel FIFO delivery order and at-most-once delivery;
//! neither guarantees at-least-once.

use crate::checkpoint::CheckpointConfig;
use crate::traits::CheckpointSaver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};

/// Envelope published on a run's event channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEvent {
    pub thread_id: String,
    pub checkpoint_id: String,
    pub ts: chrono::DateTime<chrono::Utc>,
    pub metadata: RunEventMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEventMetadata {
    pub active_skill: Option<String>,
    pub status: Option<String>,
}

#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, event: RunEvent);

    /// Subscribe to `channel`, invoking `handler` for each event until
    /// `stop_signal` resolves. Delivery is at-most-once and FIFO per channel.
    async fn subscribe(
        &self,
        channel: &str,
        handler: Box<dyn Fn(RunEvent) + Send + Sync>,
        mut stop_signal: tokio::sync::oneshot::Receiver<()>,
    );
}

/// Native push pub/sub over `tokio::sync::broadcast`.
pub struct BroadcastPubSub {
    channels: RwLock<HashMap<String, broadcast::Sender<RunEvent>>>,
    capacity: usize,
}

impl BroadcastPubSub {
    pub fn new() -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity: 256,
        }
    }

    async fn sender_for(&self, channel: &str) -> broadcast::Sender<RunEvent> {
        if let Some(tx) = self.channels.read().await.get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for BroadcastPubSub {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PubSub for BroadcastPubSub {
    async fn publish(&self, channel: &str, event: RunEvent) {
        let tx = self.sender_for(channel).await;
        // No subscribers is not an error: at-most-once delivery means a
        // message with nobody listening is simply dropped.
        let _ = tx.send(event);
    }

    async fn subscribe(
        &self,
        channel: &str,
        handler: Box<dyn Fn(RunEvent) + Send + Sync>,
        mut stop_signal: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut rx = self.sender_for(channel).await.subscribe();
        loop {
            tokio::select! {
                _ = &mut stop_signal => break,
                event = rx.recv() => {
                    match event {
                        Ok(event) => handler(event),
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
    }
}

/// Polling pub/sub: the fallback path for a NOTIFY/LISTEN-style backend,
/// implemented here purely over the storage-agnostic [`CheckpointSaver`]
/// trait so it works with any backend without requiring a Postgres
/// connection.
pub struct PollingPubSub<S: CheckpointSaver> {
    saver: Arc<S>,
    interval: Duration,
}

impl<S: CheckpointSaver> PollingPubSub<S> {
    /// `interval` should be ≤200ms per the bus's latency bound.
    pub fn new(saver: Arc<S>, interval: Duration) -> Self {
        Self { saver, interval }
    }

    async fn poll_once(&self, thread_id: &str, last_seen: &mut Option<String>) -> Option<RunEvent> {
        let config = CheckpointConfig::new().with_thread_id(thread_id.to_string());
        let tuple = self.saver.get_tuple(&config).await.ok().flatten()?;

        if last_seen.as_deref() == Some(tuple.checkpoint.id.as_str()) {
            return None;
        }
        *last_seen = Some(tuple.checkpoint.id.clone());

        let active_skill = tuple
            .checkpoint
            .channel_values
            .get("active_skill")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());
        let status = tuple
            .checkpoint
            .channel_values
            .get("status")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Some(RunEvent {
            thread_id: thread_id.to_string(),
            checkpoint_id: tuple.checkpoint.id,
            ts: tuple.checkpoint.ts,
            metadata: RunEventMetadata {
                active_skill,
                status,
            },
        })
    }

    /// Poll `thread_id` until `stop_signal` resolves, invoking `handler`
    /// whenever the latest checkpoint id changes.
    pub async fn watch(
        &self,
        thread_id: &str,
        handler: Box<dyn Fn(RunEvent) + Send + Sync>,
        mut stop_signal: tokio::sync::oneshot::Receiver<()>,
    ) {
        let mut last_seen = None;
        loop {
            if let Some(event) = self.poll_once(thread_id, &mut last_seen).await {
                handler(event);
            }
            tokio::select! {
                _ = &mut stop_signal => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }
}
