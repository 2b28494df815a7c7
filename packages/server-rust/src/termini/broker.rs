//! Message brokers backing the queue terminus.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{debug, warn};

use super::validate_key;
use crate::error::IndirectorResult;
use crate::fsutil;

/// Named-queue transport. Delivery is at most once: a received message is
/// gone from the broker whether or not the consumer handles it.
#[async_trait]
pub trait Broker: Send + Sync {
    fn name(&self) -> &'static str;

    /// Appends `message` to `queue`.
    async fn publish(&self, queue: &str, message: Vec<u8>) -> IndirectorResult<()>;

    /// Waits for the next message on `queue`. `None` means the broker is
    /// closed and no further messages will arrive.
    async fn receive(&self, queue: &str) -> IndirectorResult<Option<Vec<u8>>>;
}

// ---------------------------------------------------------------------------
// MemoryBroker
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryQueue {
    messages: Mutex<VecDeque<Vec<u8>>>,
    notify: Notify,
}

/// In-process broker; queues live as long as the broker.
#[derive(Default)]
pub struct MemoryBroker {
    queues: DashMap<String, Arc<MemoryQueue>>,
}

impl MemoryBroker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages waiting on `queue`.
    #[must_use]
    pub fn pending(&self, queue: &str) -> usize {
        self.queues
            .get(queue)
            .map_or(0, |q| q.messages.lock().len())
    }

    fn queue(&self, queue: &str) -> Arc<MemoryQueue> {
        Arc::clone(self.queues.entry(queue.to_string()).or_default().value())
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn publish(&self, queue: &str, message: Vec<u8>) -> IndirectorResult<()> {
        let target = self.queue(queue);
        target.messages.lock().push_back(message);
        target.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, queue: &str) -> IndirectorResult<Option<Vec<u8>>> {
        let source = self.queue(queue);
        loop {
            if let Some(message) = source.messages.lock().pop_front() {
                return Ok(Some(message));
            }
            source.notify.notified().await;
        }
    }
}

// ---------------------------------------------------------------------------
// DirectoryBroker
// ---------------------------------------------------------------------------

/// Extension of spooled message files.
const MESSAGE_EXTENSION: &str = "msg";

/// Spool-directory broker: one file per message under `<root>/<queue>/`,
/// consumed in name order and removed on receipt. Usable across processes
/// sharing the directory.
pub struct DirectoryBroker {
    root: PathBuf,
    poll_interval: Duration,
    sequence: AtomicU64,
}

impl DirectoryBroker {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            poll_interval: Duration::from_millis(250),
            sequence: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn queue_dir(&self, queue: &str) -> IndirectorResult<PathBuf> {
        validate_key(queue)?;
        Ok(self.root.join(queue))
    }

    /// Sortable, process-unique message file stem.
    fn next_stem(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{nanos:024}-{sequence:012}-{}", std::process::id())
    }
}

#[async_trait]
impl Broker for DirectoryBroker {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn publish(&self, queue: &str, message: Vec<u8>) -> IndirectorResult<()> {
        let dir = self.queue_dir(queue)?;
        let path = dir.join(format!("{}.{MESSAGE_EXTENSION}", self.next_stem()));
        fsutil::atomic_write(&path, &message).await?;
        debug!(path = %path.display(), "spooled message");
        Ok(())
    }

    async fn receive(&self, queue: &str) -> IndirectorResult<Option<Vec<u8>>> {
        let dir = self.queue_dir(queue)?;
        loop {
            for stem in fsutil::list_stems(&dir, MESSAGE_EXTENSION).await? {
                let path = dir.join(format!("{stem}.{MESSAGE_EXTENSION}"));
                let Some(message) = fsutil::read_optional(&path).await? else {
                    continue;
                };
                // Another consumer may have claimed the file in between.
                match fsutil::remove_if_exists(&path).await {
                    Ok(true) => return Ok(Some(message)),
                    Ok(false) => continue,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "could not claim message");
                        continue;
                    }
                }
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_broker_is_fifo_per_queue() {
        let broker = MemoryBroker::new();
        broker.publish("catalog", b"one".to_vec()).await.unwrap();
        broker.publish("catalog", b"two".to_vec()).await.unwrap();
        broker.publish("facts", b"other".to_vec()).await.unwrap();

        assert_eq!(broker.pending("catalog"), 2);
        assert_eq!(broker.receive("catalog").await.unwrap().unwrap(), b"one");
        assert_eq!(broker.receive("catalog").await.unwrap().unwrap(), b"two");
        assert_eq!(broker.pending("facts"), 1);
    }

    #[tokio::test]
    async fn memory_broker_wakes_waiting_consumer() {
        let broker = Arc::new(MemoryBroker::new());
        let consumer = {
            let broker = Arc::clone(&broker);
            tokio::spawn(async move { broker.receive("catalog").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("catalog", b"late".to_vec()).await.unwrap();
        let message = consumer.await.unwrap().unwrap().unwrap();
        assert_eq!(message, b"late");
    }

    #[tokio::test]
    async fn directory_broker_delivers_in_order_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let broker = DirectoryBroker::new(dir.path()).with_poll_interval(Duration::from_millis(10));
        for body in ["first", "second", "third"] {
            broker.publish("catalog", body.as_bytes().to_vec()).await.unwrap();
        }
        for expected in ["first", "second", "third"] {
            let message = broker.receive("catalog").await.unwrap().unwrap();
            assert_eq!(message, expected.as_bytes());
        }
        let remaining = fsutil::list_stems(&dir.path().join("catalog"), MESSAGE_EXTENSION)
            .await
            .unwrap();
        assert!(remaining.is_empty());
    }

    #[tokio::test]
    async fn directory_broker_rejects_unsafe_queue_names() {
        let dir = tempfile::tempdir().unwrap();
        let broker = DirectoryBroker::new(dir.path());
        assert!(broker.publish("../x", Vec::new()).await.is_err());
    }
}
