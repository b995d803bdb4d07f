//! Dead-letter sinks.
//!
//! Two [`DeadLetterSink`] implementations:
//!
//! - [`InMemoryDeadLetterQueue`]: bounded, FIFO, drops the oldest entry when
//!   full.
//! - [`FileDeadLetterQueue`]: JSON lines on disk, one synced write per entry.
//!
//! [`DeadLetterRegistry`] maps queue names to sinks and reports their health.

use crate::metrics::DeadLetterMetrics;
use crate::{HealthCheck, HealthReport};
use status_relay_core::{DeadLetterEntry, DeadLetterError, DeadLetterSink};
use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

/// Default capacity of an in-memory queue.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Bounded in-memory dead-letter queue.
///
/// Thread-safe for concurrent appends. Not durable: entries live only as long
/// as the process, and when full the oldest entry is dropped. An eviction is
/// logged with the dropped entry's target and payload and counted by a metric;
/// the delivery outcome recorded for that entry is not revised.
///
/// # Example
///
/// ```
/// use status_relay_runtime::dead_letter::InMemoryDeadLetterQueue;
///
/// let dlq = InMemoryDeadLetterQueue::new("primary-dlq", 1000);
/// assert!(dlq.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct InMemoryDeadLetterQueue {
    name: String,
    queue: Arc<Mutex<VecDeque<DeadLetterEntry>>>,
    max_size: usize,
}

impl InMemoryDeadLetterQueue {
    /// Create a queue holding at most `max_size` entries.
    #[must_use]
    pub fn new(name: impl Into<String>, max_size: usize) -> Self {
        Self {
            name: name.into(),
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Append an entry, evicting the oldest one if the queue is full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&self, entry: DeadLetterEntry) -> Option<DeadLetterEntry> {
        let mut queue = self
            .queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let evicted = if queue.len() >= self.max_size {
            queue.pop_front()
        } else {
            None
        };
        if let Some(dropped) = &evicted {
            DeadLetterMetrics::record_eviction(&self.name);
            tracing::error!(
                queue = %self.name,
                max_size = self.max_size,
                target_id = %dropped.target_id,
                enqueued_at = %dropped.enqueued_at,
                reason = %dropped.failure_reason,
                payload = %dropped.original_payload,
                "Dead letter queue at capacity, dropped oldest entry"
            );
        }

        tracing::warn!(
            queue = %self.name,
            target_id = %entry.target_id,
            attempts = entry.attempts,
            reason = %entry.failure_reason,
            "Delivery added to dead letter queue"
        );
        queue.push_back(entry);
        DeadLetterMetrics::record_size(&self.name, queue.len());
        evicted
    }

    /// Copy of all entries, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<DeadLetterEntry> {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Get the current queue size
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Check if the queue is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the maximum queue size
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl DeadLetterSink for InMemoryDeadLetterQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(
        &self,
        entry: DeadLetterEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>> {
        Box::pin(async move {
            let _evicted = self.push(entry);
            Ok(())
        })
    }

    fn entries(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterEntry>, DeadLetterError>> + Send + '_>>
    {
        Box::pin(async move { Ok(self.snapshot()) })
    }

    fn len(&self) -> Pin<Box<dyn Future<Output = Result<usize, DeadLetterError>> + Send + '_>> {
        Box::pin(async move { Ok(Self::len(self)) })
    }
}

/// File-backed dead-letter queue storing one JSON object per line.
///
/// Appends are serialized through an async lock so concurrent writers never
/// interleave; each entry is a single `write_all` followed by `sync_data`.
#[derive(Debug)]
pub struct FileDeadLetterQueue {
    name: String,
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileDeadLetterQueue {
    /// Queue stored at `<dir>/<name>.jsonl`.
    ///
    /// # Errors
    ///
    /// Returns [`DeadLetterError::Io`] if the directory cannot be created.
    pub async fn open(dir: impl AsRef<Path>, name: impl Into<String>) -> Result<Self, DeadLetterError> {
        let name = name.into();
        tokio::fs::create_dir_all(dir.as_ref()).await?;
        let path = dir.as_ref().join(format!("{name}.jsonl"));
        tracing::info!(queue = %name, path = %path.display(), "Opened file dead letter queue");
        Ok(Self {
            name,
            path,
            lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let _guard = self.lock.lock().await;
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(err.into()),
        };

        contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(DeadLetterError::from))
            .collect()
    }
}

impl DeadLetterSink for FileDeadLetterQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn append(
        &self,
        entry: DeadLetterEntry,
    ) -> Pin<Box<dyn Future<Output = Result<(), DeadLetterError>> + Send + '_>> {
        Box::pin(async move {
            let mut line = serde_json::to_vec(&entry)?;
            line.push(b'\n');

            let _guard = self.lock.lock().await;
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await?;
            file.write_all(&line).await?;
            file.sync_data().await?;

            tracing::warn!(
                queue = %self.name,
                target_id = %entry.target_id,
                attempts = entry.attempts,
                reason = %entry.failure_reason,
                "Delivery added to dead letter queue"
            );
            Ok(())
        })
    }

    fn entries(
        &self,
    ) -> Pin<Box<dyn Future<Output = Result<Vec<DeadLetterEntry>, DeadLetterError>> + Send + '_>>
    {
        Box::pin(self.read_all())
    }
}

/// Named dead-letter sinks, one per queue.
#[derive(Clone, Default)]
pub struct DeadLetterRegistry {
    sinks: BTreeMap<String, Arc<dyn DeadLetterSink>>,
}

impl std::fmt::Debug for DeadLetterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterRegistry")
            .field("queues", &self.sinks.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DeadLetterRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink under its own name, replacing any previous one.
    pub fn insert(&mut self, sink: Arc<dyn DeadLetterSink>) {
        self.sinks.insert(sink.name().to_string(), sink);
    }

    /// Look up a sink by queue name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn DeadLetterSink>> {
        self.sinks.get(name).cloned()
    }

    /// Queue names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.sinks.keys().map(String::as_str)
    }

    /// All sinks in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Arc<dyn DeadLetterSink>)> {
        self.sinks.iter().map(|(name, sink)| (name.as_str(), sink))
    }

    /// Size of every queue.
    ///
    /// # Errors
    ///
    /// Returns the first [`DeadLetterError`] hit while reading a queue.
    pub async fn sizes(&self) -> Result<Vec<(String, usize)>, DeadLetterError> {
        let mut sizes = Vec::with_capacity(self.sinks.len());
        for (name, sink) in &self.sinks {
            sizes.push((name.clone(), sink.len().await?));
        }
        Ok(sizes)
    }

    /// Health of every queue.
    ///
    /// A queue holding entries is degraded; one that cannot be read is
    /// unhealthy.
    pub async fn health(&self) -> HealthReport {
        let mut checks = Vec::with_capacity(self.sinks.len());
        for (name, sink) in &self.sinks {
            let component = format!("dead_letter_queue:{name}");
            let check = match sink.len().await {
                Ok(0) => HealthCheck::healthy(component).with_metadata("size", "0"),
                Ok(size) => HealthCheck::degraded(component, format!("{size} undelivered entries"))
                    .with_metadata("size", size.to_string()),
                Err(err) => HealthCheck::unhealthy(component, err.to_string()),
            };
            checks.push(check);
        }
        HealthReport::new(checks)
    }
}
