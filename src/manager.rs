//! Routes documents to per-destination buffers.
//! Buffers are created lazily on first use and live as long as the manager.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde_json::Value;
use tracing::debug;

use crate::buffer::{exceeds_limits, BufferStats, DocumentBuffer, InsertResult};
use crate::config::{BufferConfig, BufferOverrides, Provider};
use crate::size::{estimator_for, SizeEstimator};

/// Destination of a buffer: a (database, collection) pair.
///
/// Compared structurally, so names containing `.` never collide. The dotted form
/// is only used for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DestinationKey {
    database: Arc<str>,
    collection: Arc<str>,
}

impl DestinationKey {
    pub fn new(database: &str, collection: &str) -> Self {
        Self {
            database: Arc::from(database),
            collection: Arc::from(collection),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl fmt::Display for DestinationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Owns one [`DocumentBuffer`] per destination for a single transfer session.
///
/// Not synchronized. Drive it from one producer, or put it behind a
/// single-owner task (see [`crate::session::spawn_session`]).
pub struct BufferManager<D> {
    config: BufferConfig,
    estimator: SizeEstimator<D>,
    // database -> collection -> slot in `buffers`
    index: HashMap<Arc<str>, HashMap<Arc<str>, usize>>,
    buffers: Vec<(DestinationKey, DocumentBuffer<D>)>,
}

impl<D> BufferManager<D> {
    pub fn with_config(config: BufferConfig, estimator: SizeEstimator<D>) -> Self {
        Self {
            config,
            estimator,
            index: HashMap::new(),
            buffers: Vec::new(),
        }
    }

    pub fn insert(
        &mut self,
        database: &str,
        collection: &str,
        document: impl Into<Option<D>>,
    ) -> Result<InsertResult<D>> {
        self.buffer_mut(database, collection).try_add(document)
    }

    pub fn flush(&mut self, database: &str, collection: &str) -> Vec<D> {
        let buffer = self.buffer_mut(database, collection);
        let items = buffer.flush();
        if !items.is_empty() {
            debug!(
                "flushed {} documents from {}.{}",
                items.len(),
                database,
                collection
            );
        }
        items
    }

    /// Flush predicate for a destination. An unseen destination is treated as an
    /// empty buffer and is not created.
    pub fn should_flush(&self, database: &str, collection: &str, candidate_size: usize) -> bool {
        match self.buffer(database, collection) {
            Some(buffer) => buffer.should_flush(candidate_size),
            None => exceeds_limits(&self.config, 0, 0, candidate_size),
        }
    }

    pub fn buffer_stats(&self, database: &str, collection: &str) -> BufferStats {
        self.buffer(database, collection)
            .map(DocumentBuffer::stats)
            .unwrap_or_default()
    }

    /// Drain every non-empty buffer, in destination creation order.
    pub fn flush_all(&mut self) -> Vec<(DestinationKey, Vec<D>)> {
        self.buffers
            .iter_mut()
            .filter(|(_, buffer)| !buffer.is_empty())
            .map(|(key, buffer)| {
                let items = buffer.flush();
                debug!("flushed {} documents from {}", items.len(), key);
                (key.clone(), items)
            })
            .collect()
    }

    /// Known destinations in creation order.
    pub fn keys(&self) -> impl Iterator<Item = &DestinationKey> {
        self.buffers.iter().map(|(key, _)| key)
    }

    /// Occupancy summed over all buffers.
    pub fn total_stats(&self) -> BufferStats {
        self.buffers
            .iter()
            .fold(BufferStats::default(), |acc, (_, buffer)| {
                let s = buffer.stats();
                BufferStats {
                    item_count: acc.item_count + s.item_count,
                    total_size_bytes: acc.total_size_bytes + s.total_size_bytes,
                }
            })
    }

    /// Number of destination buffers created so far.
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    pub fn estimator(&self) -> &SizeEstimator<D> {
        &self.estimator
    }

    fn buffer(&self, database: &str, collection: &str) -> Option<&DocumentBuffer<D>> {
        let slot = *self.index.get(database)?.get(collection)?;
        Some(&self.buffers[slot].1)
    }

    fn buffer_mut(&mut self, database: &str, collection: &str) -> &mut DocumentBuffer<D> {
        let existing = self
            .index
            .get(database)
            .and_then(|collections| collections.get(collection))
            .copied();
        let slot = match existing {
            Some(slot) => slot,
            None => self.create_buffer(database, collection),
        };
        &mut self.buffers[slot].1
    }

    fn create_buffer(&mut self, database: &str, collection: &str) -> usize {
        let key = DestinationKey::new(database, collection);
        let slot = self.buffers.len();
        self.index
            .entry(key.database.clone())
            .or_default()
            .insert(key.collection.clone(), slot);
        debug!("created buffer for {}", key);
        let buffer = DocumentBuffer::new(self.config, self.estimator.clone());
        self.buffers.push((key, buffer));
        slot
    }
}

impl BufferManager<Value> {
    /// Manager for JSON documents using the provider's preset limits and estimator.
    pub fn for_provider(provider: Provider) -> Self {
        Self::with_config(provider.defaults(), estimator_for(provider))
    }

    /// Provider preset with some limits overridden.
    pub fn with_overrides(provider: Provider, overrides: BufferOverrides) -> Self {
        Self::with_config(
            BufferConfig::with_overrides(provider, overrides),
            estimator_for(provider),
        )
    }
}

impl<D> fmt::Debug for BufferManager<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferManager")
            .field("config", &self.config)
            .field("buffers", &self.buffers.len())
            .finish()
    }
}
