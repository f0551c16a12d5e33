//! Per-destination document buffer.
//! Admits documents against count, cumulative size and single-document limits
//! and hands back the batches that must be written.

use std::fmt;

use anyhow::Result;
use serde::Serialize;

use crate::config::BufferConfig;
use crate::size::SizeEstimator;

// ============================================================================
// Types
// ============================================================================

/// How an insertion attempt was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Document admitted into the buffer.
    Buffered,
    /// Admission would exceed a limit. The buffer's previous contents are in
    /// `documents_to_process` and the document itself comes back in `resubmit`.
    FlushRequired,
    /// Document exceeds the single-document ceiling and is returned alone.
    Oversized,
    /// No document was supplied.
    Skipped,
}

/// Result of [`DocumentBuffer::try_add`].
#[derive(Debug)]
pub struct InsertResult<D> {
    pub outcome: InsertOutcome,
    /// Documents the caller must hand to the writer now, in insertion order.
    pub documents_to_process: Vec<D>,
    /// The triggering document after a flush-before-add. It was not retained,
    /// the caller owns it again and must re-submit it.
    pub resubmit: Option<D>,
}

impl<D> InsertResult<D> {
    fn buffered() -> Self {
        Self {
            outcome: InsertOutcome::Buffered,
            documents_to_process: Vec::new(),
            resubmit: None,
        }
    }

    fn skipped() -> Self {
        Self {
            outcome: InsertOutcome::Skipped,
            documents_to_process: Vec::new(),
            resubmit: None,
        }
    }

    fn oversized(document: D) -> Self {
        Self {
            outcome: InsertOutcome::Oversized,
            documents_to_process: vec![document],
            resubmit: None,
        }
    }

    fn flush_required(flushed: Vec<D>, document: D) -> Self {
        Self {
            outcome: InsertOutcome::FlushRequired,
            documents_to_process: flushed,
            resubmit: Some(document),
        }
    }

    /// True only when the document was admitted.
    pub fn success(&self) -> bool {
        self.outcome == InsertOutcome::Buffered
    }
}

/// Point-in-time occupancy of a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BufferStats {
    pub item_count: usize,
    pub total_size_bytes: usize,
}

// ============================================================================
// Buffer
// ============================================================================

pub struct DocumentBuffer<D> {
    config: BufferConfig,
    estimator: SizeEstimator<D>,
    items: Vec<D>,
    current_size_bytes: usize,
}

impl<D> DocumentBuffer<D> {
    pub fn new(config: BufferConfig, estimator: SizeEstimator<D>) -> Self {
        Self {
            config,
            estimator,
            items: Vec::new(),
            current_size_bytes: 0,
        }
    }

    /// Try to admit `document`.
    ///
    /// Limit violations are reported through the returned [`InsertResult`], never
    /// as errors. The only error is the size estimator failing, in which case the
    /// buffer is left untouched.
    pub fn try_add(&mut self, document: impl Into<Option<D>>) -> Result<InsertResult<D>> {
        let Some(document) = document.into() else {
            return Ok(InsertResult::skipped());
        };

        let size = (self.estimator)(&document)?;
        if size > self.config.max_single_item_size_bytes {
            return Ok(InsertResult::oversized(document));
        }

        if self.should_flush(size) {
            let flushed = self.flush();
            return Ok(InsertResult::flush_required(flushed, document));
        }

        self.items.push(document);
        self.current_size_bytes += size;
        Ok(InsertResult::buffered())
    }

    /// Drain all held documents in insertion order and reset occupancy.
    pub fn flush(&mut self) -> Vec<D> {
        self.current_size_bytes = 0;
        std::mem::take(&mut self.items)
    }

    /// Whether admitting one more document of `candidate_size` bytes would exceed a limit.
    pub fn should_flush(&self, candidate_size: usize) -> bool {
        exceeds_limits(
            &self.config,
            self.items.len(),
            self.current_size_bytes,
            candidate_size,
        )
    }

    pub fn stats(&self) -> BufferStats {
        BufferStats {
            item_count: self.items.len(),
            total_size_bytes: self.current_size_bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Held documents in insertion order.
    pub fn items(&self) -> &[D] {
        &self.items
    }
}

impl<D> fmt::Debug for DocumentBuffer<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentBuffer")
            .field("config", &self.config)
            .field("item_count", &self.items.len())
            .field("current_size_bytes", &self.current_size_bytes)
            .finish()
    }
}

/// Shared flush predicate. Both limits are exclusive: reaching a limit exactly is allowed.
pub(crate) fn exceeds_limits(
    config: &BufferConfig,
    item_count: usize,
    size_bytes: usize,
    candidate_size: usize,
) -> bool {
    item_count.saturating_add(1) > config.max_item_count
        || size_bytes.saturating_add(candidate_size) > config.max_total_size_bytes
}
