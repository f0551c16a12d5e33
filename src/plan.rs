//! Dry-run write executor: prints one JSON summary line per batch instead of
//! writing to a database.

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::session::WriteExecutor;
use crate::size::SizeEstimator;
use crate::types::{BatchSummary, WriteBatch};

pub struct PlanWriter<W> {
    out: W,
    estimator: SizeEstimator<Value>,
}

impl<W> PlanWriter<W> {
    pub fn new(out: W, estimator: SizeEstimator<Value>) -> Self {
        Self { out, estimator }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    pub fn summarize(&self, batch: &WriteBatch) -> Result<BatchSummary> {
        let mut size_bytes = 0usize;
        for doc in &batch.documents {
            size_bytes += (self.estimator)(doc)?;
        }
        Ok(BatchSummary {
            database: batch.key.database().to_string(),
            collection: batch.key.collection().to_string(),
            documents: batch.documents.len(),
            size_bytes,
            reason: batch.reason,
        })
    }
}

impl<W> WriteExecutor for PlanWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, batch: WriteBatch) -> Result<()> {
        let summary = self.summarize(&batch)?;
        let mut line = serde_json::to_vec(&summary).context("serializing batch summary")?;
        line.push(b'\n');
        self.out
            .write_all(&line)
            .await
            .context("writing batch summary")?;
        self.out.flush().await.context("flushing batch summary")?;
        Ok(())
    }
}
