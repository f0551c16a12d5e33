//! Transfer session: feeds source documents through a [`BufferManager`] and
//! hands every resulting batch to a [`WriteExecutor`].

use std::future::Future;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::buffer::{InsertOutcome, InsertResult};
use crate::manager::{BufferManager, DestinationKey};
use crate::types::{FlushReason, SourceDocument, WriteBatch};

/// Persists batches. Failures are returned to the session caller as-is; the
/// session never retries, the documents are already out of the buffer.
pub trait WriteExecutor: Send {
    fn write(&mut self, batch: WriteBatch) -> impl Future<Output = Result<()>> + Send;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    pub documents_in: u64,
    pub documents_written: u64,
    pub batches_written: u64,
    pub oversized_documents: u64,
    pub skipped_documents: u64,
}

pub struct TransferSession<E> {
    manager: BufferManager<Value>,
    executor: E,
    report: SessionReport,
}

impl<E: WriteExecutor> TransferSession<E> {
    pub fn new(manager: BufferManager<Value>, executor: E) -> Self {
        Self {
            manager,
            executor,
            report: SessionReport::default(),
        }
    }

    pub fn report(&self) -> SessionReport {
        self.report
    }

    pub fn manager(&self) -> &BufferManager<Value> {
        &self.manager
    }

    /// Buffer one document, writing whatever the buffer hands back.
    ///
    /// After a flush-before-add the document is re-submitted once. If it still
    /// does not fit an empty buffer it is written alone.
    pub async fn ingest(&mut self, source: SourceDocument) -> Result<()> {
        self.report.documents_in += 1;
        let SourceDocument {
            database,
            collection,
            document,
        } = source;

        // A JSON null from the source is "no document"
        let document = Some(document).filter(|d| !d.is_null());

        let mut resubmitted = false;
        let mut result = self.manager.insert(&database, &collection, document)?;
        loop {
            let InsertResult {
                outcome,
                documents_to_process,
                resubmit,
            } = result;

            match outcome {
                InsertOutcome::Buffered => return Ok(()),
                InsertOutcome::Skipped => {
                    self.report.skipped_documents += 1;
                    return Ok(());
                }
                InsertOutcome::Oversized => {
                    warn!(
                        "document for {}.{} exceeds {} bytes, writing alone",
                        database,
                        collection,
                        self.manager.config().max_single_item_size_bytes
                    );
                    self.report.oversized_documents += 1;
                    let key = DestinationKey::new(&database, &collection);
                    return self
                        .write(key, documents_to_process, FlushReason::Oversized)
                        .await;
                }
                InsertOutcome::FlushRequired => {
                    let key = DestinationKey::new(&database, &collection);
                    if !documents_to_process.is_empty() {
                        self.write(key.clone(), documents_to_process, FlushReason::Capacity)
                            .await?;
                    }
                    let Some(document) = resubmit else {
                        return Ok(());
                    };
                    if resubmitted {
                        warn!(
                            "document for {} does not fit an empty buffer, writing alone",
                            key
                        );
                        self.report.oversized_documents += 1;
                        return self
                            .write(key, vec![document], FlushReason::Oversized)
                            .await;
                    }
                    resubmitted = true;
                    result = self.manager.insert(&database, &collection, document)?;
                }
            }
        }
    }

    /// Drain every buffer and write the remainders.
    pub async fn finish(mut self) -> Result<SessionReport> {
        for (key, documents) in self.manager.flush_all() {
            self.write(key, documents, FlushReason::EndOfStream).await?;
        }
        let r = self.report;
        info!(
            "session finished: in={} written={} batches={} oversized={} skipped={}",
            r.documents_in,
            r.documents_written,
            r.batches_written,
            r.oversized_documents,
            r.skipped_documents
        );
        Ok(r)
    }

    async fn write(
        &mut self,
        key: DestinationKey,
        documents: Vec<Value>,
        reason: FlushReason,
    ) -> Result<()> {
        let count = documents.len() as u64;
        let context = format!("writing {count} documents to {key}");
        self.executor
            .write(WriteBatch {
                key,
                documents,
                reason,
            })
            .await
            .context(context)?;
        self.report.documents_written += count;
        self.report.batches_written += 1;
        Ok(())
    }
}

// ============================================================================
// Single-owner task
// ============================================================================

/// Handle to a session running on its own task. Clones of the sender may be
/// used from any number of producers; the task serializes all access to the
/// manager.
pub struct SessionHandle {
    tx: mpsc::Sender<SourceDocument>,
    task: JoinHandle<Result<SessionReport>>,
}

impl SessionHandle {
    /// Queue a document. Fails once the session task has stopped; call
    /// [`SessionHandle::finish`] to get the reason.
    pub async fn send(&self, doc: SourceDocument) -> Result<()> {
        self.tx
            .send(doc)
            .await
            .map_err(|_| anyhow!("session task stopped"))
    }

    pub fn sender(&self) -> mpsc::Sender<SourceDocument> {
        self.tx.clone()
    }

    /// Close the input and wait for the session to drain. Outstanding senders
    /// from [`SessionHandle::sender`] must be dropped first.
    pub async fn finish(self) -> Result<SessionReport> {
        drop(self.tx);
        self.task.await.context("session task panicked")?
    }
}

pub fn spawn_session<E>(mut session: TransferSession<E>, capacity: usize) -> SessionHandle
where
    E: WriteExecutor + 'static,
{
    let (tx, mut rx) = mpsc::channel::<SourceDocument>(capacity.max(1));
    let task = tokio::spawn(async move {
        while let Some(doc) = rx.recv().await {
            if let Err(err) = session.ingest(doc).await {
                warn!(
                    "session stopped with {} documents still buffered: {err:#}",
                    session.manager().total_stats().item_count
                );
                return Err(err);
            }
        }
        session.finish().await
    });
    SessionHandle { tx, task }
}
