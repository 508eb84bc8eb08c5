use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::debug;

use crate::channel::DownstreamChannel;
use crate::error::{ExchangeError, ExchangeResult};
use crate::types::{OperationMessage, PushAck, TargetId};

#[derive(Debug)]
struct Inner<R> {
    rows: HashMap<TargetId, Vec<R>>,
    pushes: HashMap<TargetId, u64>,
    finished: HashMap<TargetId, bool>,
    failures: HashMap<TargetId, ExchangeError>,
}

/// In-memory downstream collecting the rows delivered to every target.
///
/// Every target always asks for more data, which makes [`MemoryChannel`] a convenient sink for
/// local execution and tests.
#[derive(Debug)]
pub struct MemoryChannel<R> {
    inner: Arc<Mutex<Inner<R>>>,
}

impl<R> MemoryChannel<R> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                rows: HashMap::new(),
                pushes: HashMap::new(),
                finished: HashMap::new(),
                failures: HashMap::new(),
            })),
        }
    }

    /// Returns the number of pushes received by `target_id`.
    pub async fn pushes(&self, target_id: TargetId) -> u64 {
        let inner = self.inner.lock().await;
        inner.pushes.get(&target_id).copied().unwrap_or(0)
    }

    /// Returns `true` once `target_id` received the last cycle.
    pub async fn is_finished(&self, target_id: TargetId) -> bool {
        let inner = self.inner.lock().await;
        inner.finished.get(&target_id).copied().unwrap_or(false)
    }

    /// Returns the failure notified to `target_id`, if any.
    pub async fn failure(&self, target_id: TargetId) -> Option<ExchangeError> {
        let inner = self.inner.lock().await;
        inner.failures.get(&target_id).cloned()
    }
}

impl<R: Clone> MemoryChannel<R> {
    /// Returns a copy of every row delivered to `target_id`, in delivery order.
    pub async fn rows(&self, target_id: TargetId) -> Vec<R> {
        let inner = self.inner.lock().await;
        inner.rows.get(&target_id).cloned().unwrap_or_default()
    }
}

impl<R> Clone for MemoryChannel<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R> Default for MemoryChannel<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> DownstreamChannel<R> for MemoryChannel<R>
where
    R: Send + 'static,
{
    async fn push(
        &self,
        target_id: TargetId,
        message: OperationMessage<R>,
    ) -> ExchangeResult<PushAck> {
        let mut inner = self.inner.lock().await;
        *inner.pushes.entry(target_id).or_default() += 1;

        if let Some(failure) = message.failure {
            debug!(%target_id, "received failure notice");
            inner.failures.insert(target_id, failure);
            inner.finished.insert(target_id, true);
            return Ok(PushAck::DONE);
        }

        if let Some(bucket) = message.bucket {
            debug!(%target_id, rows = bucket.len(), "received bucket");
            inner
                .rows
                .entry(target_id)
                .or_default()
                .extend(bucket.into_rows());
        }
        if message.is_last {
            inner.finished.insert(target_id, true);
        }

        Ok(PushAck::MORE)
    }
}
