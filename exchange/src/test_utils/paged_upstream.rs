use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::vec;

use tokio::sync::Notify;

use crate::error::{ErrorKind, ExchangeResult};
use crate::exchange_error;
use crate::test_utils::notify::TimedNotify;
use crate::upstream::UpstreamSource;

/// Calls observed by a [`PagedUpstream`], readable after the coordinator took ownership of it.
#[derive(Debug, Default)]
pub struct UpstreamTracker {
    rows_served: AtomicUsize,
    loads: AtomicUsize,
    close_calls: AtomicUsize,
    closed: Notify,
}

impl UpstreamTracker {
    pub fn rows_served(&self) -> usize {
        self.rows_served.load(Ordering::SeqCst)
    }

    /// Number of successful and failed calls to `load_next_batch`.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }

    /// Waits until `close` was called at least once.
    pub async fn wait_for_close(&self) {
        while self.close_calls() == 0 {
            let notified = self.closed.notified();
            if self.close_calls() > 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Scriptable upstream source serving rows page by page.
///
/// The first page is readable immediately, every further page requires a load. Loads can be
/// gated on a notification and made to fail, and every call is counted in an [`UpstreamTracker`].
#[derive(Debug)]
pub struct PagedUpstream<R> {
    current: vec::IntoIter<R>,
    pending: VecDeque<Vec<R>>,
    fail_on_load: Option<usize>,
    fail_on_row: Option<usize>,
    panic_on_row: Option<usize>,
    load_gate: Option<Arc<Notify>>,
    tracker: Arc<UpstreamTracker>,
}

impl<R> PagedUpstream<R> {
    pub fn new(pages: impl IntoIterator<Item = Vec<R>>) -> Self {
        let mut pending = pages.into_iter().collect::<VecDeque<_>>();
        let current = pending.pop_front().unwrap_or_default().into_iter();

        Self {
            current,
            pending,
            fail_on_load: None,
            fail_on_row: None,
            panic_on_row: None,
            load_gate: None,
            tracker: Arc::new(UpstreamTracker::default()),
        }
    }

    /// Makes the `load_number`-th load fail, counting from 1.
    ///
    /// With `n` pages, failing load `k` means exactly `k` pages were served.
    pub fn fail_on_load(mut self, load_number: usize) -> Self {
        self.fail_on_load = Some(load_number);
        self
    }

    /// Makes `move_next` fail instead of serving the `row_number`-th row, counting from 1.
    pub fn fail_on_row(mut self, row_number: usize) -> Self {
        self.fail_on_row = Some(row_number);
        self
    }

    /// Makes `move_next` panic instead of serving the `row_number`-th row, counting from 1.
    pub fn panic_on_row(mut self, row_number: usize) -> Self {
        self.panic_on_row = Some(row_number);
        self
    }

    /// Suspends every load until the returned notify fires, once per load.
    pub fn gate_loads(&mut self) -> TimedNotify {
        let notify = Arc::new(Notify::new());
        self.load_gate = Some(notify.clone());

        TimedNotify::new(notify)
    }

    pub fn tracker(&self) -> Arc<UpstreamTracker> {
        self.tracker.clone()
    }
}

impl<R> UpstreamSource for PagedUpstream<R>
where
    R: Send + 'static,
{
    type Row = R;

    fn move_next(&mut self) -> ExchangeResult<Option<R>> {
        if self.current.len() == 0 {
            return Ok(None);
        }

        let row_number = self.tracker.rows_served() + 1;
        if self.fail_on_row == Some(row_number) {
            return Err(exchange_error!(
                ErrorKind::UpstreamFailed,
                "Upstream row could not be read",
                format!("scripted failure at row {row_number}")
            ));
        }

        if self.panic_on_row == Some(row_number) {
            panic!("scripted panic at row {row_number}");
        }

        self.tracker.rows_served.fetch_add(1, Ordering::SeqCst);
        Ok(self.current.next())
    }

    fn exhausted(&self) -> bool {
        self.current.len() == 0 && self.pending.is_empty()
    }

    async fn load_next_batch(&mut self) -> ExchangeResult<()> {
        if let Some(gate) = &self.load_gate {
            gate.notified().await;
        }

        let load_number = self.tracker.loads.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_load == Some(load_number) {
            return Err(exchange_error!(
                ErrorKind::UpstreamFailed,
                "Upstream page could not be loaded",
                format!("scripted failure on load {load_number}")
            ));
        }

        if let Some(page) = self.pending.pop_front() {
            self.current = page.into_iter();
        }

        Ok(())
    }

    fn close(&mut self) {
        self.tracker.close_calls.fetch_add(1, Ordering::SeqCst);
        self.tracker.closed.notify_waiters();
    }
}
