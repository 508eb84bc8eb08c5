use std::collections::VecDeque;
use std::vec;

use tracing::debug;

use crate::error::ExchangeResult;
use crate::upstream::UpstreamSource;

/// Upstream source over already materialized rows, split into pages.
///
/// Only the first page is readable up front; every further page becomes readable after a call
/// to [`UpstreamSource::load_next_batch`], which mimics a source fetching pages lazily.
#[derive(Debug)]
pub struct VecUpstream<R> {
    current: vec::IntoIter<R>,
    pending: VecDeque<Vec<R>>,
    closed: bool,
}

impl<R> VecUpstream<R> {
    /// Creates a source yielding `rows` in pages of `page_len` rows.
    pub fn paged(rows: Vec<R>, page_len: usize) -> Self {
        let page_len = page_len.max(1);
        let mut pages = VecDeque::new();
        let mut rows = rows.into_iter().peekable();
        while rows.peek().is_some() {
            pages.push_back(rows.by_ref().take(page_len).collect::<Vec<_>>());
        }

        Self::from_pages(pages)
    }

    /// Creates a source yielding each of `pages` after one load.
    pub fn from_pages(pages: impl IntoIterator<Item = Vec<R>>) -> Self {
        let mut pending = pages.into_iter().collect::<VecDeque<_>>();
        let current = pending.pop_front().unwrap_or_default().into_iter();

        Self {
            current,
            pending,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl<R> UpstreamSource for VecUpstream<R>
where
    R: Send + 'static,
{
    type Row = R;

    fn move_next(&mut self) -> ExchangeResult<Option<R>> {
        if self.closed {
            return Ok(None);
        }

        Ok(self.current.next())
    }

    fn exhausted(&self) -> bool {
        self.closed || (self.current.len() == 0 && self.pending.is_empty())
    }

    async fn load_next_batch(&mut self) -> ExchangeResult<()> {
        if let Some(page) = self.pending.pop_front() {
            debug!(rows = page.len(), "loaded next upstream page");
            self.current = page.into_iter();
        }

        Ok(())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }

        self.closed = true;
        self.current = Vec::new().into_iter();
        self.pending.clear();
    }
}
