use std::future::Future;

use crate::error::ExchangeResult;

/// Pull-based, possibly suspending source of rows.
///
/// The coordinator owns its source exclusively and never drives two pulls concurrently. Rows are
/// pulled with [`UpstreamSource::move_next`] until it returns [`None`]; at that point either the
/// source is [`UpstreamSource::exhausted`], or the next rows are not available yet and
/// [`UpstreamSource::load_next_batch`] is awaited before pulling again.
pub trait UpstreamSource: Send + 'static {
    /// Row type produced by this source. Rows are opaque to the coordinator.
    type Row: Send + 'static;

    /// Advances the source and returns the next row when one is available without waiting.
    ///
    /// Errors are terminal for the operation.
    fn move_next(&mut self) -> ExchangeResult<Option<Self::Row>>;

    /// Returns `true` once every row has been produced.
    fn exhausted(&self) -> bool;

    /// Makes the next rows available to [`UpstreamSource::move_next`].
    ///
    /// Only called when `move_next` returned [`None`] and the source is not exhausted.
    fn load_next_batch(&mut self) -> impl Future<Output = ExchangeResult<()>> + Send;

    /// Releases the resources of the source.
    ///
    /// Must be idempotent. The coordinator calls it exactly once per operation, after which no
    /// other method is called.
    fn close(&mut self);
}
