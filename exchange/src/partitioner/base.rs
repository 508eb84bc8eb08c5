use crate::error::ExchangeResult;
use crate::types::Bucket;

/// Accumulates rows of one flush cycle and splits them into one bucket per target.
///
/// The coordinator checks [`BucketPartitioner::size`] and
/// [`BucketPartitioner::estimated_bytes`] after every added row to decide when to flush. Errors
/// returned by a partitioner are treated like upstream failures.
pub trait BucketPartitioner: Send + 'static {
    /// Row type accepted by this partitioner.
    type Row: Send + 'static;

    /// Buffers `row` for the current cycle.
    fn add(&mut self, row: Self::Row) -> ExchangeResult<()>;

    /// Number of rows buffered for the current cycle.
    fn size(&self) -> usize;

    /// Estimated bytes buffered for the current cycle.
    fn estimated_bytes(&self) -> usize;

    /// Materializes exactly `target_count` buckets, bucket `i` addressed to target `i`, and
    /// resets the buffered state. Buckets may be empty.
    fn build(&mut self, target_count: usize) -> ExchangeResult<Vec<Bucket<Self::Row>>>;
}
