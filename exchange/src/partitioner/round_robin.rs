use crate::bail;
use crate::error::{ErrorKind, ExchangeResult};
use crate::partitioner::BucketPartitioner;
use crate::types::{Bucket, SizeHint, TargetId};

/// Deals rows to targets in turn.
///
/// The position carries across cycles, so row `k` of the whole operation (0-based) always lands
/// on target `k mod N` no matter where the cycle boundaries fall.
#[derive(Debug)]
pub struct RoundRobinPartitioner<R> {
    rows: Vec<R>,
    estimated_bytes: usize,
    next_target: usize,
}

impl<R> RoundRobinPartitioner<R> {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            estimated_bytes: 0,
            next_target: 0,
        }
    }
}

impl<R> Default for RoundRobinPartitioner<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> BucketPartitioner for RoundRobinPartitioner<R>
where
    R: SizeHint + Send + 'static,
{
    type Row = R;

    fn add(&mut self, row: R) -> ExchangeResult<()> {
        self.estimated_bytes += row.size_hint();
        self.rows.push(row);

        Ok(())
    }

    fn size(&self) -> usize {
        self.rows.len()
    }

    fn estimated_bytes(&self) -> usize {
        self.estimated_bytes
    }

    fn build(&mut self, target_count: usize) -> ExchangeResult<Vec<Bucket<R>>> {
        if target_count == 0 {
            bail!(
                ErrorKind::PartitionFailed,
                "Cannot partition rows across zero targets"
            );
        }

        let mut partitions = (0..target_count).map(|_| Vec::new()).collect::<Vec<_>>();
        for row in self.rows.drain(..) {
            partitions[self.next_target % target_count].push(row);
            self.next_target = (self.next_target + 1) % target_count;
        }
        self.estimated_bytes = 0;

        Ok(partitions
            .into_iter()
            .enumerate()
            .map(|(index, rows)| Bucket::new(TargetId(index as u32), rows))
            .collect())
    }
}
