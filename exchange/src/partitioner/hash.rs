use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::bail;
use crate::error::{ErrorKind, ExchangeResult};
use crate::partitioner::BucketPartitioner;
use crate::types::{Bucket, SizeHint, TargetId};

/// Hashes `key` with the hasher used by [`HashPartitioner`].
pub fn hash_key<K: Hash + ?Sized>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

/// Routes every row to the target selected by the hash of its key.
///
/// Rows sharing a key always land on the same target for the lifetime of the operation.
pub struct HashPartitioner<R, F> {
    key_hash: F,
    rows: Vec<R>,
    estimated_bytes: usize,
}

impl<R, F> HashPartitioner<R, F>
where
    F: Fn(&R) -> u64,
{
    /// Creates a partitioner hashing rows with `key_hash`, typically built on [`hash_key`].
    pub fn new(key_hash: F) -> Self {
        Self {
            key_hash,
            rows: Vec::new(),
            estimated_bytes: 0,
        }
    }
}

impl<R, F> fmt::Debug for HashPartitioner<R, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashPartitioner")
            .field("rows", &self.rows.len())
            .field("estimated_bytes", &self.estimated_bytes)
            .finish()
    }
}

impl<R, F> BucketPartitioner for HashPartitioner<R, F>
where
    R: SizeHint + Send + 'static,
    F: Fn(&R) -> u64 + Send + 'static,
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
            let index = ((self.key_hash)(&row) % target_count as u64) as usize;
            partitions[index].push(row);
        }
        self.estimated_bytes = 0;

        Ok(partitions
            .into_iter()
            .enumerate()
            .map(|(index, rows)| Bucket::new(TargetId(index as u32), rows))
            .collect())
    }
}
