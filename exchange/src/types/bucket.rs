use crate::types::TargetId;

/// Immutable batch of rows addressed to one target for one flush cycle.
///
/// A bucket is built once by a partitioner and consumed once by the transport, so it exposes no
/// way to add or remove rows after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket<R> {
    target_id: TargetId,
    rows: Vec<R>,
}

impl<R> Bucket<R> {
    /// Creates a bucket holding `rows` for `target_id`.
    pub fn new(target_id: TargetId, rows: Vec<R>) -> Self {
        Self { target_id, rows }
    }

    pub fn target_id(&self) -> TargetId {
        self.target_id
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Consumes the bucket and returns its rows.
    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }
}
