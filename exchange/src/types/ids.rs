use std::fmt;

/// Identifier of one distribution operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a downstream target within an operation.
///
/// Targets are numbered `0..N` in the order they were handed to the coordinator and bucket `i`
/// of every flush cycle is addressed to target `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TargetId(pub u32);

impl TargetId {
    /// Returns the bucket index of this target.
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonically increasing index of a flush cycle within an operation, starting at 1.
pub type SequenceIndex = u64;
