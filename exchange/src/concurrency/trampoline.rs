/// Bounds how many consecutive cycles a task continues inline.
///
/// A cycle whose acknowledgements all complete on the pulling task lets that task continue with
/// the next cycle directly. [`Trampoline::bounce`] allows that up to `max_depth` times in a row,
/// after which the continuation must be scheduled as a fresh task so one operation cannot
/// monopolize a runtime worker.
#[derive(Debug)]
pub struct Trampoline {
    max_depth: usize,
    depth: usize,
}

/// Where the next continuation must run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bounce {
    /// Continue on the current task.
    Inline,
    /// Schedule onto the runtime's worker queue.
    Reschedule,
}

impl Trampoline {
    pub fn new(max_depth: usize) -> Self {
        Self {
            max_depth: max_depth.max(1),
            depth: 0,
        }
    }

    /// Registers one inline continuation and reports where it must run.
    ///
    /// The depth resets whenever [`Bounce::Reschedule`] is returned.
    pub fn bounce(&mut self) -> Bounce {
        if self.depth < self.max_depth {
            self.depth += 1;
            Bounce::Inline
        } else {
            self.depth = 0;
            Bounce::Reschedule
        }
    }

    pub fn depth(&self) -> usize {
        self.depth
    }
}
