//! Synchronization primitives used by the distribution coordinator.
//!
//! Pushes to downstream targets complete on arbitrary runtime worker threads, concurrently with
//! each other. All state those completions touch is updated through the lock-free primitives in
//! this module so that whichever completion arrives last deterministically owns the follow-up
//! action, regardless of arrival order:
//!
//! - [`fan_in::FanInCounter`] counts outstanding responses of one cycle down to zero.
//! - [`failure::FailureCell`] records the first failure of an operation and ignores later ones.
//! - [`close::CloseOnce`] guards a resource that must be released exactly once.
//! - [`completion::CompletionSignal`] resolves the caller's [`completion::Completion`] future
//!   exactly once.
//!
//! [`cancel`] carries external cancellation requests and [`trampoline`] bounds how many cycles
//! the pulling task continues inline before yielding back to the runtime.

pub mod cancel;
pub mod close;
pub mod completion;
pub mod failure;
pub mod fan_in;
pub mod trampoline;
