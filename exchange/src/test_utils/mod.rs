//! Test doubles for driving distribution operations deterministically.
//!
//! - [`scripted_channel::ScriptedChannel`] records every push, settles each one as scripted and
//!   checks that cycles never overlap.
//! - [`paged_upstream::PagedUpstream`] serves pages on demand, can suspend or fail loads, and
//!   counts its calls.
//! - [`notify::TimedNotify`] waits on test conditions without hanging forever.

pub mod notify;
pub mod paged_upstream;
pub mod scripted_channel;
