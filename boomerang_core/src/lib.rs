//! Logical time primitives shared by the rest of the workspace.
//!
//! A [`Tag`] is the `(time, microstep)` pair the scheduler advances through;
//! [`Timestamp`] is the monotonic nanosecond instant `time` is measured in.

mod time;

pub use time::{Tag, Timestamp};
