//! The GEDF-NP scheduler and watchdog subsystem: the core scheduling engine
//! of a reactor-oriented runtime.
//!
//! This crate covers exactly the concurrency-heavy leaves of such a
//! runtime — the reaction queue, the scheduler that drives workers through
//! it level by level and tag by tag, and the renewable timed guards
//! ("watchdogs") reactors use to bound how long they wait for an external
//! event. Reaction-graph compilation, the event queue that feeds triggered
//! reactions in from timed events, and federated tag negotiation are all
//! external collaborators (see [`env::Environment`]) rather than something
//! this crate implements.

mod env;
mod error;
mod platform;
mod queue;
mod reaction;
mod scheduler;
mod watchdog;

pub use env::{Environment, SequentialEnvironment};
pub use error::RuntimeError;
pub use platform::{InterruptGuard, Semaphore};
pub use queue::ReactionQueue;
pub use reaction::{pack_index, Reaction, ReactionFn, ReactionIndex, ReactionStatus};
pub use scheduler::{Scheduler, SchedulerConfig, DEFAULT_MAX_REACTION_LEVEL};
pub use watchdog::{wait_all as watchdog_wait_all, Watchdog};

pub use boomerang_core::{Tag, Timestamp};
