//! The environment collaborator interface (spec §6): tag advancement and
//! the event queue that drives it live outside this crate's scope (they're
//! the reaction-graph compiler/event-queue side of the runtime, called out
//! in spec §1 as external collaborators). The scheduler only needs to call
//! into them.

/// Per-environment hooks the scheduler calls into while draining a tag.
///
/// An implementation is free to do nothing interesting (`try_advance_level`
/// just increments the counter, `advance_tag_locked` always reports "more
/// work") for a single, non-federated environment, or to block and
/// coordinate with peer environments when running federated.
pub trait Environment: Send + Sync {
    /// Advance `*level` to the next level to dispatch, blocking if peer
    /// environments require synchronization before this one may proceed
    /// (federated mode). Called with no locks held.
    fn try_advance_level(&self, level: &mut u32);

    /// Advance the logical tag. Called with the environment mutex held
    /// (spec §4.2's `env.mutex`). Returns `true` if the stop tag was
    /// reached, `false` if there is more work at the new tag.
    fn advance_tag_locked(&self) -> bool;
}

/// A minimal, non-federated [`Environment`]: each call to
/// `try_advance_level` increments the level by exactly one with no
/// blocking, and `advance_tag_locked` runs a caller-supplied closure to
/// decide whether the stop tag has been reached.
///
/// This is the environment used by this crate's own tests and is a
/// reasonable starting point for a single-environment (non-federated)
/// embedding.
pub struct SequentialEnvironment<F>
where
    F: Fn() -> bool + Send + Sync,
{
    should_stop: F,
}

impl<F> SequentialEnvironment<F>
where
    F: Fn() -> bool + Send + Sync,
{
    pub fn new(should_stop: F) -> Self {
        Self { should_stop }
    }
}

impl<F> Environment for SequentialEnvironment<F>
where
    F: Fn() -> bool + Send + Sync,
{
    fn try_advance_level(&self, level: &mut u32) {
        *level += 1;
    }

    fn advance_tag_locked(&self) -> bool {
        (self.should_stop)()
    }
}
