use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

/// A packed `(level, deadline-tiebreak)` priority. Smaller ⇒ dispatched
/// earlier. The level occupies the upper 32 bits, the deadline tiebreak
/// (deadline duration truncated to nanoseconds, saturating at `u32::MAX`,
/// i.e. ~4.29s) the lower 32, so that ordering by this single integer
/// reproduces "level first, deadline second" exactly as spec §3 describes.
pub type ReactionIndex = u64;

pub fn pack_index(level: u32, deadline: Duration) -> ReactionIndex {
    let tiebreak = u32::try_from(deadline.as_nanos()).unwrap_or(u32::MAX);
    ((level as u64) << 32) | tiebreak as u64
}

pub fn level_of(index: ReactionIndex) -> u32 {
    (index >> 32) as u32
}

/// The tri-state reaction lifecycle from spec §3, stored as a plain `u32`
/// atom per spec §9 ("retain the atomic CAS discipline on an integer-typed
/// shadow rather than on the variant itself").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ReactionStatus {
    Inactive = 0,
    Queued = 1,
    Running = 2,
}

impl ReactionStatus {
    fn from_u32(v: u32) -> Self {
        match v {
            0 => Self::Inactive,
            1 => Self::Queued,
            2 => Self::Running,
            other => unreachable!("invalid reaction status bit pattern: {other}"),
        }
    }
}

/// The callable a worker invokes when dispatching a reaction.
pub trait ReactionFn: Fn() + Send + Sync {}
impl<F> ReactionFn for F where F: Fn() + Send + Sync {}

/// An atomic unit of work, identified by a packed level/deadline [`index`](Reaction::index)
/// and carrying the tri-state [`status`](ReactionStatus) that the scheduler
/// CASes between `inactive`, `queued` and `running`.
pub struct Reaction {
    name: String,
    index: ReactionIndex,
    status: AtomicU32,
    deadline: Duration,
    /// Back-pointer into the owning [`crate::queue::ReactionQueue`]'s heap
    /// array. `usize::MAX` means "not currently queued". Maintained by the
    /// queue under `queue_mutex`; see spec §4.1.
    pub(crate) position: AtomicUsize,
    function: Box<dyn ReactionFn>,
}

pub const NOT_QUEUED: usize = usize::MAX;

impl Reaction {
    pub fn new(
        name: impl Into<String>,
        level: u32,
        deadline: Duration,
        function: impl ReactionFn + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            index: pack_index(level, deadline),
            status: AtomicU32::new(ReactionStatus::Inactive as u32),
            deadline,
            position: AtomicUsize::new(NOT_QUEUED),
            function: Box::new(function),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index(&self) -> ReactionIndex {
        self.index
    }

    pub fn level(&self) -> u32 {
        level_of(self.index)
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    pub fn status(&self) -> ReactionStatus {
        ReactionStatus::from_u32(self.status.load(Ordering::Acquire))
    }

    /// Atomically mark this reaction queued, iff it was inactive.
    ///
    /// Returns `true` on success (the caller should enqueue it); `false`
    /// means a concurrent trigger already won the race, and this call is a
    /// silent no-op per spec §4.2 / §7 item 2.
    pub(crate) fn try_mark_queued(&self) -> bool {
        self.status
            .compare_exchange(
                ReactionStatus::Inactive as u32,
                ReactionStatus::Queued as u32,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    /// Atomically mark this reaction inactive again, asserting it was
    /// queued. A failure here is fatal: spec §4.2/§7 item 1 — it means a
    /// scheduler invariant was violated (e.g. double-dispatch).
    pub(crate) fn mark_done(&self) {
        let prev = self.status.swap(ReactionStatus::Inactive as u32, Ordering::AcqRel);
        if prev != ReactionStatus::Queued as u32 {
            tracing::error!(
                reaction = %self.name,
                status = prev,
                "done_with_reaction: expected status Queued"
            );
            panic!(
                "scheduler invariant violated: reaction '{}' had status {prev}, expected Queued",
                self.name
            );
        }
    }

    /// Invoke the reaction body. Non-preemptive: runs to completion on the
    /// calling worker thread. A panic inside `function` is fatal to the
    /// process (spec §1 Non-goals, §7 item 5) — it is deliberately not
    /// caught here.
    pub fn invoke(&self) {
        (self.function)();
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("level", &self.level())
            .field("deadline", &self.deadline)
            .field("status", &self.status())
            .finish()
    }
}

impl PartialEq for Reaction {
    /// Identity, not value, equality: "equality is by reaction identity"
    /// (spec §4.1).
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}
impl Eq for Reaction {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn index_orders_level_before_deadline() {
        let low_level_long_deadline = pack_index(1, Duration::from_secs(10));
        let high_level_short_deadline = pack_index(2, Duration::from_nanos(1));
        assert!(low_level_long_deadline < high_level_short_deadline);
    }

    #[test_log::test]
    fn index_orders_deadline_within_level() {
        let a = pack_index(1, Duration::from_nanos(50));
        let b = pack_index(1, Duration::from_nanos(100));
        let c = pack_index(1, Duration::from_nanos(200));
        assert!(a < b);
        assert!(b < c);
    }

    #[test_log::test]
    fn trigger_is_idempotent_per_tag() {
        let r = Reaction::new("r", 1, Duration::ZERO, || {});
        assert!(r.try_mark_queued());
        assert!(!r.try_mark_queued(), "second trigger must no-op");
        assert_eq!(r.status(), ReactionStatus::Queued);
        r.mark_done();
        assert_eq!(r.status(), ReactionStatus::Inactive);
        // Re-triggerable for the next tag.
        assert!(r.try_mark_queued());
    }

    #[test_log::test]
    #[should_panic(expected = "scheduler invariant violated")]
    fn done_without_trigger_is_fatal() {
        let r = Reaction::new("r", 1, Duration::ZERO, || {});
        r.mark_done();
    }
}
