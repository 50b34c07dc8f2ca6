//! The Global Earliest-Deadline-First, Non-Preemptive (GEDF-NP) scheduler
//! (spec §4.2): hands ready reactions out to workers, advances levels and
//! tags, and parks/wakes workers through [`crate::platform::Semaphore`].

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crate::env::Environment;
use crate::error::RuntimeError;
use crate::platform::Semaphore;
use crate::queue::ReactionQueue;
use crate::reaction::Reaction;

/// Used when `num_reactions_per_level` is empty (spec §6: "0 means 'use
/// default'").
pub const DEFAULT_MAX_REACTION_LEVEL: u32 = 7;

/// Mirrors the C `sched_params_t` (spec §6), minus the parts that are just
/// C's way of passing a sized array across an FFI boundary.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    /// One entry per level, sized `num_levels`; drives `max_reaction_level`
    /// and the reaction queue's initial capacity. Empty means "use
    /// [`DEFAULT_MAX_REACTION_LEVEL`]".
    pub num_reactions_per_level: Vec<usize>,
}

impl SchedulerConfig {
    pub fn with_num_reactions_per_level(mut self, counts: Vec<usize>) -> Self {
        self.num_reactions_per_level = counts;
        self
    }

    /// The highest valid (0-based) reaction level; the queue allocates one
    /// bucket per level in `0..=max_reaction_level`.
    fn max_reaction_level(&self) -> u32 {
        if self.num_reactions_per_level.is_empty() {
            DEFAULT_MAX_REACTION_LEVEL
        } else {
            (self.num_reactions_per_level.len() - 1) as u32
        }
    }
}

/// Per-environment scheduler state (spec §3's "Scheduler Instance"). One per
/// environment; constructing it *is* `lf_sched_init` — there is no separate
/// global-pointer guard to make a second call idempotent, since Rust
/// ownership already prevents a second, aliasing instance from existing.
pub struct Scheduler<E: Environment> {
    queue: Mutex<ReactionQueue>,
    semaphore: Semaphore,
    num_workers: usize,
    idle_workers: AtomicUsize,
    /// The level `get_ready_reaction` is currently allowed to pop from.
    /// Reactions queued at any other level sit in their own bucket,
    /// untouched, until `distribute_ready_reactions` makes their level the
    /// executing one.
    executing_level: AtomicU32,
    /// `distribute_ready_reactions`'s own cursor, kept one higher than the
    /// real (0-based) level it names: the headroom makes `0` available as a
    /// below-range "nothing entered yet this tag" sentinel, the same way
    /// the original scheduler's 1-based level numbering gets that headroom
    /// for free (spec §9; see `distribute_ready_reactions`). Reset to the
    /// sentinel each time a new tag begins.
    next_reaction_level: AtomicU32,
    max_reaction_level: u32,
    should_stop: AtomicBool,
    env: E,
    /// Serializes tag-level decisions across peer schedulers in a
    /// federation (spec §5); taken only inside
    /// [`Scheduler::try_advance_tag_and_distribute`].
    env_mutex: Mutex<()>,
}

impl<E: Environment> std::fmt::Debug for Scheduler<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("num_workers", &self.num_workers)
            .field("idle_workers", &self.idle_workers.load(Ordering::Relaxed))
            .field(
                "executing_level",
                &self.executing_level.load(Ordering::Relaxed),
            )
            .field(
                "next_reaction_level",
                &self.next_reaction_level.load(Ordering::Relaxed),
            )
            .field("max_reaction_level", &self.max_reaction_level)
            .field("should_stop", &self.should_stop.load(Ordering::Relaxed))
            .finish()
    }
}

impl<E: Environment> Scheduler<E> {
    pub fn new(env: E, num_workers: usize, config: SchedulerConfig) -> Result<Self, RuntimeError> {
        if num_workers == 0 {
            return Err(RuntimeError::NoWorkers);
        }
        tracing::debug!(num_workers, "initializing GEDF-NP scheduler");
        let max_reaction_level = config.max_reaction_level();
        Ok(Self {
            queue: Mutex::new(ReactionQueue::new(max_reaction_level)),
            semaphore: Semaphore::new(0),
            num_workers,
            idle_workers: AtomicUsize::new(0),
            // Level 0 is executing from the moment the scheduler exists, so
            // that reactions triggered before the first worker ever calls
            // `get_ready_reaction` (e.g. startup reactions) don't need a
            // `distribute_ready_reactions` pass to become visible. It is
            // pre-armed without a `try_advance_level` rendezvous — the one
            // and only time that rendezvous is skipped — so the shifted
            // cursor starts one level past it, at `1`.
            executing_level: AtomicU32::new(0),
            next_reaction_level: AtomicU32::new(1),
            max_reaction_level,
            should_stop: AtomicBool::new(false),
            env,
            env_mutex: Mutex::new(()),
        })
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn should_stop(&self) -> bool {
        self.should_stop.load(Ordering::Acquire)
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    /// Schedule `reaction` to run at the current tag (spec §4.2).
    ///
    /// `worker_id` identifies the calling worker for diagnostics; pass `-1`
    /// for a non-worker caller (a timer or other external event source).
    /// Idempotent per tag: a reaction already `queued` or `running` is left
    /// untouched and this call is a silent no-op. Never blocks on tag
    /// advancement, and safe under concurrent callers.
    #[tracing::instrument(skip(self, reaction), fields(reaction = reaction.name()))]
    pub fn trigger_reaction(&self, reaction: &Arc<Reaction>, worker_id: i64) {
        if !reaction.try_mark_queued() {
            tracing::trace!(worker_id, "duplicate trigger suppressed");
            return;
        }
        tracing::trace!(worker_id, level = reaction.level(), "enqueueing reaction");
        self.queue
            .lock()
            .expect("reaction queue mutex poisoned")
            .insert(reaction.clone());
    }

    /// Ask the scheduler for one more reaction to run. Blocks until a ready
    /// reaction is available or it is time for the worker to stop.
    pub fn get_ready_reaction(&self, worker_id: i64) -> Option<Arc<Reaction>> {
        loop {
            if self.should_stop() {
                return None;
            }

            let level = self.executing_level.load(Ordering::Acquire);
            let popped = self
                .queue
                .lock()
                .expect("reaction queue mutex poisoned")
                .pop_at(level);
            if let Some(reaction) = popped {
                return Some(reaction);
            }

            tracing::trace!(worker_id, "out of ready reactions, waiting for work");
            self.wait_for_work(worker_id);
        }
    }

    /// Inform the scheduler that `worker_id` is done executing `reaction`.
    /// Fatal (per spec §4.2/§7) if `reaction` was not `queued`.
    pub fn done_with_reaction(&self, _worker_id: i64, reaction: &Arc<Reaction>) {
        reaction.mark_done();
    }

    /// The wait-for-work protocol (spec §4.2): the last worker to go idle
    /// is elected, by that very fact, to advance the schedule on everyone's
    /// behalf — no separate election/barrier primitive is needed because
    /// incrementing `idle_workers` to `num_workers` *is* the barrier.
    fn wait_for_work(&self, worker_id: i64) {
        let idle_now = self.idle_workers.fetch_add(1, Ordering::AcqRel) + 1;
        if idle_now == self.num_workers {
            tracing::trace!(worker_id, "last worker idle, advancing schedule");
            self.try_advance_tag_and_distribute();
        } else {
            self.semaphore.acquire();
        }
    }

    /// Runs only with all workers idle and the reaction queue empty — the
    /// barrier condition that lets this function mutate `next_reaction_level`
    /// without the queue mutex (spec §9: "the idle counter must be updated
    /// *before* the last worker enters this function, so that any late
    /// `trigger_reaction` call ... takes the `queue_mutex`").
    #[tracing::instrument(skip(self))]
    fn try_advance_tag_and_distribute(&self) {
        debug_assert_eq!(
            self.queue
                .lock()
                .expect("reaction queue mutex poisoned")
                .size_at(self.executing_level.load(Ordering::Acquire)),
            0,
            "executing level's queue must be empty when advancing"
        );

        loop {
            if self.next_reaction_level.load(Ordering::Acquire) > self.max_reaction_level {
                // New tag: reset to the below-range sentinel so that level
                // 0's own `try_advance_level` rendezvous runs the next time
                // `distribute_ready_reactions` is called — unlike level 0
                // at construction, a fresh tag's level 0 has had no
                // rendezvous yet and must not skip it (spec §4.2/§9).
                self.next_reaction_level.store(0, Ordering::Release);
                let _env_guard = self.env_mutex.lock().expect("environment mutex poisoned");
                tracing::debug!("advancing tag");
                if self.env.advance_tag_locked() {
                    tracing::debug!("stop tag reached");
                    self.should_stop.store(true, Ordering::Release);
                    self.semaphore.release(self.num_workers - 1);
                    return;
                }
                continue;
            }

            let distributed = self.distribute_ready_reactions();
            if distributed > 0 {
                self.notify_workers(distributed);
                return;
            }
        }
    }

    /// Advance through levels (via the external, possibly-blocking
    /// `try_advance_level`) until one has ready reactions, or until levels
    /// are exhausted for this tag.
    ///
    /// Always calls `try_advance_level` *before* inspecting a level's
    /// queue (spec §4.2: "call `try_advance_level` ... [then] inspect the
    /// queue"), exactly once per level visited — including level 0 of
    /// every tag but the very first, whose level 0 is pre-armed at
    /// construction specifically so it skips this call (`Scheduler::new`).
    /// `next_reaction_level` is kept one higher than the real level it
    /// names to make that possible: incrementing the sentinel `0` lands on
    /// real level 0, the same below-range headroom the original
    /// scheduler's 1-based level numbering gets for free (spec §9).
    fn distribute_ready_reactions(&self) -> usize {
        loop {
            let shifted = self.next_reaction_level.load(Ordering::Acquire);
            if shifted > self.max_reaction_level {
                return 0;
            }

            let mut next = shifted;
            self.env.try_advance_level(&mut next);
            let level = next - 1;

            // All workers are idle here, so the queue can be inspected
            // without the mutex (spec §9).
            let size = self.queue.lock().expect("reaction queue mutex poisoned").size_at(level);
            self.next_reaction_level.store(next, Ordering::Release);
            if size > 0 {
                self.executing_level.store(level, Ordering::Release);
                return size;
            }
        }
    }

    /// Wake up to `executing_size` idle workers, under-notifying by one: the
    /// caller (the last-idle worker itself) consumes one "slot" for free by
    /// simply returning to `get_ready_reaction` and popping — releasing a
    /// full `executing_size` permits would leak one and wake a phantom
    /// worker on the next cycle (spec §9).
    fn notify_workers(&self, executing_size: usize) {
        let idle = self.idle_workers.load(Ordering::Acquire);
        let k = idle.min(executing_size);
        self.idle_workers.fetch_sub(k, Ordering::AcqRel);
        tracing::trace!(k, "notifying workers");
        if k > 0 {
            self.semaphore.release(k - 1);
        }
    }
}

impl<E: Environment + 'static> Scheduler<E> {
    /// Spawn `num_workers` named OS threads, each running
    /// `get_ready_reaction` → `body` → `done_with_reaction` until the
    /// scheduler signals stop, and block until all of them exit.
    ///
    /// Reactions are non-preemptive and a panic inside `body` is fatal to
    /// the process (spec §1 Non-goals) — workers are not caught with
    /// `catch_unwind`, so a panicking reaction brings the whole process
    /// down, matching the C runtime's behavior exactly.
    pub fn run_workers(self: &Arc<Self>) {
        let handles: Vec<_> = (0..self.num_workers)
            .map(|worker_id| {
                let scheduler = self.clone();
                thread::Builder::new()
                    .name(format!("gedf-np-worker-{worker_id}"))
                    .spawn(move || {
                        while let Some(reaction) = scheduler.get_ready_reaction(worker_id as i64) {
                            reaction.invoke();
                            scheduler.done_with_reaction(worker_id as i64, &reaction);
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();

        for handle in handles {
            handle.join().expect("worker thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::SequentialEnvironment;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::time::Duration;

    fn stop_after(n: usize) -> SequentialEnvironment<impl Fn() -> bool> {
        let calls = StdAtomicUsize::new(0);
        SequentialEnvironment::new(move || calls.fetch_add(1, Ordering::SeqCst) >= n)
    }

    #[test_log::test]
    fn single_reaction_single_worker() {
        let ran = Arc::new(StdAtomicUsize::new(0));
        let ran2 = ran.clone();
        let r = Arc::new(Reaction::new("R", 0, Duration::ZERO, move || {
            ran2.fetch_add(1, Ordering::SeqCst);
        }));

        let sched = Arc::new(
            Scheduler::new(stop_after(1), 1, SchedulerConfig::default().with_num_reactions_per_level(vec![1]))
                .unwrap(),
        );
        sched.trigger_reaction(&r, 0);

        let got = sched.get_ready_reaction(0).expect("expected one reaction");
        assert!(Arc::ptr_eq(&got, &r));
        got.invoke();
        sched.done_with_reaction(0, &got);

        assert!(sched.get_ready_reaction(0).is_none(), "expected Stop");
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test_log::test]
    fn duplicate_trigger_from_many_threads_runs_once() {
        let sched = Arc::new(
            Scheduler::new(stop_after(1), 1, SchedulerConfig::default()).unwrap(),
        );
        let r = Arc::new(Reaction::new("R", 1, Duration::ZERO, || {}));

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let sched = sched.clone();
                let r = r.clone();
                thread::spawn(move || sched.trigger_reaction(&r, -1))
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let got = sched.get_ready_reaction(0).expect("one reaction expected");
        assert!(Arc::ptr_eq(&got, &r));
        sched.done_with_reaction(0, &got);
        assert!(
            sched.get_ready_reaction(0).is_none(),
            "duplicate triggers must not produce a second execution"
        );
    }

    /// A level-1 reaction triggered before its level-0 dependency must not
    /// be handed to a worker until the level-0 reaction has completed, even
    /// though both are already sitting in the queue.
    #[test_log::test]
    fn two_level_precedence() {
        let config = SchedulerConfig::default().with_num_reactions_per_level(vec![1, 1]);
        let sched = Arc::new(Scheduler::new(stop_after(1), 1, config).unwrap());

        let a = Arc::new(Reaction::new("A", 0, Duration::ZERO, || {}));
        let b = Arc::new(Reaction::new("B", 1, Duration::ZERO, || {}));

        // B (level 1) triggered first; A (level 0) triggered second.
        sched.trigger_reaction(&b, -1);
        sched.trigger_reaction(&a, -1);

        let first = sched.get_ready_reaction(0).expect("A should be ready");
        assert!(Arc::ptr_eq(&first, &a), "level 0 must dispatch before level 1");
        sched.done_with_reaction(0, &first);

        let second = sched.get_ready_reaction(0).expect("B should be ready");
        assert!(Arc::ptr_eq(&second, &b), "B only becomes ready once level 1 is reached");
        sched.done_with_reaction(0, &second);

        assert!(sched.get_ready_reaction(0).is_none(), "expected Stop");
    }

    /// Ten tags, one reaction each, triggered from inside `advance_tag_locked`
    /// as each tag is reached (mirroring how an event queue would feed the
    /// next tag's reactions in) — with four workers racing to pick up each
    /// tag's single reaction, execution order must still match tag order.
    #[test_log::test]
    fn tag_advance_race_runs_reactions_in_tag_order() {
        use std::sync::{OnceLock, Weak};

        struct TagDrivenEnv {
            scheduler: OnceLock<Weak<Scheduler<TagDrivenEnv>>>,
            reactions: Vec<Arc<Reaction>>,
            next_tag: StdAtomicUsize,
        }

        impl Environment for TagDrivenEnv {
            fn try_advance_level(&self, level: &mut u32) {
                *level += 1;
            }

            fn advance_tag_locked(&self) -> bool {
                let n = self.next_tag.fetch_add(1, Ordering::SeqCst);
                if n + 1 >= self.reactions.len() {
                    return true;
                }
                let scheduler = self
                    .scheduler
                    .get()
                    .expect("scheduler handle installed before use")
                    .upgrade()
                    .expect("scheduler outlives its environment");
                scheduler.trigger_reaction(&self.reactions[n + 1], -1);
                false
            }
        }

        let order = Arc::new(Mutex::new(Vec::new()));
        let reactions: Vec<_> = (0..10)
            .map(|i| {
                let order = order.clone();
                Arc::new(Reaction::new(format!("tag{i}"), 0, Duration::ZERO, move || {
                    order.lock().expect("order mutex poisoned").push(i);
                }))
            })
            .collect();

        let env = TagDrivenEnv {
            scheduler: OnceLock::new(),
            reactions: reactions.clone(),
            next_tag: StdAtomicUsize::new(0),
        };
        let sched = Arc::new(Scheduler::new(env, 4, SchedulerConfig::default()).unwrap());
        sched
            .env()
            .scheduler
            .set(Arc::downgrade(&sched))
            .expect("scheduler handle set exactly once");

        sched.trigger_reaction(&reactions[0], -1);
        sched.run_workers();

        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }
}
