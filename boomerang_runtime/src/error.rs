/// Errors the runtime can report *without* aborting the process.
///
/// Per spec §7, invariant violations (a failed `done_with_reaction` CAS, a
/// poisoned mutex, a watchdog thread that can't be spawned) are not part of
/// this taxonomy: those indicate a bug in the runtime or calling code and go
/// straight to `tracing::error!` + `panic!`/`process::abort`, since there is
/// no safe way to continue past them.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// A scheduler was configured with zero worker threads.
    #[error("a scheduler needs at least one worker thread")]
    NoWorkers,
}
