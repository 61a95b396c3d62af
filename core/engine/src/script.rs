use std::cell::Cell;
use std::fmt;

use log::{debug, error, info, warn};
use mlua::{MultiValue, Thread, ThreadStatus};

use crate::debugger::host_hooks;
use crate::engine::Engine;
use crate::error::RuntimeError;

/// Lifecycle of a [`Script`], derived from the VM thread status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptState {
    /// Holds its entry point and has never been resumed.
    Fresh,
    /// Yielded at least once and can be resumed again.
    Suspended,
    /// Returned or faulted.
    Dead,
}

/// What a single [`Script::resume`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeOutcome {
    /// The coroutine yielded and can be resumed again.
    Yielded,
    /// The coroutine returned.
    Finished,
    /// The coroutine raised an error. Already reported to the log.
    Faulted(RuntimeError),
    /// The script was already dead; nothing ran.
    NotAlive,
}

/// One resumable guest coroutine created by [`Engine::create_from_file`].
///
/// Dropping a script releases its thread handle. Pending guest code is
/// abandoned, never run to completion.
pub struct Script<'e> {
    engine: &'e Engine,
    thread: Thread,
    name: String,
    resumes: Cell<u64>,
}

impl<'e> Script<'e> {
    pub(crate) fn new(engine: &'e Engine, thread: Thread, name: String) -> Self {
        Self {
            engine,
            thread,
            name,
            resumes: Cell::new(0),
        }
    }

    /// The engine that loaded this script.
    pub fn engine(&self) -> &'e Engine {
        self.engine
    }

    /// The guest coroutine.
    pub fn thread(&self) -> &Thread {
        &self.thread
    }

    /// The path the script was loaded from.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times [`resume`](Self::resume) actually ran the coroutine.
    pub fn resume_count(&self) -> u64 {
        self.resumes.get()
    }

    /// Whether the coroutine can be resumed.
    ///
    /// A thread counts as alive when it is suspended at a yield, or when it has
    /// not started yet and still holds its entry function. Any other VM status
    /// is dead.
    pub fn is_alive(&self) -> bool {
        matches!(self.thread.status(), ThreadStatus::Resumable)
    }

    /// Current lifecycle state.
    ///
    /// A coroutine the top level already resumed to a yield is `Suspended`,
    /// not `Fresh`.
    pub fn state(&self) -> ScriptState {
        if !self.is_alive() {
            return ScriptState::Dead;
        }
        let started = self.engine.thread_started(&self.thread).unwrap_or_else(|err| {
            warn!("Script.state: cannot inspect `{}`: {err}", self.name);
            self.resumes.get() > 0
        });
        if started {
            ScriptState::Suspended
        } else {
            ScriptState::Fresh
        }
    }

    /// Runs the coroutine until it yields, returns or faults.
    ///
    /// Faults are logged as [`RuntimeError`]s and leave the script dead; they
    /// are never returned as host errors. Poll [`is_alive`](Self::is_alive)
    /// before resuming again.
    pub fn resume(&self) -> ResumeOutcome {
        if !self.is_alive() {
            warn!("Script.resume: `{}` is not alive", self.name);
            return ResumeOutcome::NotAlive;
        }

        host_hooks::rearm(self.engine.lua(), &self.thread);
        self.resumes.set(self.resumes.get() + 1);

        match self.thread.resume::<MultiValue>(()) {
            Ok(_) if self.is_alive() => {
                debug!("Script.resume: `{}` yielded", self.name);
                ResumeOutcome::Yielded
            }
            Ok(_) => {
                info!("Script.resume: `{}` finished", self.name);
                ResumeOutcome::Finished
            }
            Err(err) => {
                let fault = RuntimeError::from_lua(&err);
                error!("Script.resume: `{}` faulted: {fault}", self.name);
                ResumeOutcome::Faulted(fault)
            }
        }
    }
}

impl fmt::Debug for Script<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Script")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("resumes", &self.resumes.get())
            .finish_non_exhaustive()
    }
}
