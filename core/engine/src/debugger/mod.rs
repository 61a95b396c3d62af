//! Lunar's interactive script debugger
//!
//! This module provides a line-oriented source debugger for a single
//! [`Script`](crate::Script), driven entirely by VM execution hooks.
//!
//! # Overview
//!
//! The debugger API consists of several key components:
//!
//! - [`Debugger`]: The debugger attached to one script for its whole lifetime
//! - [`BreakpointSite`] / [`Breakpoint`]: Function and line breakpoints with hit counters
//! - [`Transport`]: The pair of streams the interactive loop reads commands from
//!   and writes output to
//! - [`FrameInfo`]: A resolved view of one paused call frame
//!
//! # Architecture
//!
//! VM hooks carry no closure context, so dispatch goes through a per-VM
//! registry keyed by thread identity:
//!
//! - `HookRegistration`: Registers the debugger session when a [`Debugger`] is
//!   created and removes it when the debugger is dropped
//! - `hook_trampoline`: The single hook function, which looks the receiver up by
//!   the running thread and forwards the event
//! - [`HookMask`]: The events the VM reports, recomputed from the debugger
//!   state and its breakpoints after every change
//!
//! When a breakpoint or step target matches, the hook blocks inside the
//! interactive loop until a control command (`continue`, `step`, `next`,
//! `return`) is read.
//!
//! # Example
//!
//! ```rust,no_run
//! use lunar_engine::{Engine, debugger::{Debugger, Transport}};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//! let script = engine.create_from_file("behaviour.lua")?;
//! let debugger = Debugger::new(&script, Transport::stdio());
//!
//! debugger.set_line_breakpoint("behaviour.lua", 10);
//!
//! // Pauses in the interactive loop when line 10 runs.
//! script.resume();
//! # Ok(())
//! # }
//! ```

pub mod breakpoint;
pub mod frame;
pub mod state;
pub mod transport;

pub(crate) mod eval_context;
pub(crate) mod host_hooks;
mod repl;


pub use breakpoint::{Breakpoint, BreakpointId, BreakpointSite};
pub use frame::FrameInfo;
pub use host_hooks::{HookMask, HookReceiver};
pub use state::{Debugger, DebuggerConfig, DebuggerState};
pub use transport::Transport;

use mlua::Lua;

/// Prepares a fresh VM for debugging: the hook registry and the frame probe.
pub(crate) fn install(lua: &Lua) -> mlua::Result<()> {
    host_hooks::HookRegistry::install(lua);
    eval_context::FrameProbe::install(lua)
}
