//! Debugger state management

use std::cell::RefCell;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::rc::{Rc, Weak};

use log::{debug, trace, warn};
use mlua::{Debug, DebugEvent, Lua, Thread};
use serde::{Deserialize, Serialize};

use super::breakpoint::{Breakpoint, BreakpointId, BreakpointList, BreakpointSite};
use super::eval_context::{self, FrameBindings};
use super::frame::{self, FrameInfo};
use super::host_hooks::{self, HookMask, HookReceiver, HookRegistration};
use super::repl::{self, LoopExit};
use super::transport::Transport;
use crate::error::describe_lua_error;
use crate::script::Script;

/// Default number of lines listed on each side of the current line.
const DEFAULT_SOURCE_CONTEXT: usize = 4;

/// The mode a debugger is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DebuggerState {
    /// Attached, nothing requested yet.
    #[default]
    Idle,
    /// Blocked in the interactive loop.
    Debugging,
    /// Waiting for the transient step target.
    Stepping,
    /// Running an expression typed at the prompt; every hook is suppressed.
    EvaluatingExpression,
    /// Running until the next persistent breakpoint.
    Continuing,
}

impl DebuggerState {
    /// The events the VM must report in this state.
    pub fn hook_mask(self, has_function_breakpoints: bool, has_line_breakpoints: bool) -> HookMask {
        if self == Self::EvaluatingExpression {
            return HookMask::empty();
        }
        let mut mask = HookMask::empty();
        if has_function_breakpoints {
            mask |= HookMask::CALL;
        }
        if has_line_breakpoints {
            mask |= HookMask::LINE;
        }
        if self == Self::Stepping {
            mask |= HookMask::LINE | HookMask::RETURN;
        }
        mask
    }
}

/// Tunables of a debugger session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerConfig {
    /// Lines listed on each side of the current line.
    pub source_context: usize,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            source_context: DEFAULT_SOURCE_CONTEXT,
        }
    }
}

/// Everything the hook needs while a thread runs under the debugger.
pub(crate) struct Session {
    lua: Lua,
    thread: Thread,
    config: DebuggerConfig,
    state: DebuggerState,
    breakpoints: BreakpointList,
    step: Option<BreakpointSite>,
    transport: Option<Transport>,
    detached: bool,
}

impl Session {
    fn current_frame(&self) -> Option<FrameInfo> {
        FrameInfo::at_level(&self.lua, 0)
    }

    pub(crate) fn update_hooks(&self) {
        let mask = self
            .state
            .hook_mask(self.breakpoints.has_functions(), self.breakpoints.has_lines());
        debug!("debugger hook mask: {mask:?}");
        host_hooks::apply_mask(&self.lua, &self.thread, mask);
    }

    pub(crate) fn step(&mut self) {
        self.state = DebuggerState::Stepping;
        self.step = Some(match self.current_frame() {
            Some(frame) => BreakpointSite::line(frame.short_src, frame.line + 1),
            None => BreakpointSite::any_line(),
        });
    }

    pub(crate) fn next(&mut self) {
        self.state = DebuggerState::Stepping;
        self.step = Some(BreakpointSite::any_line());
    }

    /// Pauses when the current function returns, matched by name only.
    ///
    /// A recursive call of the same name returning first also matches.
    pub(crate) fn step_to_return(&mut self) {
        match self.current_frame().and_then(|frame| frame.name) {
            Some(name) => {
                self.state = DebuggerState::Stepping;
                self.step = Some(BreakpointSite::function(name));
            }
            None => self.step(),
        }
    }

    pub(crate) fn continue_execution(&mut self) {
        self.state = DebuggerState::Continuing;
    }

    pub(crate) fn state(&self) -> DebuggerState {
        self.state
    }

    pub(crate) fn print_backtrace(&self, out: &mut dyn Write) -> io::Result<()> {
        frame::print_backtrace(&self.lua, out)
    }

    pub(crate) fn print_source(&self, out: &mut dyn Write) -> io::Result<()> {
        match self.current_frame() {
            Some(frame) => frame::print_source(&frame, self.config.source_context, out),
            None => writeln!(out, "< No Source (no active frame) >"),
        }
    }

    pub(crate) fn print_stack_frame(&self, level: usize, out: &mut dyn Write) -> io::Result<()> {
        match FrameInfo::at_level(&self.lua, level) {
            Some(frame) => writeln!(out, "{frame}"),
            None => writeln!(out, "no frame at level {level}"),
        }
    }

    pub(crate) fn print_breakpoints(&self, out: &mut dyn Write) -> io::Result<()> {
        for (id, breakpoint) in self.breakpoints.iter() {
            writeln!(out, "{id} {breakpoint}")?;
        }
        Ok(())
    }

    /// Evaluates `expression` in the paused frame. Failures are printed, never returned.
    pub(crate) fn evaluate_expression(
        &mut self,
        expression: &str,
        out: &mut dyn Write,
    ) -> io::Result<()> {
        let previous = self.state;
        self.state = DebuggerState::EvaluatingExpression;
        self.update_hooks();

        let result = self.evaluate_in_frame(expression);

        self.state = previous;
        self.update_hooks();

        match result {
            Ok(values) => writeln!(out, ">>> {}", values.join("\t")),
            Err(err) => match describe_lua_error(&err) {
                message if message.is_empty() => writeln!(out, "**Error: ( no description )"),
                message => writeln!(out, "**Error: {message}"),
            },
        }
    }

    fn evaluate_in_frame(&self, expression: &str) -> mlua::Result<Vec<String>> {
        let no_frame = || mlua::Error::RuntimeError("no active frame".to_owned());
        let frame = self.current_frame().ok_or_else(no_frame)?;
        let bindings = FrameBindings::capture(&self.lua, &frame)?.ok_or_else(no_frame)?;
        eval_context::evaluate(&self.lua, &bindings, expression)
    }

    /// Runs the interactive loop on the given streams until a control command.
    pub(crate) fn enter_debugger(
        &mut self,
        input: &mut dyn BufRead,
        out: &mut dyn Write,
    ) -> io::Result<LoopExit> {
        self.step = None;
        self.state = DebuggerState::Debugging;
        let exit = repl::run(self, input, out);
        if self.state == DebuggerState::Debugging {
            // Left without a control command.
            self.state = DebuggerState::Continuing;
        }
        self.update_hooks();
        exit
    }

    /// Prints the location and blocks in the interactive loop on the session's streams.
    fn pause(&mut self, with_backtrace: bool) {
        if self.detached {
            return;
        }
        let Some(mut transport) = self.transport.take() else {
            return;
        };

        match self.announce(&mut transport, with_backtrace) {
            Ok(LoopExit::Command) => {}
            Ok(LoopExit::EndOfInput) => {
                warn!("debugger input exhausted, detaching the interactive loop");
                self.detached = true;
            }
            Err(err) => {
                warn!("debugger stream failed, detaching the interactive loop: {err}");
                self.detached = true;
                self.state = DebuggerState::Continuing;
                self.update_hooks();
            }
        }
        self.transport = Some(transport);
    }

    fn announce(&mut self, transport: &mut Transport, with_backtrace: bool) -> io::Result<LoopExit> {
        if with_backtrace {
            self.print_backtrace(&mut *transport.output)?;
        }
        self.print_source(&mut *transport.output)?;
        self.enter_debugger(&mut *transport.input, &mut *transport.output)
    }

    fn step_matches(&self, event: DebugEvent, frame: &FrameInfo) -> bool {
        match &self.step {
            Some(site) if site.is_any_line() => matches!(event, DebugEvent::Line),
            Some(site @ BreakpointSite::Line { .. }) => {
                matches!(event, DebugEvent::Line | DebugEvent::Ret) && frame.is_at(site)
            }
            _ => false,
        }
    }

    /// Counts every persistent breakpoint matched by `event`.
    fn record_hits(&mut self, event: DebugEvent, frame: &FrameInfo) -> bool {
        match event {
            DebugEvent::Call | DebugEvent::TailCall => {
                let Some(name) = &frame.name else { return false };
                let site = BreakpointSite::function(name.clone());
                let hit = self.breakpoints.hit(&site);
                if let Some(hits) = hit {
                    debug!("function breakpoint `{name}` hit ({hits})");
                }
                hit.is_some()
            }
            DebugEvent::Line => {
                let hit = frame
                    .line_sites()
                    .iter()
                    .find_map(|site| self.breakpoints.hit(site));
                if let Some(hits) = hit {
                    debug!("line breakpoint at {}:{} hit ({hits})", frame.short_src, frame.line);
                }
                hit.is_some()
            }
            _ => false,
        }
    }

    fn dispatch(&mut self, debug: &Debug<'_>) {
        let event = debug.event();
        let frame = FrameInfo::from_debug(debug);
        trace!("hook {event:?} at {frame}");

        let stepping = self.state == DebuggerState::Stepping;
        let stepped = stepping && self.step_matches(event, &frame);
        let returning = stepping
            && matches!(event, DebugEvent::Ret)
            && self
                .step
                .as_ref()
                .is_some_and(|site| site.is_function() && frame.is_at(site));
        let hit = self.record_hits(event, &frame);

        if hit || returning {
            self.pause(true);
        } else if stepped {
            self.pause(false);
        }
    }
}

impl HookReceiver for RefCell<Session> {
    fn on_hook(&self, _lua: &Lua, debug: &Debug<'_>) {
        match self.try_borrow_mut() {
            Ok(mut session) => session.dispatch(debug),
            Err(_) => trace!("hook event ignored while the session is busy"),
        }
    }
}

/// A debugger attached to one [`Script`] for its whole lifetime.
///
/// The debugger borrows its script, so it is always dropped first. Dropping it
/// removes the script's thread from the hook registry.
pub struct Debugger<'a> {
    // Declared first: the registry entry goes away before the session is freed.
    registration: HookRegistration,
    session: Rc<RefCell<Session>>,
    script: &'a Script<'a>,
}

impl<'a> Debugger<'a> {
    /// Attaches a debugger to `script`, using `transport` for the interactive loop.
    pub fn new(script: &'a Script<'a>, transport: Transport) -> Self {
        Self::with_config(script, transport, DebuggerConfig::default())
    }

    /// Attaches a debugger with explicit settings.
    pub fn with_config(
        script: &'a Script<'a>,
        transport: Transport,
        config: DebuggerConfig,
    ) -> Self {
        let lua = script.engine().lua();
        let session = Rc::new(RefCell::new(Session {
            lua: lua.clone(),
            thread: script.thread().clone(),
            config,
            state: DebuggerState::Idle,
            breakpoints: BreakpointList::default(),
            step: None,
            transport: Some(transport),
            detached: false,
        }));

        let receiver: Rc<dyn HookReceiver> = session.clone();
        let receiver: Weak<dyn HookReceiver> = Rc::downgrade(&receiver);
        let registration = HookRegistration::register(lua, script.thread(), receiver);
        session.borrow().update_hooks();

        Self {
            registration,
            session,
            script,
        }
    }

    /// The script being debugged.
    pub fn script(&self) -> &'a Script<'a> {
        self.script
    }

    /// Current mode.
    pub fn state(&self) -> DebuggerState {
        self.session.borrow().state()
    }

    /// Replaces the streams used when a breakpoint pauses the script.
    pub fn set_transport(&self, transport: Transport) {
        let mut session = self.session.borrow_mut();
        session.transport = Some(transport);
        session.detached = false;
    }

    fn edit_breakpoints<R>(&self, edit: impl FnOnce(&mut BreakpointList) -> R) -> R {
        let mut session = self.session.borrow_mut();
        let result = edit(&mut session.breakpoints);
        session.update_hooks();
        result
    }

    /// Pauses on calls of functions named `name`. Returns `false` if already set.
    pub fn set_function_breakpoint(&self, name: &str) -> bool {
        self.edit_breakpoints(|list| list.insert(BreakpointSite::function(name)))
    }

    /// Removes the function breakpoint on `name`. Returns `false` if none was set.
    pub fn unset_function_breakpoint(&self, name: &str) -> bool {
        self.edit_breakpoints(|list| list.remove(&BreakpointSite::function(name)))
    }

    /// Pauses when `file:line` runs. `file` is the short source name or the full path.
    pub fn set_line_breakpoint(&self, file: &str, line: i32) -> bool {
        self.edit_breakpoints(|list| list.insert(BreakpointSite::line(file, line)))
    }

    /// Removes the line breakpoint at `file:line`. Returns `false` if none was set.
    pub fn unset_line_breakpoint(&self, file: &str, line: i32) -> bool {
        self.edit_breakpoints(|list| list.remove(&BreakpointSite::line(file, line)))
    }

    /// Adds an arbitrary breakpoint site.
    pub fn set_breakpoint(&self, site: BreakpointSite) -> bool {
        self.edit_breakpoints(|list| list.insert(site))
    }

    /// Removes the breakpoint at `id` in the display list.
    pub fn unset_breakpoint(&self, id: BreakpointId) -> Option<BreakpointSite> {
        self.edit_breakpoints(|list| list.remove_index(id))
    }

    /// Snapshot of the display list.
    pub fn breakpoints(&self) -> Vec<Breakpoint> {
        self.session
            .borrow()
            .breakpoints
            .iter()
            .map(|(_, breakpoint)| breakpoint)
            .collect()
    }

    /// Hit counter of `site`, if it is set.
    pub fn hit_count(&self, site: &BreakpointSite) -> Option<u32> {
        self.session.borrow().breakpoints.hits(site)
    }

    /// Pauses at the line after the current one, in the same file.
    pub fn step(&self) {
        let mut session = self.session.borrow_mut();
        session.step();
        session.update_hooks();
    }

    /// Pauses at the very next line, wherever it is, including inside a newly
    /// entered call.
    pub fn next(&self) {
        let mut session = self.session.borrow_mut();
        session.next();
        session.update_hooks();
    }

    /// Pauses when the current function returns.
    pub fn step_to_return(&self) {
        let mut session = self.session.borrow_mut();
        session.step_to_return();
        session.update_hooks();
    }

    /// Runs until the next persistent breakpoint.
    pub fn continue_execution(&self) {
        let mut session = self.session.borrow_mut();
        session.continue_execution();
        session.update_hooks();
    }

    /// Runs the interactive loop on the given streams.
    pub fn enter_debugger(&self, input: &mut dyn BufRead, out: &mut dyn Write) -> io::Result<()> {
        self.session
            .borrow_mut()
            .enter_debugger(input, out)
            .map(|_| ())
    }

    /// Prints every frame of the paused thread.
    pub fn print_backtrace(&self, out: &mut dyn Write) -> io::Result<()> {
        self.session.borrow().print_backtrace(out)
    }

    /// Prints one frame as `name at source:line`.
    pub fn print_stack_frame(&self, level: usize, out: &mut dyn Write) -> io::Result<()> {
        self.session.borrow().print_stack_frame(level, out)
    }

    /// Lists the source around the paused line.
    pub fn print_source(&self, out: &mut dyn Write) -> io::Result<()> {
        self.session.borrow().print_source(out)
    }

    /// Prints the display list as `[index] breakpoint (hits: n)`.
    pub fn print_breakpoints(&self, out: &mut dyn Write) -> io::Result<()> {
        self.session.borrow().print_breakpoints(out)
    }

    /// Evaluates `expression` in the paused frame, printing the result or the error.
    pub fn evaluate_expression(&self, out: &mut dyn Write, expression: &str) -> io::Result<()> {
        self.session
            .borrow_mut()
            .evaluate_expression(expression, out)
    }
}

impl fmt::Debug for Debugger<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debugger")
            .field("registration", &self.registration)
            .field("state", &self.session.try_borrow().map(|s| s.state()).ok())
            .field("script", &self.script.name())
            .finish_non_exhaustive()
    }
}
