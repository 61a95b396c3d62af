//! Hook dispatch for debugger integration
//!
//! The VM reports execution events through a plain function with no closure
//! context. This module keeps a per-VM registry mapping each debugged thread
//! to its receiver, and a single trampoline that forwards every event to the
//! receiver registered for the running thread.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use log::trace;
use mlua::{Debug, HookTriggers, Lua, Thread, VmState};
use rustc_hash::FxHashMap;

bitflags! {
    /// The execution events a debugged thread reports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HookMask: u8 {
        /// Function calls, including tail calls.
        const CALL = 0b001;
        /// Function returns.
        const RETURN = 0b010;
        /// Each new source line.
        const LINE = 0b100;
    }
}

impl From<HookMask> for HookTriggers {
    fn from(mask: HookMask) -> Self {
        let mut triggers = HookTriggers::new();
        if mask.contains(HookMask::CALL) {
            triggers = triggers.on_calls();
        }
        if mask.contains(HookMask::RETURN) {
            triggers = triggers.on_returns();
        }
        if mask.contains(HookMask::LINE) {
            triggers = triggers.every_line();
        }
        triggers
    }
}

/// Receives the hook events of one registered thread.
pub trait HookReceiver {
    /// Called for every enabled event while the thread runs.
    fn on_hook(&self, lua: &Lua, debug: &Debug<'_>);
}

/// Raw identity of a guest thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct ThreadKey(usize);

impl ThreadKey {
    pub(crate) fn of(thread: &Thread) -> Self {
        Self(thread.to_pointer().addr())
    }
}

struct HookEntry {
    receiver: Weak<dyn HookReceiver>,
    mask: HookMask,
}

/// Thread-to-receiver table, stored in the VM's application data.
#[derive(Default)]
pub(crate) struct HookRegistry {
    entries: RefCell<FxHashMap<ThreadKey, HookEntry>>,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("entries", &self.entries.borrow().len())
            .finish()
    }
}

impl HookRegistry {
    pub(crate) fn install(lua: &Lua) {
        lua.set_app_data(Self::default());
    }

    fn with<R>(lua: &Lua, f: impl FnOnce(&Self) -> R) -> Option<R> {
        let registry = lua.app_data_ref::<Self>()?;
        Some(f(&registry))
    }

    fn receiver(lua: &Lua, key: ThreadKey) -> Option<Rc<dyn HookReceiver>> {
        Self::with(lua, |registry| {
            registry
                .entries
                .borrow()
                .get(&key)
                .and_then(|entry| entry.receiver.upgrade())
        })
        .flatten()
    }

    fn mask(lua: &Lua, key: ThreadKey) -> Option<HookMask> {
        Self::with(lua, |registry| {
            registry.entries.borrow().get(&key).map(|entry| entry.mask)
        })
        .flatten()
    }

    /// Number of threads currently registered.
    #[cfg(test)]
    pub(crate) fn len(lua: &Lua) -> usize {
        Self::with(lua, |registry| registry.entries.borrow().len()).unwrap_or_default()
    }
}

/// Keeps one thread registered with the hook registry.
///
/// Dropping the registration disables the thread's hook and removes the
/// registry entry.
pub(crate) struct HookRegistration {
    lua: Lua,
    thread: Thread,
    key: ThreadKey,
}

impl HookRegistration {
    pub(crate) fn register(lua: &Lua, thread: &Thread, receiver: Weak<dyn HookReceiver>) -> Self {
        let key = ThreadKey::of(thread);
        HookRegistry::with(lua, |registry| {
            registry.entries.borrow_mut().insert(
                key,
                HookEntry {
                    receiver,
                    mask: HookMask::empty(),
                },
            );
        });
        trace!("hook registered for thread {key:?}");
        Self {
            lua: lua.clone(),
            thread: thread.clone(),
            key,
        }
    }
}

impl Drop for HookRegistration {
    fn drop(&mut self) {
        self.thread.set_hook(HookTriggers::new(), hook_trampoline);
        HookRegistry::with(&self.lua, |registry| {
            registry.entries.borrow_mut().remove(&self.key);
        });
        trace!("hook deregistered for thread {:?}", self.key);
    }
}

impl fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistration")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Records `mask` for `thread` and applies it.
pub(crate) fn apply_mask(lua: &Lua, thread: &Thread, mask: HookMask) {
    let key = ThreadKey::of(thread);
    HookRegistry::with(lua, |registry| {
        if let Some(entry) = registry.entries.borrow_mut().get_mut(&key) {
            entry.mask = mask;
        }
    });
    thread.set_hook(mask.into(), hook_trampoline);
}

/// Re-applies the registered mask of `thread` before it is resumed.
///
/// The VM binding keeps a single hook slot per VM, so another thread's
/// debugger may have taken it since the last resume.
pub(crate) fn rearm(lua: &Lua, thread: &Thread) {
    if let Some(mask) = HookRegistry::mask(lua, ThreadKey::of(thread)) {
        thread.set_hook(mask.into(), hook_trampoline);
    }
}

fn hook_trampoline(lua: &Lua, debug: Debug<'_>) -> mlua::Result<VmState> {
    let key = ThreadKey::of(&lua.current_thread());
    match HookRegistry::receiver(lua, key) {
        Some(receiver) => receiver.on_hook(lua, &debug),
        None => trace!("hook event for unregistered thread {key:?}"),
    }
    Ok(VmState::Continue)
}
