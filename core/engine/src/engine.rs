use std::fs;
use std::path::Path;
use std::rc::Rc;

use log::{debug, error};
use mlua::{AnyUserData, Function, Lua, MultiValue, Thread, Value};

use crate::debugger;
use crate::error::{EngineError, EngineResult, LoadError};
use crate::module::NativeModule;
use crate::script::Script;

/// Whether a coroutine has an active frame, i.e. was resumed at least once.
const STARTED_SOURCE: &str = r#"
local getinfo = debug.getinfo
return function(co)
  return getinfo(co, 0, "l") ~= nil
end
"#;

/// Owns one guest VM.
///
/// Scripts borrow the engine that created them, so the engine cannot be
/// dropped while any of its scripts (or their debuggers) are alive.
#[derive(Debug)]
pub struct Engine {
    lua: Lua,
    started: Function,
}

impl Engine {
    /// Creates a VM with every standard library opened, including `debug`.
    pub fn new() -> EngineResult<Self> {
        // SAFETY: the `debug` library is required for frame introspection.
        // Scripts run by the engine are trusted host content.
        let lua = unsafe { Lua::unsafe_new() };
        debugger::install(&lua)?;
        let started = lua
            .load(STARTED_SOURCE)
            .set_name("=(thread probe)")
            .eval::<Function>()?;
        Ok(Self { lua, started })
    }

    /// The underlying VM, for native callbacks and marshaling.
    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Whether `thread` has run, even if it was resumed by guest code before
    /// the host saw it.
    pub(crate) fn thread_started(&self, thread: &Thread) -> mlua::Result<bool> {
        self.started.call(thread.clone())
    }

    /// Runs the top level of `path` once and wraps the value it returns into a [`Script`].
    ///
    /// The top level must return exactly one value, either a coroutine or a
    /// function. A garbage collection cycle runs before returning, whether the
    /// load succeeded or not.
    pub fn create_from_file(&self, path: impl AsRef<Path>) -> Result<Script<'_>, LoadError> {
        let path = path.as_ref();
        let result = self.load_entry_point(path);
        if let Err(err) = &result {
            error!("Engine.create_from_file: {err}");
        }
        self.collect_garbage();
        result
    }

    fn load_entry_point(&self, path: &Path) -> Result<Script<'_>, LoadError> {
        let source = fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        let chunk = self
            .lua
            .load(source.as_str())
            .set_name(format!("@{}", path.display()))
            .into_function()
            .map_err(|source| LoadError::Compile {
                path: path.to_path_buf(),
                source,
            })?;

        let returned: MultiValue = chunk.call(()).map_err(|source| LoadError::Execute {
            path: path.to_path_buf(),
            source,
        })?;

        let count = returned.len();
        let mut returned = returned.into_iter();
        let (Some(entry), None) = (returned.next(), returned.next()) else {
            return Err(LoadError::ReturnArity {
                path: path.to_path_buf(),
                count,
            });
        };

        let thread = match entry {
            Value::Thread(thread) => thread,
            Value::Function(function) => {
                self.lua
                    .create_thread(function)
                    .map_err(|source| LoadError::Thread {
                        path: path.to_path_buf(),
                        source,
                    })?
            }
            other => {
                return Err(LoadError::EntryPoint {
                    path: path.to_path_buf(),
                    type_name: other.type_name(),
                });
            }
        };

        debug!("loaded script {}", path.display());
        Ok(Script::new(self, thread, path.display().to_string()))
    }

    /// Installs `module` as a global and in `package.loaded`, replacing any
    /// previous installation under the same name.
    pub fn require_module(&self, module: &dyn NativeModule) -> EngineResult<()> {
        let name = module.name();
        let exports = module.open(&self.lua).map_err(|source| EngineError::Module {
            name: name.to_owned(),
            source,
        })?;

        let globals = self.lua.globals();
        let package: mlua::Table = globals.get("package")?;
        let loaded: mlua::Table = package.get("loaded")?;
        loaded.set(name, exports.clone())?;
        globals.set(name, exports)?;
        debug!("required native module `{name}`");
        Ok(())
    }

    /// Exposes a host-owned handle as the global `name`.
    ///
    /// Guest code sees an opaque userdata. Native callbacks recover the handle
    /// with [`host_handle`].
    pub fn set_global<T: 'static>(&self, name: &str, handle: Rc<T>) -> EngineResult<()> {
        let userdata = self.lua.create_any_userdata(handle)?;
        self.lua.globals().set(name, userdata)?;
        Ok(())
    }

    /// Sets the global `name` to `nil`.
    pub fn clear_global(&self, name: &str) -> EngineResult<()> {
        self.lua.globals().set(name, Value::Nil)?;
        Ok(())
    }

    /// Runs a full garbage collection cycle.
    ///
    /// Expected once per driving tick.
    pub fn collect_garbage(&self) {
        if let Err(err) = self.lua.gc_collect() {
            error!("Engine.collect_garbage: {err}");
        }
    }
}

/// Recovers a handle stored with [`Engine::set_global`].
pub fn host_handle<T: 'static>(lua: &Lua, name: &str) -> mlua::Result<Rc<T>> {
    let userdata: AnyUserData = lua.globals().get(name)?;
    let handle = userdata.borrow::<Rc<T>>()?;
    Ok(Rc::clone(&handle))
}
