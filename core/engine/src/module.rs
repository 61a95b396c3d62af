//! Native libraries callable from guest code.

use std::fmt;

use mlua::{FromLuaMulti, Function, IntoLuaMulti, Lua, Table};

/// A named library of host functions installed with
/// [`Engine::require_module`](crate::Engine::require_module).
pub trait NativeModule {
    /// Name the export table is registered under, both as a global and in
    /// `package.loaded`.
    fn name(&self) -> &str;

    /// Builds the export table.
    fn open(&self, lua: &Lua) -> mlua::Result<Table>;
}

type Registrar = Box<dyn Fn(&Lua) -> mlua::Result<Function>>;

/// A [`NativeModule`] assembled from Rust closures.
///
/// ```rust
/// use lunar_engine::NativeLibrary;
///
/// let library = NativeLibrary::new("host")
///     .function("double", |_, n: f64| Ok(n * 2.0))
///     .function("greet", |_, name: String| Ok(format!("hello {name}")));
/// assert_eq!(library.function_names().count(), 2);
/// ```
pub struct NativeLibrary {
    name: String,
    functions: Vec<(String, Registrar)>,
}

impl NativeLibrary {
    /// Creates an empty library.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
        }
    }

    /// Adds a function. A later function with the same name wins.
    #[must_use]
    pub fn function<A, R, F>(mut self, name: impl Into<String>, func: F) -> Self
    where
        A: FromLuaMulti,
        R: IntoLuaMulti,
        F: Fn(&Lua, A) -> mlua::Result<R> + Clone + 'static,
    {
        let registrar: Registrar = Box::new(move |lua| lua.create_function(func.clone()));
        self.functions.push((name.into(), registrar));
        self
    }

    /// Names of the registered functions, in registration order.
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|(name, _)| name.as_str())
    }
}

impl NativeModule for NativeLibrary {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self, lua: &Lua) -> mlua::Result<Table> {
        let exports = lua.create_table_with_capacity(0, self.functions.len())?;
        for (name, registrar) in &self.functions {
            exports.raw_set(name.as_str(), registrar(lua)?)?;
        }
        Ok(exports)
    }
}

impl fmt::Debug for NativeLibrary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeLibrary")
            .field("name", &self.name)
            .field("functions", &self.function_names().collect::<Vec<_>>())
            .finish()
    }
}
