//! Debug evaluation context
//!
//! Expressions typed at the prompt are evaluated by the guest VM itself. The
//! paused frame's upvalues and named locals are captured through the `debug`
//! library. Upvalues become the chunk's environment and locals are rebound as
//! parameters of a synthesized function returning the expression.

use std::fmt::Write as _;

use mlua::{Function, Lua, MultiValue, Table, Value};

use super::FrameInfo;

/// Locates the paused frame by chunk and line, starting at the probe's caller,
/// and returns its upvalues and locals as `{ name, value }` pairs.
const PROBE_SOURCE: &str = r#"
local getinfo, getlocal, getupvalue = debug.getinfo, debug.getlocal, debug.getupvalue
return function(source, line)
  local level = 2
  while true do
    local info = getinfo(level, "Sl")
    if info == nil then
      return nil
    end
    if info.source == source and info.currentline == line then
      break
    end
    level = level + 1
  end
  local func = getinfo(level, "f").func
  local upvalues, locals = {}, {}
  local index = 1
  while true do
    local name, value = getupvalue(func, index)
    if name == nil then
      break
    end
    upvalues[index] = { name, value }
    index = index + 1
  end
  index = 1
  while true do
    local name, value = getlocal(level, index)
    if name == nil then
      break
    end
    locals[index] = { name, value }
    index = index + 1
  end
  return { upvalues = upvalues, locals = locals }
end
"#;

/// Name of the upvalue holding a function's whole environment.
const ENVIRONMENT: &str = "_ENV";

/// The probe and the formatting function, captured before any script runs.
pub(crate) struct FrameProbe {
    capture: Function,
    tostring: Function,
}

impl FrameProbe {
    pub(crate) fn install(lua: &Lua) -> mlua::Result<()> {
        let capture = lua
            .load(PROBE_SOURCE)
            .set_name("=(frame probe)")
            .eval::<Function>()?;
        let tostring = lua.globals().get::<Function>("tostring")?;
        lua.set_app_data(Self { capture, tostring });
        Ok(())
    }
}

/// Variables visible from a paused frame.
#[derive(Debug, Clone, Default)]
pub(crate) struct FrameBindings {
    pub(crate) upvalues: Vec<(String, Value)>,
    pub(crate) locals: Vec<(String, Value)>,
}

impl FrameBindings {
    /// Captures the bindings of `frame`, or `None` when it is not on the stack.
    pub(crate) fn capture(lua: &Lua, frame: &FrameInfo) -> mlua::Result<Option<Self>> {
        let capture = {
            let probe = lua
                .app_data_ref::<FrameProbe>()
                .ok_or_else(probe_missing)?;
            probe.capture.clone()
        };

        let source = frame.source.clone().unwrap_or_default();
        let Some(captured) = capture.call::<Option<Table>>((source, frame.line))? else {
            return Ok(None);
        };

        Ok(Some(Self {
            upvalues: named_pairs(&captured.get::<Table>("upvalues")?)?,
            locals: named_pairs(&captured.get::<Table>("locals")?)?,
        }))
    }

    /// The environment the expression sees: the frame's upvalues by name,
    /// falling back to its captured `_ENV` when it has one.
    pub(crate) fn environment(&self, lua: &Lua) -> mlua::Result<Table> {
        let environment = lua.create_table_with_capacity(0, self.upvalues.len())?;
        for (name, value) in &self.upvalues {
            if name == ENVIRONMENT {
                let meta = lua.create_table_with_capacity(0, 1)?;
                meta.raw_set("__index", value.clone())?;
                environment.set_metatable(Some(meta));
            } else {
                environment.raw_set(name.as_str(), value.clone())?;
            }
        }
        Ok(environment)
    }

    /// Source of the chunk evaluating `expression` over these bindings.
    ///
    /// The chunk returns a function taking the local values positionally. The
    /// locals are bound in a single statement, so the chunk introduces no name
    /// of its own.
    pub(crate) fn synthesize(&self, expression: &str) -> String {
        let mut chunk = String::from("return function(...)\n");
        if !self.locals.is_empty() {
            let names: Vec<&str> = self.locals.iter().map(|(name, _)| name.as_str()).collect();
            let _ = writeln!(chunk, "  local {} = ...", names.join(", "));
        }
        let _ = write!(chunk, "  return {expression}\nend\n");
        chunk
    }
}

/// Evaluates `expression` against `bindings` and renders each result with the
/// guest's own `tostring`.
pub(crate) fn evaluate(
    lua: &Lua,
    bindings: &FrameBindings,
    expression: &str,
) -> mlua::Result<Vec<String>> {
    let chunk = bindings.synthesize(expression);
    let wrapper: Function = lua
        .load(chunk.as_str())
        .set_name("=(debugger)")
        .set_environment(bindings.environment(lua)?)
        .eval()?;

    let locals: MultiValue = bindings.locals.iter().map(|(_, v)| v.clone()).collect();
    let results: MultiValue = wrapper.call(locals)?;

    let tostring = {
        let probe = lua
            .app_data_ref::<FrameProbe>()
            .ok_or_else(probe_missing)?;
        probe.tostring.clone()
    };
    results
        .into_iter()
        .map(|value| tostring.call::<String>(value))
        .collect()
}

fn probe_missing() -> mlua::Error {
    mlua::Error::RuntimeError("frame probe is not installed".to_owned())
}

/// Reads `{ name, value }` pairs, keeping only names that are identifiers.
///
/// Internal slots such as `(temporary)` or `(for state)` are dropped.
fn named_pairs(table: &Table) -> mlua::Result<Vec<(String, Value)>> {
    let mut pairs = Vec::new();
    for index in 1..=table.raw_len() {
        let pair: Table = table.raw_get(index)?;
        let name: String = pair.raw_get(1)?;
        if is_identifier(&name) {
            pairs.push((name, pair.raw_get::<Value>(2)?));
        }
    }
    Ok(pairs)
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|first| first == '_' || first.is_ascii_alphabetic())
        && chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}
