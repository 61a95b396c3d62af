use std::cell::Cell;
use std::io::Write as _;
use std::rc::Rc;

use indoc::indoc;
use tempfile::NamedTempFile;
use test_case::test_case;

use crate::{
    Engine, LoadError, NativeLibrary, ResumeOutcome, ScriptState, host_handle,
};

/// Writes `source` to a temporary `.lua` file.
pub(crate) fn script_file(source: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .prefix("lunar")
        .suffix(".lua")
        .tempfile()
        .expect("create temporary script");
    file.write_all(source.as_bytes())
        .expect("write temporary script");
    file
}

const TWO_YIELDS: &str = indoc! {r#"
    return function()
      coroutine.yield()
      coroutine.yield()
    end
"#};

#[test]
fn function_entry_point_runs_until_finished() {
    let engine = Engine::new().unwrap();
    let file = script_file(TWO_YIELDS);
    let script = engine.create_from_file(file.path()).unwrap();

    assert!(script.is_alive());
    assert_eq!(script.state(), ScriptState::Fresh);

    assert_eq!(script.resume(), ResumeOutcome::Yielded);
    assert_eq!(script.state(), ScriptState::Suspended);
    assert_eq!(script.resume(), ResumeOutcome::Yielded);
    assert_eq!(script.resume(), ResumeOutcome::Finished);

    assert!(!script.is_alive());
    assert_eq!(script.state(), ScriptState::Dead);
    assert_eq!(script.resume(), ResumeOutcome::NotAlive);
    assert_eq!(script.resume_count(), 3);
}

#[test]
fn coroutine_entry_point_is_used_as_is() {
    let engine = Engine::new().unwrap();
    let file = script_file(indoc! {r#"
        local co = coroutine.create(function(...)
          coroutine.yield()
        end)
        return co
    "#});
    let script = engine.create_from_file(file.path()).unwrap();

    assert_eq!(script.resume(), ResumeOutcome::Yielded);
    assert_eq!(script.resume(), ResumeOutcome::Finished);
    assert_eq!(script.state(), ScriptState::Dead);
}

#[test]
fn coroutine_resumed_by_the_top_level_is_suspended() {
    let engine = Engine::new().unwrap();
    let file = script_file(indoc! {r#"
        local co = coroutine.create(function()
          coroutine.yield()
          coroutine.yield()
        end)
        coroutine.resume(co)
        return co
    "#});
    let script = engine.create_from_file(file.path()).unwrap();

    assert_eq!(script.resume_count(), 0);
    assert_eq!(script.state(), ScriptState::Suspended);
    assert_eq!(script.resume(), ResumeOutcome::Yielded);
    assert_eq!(script.resume(), ResumeOutcome::Finished);
    assert_eq!(script.state(), ScriptState::Dead);
}

#[test]
fn finished_coroutine_loads_dead() {
    let engine = Engine::new().unwrap();
    let file = script_file(indoc! {r#"
        local co = coroutine.create(function() end)
        coroutine.resume(co)
        return co
    "#});
    let script = engine.create_from_file(file.path()).unwrap();

    assert!(!script.is_alive());
    assert_eq!(script.resume(), ResumeOutcome::NotAlive);
    assert_eq!(script.resume_count(), 0);
}

#[test_case("" => matches LoadError::ReturnArity { count: 0, .. }; "no value")]
#[test_case("return function() end, 2" => matches LoadError::ReturnArity { count: 2, .. }; "two values")]
#[test_case("return 42" => matches LoadError::EntryPoint { type_name: "integer", .. }; "integer")]
#[test_case("return { }" => matches LoadError::EntryPoint { type_name: "table", .. }; "table")]
#[test_case("return (" => matches LoadError::Compile { .. }; "syntax error")]
#[test_case("error('top level')" => matches LoadError::Execute { .. }; "top level error")]
fn rejected_entry_points(source: &str) -> LoadError {
    let engine = Engine::new().unwrap();
    let file = script_file(source);
    engine.create_from_file(file.path()).unwrap_err()
}

#[test]
fn missing_file_is_a_read_error() {
    let engine = Engine::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.lua");

    let err = engine.create_from_file(&missing).unwrap_err();
    assert!(matches!(err, LoadError::Read { ref path, .. } if *path == missing));
    assert!(err.to_string().contains("missing.lua"));
}

#[test]
fn fault_is_reported_with_location() {
    let engine = Engine::new().unwrap();
    let file = script_file(indoc! {r#"
        return function()
          coroutine.yield()
          error("boom")
        end
    "#});
    let script = engine.create_from_file(file.path()).unwrap();

    assert_eq!(script.resume(), ResumeOutcome::Yielded);
    let ResumeOutcome::Faulted(fault) = script.resume() else {
        panic!("expected a fault");
    };

    assert_eq!(fault.message, "boom");
    let location = fault.location.expect("fault location");
    assert_eq!(location.line, 3);
    assert!(location.chunk.ends_with(".lua"));

    assert!(!script.is_alive());
    assert_eq!(script.state(), ScriptState::Dead);
}

#[test]
fn require_module_replaces_previous_installation() {
    let engine = Engine::new().unwrap();
    let first = NativeLibrary::new("host").function("version", |_, ()| Ok(1));
    let second = NativeLibrary::new("host").function("version", |_, ()| Ok(2));

    engine.require_module(&first).unwrap();
    engine.require_module(&second).unwrap();

    let (global, required): (i64, i64) = engine
        .lua()
        .load("return host.version(), require('host').version()")
        .eval()
        .unwrap();
    assert_eq!((global, required), (2, 2));
}

struct Counter {
    calls: Cell<u32>,
}

#[test]
fn globals_expose_opaque_host_handles() {
    let engine = Engine::new().unwrap();
    let counter = Rc::new(Counter {
        calls: Cell::new(0),
    });
    engine.set_global("ctx", Rc::clone(&counter)).unwrap();

    let library = NativeLibrary::new("host").function("tick", |lua, ()| {
        let counter = host_handle::<Counter>(lua, "ctx")?;
        counter.calls.set(counter.calls.get() + 1);
        Ok(counter.calls.get())
    });
    engine.require_module(&library).unwrap();

    let file = script_file(indoc! {r#"
        return function()
          while true do
            host.tick()
            coroutine.yield()
          end
        end
    "#});
    let script = engine.create_from_file(file.path()).unwrap();
    script.resume();
    script.resume();
    assert_eq!(counter.calls.get(), 2);

    engine.clear_global("ctx").unwrap();
    let cleared: bool = engine.lua().load("return ctx == nil").eval().unwrap();
    assert!(cleared);
    assert!(host_handle::<Counter>(engine.lua(), "ctx").is_err());

    // The native callback now fails, which faults the script.
    assert!(matches!(script.resume(), ResumeOutcome::Faulted(_)));
}

#[test]
fn native_library_reports_its_functions() {
    let library = NativeLibrary::new("host")
        .function("time", |_, ()| Ok(0.0))
        .function("log", |_, _message: String| Ok(()));

    let names: Vec<_> = library.function_names().collect();
    assert_eq!(names, ["time", "log"]);
    assert!(format!("{library:?}").contains("\"host\""));
}
