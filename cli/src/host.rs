//! The `host` native library scripts call into.

use std::time::Instant;

use log::info;
use lunar_engine::NativeLibrary;
use lunar_engine::mlua::Table;

/// Builds the library. `time()` counts seconds from `start`.
pub(crate) fn library(start: Instant) -> NativeLibrary {
    NativeLibrary::new("host")
        .function("time", move |_, ()| Ok(start.elapsed().as_secs_f64()))
        .function("log", |_, message: String| {
            info!(target: "script", "{message}");
            Ok(())
        })
        .function("configure", |_, table: Table| {
            let tree = lunar_engine::guest_to_tree(&table)?;
            let json = tree.canonical().to_json().to_string();
            info!(target: "script", "configure: {json}");
            Ok(json)
        })
}
