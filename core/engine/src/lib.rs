//! Lunar embeds Lua 5.4 coroutines in a host application.
//!
//! # Overview
//!
//! The crate is organised around four components, leaves first:
//!
//! - [`tree`]: converts between the generic structured-data [`Tree`] and guest tables
//! - [`Script`]: one resumable guest coroutine, driven once per host tick
//! - [`Engine`]: owns the VM, loads scripts, installs native libraries and globals
//! - [`debugger`]: a hook-driven, line-oriented source debugger attached to one [`Script`]
//!
//! # Example
//!
//! ```rust,no_run
//! use lunar_engine::Engine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = Engine::new()?;
//! let script = engine.create_from_file("behaviour.lua")?;
//!
//! while script.is_alive() {
//!     script.resume();
//!     engine.collect_garbage();
//! }
//! # Ok(())
//! # }
//! ```

pub mod debugger;
pub mod error;
pub mod module;
pub mod tree;

mod engine;
mod script;

#[cfg(test)]
mod tests;

pub use engine::{Engine, host_handle};
pub use error::{EngineError, EngineResult, LoadError, Location, MarshalWarning, RuntimeError};
pub use module::{NativeLibrary, NativeModule};
pub use script::{ResumeOutcome, Script, ScriptState};
pub use tree::{Tree, guest_to_tree, tree_to_guest};

/// Re-export of the VM binding, so native libraries can name its types.
pub use mlua;
