//! Error kinds surfaced by the engine.
//!
//! Load failures are returned to the caller, guest faults are reported as
//! [`RuntimeError`] diagnostics and marshaling problems are [`MarshalWarning`]s
//! that never abort a conversion.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// A failure of an engine-level operation other than loading a script.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The VM rejected an operation.
    #[error(transparent)]
    Lua(#[from] mlua::Error),

    /// A native library failed to build its export table.
    #[error("failed to open native module `{name}`")]
    Module {
        /// Name the module registers under.
        name: String,
        /// Underlying VM error.
        #[source]
        source: mlua::Error,
    },
}

/// Why [`Engine::create_from_file`](crate::Engine::create_from_file) produced no script.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The file could not be read.
    #[error("failed to read script `{}`", .path.display())]
    Read {
        /// Path that was requested.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid chunk.
    #[error("failed to compile script `{}`", .path.display())]
    Compile {
        /// Path of the script.
        path: PathBuf,
        /// Syntax error reported by the VM.
        #[source]
        source: mlua::Error,
    },

    /// The top level raised an error while running.
    #[error("top level of script `{}` failed", .path.display())]
    Execute {
        /// Path of the script.
        path: PathBuf,
        /// Error raised by the top level.
        #[source]
        source: mlua::Error,
    },

    /// The top level returned zero or several values.
    #[error("script `{}` must return exactly one value, got {count}", .path.display())]
    ReturnArity {
        /// Path of the script.
        path: PathBuf,
        /// Number of values returned.
        count: usize,
    },

    /// The top level returned something that cannot be resumed.
    #[error(
        "script `{}` returned a value of type `{type_name}`, expected a function or a coroutine",
        .path.display()
    )]
    EntryPoint {
        /// Path of the script.
        path: PathBuf,
        /// Guest type name of the returned value.
        type_name: &'static str,
    },

    /// The VM could not create a thread for the returned function.
    #[error("failed to create a coroutine for script `{}`", .path.display())]
    Thread {
        /// Path of the script.
        path: PathBuf,
        /// Underlying VM error.
        #[source]
        source: mlua::Error,
    },
}

/// Source position attached to a guest fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Short chunk name as reported by the VM.
    pub chunk: String,
    /// One-based line number.
    pub line: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chunk, self.line)
    }
}

/// A guest fault raised while resuming a script.
///
/// Reported to diagnostics, never propagated as a host failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}{message}", .location.as_ref().map(|l| format!("{l}: ")).unwrap_or_default())]
pub struct RuntimeError {
    /// Where the fault was raised, when the VM reported it.
    pub location: Option<Location>,
    /// Message without the location prefix.
    pub message: String,
}

impl RuntimeError {
    /// Builds a diagnostic from a VM error, splitting off a `chunk:line: ` prefix.
    pub fn from_lua(error: &mlua::Error) -> Self {
        let text = describe_lua_error(error);
        let parsed = text.split_once(": ").and_then(|(head, message)| {
            let (chunk, line) = head.rsplit_once(':')?;
            let line = line.parse().ok()?;
            Some(Self {
                location: Some(Location {
                    chunk: chunk.to_owned(),
                    line,
                }),
                message: message.to_owned(),
            })
        });
        parsed.unwrap_or(Self {
            location: None,
            message: text,
        })
    }
}

/// A value skipped while converting a guest table into a [`Tree`](crate::Tree).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MarshalWarning {
    /// A key that is neither a string nor a sequence index.
    #[error("unsupported key type `{type_name}` skipped")]
    UnsupportedKey {
        /// Guest type name of the key.
        type_name: &'static str,
    },

    /// A value of a type the tree cannot hold.
    #[error("unsupported value type `{type_name}` at `{key}` skipped")]
    UnsupportedValue {
        /// Key (or `[index]`) holding the value.
        key: String,
        /// Guest type name of the value.
        type_name: &'static str,
    },

    /// A numeric key outside the contiguous `1..=len` range.
    #[error("numeric key {index} outside of the sequence 1..={len} skipped")]
    OutOfSequence {
        /// The offending key.
        index: i64,
        /// Length of the sequence part.
        len: usize,
    },

    /// Nesting went deeper than the converter follows.
    #[error("table nested deeper than {limit} levels at `{key}` skipped")]
    DepthExceeded {
        /// Key holding the nested table.
        key: String,
        /// Maximum depth followed.
        limit: usize,
    },
}

/// First line of a VM error, without tracebacks or callback wrappers.
pub(crate) fn describe_lua_error(error: &mlua::Error) -> String {
    let text = match error {
        mlua::Error::RuntimeError(message) | mlua::Error::MemoryError(message) => message.clone(),
        mlua::Error::SyntaxError { message, .. } => message.clone(),
        mlua::Error::CallbackError { cause, .. } => return describe_lua_error(cause),
        other => other.to_string(),
    };
    text.lines().next().unwrap_or_default().to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_error_splits_location() {
        let error = mlua::Error::RuntimeError(
            "scripts/fault.lua:3: boom\nstack traceback:\n\t[C]: in ?".to_owned(),
        );
        let fault = RuntimeError::from_lua(&error);
        assert_eq!(
            fault.location,
            Some(Location {
                chunk: "scripts/fault.lua".to_owned(),
                line: 3
            })
        );
        assert_eq!(fault.message, "boom");
        assert_eq!(fault.to_string(), "scripts/fault.lua:3: boom");
    }

    #[test]
    fn runtime_error_without_location() {
        let error = mlua::Error::RuntimeError("plain failure".to_owned());
        let fault = RuntimeError::from_lua(&error);
        assert_eq!(fault.location, None);
        assert_eq!(fault.to_string(), "plain failure");
    }
}
