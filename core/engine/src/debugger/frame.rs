//! Paused call frames: backtraces and source listings

use std::fmt;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::Path;

use mlua::{Debug, Lua};

use super::BreakpointSite;

/// Placeholder printed for frames without a resolvable name.
const ANONYMOUS: &str = "(anon)";

/// A resolved view of one call frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameInfo {
    /// Name the caller used for the function, if the VM could resolve one.
    pub name: Option<String>,
    /// Raw chunk name, `@path` for chunks loaded from files.
    pub source: Option<String>,
    /// Short, printable chunk name.
    pub short_src: String,
    /// Current line, or -1 when unknown.
    pub line: i32,
}

impl FrameInfo {
    pub(crate) fn from_debug(debug: &Debug<'_>) -> Self {
        let names = debug.names();
        let source = debug.source();
        Self {
            name: names.name.as_deref().map(str::to_owned),
            source: source.source.as_deref().map(str::to_owned),
            short_src: source.short_src.as_deref().unwrap_or("?").to_owned(),
            line: debug.curr_line(),
        }
    }

    /// The frame `level` steps below the running function, if any.
    pub(crate) fn at_level(lua: &Lua, level: usize) -> Option<Self> {
        lua.inspect_stack(level).map(|debug| Self::from_debug(&debug))
    }

    /// Path of the file the chunk was loaded from.
    pub fn file_path(&self) -> Option<&Path> {
        self.source.as_deref()?.strip_prefix('@').map(Path::new)
    }

    /// Whether `file` names this frame's chunk, by short name or by full path.
    pub fn is_in_file(&self, file: &str) -> bool {
        self.short_src == file || self.file_path().is_some_and(|path| path == Path::new(file))
    }

    /// Whether this frame sits on `site`. Function sites compare the name.
    pub fn is_at(&self, site: &BreakpointSite) -> bool {
        match site {
            BreakpointSite::Function { name } => self.name.as_deref() == Some(name.as_str()),
            BreakpointSite::Line { file, line } => *line == self.line && self.is_in_file(file),
        }
    }

    /// Line breakpoint sites that would match this frame.
    pub(crate) fn line_sites(&self) -> Vec<BreakpointSite> {
        let mut sites = vec![BreakpointSite::line(self.short_src.clone(), self.line)];
        if let Some(path) = self.file_path().and_then(Path::to_str)
            && path != self.short_src
        {
            sites.push(BreakpointSite::line(path, self.line));
        }
        sites
    }
}

impl fmt::Display for FrameInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.name.as_deref().unwrap_or(ANONYMOUS),
            self.short_src,
            self.line
        )
    }
}

/// Prints every frame from the running one outward as `(level) frame`.
pub(crate) fn print_backtrace(lua: &Lua, out: &mut dyn Write) -> io::Result<()> {
    let mut level = 0;
    while let Some(frame) = FrameInfo::at_level(lua, level) {
        writeln!(out, "({level}) {frame}")?;
        level += 1;
    }
    Ok(())
}

/// Prints the window of `context` lines around the frame's current line.
///
/// The file is read again on every call.
pub(crate) fn print_source(frame: &FrameInfo, context: usize, out: &mut dyn Write) -> io::Result<()> {
    let file = frame.file_path().and_then(|path| File::open(path).ok());
    let Some(file) = file else {
        let source = frame.source.as_deref().unwrap_or(&frame.short_src);
        return writeln!(out, "< No Source ({source}) >");
    };

    let current = usize::try_from(frame.line).unwrap_or_default();
    let first = current.saturating_sub(context).max(1);
    let last = current.saturating_add(context);

    for (index, text) in BufReader::new(file).lines().enumerate() {
        let number = index + 1;
        if number < first {
            continue;
        }
        if number > last {
            break;
        }
        let marker = if number == current { "-> " } else { "   " };
        writeln!(out, "{marker}{number:>4}  {}", text?)?;
    }
    Ok(())
}
