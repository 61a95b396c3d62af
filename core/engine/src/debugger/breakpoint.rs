//! Breakpoint management

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// File name of the any-line sentinel.
const ANY_FILE: &str = "ANY";

/// Display-list index of a breakpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BreakpointId(pub usize);

impl fmt::Display for BreakpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.0)
    }
}

/// Where a breakpoint triggers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BreakpointSite {
    /// Calls of a function with this resolved name.
    Function {
        /// Exact function name.
        name: String,
    },
    /// Execution reaching a line.
    Line {
        /// Short source name or path of the chunk.
        file: String,
        /// One-based line number.
        line: i32,
    },
}

impl BreakpointSite {
    /// A function breakpoint.
    pub fn function(name: impl Into<String>) -> Self {
        Self::Function { name: name.into() }
    }

    /// A line breakpoint.
    pub fn line(file: impl Into<String>, line: i32) -> Self {
        Self::Line {
            file: file.into(),
            line,
        }
    }

    /// The sentinel matching any line. Only ever used as a step target.
    pub fn any_line() -> Self {
        Self::line(ANY_FILE, -1)
    }

    /// Whether this is the any-line sentinel.
    pub fn is_any_line(&self) -> bool {
        matches!(self, Self::Line { file, line: -1 } if file == ANY_FILE)
    }

    /// Whether this is a function breakpoint.
    pub fn is_function(&self) -> bool {
        matches!(self, Self::Function { .. })
    }
}

impl fmt::Display for BreakpointSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Function { name } => write!(f, "function {name}"),
            Self::Line { .. } if self.is_any_line() => f.write_str("any line"),
            Self::Line { file, line } => write!(f, "line {file}:{line}"),
        }
    }
}

/// A breakpoint together with its hit counter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    /// Where it triggers.
    pub site: BreakpointSite,
    /// How many times it matched.
    pub hits: u32,
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (hits: {})", self.site, self.hits)
    }
}

/// The persistent breakpoints of one debugger, in display order.
///
/// Sites are unique; adding an existing site keeps its position and counter.
#[derive(Debug, Clone, Default)]
pub(crate) struct BreakpointList {
    entries: IndexMap<BreakpointSite, u32>,
}

impl BreakpointList {
    /// Adds `site`, returning `false` when it was already present.
    pub(crate) fn insert(&mut self, site: BreakpointSite) -> bool {
        if self.entries.contains_key(&site) {
            return false;
        }
        self.entries.insert(site, 0);
        true
    }

    pub(crate) fn remove(&mut self, site: &BreakpointSite) -> bool {
        self.entries.shift_remove(site).is_some()
    }

    pub(crate) fn remove_index(&mut self, id: BreakpointId) -> Option<BreakpointSite> {
        self.entries.shift_remove_index(id.0).map(|(site, _)| site)
    }

    /// Counts a match on `site`, returning the new count when it is armed.
    pub(crate) fn hit(&mut self, site: &BreakpointSite) -> Option<u32> {
        let hits = self.entries.get_mut(site)?;
        *hits += 1;
        Some(*hits)
    }

    pub(crate) fn hits(&self, site: &BreakpointSite) -> Option<u32> {
        self.entries.get(site).copied()
    }

    pub(crate) fn has_functions(&self) -> bool {
        self.entries.keys().any(BreakpointSite::is_function)
    }

    pub(crate) fn has_lines(&self) -> bool {
        self.entries.keys().any(|site| !site.is_function())
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (BreakpointId, Breakpoint)> + '_ {
        self.entries.iter().enumerate().map(|(index, (site, hits))| {
            (
                BreakpointId(index),
                Breakpoint {
                    site: site.clone(),
                    hits: *hits,
                },
            )
        })
    }
}
