//! Debugger attachment for the CLI
//!
//! The debugger runs its interactive loop on standard input and output. It is
//! attached when `--debug` or any breakpoint option is given.

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, ValueHint};
use color_eyre::eyre::{Result, WrapErr};
use log::debug;
use lunar_engine::Script;
use lunar_engine::debugger::{BreakpointSite, Debugger, DebuggerConfig, Transport};

#[derive(Debug, Default, Args)]
pub(crate) struct DebugOptions {
    /// Attach the interactive debugger on stdin/stdout.
    #[arg(long)]
    debug: bool,

    /// Pause on calls of this function. Repeatable.
    #[arg(long = "break", value_name = "FUNCTION")]
    functions: Vec<String>,

    /// Pause when `FILE:LINE` runs. Repeatable.
    #[arg(long = "break-line", value_name = "FILE:LINE", value_parser = parse_line_site)]
    lines: Vec<BreakpointSite>,

    /// A JSON array of breakpoint sites, e.g. `[{"function": {"name": "update"}}]`.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    breakpoints: Option<PathBuf>,

    /// Pause on the very first line the script runs.
    #[arg(long)]
    step: bool,

    /// Lines listed on each side of the current line.
    #[arg(long, value_name = "N")]
    context: Option<usize>,
}

impl DebugOptions {
    fn requested(&self) -> bool {
        self.debug
            || self.step
            || !self.functions.is_empty()
            || !self.lines.is_empty()
            || self.breakpoints.is_some()
    }
}

fn parse_line_site(value: &str) -> Result<BreakpointSite, String> {
    let (file, line) = value
        .rsplit_once(':')
        .ok_or_else(|| format!("expected FILE:LINE, got `{value}`"))?;
    let line = line
        .parse::<i32>()
        .ok()
        .filter(|line| *line > 0)
        .ok_or_else(|| format!("invalid line number in `{value}`"))?;
    if file.is_empty() {
        return Err(format!("missing file name in `{value}`"));
    }
    Ok(BreakpointSite::line(file, line))
}

fn read_breakpoint_file(path: &Path) -> Result<Vec<BreakpointSite>> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read breakpoints `{}`", path.display()))?;
    serde_json::from_str(&text)
        .wrap_err_with(|| format!("invalid breakpoints file `{}`", path.display()))
}

/// Attaches a debugger to `script` when the options ask for one.
pub(crate) fn attach<'a>(
    script: &'a Script<'a>,
    options: &DebugOptions,
) -> Result<Option<Debugger<'a>>> {
    if !options.requested() {
        return Ok(None);
    }

    let mut config = DebuggerConfig::default();
    if let Some(context) = options.context {
        config.source_context = context;
    }
    let debugger = Debugger::with_config(script, Transport::stdio(), config);

    let mut sites: Vec<BreakpointSite> = options
        .functions
        .iter()
        .map(|name| BreakpointSite::function(name.as_str()))
        .chain(options.lines.iter().cloned())
        .collect();
    if let Some(path) = &options.breakpoints {
        sites.extend(read_breakpoint_file(path)?);
    }
    for site in sites {
        debug!("breakpoint: {site}");
        debugger.set_breakpoint(site);
    }

    if options.step {
        debugger.next();
    }
    Ok(Some(debugger))
}
