//! A command-line driver for Lunar scripts.
//!
//! Loads one script, exposes the `host` library to it and resumes it once per
//! tick until it finishes, optionally under the interactive debugger.
#![allow(clippy::print_stdout, clippy::print_stderr)]

mod debug;
mod host;

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueHint};
use color_eyre::eyre::{Result, WrapErr};
use colored::Colorize;
use log::{LevelFilter, info};
use lunar_engine::{Engine, ResumeOutcome, Tree, tree_to_guest};
use simple_logger::SimpleLogger;

use crate::debug::DebugOptions;

/// Global the `--config` document is exposed under.
const CONFIG_GLOBAL: &str = "config";

#[derive(Debug, Parser)]
#[command(author, version, about, name = "lunar")]
struct Opt {
    /// The script to run. Its top level must return a function or a coroutine.
    #[arg(value_name = "SCRIPT", value_hint = ValueHint::FilePath)]
    script: PathBuf,

    /// Stop after this many ticks, even if the script is still alive.
    #[arg(long, value_name = "N")]
    ticks: Option<u64>,

    /// Milliseconds to sleep between ticks.
    #[arg(long, value_name = "MS", default_value_t = 0)]
    tick_ms: u64,

    /// A JSON document exposed to the script as the global table `config`.
    #[arg(long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Log at debug level, regardless of `RUST_LOG`.
    #[arg(long, short = 'v')]
    verbose: bool,

    #[command(flatten)]
    debug: DebugOptions,
}

fn init_logger(verbose: bool) -> Result<()> {
    let logger = SimpleLogger::new().with_level(LevelFilter::Warn).env();
    let logger = if verbose {
        logger.with_level(LevelFilter::Debug)
    } else {
        logger
    };
    logger.init().wrap_err("failed to install the logger")
}

/// Reads `path` as JSON and sets it as a guest global table.
fn expose_config(engine: &Engine, path: &Path) -> Result<()> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read config `{}`", path.display()))?;
    let json: serde_json::Value = serde_json::from_str(&text)
        .wrap_err_with(|| format!("config `{}` is not valid JSON", path.display()))?;
    let table = tree_to_guest(engine.lua(), &Tree::from_json(&json))?;
    engine.lua().globals().set(CONFIG_GLOBAL, table)?;
    Ok(())
}

fn main() -> Result<ExitCode> {
    color_eyre::config::HookBuilder::default()
        .display_location_section(false)
        .display_env_section(false)
        .install()?;

    let opt = Opt::parse();
    init_logger(opt.verbose)?;

    let engine = Engine::new()?;
    engine.require_module(&host::library(Instant::now()))?;
    if let Some(path) = &opt.config {
        expose_config(&engine, path)?;
    }

    let script = engine
        .create_from_file(&opt.script)
        .wrap_err("could not load the script")?;
    let debugger = debug::attach(&script, &opt.debug)?;

    let pause = Duration::from_millis(opt.tick_ms);
    let mut ticks = 0;
    while script.is_alive() && opt.ticks.is_none_or(|limit| ticks < limit) {
        if let ResumeOutcome::Faulted(fault) = script.resume() {
            eprintln!("{}: {fault}", "Uncaught".red());
            return Ok(ExitCode::FAILURE);
        }
        engine.collect_garbage();
        ticks += 1;
        if !pause.is_zero() && script.is_alive() {
            thread::sleep(pause);
        }
    }

    drop(debugger);
    info!("`{}` stopped after {ticks} ticks", script.name());
    Ok(ExitCode::SUCCESS)
}
