//! Demonstrates a scripted debugger session on a ticking script.
//!
//! The commands an operator would type are fed from a fixed string, so the
//! demo runs unattended. The debugger output goes to stdout, the narration and
//! the log to stderr.
#![allow(clippy::print_stderr)]

use std::error::Error;
use std::io::{self, Cursor};

use log::{LevelFilter, info};
use lunar_engine::debugger::{Debugger, Transport};
use lunar_engine::{Engine, NativeLibrary, ResumeOutcome};
use simple_logger::SimpleLogger;

const SCRIPT: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/scripts/countdown.lua");

/// Commands answered at each pause, in order.
const OPERATOR: &str = "\
where
return
p text, remaining
continue
continue
continue
p launch_message
continue
";

fn main() -> Result<(), Box<dyn Error>> {
    SimpleLogger::new().with_level(LevelFilter::Info).init()?;

    let engine = Engine::new()?;
    engine.require_module(&NativeLibrary::new("demo").function("log", |_, text: String| {
        info!(target: "countdown", "{text}");
        Ok(())
    }))?;

    let script = engine.create_from_file(SCRIPT)?;
    let debugger = Debugger::new(
        &script,
        Transport::new(Cursor::new(OPERATOR), io::stdout()),
    );

    debugger.set_function_breakpoint("announce");
    debugger.set_line_breakpoint(SCRIPT, 15);

    eprintln!("\n=== Ticking the countdown under the debugger ===\n");

    let mut tick = 0;
    while script.is_alive() {
        tick += 1;
        eprintln!("[Demo] tick {tick}");
        match script.resume() {
            ResumeOutcome::Faulted(fault) => {
                eprintln!("[Demo] ERROR: {fault}");
                break;
            }
            outcome => eprintln!("[Demo] {outcome:?}"),
        }
        engine.collect_garbage();
    }

    eprintln!("\n[Demo] Final breakpoint list:");
    debugger.print_breakpoints(&mut io::stderr())?;
    eprintln!("\n=== Demo Complete ===\n");
    Ok(())
}
