//! The interactive command loop

use std::io::{self, BufRead, Write};

use log::trace;
use phf::phf_map;

use super::state::{DebuggerState, Session};
use super::transport::read_command;

/// Why the loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// A control command was read.
    Command,
    /// The input stream ended first.
    EndOfInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Continue,
    Step,
    Next,
    Return,
    List,
    Where,
    Expression,
}

static COMMANDS: phf::Map<&'static str, Command> = phf_map! {
    "continue" => Command::Continue,
    "c" => Command::Continue,
    "step" => Command::Step,
    "s" => Command::Step,
    "next" => Command::Next,
    "n" => Command::Next,
    "return" => Command::Return,
    "r" => Command::Return,
    "list" => Command::List,
    "l" => Command::List,
    "where" => Command::Where,
    "bt" => Command::Where,
    "expression" => Command::Expression,
    "p" => Command::Expression,
};

impl Command {
    /// Runs the command, returning whether the loop should exit.
    fn execute(self, session: &mut Session, args: &str, out: &mut dyn Write) -> io::Result<bool> {
        match self {
            Self::Continue => {
                writeln!(out, "continue")?;
                session.continue_execution();
                Ok(true)
            }
            Self::Step => {
                session.step();
                Ok(true)
            }
            Self::Next => {
                session.next();
                Ok(true)
            }
            Self::Return => {
                writeln!(out, "step to return")?;
                session.step_to_return();
                Ok(true)
            }
            Self::List => session.print_source(out).map(|()| false),
            Self::Where => session.print_backtrace(out).map(|()| false),
            Self::Expression => session.evaluate_expression(args, out).map(|()| false),
        }
    }
}

/// Reads and runs commands while the session stays in [`DebuggerState::Debugging`].
pub(crate) fn run(
    session: &mut Session,
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> io::Result<LoopExit> {
    while session.state() == DebuggerState::Debugging {
        write!(out, "> ")?;
        out.flush()?;

        let Some(line) = read_command(input)? else {
            writeln!(out)?;
            return Ok(LoopExit::EndOfInput);
        };
        trace!("debugger command `{}` `{}`", line.token, line.args);

        match COMMANDS.get(line.token.as_str()) {
            Some(command) => {
                if command.execute(session, &line.args, out)? {
                    break;
                }
            }
            None => writeln!(out, "unknown command: {}", line.token)?,
        }
    }
    out.flush()?;
    Ok(LoopExit::Command)
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("c", Command::Continue; "continue alias")]
    #[test_case("step", Command::Step; "step")]
    #[test_case("n", Command::Next; "next alias")]
    #[test_case("r", Command::Return; "return alias")]
    #[test_case("l", Command::List; "list alias")]
    #[test_case("bt", Command::Where; "backtrace alias")]
    #[test_case("p", Command::Expression; "expression alias")]
    fn resolves_aliases(token: &str, expected: Command) {
        assert_eq!(COMMANDS.get(token), Some(&expected));
    }

    #[test]
    fn tokens_are_exact() {
        assert_eq!(COMMANDS.get("C"), None);
        assert_eq!(COMMANDS.get("cont"), None);
    }
}
