//! Transport layer for the interactive loop
//!
//! The debugger reads commands from and writes output to any pair of streams,
//! not only the process's standard streams.

use std::fmt;
use std::io::{self, BufRead, BufReader, Write};

/// The input and output streams of a debugger session.
pub struct Transport {
    pub(crate) input: Box<dyn BufRead>,
    pub(crate) output: Box<dyn Write>,
}

impl Transport {
    /// Wraps an arbitrary pair of streams.
    pub fn new(input: impl BufRead + 'static, output: impl Write + 'static) -> Self {
        Self {
            input: Box::new(input),
            output: Box::new(output),
        }
    }

    /// Standard input and standard output.
    pub fn stdio() -> Self {
        Self::new(BufReader::new(io::stdin()), io::stdout())
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::stdio()
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}

/// One command line: the first whitespace-delimited token and the rest of the line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CommandLine {
    pub(crate) token: String,
    pub(crate) args: String,
}

/// Reads the next non-blank line as a command.
///
/// Returns `None` at the end of the input.
pub(crate) fn read_command(input: &mut dyn BufRead) -> io::Result<Option<CommandLine>> {
    let mut line = String::new();
    loop {
        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let (token, args) = trimmed
            .split_once(char::is_whitespace)
            .unwrap_or((trimmed, ""));
        return Ok(Some(CommandLine {
            token: token.to_owned(),
            args: args.trim_start().to_owned(),
        }));
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn splits_token_and_raw_arguments() {
        let mut input = Cursor::new("\n   \np  value +  1 \nc\n");

        let first = read_command(&mut input).unwrap().unwrap();
        assert_eq!(first.token, "p");
        assert_eq!(first.args, "value +  1");

        let second = read_command(&mut input).unwrap().unwrap();
        assert_eq!(second.token, "c");
        assert_eq!(second.args, "");

        assert_eq!(read_command(&mut input).unwrap(), None);
    }
}
