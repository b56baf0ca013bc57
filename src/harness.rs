//! Interactive sublet testing.
//!
//! Every path is loaded on its own. A loaded sublet gets a menu listing its
//! attributes and capabilities; the operator picks a capability by number
//! and the harness invokes it with arguments chosen from the handler's arity.
//! `0` moves on to the next path.
//!
//! The loop is generic over its input and output so it can be driven without
//! a terminal.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use sur_lua::{CapabilityEntry, ExecutionLimits, Failure, LoadOutcome, LoadedSublet, SubletLoader};
use tracing::{debug, info, warn};

pub const SEPARATOR: &str = "------------------";
pub const PROMPT: &str = ">>> ";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarnessOptions {
    pub limits: ExecutionLimits,
    /// Print the listing once instead of prompting.
    pub list_only: bool,
}

/// What the operator asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Quit,
    /// Zero-based index into the capability list.
    Invoke(usize),
    OutOfRange(i64),
}

impl Selection {
    pub fn from_number(num: i64, count: usize) -> Self {
        match num {
            0 => Selection::Quit,
            n if n > 0 && (n as u64) <= count as u64 => Selection::Invoke(n as usize - 1),
            n => Selection::OutOfRange(n),
        }
    }
}

pub struct Harness {
    loader: SubletLoader,
    list_only: bool,
}

impl Harness {
    pub fn new(options: HarnessOptions) -> Self {
        Self {
            loader: SubletLoader::new(options.limits),
            list_only: options.list_only,
        }
    }

    /// Test every path in order.
    ///
    /// Load and dispatch failures are reported to `output` and never end the
    /// run; only I/O errors on `input` or `output` are returned.
    pub fn run<R: BufRead, W: Write>(
        &self,
        paths: &[PathBuf],
        input: &mut R,
        output: &mut W,
    ) -> anyhow::Result<()> {
        for path in paths {
            match self.loader.load(path) {
                LoadOutcome::Missing => {
                    warn!("Skipping {}: no such file", path.display());
                }
                LoadOutcome::Failed(failure) => {
                    report_load_failure(output, &failure)?;
                }
                LoadOutcome::Loaded(sublet) if self.list_only => {
                    render_listing(output, &sublet, &sublet.capabilities())?;
                }
                LoadOutcome::Loaded(sublet) => {
                    self.interact(&sublet, input, output)?;
                }
            }
        }

        output.flush()?;
        Ok(())
    }

    fn interact<R: BufRead, W: Write>(
        &self,
        sublet: &LoadedSublet,
        input: &mut R,
        output: &mut W,
    ) -> io::Result<()> {
        loop {
            // Invoked capabilities may change attributes and capabilities.
            let capabilities = sublet.capabilities();
            render_listing(output, sublet, &capabilities)?;
            writeln!(output, "{PROMPT}Select one method:")?;
            write!(output, "{PROMPT}")?;
            output.flush()?;

            let num = read_selection(input)?;
            match Selection::from_number(num, capabilities.len()) {
                Selection::Quit => {
                    info!("Done with sublet '{}'", sublet.name());
                    return Ok(());
                }
                Selection::OutOfRange(n) => {
                    debug!("Selection {} out of range 1..={}", n, capabilities.len());
                }
                Selection::Invoke(index) => {
                    let name = &capabilities[index].name;
                    if let Err(failure) = sublet.invoke(name) {
                        warn!("Invoking '{}' failed: {}", name, failure);
                        report_dispatch_failure(output, &failure)?;
                    }
                }
            }
        }
    }
}

/// Write the sublet header, its attributes and the numbered capabilities.
pub fn render_listing<W: Write>(
    output: &mut W,
    sublet: &LoadedSublet,
    capabilities: &[CapabilityEntry],
) -> io::Result<()> {
    writeln!(output, "{SEPARATOR}")?;
    writeln!(output, " {}", sublet.name())?;
    writeln!(output, "{SEPARATOR}")?;

    for (name, value) in sublet.attributes() {
        writeln!(output, " @{name} = {value}")?;
    }

    writeln!(output, "{SEPARATOR}")?;

    for (i, cap) in capabilities.iter().enumerate() {
        let marker = if cap.helper { " (helper)" } else { "" };
        writeln!(output, " ({}) {}{}", i + 1, cap.name, marker)?;
    }

    writeln!(output, " (0) Quit")?;
    writeln!(output, "{SEPARATOR}")
}

/// Read one line and parse it as a number.
///
/// End of input is 0. Otherwise see [`leading_integer`].
pub fn read_selection<R: BufRead>(input: &mut R) -> io::Result<i64> {
    let mut line = Vec::new();
    if input.read_until(b'\n', &mut line)? == 0 {
        debug!("End of input, quitting");
        return Ok(0);
    }

    Ok(leading_integer(&String::from_utf8_lossy(&line)))
}

/// Integer at the start of `text`, after optional whitespace and sign.
///
/// Trailing garbage is ignored (`"2abc"` is 2) and text without leading
/// digits is 0. Values too large for `i64` saturate so they stay out of
/// range instead of turning into 0.
pub fn leading_integer(text: &str) -> i64 {
    let text = text.trim_start();
    let (negative, rest) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };

    let mut value: i64 = 0;
    for digit in rest.bytes().take_while(u8::is_ascii_digit) {
        let digit = i64::from(digit - b'0');
        value = value.saturating_mul(10);
        value = if negative {
            value.saturating_sub(digit)
        } else {
            value.saturating_add(digit)
        };
    }
    value
}

fn report_load_failure<W: Write>(output: &mut W, failure: &Failure) -> io::Result<()> {
    writeln!(output, "{PROMPT}WARNING: Couldn't load sublet: {}", failure.message)?;
    if !failure.is_soft() {
        write_trace(output, failure)?;
    }
    Ok(())
}

fn report_dispatch_failure<W: Write>(output: &mut W, failure: &Failure) -> io::Result<()> {
    writeln!(output, "{PROMPT}ERROR: {}", failure.message)?;
    if !failure.is_soft() {
        writeln!(output, "{}", failure.message)?;
        write_trace(output, failure)?;
    }
    Ok(())
}

fn write_trace<W: Write>(output: &mut W, failure: &Failure) -> io::Result<()> {
    if let Some(trace) = &failure.trace {
        for line in trace.lines() {
            writeln!(output, "{line}")?;
        }
    }
    Ok(())
}
