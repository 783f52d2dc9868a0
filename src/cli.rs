//! Thin `clap`-derive command surface. Each arm below calls straight into
//! [`Supervisor`]/[`RelayEngine`]/[`ReplayEngine`](crate::replay::ReplayEngine)
//! and leaves error formatting to the caller, which prints `Err`'s
//! `Display` impl as a one-line diagnostic and keeps the session alive.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};

use crate::checksum::ChecksumMethod;
use crate::config::{parse_hex_tokens, Direction, PortConfig};
use crate::supervisor::Supervisor;
use crate::Error;

#[derive(Debug, Parser)]
#[command(name = "uart-proxy", no_binary_name = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Enumerate serial ports available to use.
    List {
        #[arg(short = 'v', long)]
        verbose: bool,
    },
    /// Dump current port settings.
    Portget,
    /// Set the device and baud rate for one endpoint.
    Portset { direction: Direction, device: String, baud: u32 },
    /// Dump configured start/end delimiters.
    Delimget,
    /// Set start or end delimiters: comma-separated groups of hex bytes,
    /// one group per delimiter (e.g. `0xaa,0xde 0xad`).
    Delimset { kind: String, hex: String },
    /// Dump the substitution table for one direction.
    Replaceget { direction: Direction },
    /// Add pattern -> replacement rules for one direction:
    /// `<hex...> -> <hex...>[, <hex...> -> <hex...>]`.
    #[command(trailing_var_arg = true)]
    Replaceset {
        direction: Direction,
        #[arg(num_args = 1..)]
        rule: Vec<String>,
    },
    /// Dump the checksum method for one direction.
    Checksumget { direction: Direction },
    /// Set the checksum method for one direction.
    Checksumset { direction: Direction, method: String },
    /// Start capturing the transcript to a file.
    Capturestart { file: PathBuf },
    /// Stop the active capture.
    Capturestop,
    /// Print a line-numbered dump of a capture file.
    Capturedump { file: PathBuf },
    /// Open both ports and start relaying.
    Start,
    /// Stop relaying and close both ports.
    Stop,
    /// Toggle the live transcript display.
    Watch,
    /// Replay a capture file, optionally restricted to a line selector
    /// (`1,4` or `2-10`).
    Replay { file: PathBuf, lines: Option<String> },
    /// Print the proxy version.
    Version,
    /// Leave the session.
    Exit,
    /// Alias for `exit`.
    Quit,
}

/// What the REPL loop should do after executing one command.
pub enum Outcome {
    Continue(Option<String>),
    Exit,
}

fn parse_delimiter_groups(hex: &str) -> Result<Vec<Vec<u8>>, Error> {
    hex.split(',')
        .map(|group| {
            let bytes = parse_hex_tokens(group.trim())?;
            if bytes.is_empty() {
                return Err(Error::Config(format!("delimiter group {group:?} must be nonempty")));
            }
            Ok(bytes)
        })
        .collect()
}

/// Parses one or more `<hex...> -> <hex...>` rules separated by `,`.
fn parse_substitution_rules(tokens: &[String]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, Error> {
    let joined = tokens.join(" ");
    joined
        .split(',')
        .map(|rule| {
            let (pattern, replacement) = rule
                .split_once("->")
                .ok_or_else(|| Error::Config(format!("expected '<hex> -> <hex>', got {rule:?}")))?;
            Ok((parse_hex_tokens(pattern.trim())?, parse_hex_tokens(replacement.trim())?))
        })
        .collect()
}

pub fn execute(command: Command, supervisor: &mut Supervisor) -> Result<Outcome, Error> {
    match command {
        Command::List { verbose } => {
            let ports = serial2::SerialPort::available_ports().map_err(Error::Io)?;
            let text = ports
                .iter()
                .map(|p| {
                    if verbose {
                        format!("{}", p.display())
                    } else {
                        p.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default()
                    }
                })
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Outcome::Continue(Some(text)))
        }
        Command::Portget => {
            let text = [Direction::A, Direction::B]
                .into_iter()
                .map(|d| match supervisor.config().port(d) {
                    Some(p) => format!("{d}: {} @ {}", p.device, p.baud),
                    None => format!("{d}: (unset)"),
                })
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Outcome::Continue(Some(text)))
        }
        Command::Portset { direction, device, baud } => {
            supervisor.set_port(direction, PortConfig::new(device, baud))?;
            Ok(Outcome::Continue(None))
        }
        Command::Delimget => {
            let cfg = supervisor.config();
            let text = format!(
                "start: {:?}\nend: {:?}",
                cfg.start_delimiters, cfg.end_delimiters
            );
            Ok(Outcome::Continue(Some(text)))
        }
        Command::Delimset { kind, hex } => {
            let groups = parse_delimiter_groups(&hex)?;
            let cfg = supervisor.config().clone();
            match kind.to_ascii_lowercase().as_str() {
                "start" => supervisor.set_delimiters(groups, cfg.end_delimiters)?,
                "end" => supervisor.set_delimiters(cfg.start_delimiters, groups)?,
                other => return Err(Error::Config(format!("unknown delimiter kind {other:?}, expected 'start' or 'end'"))),
            }
            Ok(Outcome::Continue(None))
        }
        Command::Replaceget { direction } => {
            let table = supervisor
                .config()
                .substitution_table(direction)
                .cloned()
                .unwrap_or_default();
            Ok(Outcome::Continue(Some(table.to_string())))
        }
        Command::Replaceset { direction, rule } => {
            let rules = parse_substitution_rules(&rule)?;
            let mut table = supervisor.config().substitution_table(direction).cloned().unwrap_or_default();
            for (pattern, replacement) in rules {
                table.push(pattern, replacement)?;
            }
            supervisor.set_substitution_table(direction, table);
            Ok(Outcome::Continue(None))
        }
        Command::Checksumget { direction } => {
            let text = match supervisor.config().checksum_method(direction) {
                Some(method) => method.to_string(),
                None => "(unset)".to_string(),
            };
            Ok(Outcome::Continue(Some(text)))
        }
        Command::Checksumset { direction, method } => {
            supervisor.set_checksum_method(direction, ChecksumMethod::from_str(&method)?);
            Ok(Outcome::Continue(None))
        }
        Command::Capturestart { file } => {
            supervisor.open_capture(&file)?;
            Ok(Outcome::Continue(None))
        }
        Command::Capturestop => {
            supervisor.close_capture();
            Ok(Outcome::Continue(None))
        }
        Command::Capturedump { file } => {
            let contents = std::fs::read_to_string(&file).map_err(Error::Io)?;
            let text = contents
                .lines()
                .enumerate()
                .map(|(i, line)| format!("{:5}: {line}", i + 1))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Outcome::Continue(Some(text)))
        }
        Command::Start => {
            supervisor.start()?;
            Ok(Outcome::Continue(None))
        }
        Command::Stop => {
            supervisor.stop()?;
            Ok(Outcome::Continue(None))
        }
        Command::Watch => {
            supervisor.set_display_enabled(true);
            Ok(Outcome::Continue(None))
        }
        Command::Replay { file, lines } => {
            supervisor.replay(&file, lines.as_deref())?;
            Ok(Outcome::Continue(None))
        }
        Command::Version => Ok(Outcome::Continue(Some(env!("CARGO_PKG_VERSION").to_string()))),
        Command::Exit | Command::Quit => Ok(Outcome::Exit),
    }
}
