//! Configuration types owned by the [`crate::supervisor::Supervisor`] and
//! read (not owned) by endpoints and helpers: port settings, delimiters,
//! substitution tables, and checksum methods.

use crate::Error;
use derive_more::Display;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::checksum::ChecksumMethod;

/// Identifies one of the two serial endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum Direction {
    A,
    B,
}

impl Direction {
    /// The other endpoint: bytes read from `self` are destined for it.
    pub fn opposite(self) -> Direction {
        match self {
            Direction::A => Direction::B,
            Direction::B => Direction::A,
        }
    }
}

impl FromStr for Direction {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "A" | "a" => Ok(Direction::A),
            "B" | "b" => Ok(Direction::B),
            other => Err(Error::Config(format!(
                "invalid direction {other:?}, expected 'A' or 'B'"
            ))),
        }
    }
}

/// Device path and baud rate for one endpoint. Both are required before the
/// engine may start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortConfig {
    pub device: String,
    pub baud: u32,
}

impl PortConfig {
    pub fn new(device: impl Into<String>, baud: u32) -> Self {
        Self {
            device: device.into(),
            baud,
        }
    }
}

/// A nonempty ordered sequence of byte values marking a message boundary.
pub type Delimiter = Vec<u8>;

/// Ordered mapping of byte-pattern to byte-replacement for one source
/// direction. Insertion order defines match priority; at most one
/// substitution is ever applied per message (see
/// [`crate::rewrite::PatternRewriter`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
}

impl SubstitutionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a pattern/replacement pair. Both must be nonempty.
    pub fn push(&mut self, pattern: Vec<u8>, replacement: Vec<u8>) -> Result<(), Error> {
        if pattern.is_empty() || replacement.is_empty() {
            return Err(Error::Config(
                "substitution pattern and replacement must be nonempty".to_string(),
            ));
        }
        self.entries.push((pattern, replacement));
        Ok(())
    }

    pub fn entries(&self) -> &[(Vec<u8>, Vec<u8>)] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for SubstitutionTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (pat, rep) in &self.entries {
            writeln!(f, "{} -> {}", format_hex(pat), format_hex(rep))?;
        }
        Ok(())
    }
}

/// Formats a byte slice as space-separated `0xHH` tokens.
pub fn format_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("0x{:02x}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parses a whitespace-separated list of hex tokens (`0xHH`, `HH`, or decimal)
/// into bytes. Used by both the CLI and the replay engine's capture parser.
pub fn parse_hex_tokens(s: &str) -> Result<Vec<u8>, Error> {
    s.split_whitespace()
        .map(|tok| {
            let digits = tok
                .strip_prefix("0x")
                .or_else(|| tok.strip_prefix("0X"))
                .unwrap_or(tok);
            u8::from_str_radix(digits, 16)
                .map_err(|e| Error::Config(format!("invalid hex byte {tok:?}: {e}")))
        })
        .collect()
}

/// The full configuration tree for the proxy: port settings, the global
/// delimiter sets, and the per-direction substitution/checksum settings.
/// Built up incrementally by CLI commands and consumed wholesale by
/// [`crate::supervisor::Supervisor::start`].
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub port_a: Option<PortConfig>,
    pub port_b: Option<PortConfig>,
    pub start_delimiters: Vec<Delimiter>,
    pub end_delimiters: Vec<Delimiter>,
    pub substitutions: HashMap<Direction, SubstitutionTable>,
    pub checksums: HashMap<Direction, ChecksumMethod>,
    pub capture_path: Option<std::path::PathBuf>,
}

impl AppConfig {
    pub fn port(&self, dir: Direction) -> Option<&PortConfig> {
        match dir {
            Direction::A => self.port_a.as_ref(),
            Direction::B => self.port_b.as_ref(),
        }
    }

    pub fn set_port(&mut self, dir: Direction, port: PortConfig) {
        match dir {
            Direction::A => self.port_a = Some(port),
            Direction::B => self.port_b = Some(port),
        }
    }

    /// Framing is active whenever at least one start- or end-delimiter is
    /// configured.
    pub fn framing_enabled(&self) -> bool {
        !self.start_delimiters.is_empty() || !self.end_delimiters.is_empty()
    }

    /// The delimiter window capacity: the maximum length over all
    /// configured delimiters, or zero if framing is disabled.
    pub fn window_capacity(&self) -> usize {
        self.start_delimiters
            .iter()
            .chain(self.end_delimiters.iter())
            .map(|d| d.len())
            .max()
            .unwrap_or(0)
    }

    pub fn substitution_table(&self, dir: Direction) -> Option<&SubstitutionTable> {
        self.substitutions.get(&dir)
    }

    pub fn checksum_method(&self, dir: Direction) -> Option<ChecksumMethod> {
        self.checksums.get(&dir).copied()
    }
}
