//! Parses a capture file produced by [`crate::tee::Tee`] and re-injects a
//! selected subset of its messages into the live relay.

use std::collections::HashSet;
use std::path::Path;

use crate::config::{parse_hex_tokens, Direction};
use crate::endpoint::PortIo;
use crate::relay::RelayEngine;
use crate::Error;

const HEADER_A_TO_B: &str = "A -> B:";
const HEADER_B_TO_A: &str = "B -> A:";

/// Returns the source direction of a capture-file header line, and the
/// payload text following its colon.
fn split_header(line: &str) -> Option<(Direction, &str)> {
    if let Some(rest) = line.strip_prefix(HEADER_A_TO_B) {
        Some((Direction::A, rest))
    } else if let Some(rest) = line.strip_prefix(HEADER_B_TO_A) {
        Some((Direction::B, rest))
    } else {
        None
    }
}

/// Parses a comma-separated selector of line numbers and inclusive
/// hyphenated ranges (`"1,4"`, `"2-10"`). `None` selects every line.
fn parse_selector(selector: Option<&str>, total_lines: usize) -> Result<HashSet<usize>, Error> {
    let Some(selector) = selector else {
        return Ok((1..=total_lines).collect());
    };
    let mut lines = HashSet::new();
    for token in selector.split(',') {
        let token = token.trim();
        if token.is_empty() {
            continue;
        }
        match token.split_once('-') {
            Some((start, end)) => {
                let start: usize = start
                    .trim()
                    .parse()
                    .map_err(|_| Error::ReplayParse(format!("invalid range start {token:?}")))?;
                let end: usize = end
                    .trim()
                    .parse()
                    .map_err(|_| Error::ReplayParse(format!("invalid range end {token:?}")))?;
                lines.extend(start..=end);
            }
            None => {
                let n: usize = token
                    .parse()
                    .map_err(|_| Error::ReplayParse(format!("invalid line number {token:?}")))?;
                lines.insert(n);
            }
        }
    }
    Ok(lines)
}

/// Replays selected lines of a capture file through a [`RelayEngine`].
pub struct ReplayEngine<T: PortIo = serial2::SerialPort> {
    relay: RelayEngine<T>,
}

impl<T: PortIo> ReplayEngine<T> {
    pub fn new(relay: RelayEngine<T>) -> Self {
        Self { relay }
    }

    /// Replays `selector` (or every line, if `None`) from the capture file
    /// at `path`. Requires the relay to already be running.
    pub fn run(&self, path: &Path, selector: Option<&str>) -> Result<(), Error> {
        if !self.relay.is_running() {
            return Err(Error::NotRunning);
        }

        let contents = std::fs::read_to_string(path).map_err(Error::Io)?;
        let lines: Vec<&str> = contents.lines().collect();
        let selected = parse_selector(selector, lines.len())?;

        let mut current_dir: Option<Direction> = None;
        let mut replay_direction: Option<Direction> = None;
        let mut parsed: Vec<(usize, Option<Direction>, &str)> = Vec::with_capacity(lines.len());

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let payload = if let Some((dir, payload)) = split_header(line) {
                current_dir = Some(dir);
                payload
            } else {
                line
            };
            parsed.push((line_no, current_dir, payload));
            if replay_direction.is_none() && selected.contains(&line_no)
                && let Some(dir) = current_dir {
                    replay_direction = Some(dir);
                }
        }

        let replay_direction = replay_direction.ok_or(Error::ReplayDirectionUnknown)?;
        let sink = replay_direction.opposite();

        for (line_no, dir, payload) in parsed {
            if !selected.contains(&line_no) || dir != Some(replay_direction) {
                continue;
            }
            let bytes = parse_hex_tokens(payload).map_err(|e| Error::ReplayParse(e.to_string()))?;
            log::info!("replay: line {line_no}: {replay_direction} -> {sink}, {} bytes", bytes.len());
            self.relay.replay_write(sink, replay_direction, bytes)?;
        }

        Ok(())
    }
}
