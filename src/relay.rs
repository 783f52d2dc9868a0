//! Wires two [`SerialEndpoint`]s together: bytes read from one are matched
//! against the configured delimiters, optionally buffered into a framed
//! message, and forwarded to the other, with every byte mirrored to a
//! shared transcript sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::checksum::ChecksumMethod;
use crate::config::{Delimiter, Direction, SubstitutionTable};
use crate::delimiter::{DelimiterMatcher, MatchResult};
use crate::endpoint::{PortIo, SerialEndpoint};
use crate::rewrite::PatternRewriter;
use crate::tee::Tee;
use crate::Error;

struct RelayCore<T: PortIo> {
    endpoints: Mutex<HashMap<Direction, SerialEndpoint<T>>>,
    write_locks: HashMap<Direction, Mutex<()>>,
    matcher: Mutex<DelimiterMatcher>,
    buffers: Mutex<HashMap<Direction, Vec<u8>>>,
    tee: Arc<Tee>,
    substitutions: Mutex<HashMap<Direction, SubstitutionTable>>,
    checksums: Mutex<HashMap<Direction, ChecksumMethod>>,
    framing_enabled: bool,
}

impl<T: PortIo> RelayCore<T> {
    fn write_endpoint(&self, dir: Direction, bytes: &[u8]) -> Result<(), Error> {
        let endpoints = self.endpoints.lock().expect("relay endpoints mutex poisoned");
        endpoints
            .get(&dir)
            .expect("both directions are always present")
            .write(bytes)
    }

    /// Runs the full per-byte algorithm for one chunk read from `reader_dir`,
    /// holding the sink's write lock for the whole chunk so a framed message
    /// is never interleaved with another writer.
    fn handle_chunk(&self, reader_dir: Direction, chunk: &[u8]) {
        let sink = reader_dir.opposite();
        let _write_guard = self.write_locks[&sink].lock().expect("write lock poisoned");

        for &byte in chunk {
            self.handle_byte(reader_dir, sink, byte);
        }
    }

    fn handle_byte(&self, reader_dir: Direction, sink: Direction, byte: u8) {
        self.tee.begin_byte(reader_dir, sink);

        let result = self.matcher.lock().expect("matcher mutex poisoned").feed(reader_dir, byte);

        match result {
            MatchResult::StartMatched(d) => self.handle_start_matched(sink, byte, &d),
            MatchResult::EndMatched(_) => self.handle_end_matched(reader_dir, sink, byte),
            MatchResult::NoMatch => self.handle_no_match(sink, byte),
        }
    }

    fn handle_start_matched(&self, sink: Direction, byte: u8, delimiter: &Delimiter) {
        let mut buffers = self.buffers.lock().expect("buffers mutex poisoned");
        let buf = buffers.entry(sink).or_default();
        buf.push(byte);

        if delimiter.len() > 1 {
            let rewind_chars = 5 * (delimiter.len() - 1);
            self.tee.emit(&"\x08".repeat(rewind_chars), "");
            if self.tee.bytes_on_line() >= delimiter.len() {
                self.tee.emit(&" ".repeat(rewind_chars), "\n        ");
            }
        }

        let delim_text: String = delimiter.iter().map(|b| format!("0x{b:02x} ")).collect();
        self.tee.emit(&delim_text, "");

        let split_at = buf.len().saturating_sub(delimiter.len());
        let prefix: Vec<u8> = buf.drain(..split_at).collect();
        drop(buffers);

        if !prefix.is_empty()
            && let Err(e) = self.write_endpoint(sink, &prefix) {
                log::error!("relay: dropping message to {sink}: {e}");
            }

        self.tee.set_bytes_on_line(delimiter.len());
        self.tee.swap_last_byte_was_end_delimiter(false);
    }

    fn handle_end_matched(&self, reader_dir: Direction, sink: Direction, byte: u8) {
        self.tee.emit(&format!("0x{byte:02x} "), "");
        self.tee.add_bytes_on_line(1);

        if self.framing_enabled {
            let mut buffers = self.buffers.lock().expect("buffers mutex poisoned");
            let buf = buffers.entry(sink).or_default();
            buf.push(byte);
            let mut message = std::mem::take(buf);
            drop(buffers);

            {
                let substitutions = self.substitutions.lock().expect("substitutions mutex poisoned");
                let checksums = self.checksums.lock().expect("checksums mutex poisoned");
                PatternRewriter::apply(
                    &mut message,
                    substitutions.get(&reader_dir),
                    checksums.get(&reader_dir).copied(),
                );
            }
            if let Err(e) = self.write_endpoint(sink, &message) {
                log::error!("relay: dropping message to {sink}: {e}");
            }
        }

        self.tee.swap_last_byte_was_end_delimiter(true);
    }

    fn handle_no_match(&self, sink: Direction, byte: u8) {
        self.tee.emit(&format!("0x{byte:02x} "), "");
        self.tee.add_bytes_on_line(1);

        if self.framing_enabled {
            let mut buffers = self.buffers.lock().expect("buffers mutex poisoned");
            buffers.entry(sink).or_default().push(byte);
        } else if let Err(e) = self.write_endpoint(sink, &[byte]) {
            log::error!("relay: dropping byte to {sink}: {e}");
        }

        self.tee.swap_last_byte_was_end_delimiter(false);
    }
}

/// Owns both serial endpoints and all per-direction runtime state for one
/// live relay session. Cheaply cloneable; clones share the same underlying
/// endpoints, locks, and transcript sink, which lets [`crate::replay::ReplayEngine`]
/// inject bytes through the same write-locked sink the reader threads use.
pub struct RelayEngine<T: PortIo = serial2::SerialPort> {
    core: Arc<RelayCore<T>>,
}

impl<T: PortIo> Clone for RelayEngine<T> {
    fn clone(&self) -> Self {
        Self {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: PortIo> RelayEngine<T> {
    /// Builds the relay over two already-open endpoints and immediately
    /// spawns their reader threads. Always starts with empty message
    /// buffers and a fresh delimiter window, matching the "start clears
    /// per-direction state" requirement: callers build a new `RelayEngine`
    /// on every `start()`, never reuse one across a stop/start cycle.
    pub fn new(
        endpoint_a: SerialEndpoint<T>,
        endpoint_b: SerialEndpoint<T>,
        start_delimiters: Vec<Delimiter>,
        end_delimiters: Vec<Delimiter>,
        substitutions: HashMap<Direction, SubstitutionTable>,
        checksums: HashMap<Direction, ChecksumMethod>,
        tee: Arc<Tee>,
    ) -> Self {
        let framing_enabled = !start_delimiters.is_empty() || !end_delimiters.is_empty();
        let matcher = DelimiterMatcher::new(start_delimiters, end_delimiters);

        let mut endpoints = HashMap::new();
        endpoints.insert(Direction::A, endpoint_a);
        endpoints.insert(Direction::B, endpoint_b);

        let mut write_locks = HashMap::new();
        write_locks.insert(Direction::A, Mutex::new(()));
        write_locks.insert(Direction::B, Mutex::new(()));

        let core = Arc::new(RelayCore {
            endpoints: Mutex::new(endpoints),
            write_locks,
            matcher: Mutex::new(matcher),
            buffers: Mutex::new(HashMap::new()),
            tee,
            substitutions: Mutex::new(substitutions),
            checksums: Mutex::new(checksums),
            framing_enabled,
        });

        for dir in [Direction::A, Direction::B] {
            let core_clone = Arc::clone(&core);
            let mut endpoints = core.endpoints.lock().expect("relay endpoints mutex poisoned");
            if let Some(endpoint) = endpoints.get_mut(&dir) {
                endpoint.start(move |chunk| core_clone.handle_chunk(dir, chunk));
            }
        }

        Self { core }
    }

    pub fn tee(&self) -> Arc<Tee> {
        Arc::clone(&self.core.tee)
    }

    pub fn framing_enabled(&self) -> bool {
        self.core.framing_enabled
    }

    pub fn is_running(&self) -> bool {
        let endpoints = self.core.endpoints.lock().expect("relay endpoints mutex poisoned");
        endpoints.values().all(|e| e.is_running())
    }

    /// Stops both endpoints, joining their reader threads.
    pub fn stop(&self) -> Result<(), Error> {
        let mut endpoints = self.core.endpoints.lock().expect("relay endpoints mutex poisoned");
        let mut last_err = None;
        for endpoint in endpoints.values_mut() {
            if let Err(e) = endpoint.close() {
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Writes `payload` to `sink` under its write lock, applying
    /// `PatternRewriter` with `source`'s substitution table and checksum
    /// method, then mirrors the replayed bytes to the transcript. Used by
    /// [`crate::replay::ReplayEngine`] to inject a captured message.
    pub fn replay_write(&self, sink: Direction, source: Direction, mut payload: Vec<u8>) -> Result<(), Error> {
        let _guard = self.core.write_locks[&sink].lock().expect("write lock poisoned");
        {
            let substitutions = self.core.substitutions.lock().expect("substitutions mutex poisoned");
            let checksums = self.core.checksums.lock().expect("checksums mutex poisoned");
            PatternRewriter::apply(&mut payload, substitutions.get(&source), checksums.get(&source).copied());
        }
        self.core.write_endpoint(sink, &payload)?;

        let hex: String = payload.iter().map(|b| format!("0x{b:02x} ")).collect();
        self.core.tee.emit(&format!("\n{source}: {hex}"), "");
        Ok(())
    }

    /// Replaces the substitution table for `dir`, or clears it if `table`
    /// is `None`. Safe to call while the relay is running: the reader
    /// threads only consult it at message-completion time.
    pub fn set_substitution_table(&self, dir: Direction, table: Option<SubstitutionTable>) {
        let mut substitutions = self.core.substitutions.lock().expect("substitutions mutex poisoned");
        match table {
            Some(table) => {
                substitutions.insert(dir, table);
            }
            None => {
                substitutions.remove(&dir);
            }
        }
    }

    pub fn substitution_table(&self, dir: Direction) -> Option<SubstitutionTable> {
        self.core.substitutions.lock().expect("substitutions mutex poisoned").get(&dir).cloned()
    }

    /// Replaces the checksum method for `dir`, or clears it if `method` is
    /// `None`. Safe to call while the relay is running.
    pub fn set_checksum_method(&self, dir: Direction, method: Option<ChecksumMethod>) {
        let mut checksums = self.core.checksums.lock().expect("checksums mutex poisoned");
        match method {
            Some(method) => {
                checksums.insert(dir, method);
            }
            None => {
                checksums.remove(&dir);
            }
        }
    }

    pub fn checksum_method(&self, dir: Direction) -> Option<ChecksumMethod> {
        self.core.checksums.lock().expect("checksums mutex poisoned").get(&dir).copied()
    }
}
