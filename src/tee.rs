//! Single-writer transcript sink merging an on-disk capture file and an
//! optional live display under one mutex, with byte-precise rewind.

use std::fs::File;
use std::io::{Seek, SeekFrom, Write};
use std::sync::Mutex;

use crate::Error;

const BACKSPACE: u8 = b'\x08';

struct TeeState {
    capture: Option<File>,
    capture_size: u64,
    display_enabled: bool,
    last_printed_direction: Option<crate::Direction>,
    bytes_on_line: usize,
    last_byte_was_end_delimiter: bool,
}

/// Shared output sink. `emit` appends `text + end` to the display (if
/// enabled) and to the capture file (if open); a `text` beginning with a
/// backspace byte instead rewinds the capture file. All transcript state
/// that must be consistent across the two reader threads: the capture
/// file, its byte counter, and the "what did we print last" bookkeeping,
/// lives here, behind one mutex.
pub struct Tee {
    state: Mutex<TeeState>,
}

impl Tee {
    pub fn new(display_enabled: bool) -> Self {
        Self {
            state: Mutex::new(TeeState {
                capture: None,
                capture_size: 0,
                display_enabled,
                last_printed_direction: None,
                bytes_on_line: 0,
                last_byte_was_end_delimiter: false,
            }),
        }
    }

    /// Opens a capture file, failing if one is already open.
    pub fn open_capture(&self, path: &std::path::Path) -> Result<(), Error> {
        let mut state = self.state.lock().expect("tee mutex poisoned");
        if state.capture.is_some() {
            return Err(Error::CaptureAlreadyOpen);
        }
        let file = File::create(path).map_err(|e| Error::Capture(e.to_string()))?;
        state.capture = Some(file);
        state.capture_size = 0;
        Ok(())
    }

    /// Closes the capture file, if any.
    pub fn close_capture(&self) {
        let mut state = self.state.lock().expect("tee mutex poisoned");
        state.capture = None;
        state.capture_size = 0;
    }

    pub fn capture_open(&self) -> bool {
        self.state.lock().expect("tee mutex poisoned").capture.is_some()
    }

    pub fn set_display_enabled(&self, enabled: bool) {
        self.state.lock().expect("tee mutex poisoned").display_enabled = enabled;
    }

    /// Appends `text + end` to the display and capture file, or, if `text`
    /// begins with a backspace, rewinds the capture file by `text.len()`
    /// bytes (clamped at zero).
    pub fn emit(&self, text: &str, end: &str) {
        let mut state = self.state.lock().expect("tee mutex poisoned");
        Self::emit_locked(&mut state, text, end);
    }

    fn emit_locked(state: &mut TeeState, text: &str, end: &str) {
        if text.as_bytes().first() == Some(&BACKSPACE) {
            let rewind_by = text.len() as u64;
            state.capture_size = state.capture_size.saturating_sub(rewind_by);
            let new_size = state.capture_size;
            if let Some(file) = state.capture.as_mut() {
                let _ = file.seek(SeekFrom::Start(new_size));
                let _ = file.set_len(new_size);
            }
        } else {
            if let Some(file) = state.capture.as_mut() {
                let _ = write!(file, "{text}{end}");
            }
            state.capture_size += (text.len() + end.len()) as u64;
        }
        if state.display_enabled {
            print!("{text}{end}");
            let _ = std::io::stdout().flush();
        }
    }

    /// Emits the header or indent text needed before the next byte read
    /// from `reader_dir`, and updates `last_printed_direction` and
    /// `bytes_on_line` to match, all under one lock acquisition. Since A's
    /// reader thread and B's reader thread call this concurrently (each
    /// holding the other direction's write lock, not this one), the
    /// decision and its mutation must not be split across separate lock
    /// acquisitions, or one thread's header could interleave with the
    /// other's. Writes no leading newline the first time any direction is
    /// printed.
    pub fn begin_byte(&self, reader_dir: crate::Direction, sink: crate::Direction) {
        let mut state = self.state.lock().expect("tee mutex poisoned");
        if state.last_printed_direction != Some(reader_dir) {
            let end = if state.last_printed_direction.is_none() { "" } else { "\n" };
            let header = format!("{end}{reader_dir} -> {sink}: ");
            Self::emit_locked(&mut state, &header, "");
            state.last_printed_direction = Some(reader_dir);
            state.bytes_on_line = 0;
        } else if std::mem::replace(&mut state.last_byte_was_end_delimiter, false) {
            Self::emit_locked(&mut state, "\n        ", "");
            state.bytes_on_line = 0;
        }
    }

    pub fn capture_size(&self) -> u64 {
        self.state.lock().expect("tee mutex poisoned").capture_size
    }

    /// Whether the most recently processed byte, in transcript order,
    /// completed an end-delimiter match. `RelayEngine` uses this to start a
    /// new indented line when a direction continues uninterrupted across
    /// two messages.
    pub fn swap_last_byte_was_end_delimiter(&self, value: bool) -> bool {
        let mut state = self.state.lock().expect("tee mutex poisoned");
        std::mem::replace(&mut state.last_byte_was_end_delimiter, value)
    }

    pub fn bytes_on_line(&self) -> usize {
        self.state.lock().expect("tee mutex poisoned").bytes_on_line
    }

    pub fn set_bytes_on_line(&self, n: usize) {
        self.state.lock().expect("tee mutex poisoned").bytes_on_line = n;
    }

    pub fn add_bytes_on_line(&self, n: usize) {
        self.state.lock().expect("tee mutex poisoned").bytes_on_line += n;
    }
}

impl Default for Tee {
    fn default() -> Self {
        Self::new(true)
    }
}
