//! Per-direction rolling-window classifier that decides, for each incoming
//! byte, whether the current tail of the stream equals any configured
//! start- or end-of-message delimiter.

use crate::config::{Delimiter, Direction};
use std::collections::{HashMap, VecDeque};

/// The classification of a single incoming byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchResult {
    NoMatch,
    StartMatched(Delimiter),
    EndMatched(Delimiter),
}

/// Bounded FIFO of the most recent bytes for one direction, capacity equal
/// to the longest configured delimiter.
#[derive(Debug, Default)]
struct DelimiterWindow {
    buf: VecDeque<u8>,
}

impl DelimiterWindow {
    fn push(&mut self, capacity: usize, byte: u8) {
        if self.buf.len() == capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(byte);
    }

    fn ends_with(&self, delim: &[u8]) -> bool {
        if self.buf.len() < delim.len() {
            return false;
        }
        let skip = self.buf.len() - delim.len();
        self.buf.iter().skip(skip).eq(delim.iter())
    }

    fn clear(&mut self) {
        self.buf.clear();
    }
}

/// Holds the global delimiter sets and a rolling window per direction.
pub struct DelimiterMatcher {
    start_delimiters: Vec<Delimiter>,
    end_delimiters: Vec<Delimiter>,
    capacity: usize,
    windows: HashMap<Direction, DelimiterWindow>,
}

impl DelimiterMatcher {
    pub fn new(start_delimiters: Vec<Delimiter>, end_delimiters: Vec<Delimiter>) -> Self {
        let capacity = start_delimiters
            .iter()
            .chain(end_delimiters.iter())
            .map(|d| d.len())
            .max()
            .unwrap_or(0);
        let mut windows = HashMap::new();
        windows.insert(Direction::A, DelimiterWindow::default());
        windows.insert(Direction::B, DelimiterWindow::default());
        Self {
            start_delimiters,
            end_delimiters,
            capacity,
            windows,
        }
    }

    /// Feeds one byte from `dir` through the matcher, mutating that
    /// direction's window and returning the classification.
    pub fn feed(&mut self, dir: Direction, byte: u8) -> MatchResult {
        if self.capacity == 0 {
            return MatchResult::NoMatch;
        }
        let window = self.windows.get_mut(&dir).expect("both directions present");
        window.push(self.capacity, byte);

        for d in &self.start_delimiters {
            if window.ends_with(d) {
                window.clear();
                return MatchResult::StartMatched(d.clone());
            }
        }
        for d in &self.end_delimiters {
            if window.ends_with(d) {
                window.clear();
                return MatchResult::EndMatched(d.clone());
            }
        }
        MatchResult::NoMatch
    }

    /// Reports whether `dir`'s current window tail equals any end
    /// delimiter, without mutating the window. Used to decide transcript
    /// line breaks.
    pub fn peek_end(&self, dir: Direction) -> Option<Delimiter> {
        let window = self.windows.get(&dir)?;
        self.end_delimiters.iter().find(|d| window.ends_with(d)).cloned()
    }

    /// Clears both directions' windows, used when the relay (re)starts.
    pub fn reset(&mut self) {
        for window in self.windows.values_mut() {
            window.clear();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_delimiters_disables_the_window() {
        let mut m = DelimiterMatcher::new(vec![], vec![]);
        assert_eq!(m.capacity(), 0);
        assert_eq!(m.feed(Direction::A, 0xAA), MatchResult::NoMatch);
    }

    #[test]
    fn single_byte_start_delimiter_matches_immediately() {
        let mut m = DelimiterMatcher::new(vec![vec![0xAA]], vec![]);
        assert_eq!(m.feed(Direction::A, 0x01), MatchResult::NoMatch);
        assert_eq!(
            m.feed(Direction::A, 0xAA),
            MatchResult::StartMatched(vec![0xAA])
        );
    }

    #[test]
    fn multi_byte_start_delimiter_requires_full_sequence() {
        let mut m = DelimiterMatcher::new(vec![vec![0xDE, 0xAD]], vec![]);
        assert_eq!(m.feed(Direction::A, 0x01), MatchResult::NoMatch);
        assert_eq!(m.feed(Direction::A, 0xDE), MatchResult::NoMatch);
        assert_eq!(
            m.feed(Direction::A, 0xAD),
            MatchResult::StartMatched(vec![0xDE, 0xAD])
        );
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut m = DelimiterMatcher::new(vec![vec![0x01, 0x02, 0x03]], vec![]);
        for b in 0..10u8 {
            m.feed(Direction::A, b);
        }
        assert!(m.windows.get(&Direction::A).unwrap().buf.len() <= m.capacity());
    }

    #[test]
    fn directions_have_independent_windows() {
        let mut m = DelimiterMatcher::new(vec![vec![0xAA]], vec![]);
        m.feed(Direction::A, 0xAA);
        assert_eq!(m.feed(Direction::B, 0xAA), MatchResult::StartMatched(vec![0xAA]));
    }

    #[test]
    fn peek_end_does_not_mutate_window() {
        let mut m = DelimiterMatcher::new(vec![], vec![vec![0x0A]]);
        m.feed(Direction::A, 0x0A);
        assert_eq!(m.peek_end(Direction::A), None);

        let mut m = DelimiterMatcher::new(vec![], vec![vec![0x0A]]);
        assert_eq!(m.feed(Direction::A, 0x0A), MatchResult::EndMatched(vec![0x0A]));
    }

    #[test]
    fn start_delimiters_take_priority_over_end_delimiters() {
        let mut m = DelimiterMatcher::new(vec![vec![0xAA]], vec![vec![0xAA]]);
        assert_eq!(m.feed(Direction::A, 0xAA), MatchResult::StartMatched(vec![0xAA]));
    }
}
