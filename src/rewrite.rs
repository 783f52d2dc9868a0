//! First-match pattern substitution with optional trailing checksum repair,
//! applied to a buffered message at end-of-message.

use crate::checksum::ChecksumMethod;
use crate::config::SubstitutionTable;

/// Applies at most one substitution from `table` to `message`, in
/// insertion order, then recomputes the trailing checksum byte if `method`
/// is set.
///
/// Scanning stops at the first pattern that matches anywhere in the
/// message; later table entries are never consulted for that message. This
/// mirrors the original's single-iteration, non-restart replace loop: an
/// implementer must not iterate substitutions to a fixpoint.
///
/// When a checksum method is set, the last byte of `message` is assumed to
/// be a trailing checksum and is overwritten with the checksum of
/// everything before it. Combine this only with a start/end delimiter pair
/// so the last byte really is the message's checksum slot.
pub struct PatternRewriter;

impl PatternRewriter {
    pub fn apply(
        message: &mut Vec<u8>,
        table: Option<&SubstitutionTable>,
        checksum: Option<ChecksumMethod>,
    ) {
        let Some(table) = table else { return };
        if table.is_empty() {
            return;
        }

        for (pattern, replacement) in table.entries() {
            if let Some(pos) = find_subslice(message, pattern) {
                message.splice(pos..pos + pattern.len(), replacement.iter().copied());
                if let Some(method) = checksum
                    && let Some((last, body)) = message.split_last_mut() {
                        *last = method.checksum(body);
                    }
                return;
            }
        }
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || needle.len() > haystack.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
