use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::cursor::{CursorPos, FragmentCursor};
use super::fragment::{Fragment, FragmentPos, FragmentSequence};

pub const RECORD_DELIMITER: u8 = b'\n';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketizerConfig {
    /// Drop a `\r` left in front of the delimiter.
    pub strip_trailing_cr: bool,
    /// Extra steps allowed per scan on top of the fragments it can visit.
    pub scan_step_limit: usize,
}

impl Default for PacketizerConfig {
    fn default() -> Self {
        PacketizerConfig {
            strip_trailing_cr: false,
            scan_step_limit: 1000,
        }
    }
}

/// Result of draining every complete record reachable from a cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    /// Raw record bytes, delimiter removed. No text decoding is applied.
    pub records: Vec<Bytes>,
    /// Just past the last complete record, or the starting position when none
    /// was complete.
    pub residual: CursorPos,
}

/// Newline-delimited record framing over two back-to-back fragment sequences.
#[derive(Debug, Clone, Copy, Default)]
pub struct Packetizer {
    config: PacketizerConfig,
}

impl Packetizer {
    pub fn new(config: PacketizerConfig) -> Self {
        Packetizer { config }
    }

    /// Moves `cursor` one byte past the next delimiter. On failure the cursor
    /// is left where it was.
    pub fn find_next_record_boundary(&self, cursor: &mut FragmentCursor<'_>) -> bool {
        let mut pos = *cursor;
        let mut budget = pos.scan_budget(self.config.scan_step_limit);

        while !pos.at_end() {
            budget.tick();
            let data = pos.current_data();
            let from = pos.offset();
            if let Some(found) = data[from..].iter().position(|b| *b == RECORD_DELIMITER) {
                pos.advance_to_offset(from + found);
                pos.advance_byte();
                *cursor = pos;
                return true;
            }
            pos.advance_fragment();
        }
        false
    }

    /// Bytes of the next complete record, without its delimiter.
    pub fn extract_one_record(&self, cursor: &mut FragmentCursor<'_>) -> Option<Vec<u8>> {
        let start = *cursor;
        if !self.find_next_record_boundary(cursor) {
            return None;
        }

        let mut record = FragmentCursor::copy_range(&start, cursor, self.config.scan_step_limit);
        let delimiter = record.pop();
        debug_assert_eq!(delimiter, Some(RECORD_DELIMITER));
        if self.config.strip_trailing_cr && record.last() == Some(&b'\r') {
            record.pop();
        }
        Some(record)
    }

    pub fn extract_all(&self, mut cursor: FragmentCursor<'_>) -> Extraction {
        let mut records = Vec::new();
        while let Some(record) = self.extract_one_record(&mut cursor) {
            records.push(Bytes::from(record));
        }
        Extraction {
            records,
            residual: cursor.position(),
        }
    }
}

/// Folds freshly read `extra` into `buffer`, dropping everything before
/// `residual`.
///
/// While the residual still points into `buffer`, only its consumed prefix
/// goes and all of `extra` is appended. Once it has crossed into `extra`,
/// `buffer` is entirely consumed and only the rest of `extra` is kept.
pub fn cull_and_merge(buffer: &mut FragmentSequence, extra: &FragmentSequence, residual: CursorPos) {
    if residual.in_first {
        Fragment::erase_prefix_to(buffer, residual.into());
        Fragment::copy_suffix_from(extra, FragmentPos::default(), buffer);
    } else {
        buffer.clear();
        Fragment::copy_suffix_from(extra, residual.into(), buffer);
    }
}
