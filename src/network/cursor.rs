use bytes::Bytes;

use super::fragment::{FragmentPos, FragmentSequence};

/// A position inside one of two back-to-back fragment sequences.
///
/// `in_first == false` with `fragment == second.len()` is the end of both
/// sequences combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorPos {
    pub fragment: usize,
    pub offset: usize,
    pub in_first: bool,
}

impl CursorPos {
    pub fn new(fragment: usize, offset: usize, in_first: bool) -> Self {
        CursorPos {
            fragment,
            offset,
            in_first,
        }
    }

    fn start_of_second() -> Self {
        CursorPos::new(0, 0, false)
    }
}

impl From<CursorPos> for FragmentPos {
    fn from(pos: CursorPos) -> Self {
        FragmentPos::new(pos.fragment, pos.offset)
    }
}

/// Walks the already-buffered `first` sequence followed by the freshly read
/// `second` sequence without joining them.
#[derive(Debug, Clone, Copy)]
pub struct FragmentCursor<'a> {
    first: &'a FragmentSequence,
    second: &'a FragmentSequence,
    pos: CursorPos,
}

impl<'a> FragmentCursor<'a> {
    /// Starts at the beginning of `first`, or directly in `second` when
    /// `first` holds nothing.
    pub fn new(first: &'a FragmentSequence, second: &'a FragmentSequence) -> Self {
        FragmentCursor {
            first,
            second,
            pos: CursorPos::new(0, 0, !first.is_empty()),
        }
    }

    pub fn position(&self) -> CursorPos {
        self.pos
    }

    pub fn offset(&self) -> usize {
        self.pos.offset
    }

    fn current_sequence(&self) -> &'a FragmentSequence {
        if self.pos.in_first {
            self.first
        } else {
            self.second
        }
    }

    /// Data of the fragment under the cursor. Must not be called at the end.
    pub fn current_data(&self) -> &'a Bytes {
        let seq = self.current_sequence();
        match seq.get(self.pos.fragment) {
            Some(fragment) => &fragment.data,
            None => panic!("cursor read at {:?} past the last fragment", self.pos),
        }
    }

    pub fn at_end(&self) -> bool {
        !self.pos.in_first && self.pos.fragment == self.second.len()
    }

    /// Compares sequence and fragment index, ignoring the byte offset.
    pub fn same_fragment(&self, other: &FragmentCursor<'_>) -> bool {
        self.pos.in_first == other.pos.in_first && self.pos.fragment == other.pos.fragment
    }

    pub fn advance_byte(&mut self) {
        self.pos.offset += 1;
        if self.pos.offset >= self.current_data().len() {
            self.advance_fragment();
        }
    }

    /// Moves to the start of the next fragment, crossing from `first` into
    /// `second` when `first` runs out. Advancing at the end is a no-op.
    pub fn advance_fragment(&mut self) {
        let len = self.current_sequence().len();
        assert!(
            self.pos.fragment <= len,
            "cursor at {:?} advanced past the end of a {} fragment sequence",
            self.pos,
            len
        );
        let next = (self.pos.fragment + 1).min(len);
        if self.pos.in_first && next == len {
            self.pos = CursorPos::start_of_second();
        } else {
            self.pos.fragment = next;
            self.pos.offset = 0;
        }
    }

    /// Jumps to `offset` within the current fragment, clamped to its length.
    pub fn advance_to_offset(&mut self, offset: usize) {
        let len = self
            .current_sequence()
            .get(self.pos.fragment)
            .map_or(0, |f| f.len());
        self.pos.offset = offset.min(len);
    }

    /// Step budget for one scan starting here: one step per fragment that can
    /// still be visited, plus `slack`.
    pub fn scan_budget(&self, slack: usize) -> ScanBudget {
        ScanBudget {
            steps: 0,
            limit: self.first.len() + self.second.len() + slack,
        }
    }

    /// Bytes between `from` and `to`, walked fragment by fragment.
    pub fn copy_range(from: &FragmentCursor<'_>, to: &FragmentCursor<'_>, slack: usize) -> Vec<u8> {
        let mut it = *from;
        let mut budget = it.scan_budget(slack);
        let mut out = Vec::new();

        while !it.same_fragment(to) {
            budget.tick();
            if !it.at_end() {
                out.extend_from_slice(&it.current_data()[it.offset()..]);
            }
            it.advance_fragment();
        }
        if !it.at_end() {
            // `it.offset()` is `from`'s offset when no fragment was crossed, 0 otherwise.
            out.extend_from_slice(&it.current_data()[it.offset()..to.offset()]);
        }
        out
    }
}

/// Bounds a scanning loop. Exceeding the limit means the cursor arithmetic is
/// broken, so it panics instead of looping on.
#[derive(Debug)]
pub struct ScanBudget {
    steps: usize,
    limit: usize,
}

impl ScanBudget {
    pub fn tick(&mut self) {
        self.steps += 1;
        if self.steps > self.limit {
            panic!("fragment scan exceeded its budget of {} steps", self.limit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::fragment::sequence_from;

    #[test]
    fn test_empty_first_starts_in_second() {
        let first = FragmentSequence::new();
        let second = sequence_from(["hello\n"]);
        let cursor = FragmentCursor::new(&first, &second);
        assert_eq!(cursor.position(), CursorPos::new(0, 0, false));
        assert!(!cursor.at_end());
        assert_eq!(cursor.current_data().as_ref(), b"hello\n");
    }

    #[test]
    fn test_both_empty_is_at_end() {
        let first = FragmentSequence::new();
        let second = FragmentSequence::new();
        let cursor = FragmentCursor::new(&first, &second);
        assert!(cursor.at_end());
    }

    #[test]
    fn test_advance_fragment_crosses_into_second() {
        let first = sequence_from(["ab", "cd"]);
        let second = sequence_from(["ef"]);
        let mut cursor = FragmentCursor::new(&first, &second);
        cursor.advance_fragment();
        assert_eq!(cursor.position(), CursorPos::new(1, 0, true));
        cursor.advance_fragment();
        assert_eq!(cursor.position(), CursorPos::new(0, 0, false));
        cursor.advance_fragment();
        assert!(cursor.at_end());
        assert_eq!(cursor.position(), CursorPos::new(1, 0, false));

        // end is sticky
        cursor.advance_fragment();
        assert_eq!(cursor.position(), CursorPos::new(1, 0, false));
    }

    #[test]
    fn test_advance_byte_rolls_over_fragment() {
        let first = sequence_from(["ab"]);
        let second = sequence_from(["c"]);
        let mut cursor = FragmentCursor::new(&first, &second);
        cursor.advance_byte();
        assert_eq!(cursor.position(), CursorPos::new(0, 1, true));
        cursor.advance_byte();
        assert_eq!(cursor.position(), CursorPos::new(0, 0, false));
        cursor.advance_byte();
        assert!(cursor.at_end());
    }

    #[test]
    #[should_panic(expected = "advanced past the end")]
    fn test_advance_beyond_end_panics() {
        let first = FragmentSequence::new();
        let second = sequence_from(["x"]);
        let mut cursor = FragmentCursor::new(&first, &second);
        cursor.pos = CursorPos::new(3, 0, false);
        cursor.advance_fragment();
    }

    #[test]
    fn test_same_fragment_ignores_offset() {
        let first = sequence_from(["abc"]);
        let second = FragmentSequence::new();
        let a = FragmentCursor::new(&first, &second);
        let mut b = a;
        b.advance_byte();
        assert!(a.same_fragment(&b));
        b.advance_fragment();
        assert!(!a.same_fragment(&b));
    }

    #[test]
    fn test_copy_range_within_one_fragment() {
        let first = FragmentSequence::new();
        let second = sequence_from(["a\nb\nc"]);
        let mut from = FragmentCursor::new(&first, &second);
        from.advance_to_offset(2);
        let mut to = from;
        to.advance_to_offset(4);
        assert_eq!(FragmentCursor::copy_range(&from, &to, 10), b"b\n");
    }

    #[test]
    fn test_copy_range_across_sequences() {
        let first = sequence_from(["xab", "c"]);
        let second = sequence_from(["de", "f\ng"]);
        let mut from = FragmentCursor::new(&first, &second);
        from.advance_byte();
        let mut to = from;
        to.advance_fragment();
        to.advance_fragment();
        to.advance_fragment();
        to.advance_to_offset(2);
        assert_eq!(to.position(), CursorPos::new(1, 2, false));
        assert_eq!(FragmentCursor::copy_range(&from, &to, 10), b"abcdef\n");
    }

    #[test]
    fn test_copy_range_to_end() {
        let first = sequence_from(["ab"]);
        let second = sequence_from(["cd"]);
        let from = FragmentCursor::new(&first, &second);
        let mut to = from;
        to.advance_fragment();
        to.advance_fragment();
        assert!(to.at_end());
        assert_eq!(FragmentCursor::copy_range(&from, &to, 10), b"abcd");
    }

    #[test]
    #[should_panic(expected = "exceeded its budget")]
    fn test_unreachable_target_trips_budget() {
        let first = sequence_from(["ab"]);
        let second = sequence_from(["cd"]);
        let start = FragmentCursor::new(&first, &second);
        let mut later = start;
        later.advance_fragment();
        // `start` lies behind `later`, so walking forward never meets it
        FragmentCursor::copy_range(&later, &start, 3);
    }
}
