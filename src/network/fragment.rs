use std::collections::VecDeque;

use bytes::Bytes;

/// Creation-order stamp attached to every fragment. Carried along but never
/// interpreted.
pub type Stamp = u32;

pub const EMPTY_STAMP: Stamp = 0xBBAA_CCFF;

/// A logically contiguous byte stream, split into chunks only for buffering.
pub type FragmentSequence = VecDeque<Fragment>;

/// One immutable chunk of a buffered byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub stamp: Stamp,
    pub data: Bytes,
}

/// Absolute position within a single [`FragmentSequence`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FragmentPos {
    pub fragment: usize,
    pub offset: usize,
}

impl FragmentPos {
    pub fn new(fragment: usize, offset: usize) -> Self {
        FragmentPos { fragment, offset }
    }
}

impl Fragment {
    pub fn new(data: impl Into<Bytes>) -> Self {
        Fragment {
            stamp: EMPTY_STAMP,
            data: data.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The bytes from `offset` on, sharing the underlying buffer.
    pub fn suffix(&self, offset: usize) -> Bytes {
        self.data.slice(offset.min(self.data.len())..)
    }

    /// Drops everything before `pos` from `seq`.
    ///
    /// Whole fragments before `pos.fragment` are removed; a non-zero
    /// `pos.offset` then trims the new front fragment down to its suffix.
    pub fn erase_prefix_to(seq: &mut FragmentSequence, pos: FragmentPos) {
        assert!(
            pos.fragment <= seq.len(),
            "erase position {:?} beyond sequence of {} fragments",
            pos,
            seq.len()
        );
        seq.drain(..pos.fragment);
        if pos.offset != 0 {
            let front = seq
                .pop_front()
                .unwrap_or_else(|| panic!("erase offset {:?} past the last fragment", pos));
            let rest = Fragment {
                stamp: front.stamp,
                data: front.suffix(pos.offset),
            };
            if !rest.is_empty() {
                seq.push_front(rest);
            }
        }
    }

    /// Appends to `out` everything in `seq` from `pos` on.
    pub fn copy_suffix_from(seq: &FragmentSequence, pos: FragmentPos, out: &mut FragmentSequence) {
        if pos.fragment >= seq.len() {
            return;
        }
        let head = &seq[pos.fragment];
        let rest = head.suffix(pos.offset);
        if !rest.is_empty() {
            out.push_back(Fragment {
                stamp: head.stamp,
                data: rest,
            });
        }
        out.extend(seq.iter().skip(pos.fragment + 1).cloned());
    }
}

/// Concatenated content of a sequence.
pub fn sequence_bytes(seq: &FragmentSequence) -> Vec<u8> {
    let mut out = Vec::with_capacity(sequence_len(seq));
    for fragment in seq {
        out.extend_from_slice(&fragment.data);
    }
    out
}

pub fn sequence_len(seq: &FragmentSequence) -> usize {
    seq.iter().map(Fragment::len).sum()
}

/// Builds a sequence from string chunks, skipping empty ones.
pub fn sequence_from<I, T>(chunks: I) -> FragmentSequence
where
    I: IntoIterator<Item = T>,
    T: Into<Bytes>,
{
    chunks
        .into_iter()
        .map(Fragment::new)
        .filter(|f| !f.is_empty())
        .collect()
}
