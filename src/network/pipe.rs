use std::collections::{BTreeMap, BTreeSet, VecDeque};

use bytes::Bytes;
use tracing::{debug, trace, warn};

use super::cursor::{CursorPos, FragmentCursor};
use super::fragment::{sequence_bytes, sequence_len, FragmentSequence};
use super::packetizer::{cull_and_merge, Packetizer};
use super::table::StagedRead;
use super::token::ConnectionToken;

/// Per-connection framing state: bytes of a record still in progress and the
/// records completed so far.
#[derive(Debug, Clone, Default)]
pub struct Pipe {
    inbound: FragmentSequence,
    records: VecDeque<Bytes>,
}

/// A mutation computed while packetizing and applied once every connection of
/// the batch has been packetized.
#[derive(Debug)]
pub enum PostProcess<'a> {
    /// Drop consumed bytes up to `residual` and keep the rest of `extra`.
    CullAndMerge {
        residual: CursorPos,
        extra: &'a FragmentSequence,
    },
    /// Queue completed records.
    PackWrite { records: Vec<Bytes> },
}

impl PostProcess<'_> {
    pub fn apply(self, pipe: &mut Pipe) {
        match self {
            PostProcess::CullAndMerge { residual, extra } => {
                cull_and_merge(&mut pipe.inbound, extra, residual);
            }
            PostProcess::PackWrite { records } => pipe.records.extend(records),
        }
    }
}

impl Pipe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inbound(&self) -> &FragmentSequence {
        &self.inbound
    }

    pub fn take_records(&mut self) -> Vec<Bytes> {
        self.records.drain(..).collect()
    }

    /// Packetizes `fragments` against this pipe's buffered bytes.
    ///
    /// `self` is left untouched. The returned pipe is a copy which the
    /// returned steps, applied in order, bring up to date.
    pub fn remake_for_read<'a>(
        &self,
        packetizer: &Packetizer,
        fragments: &'a FragmentSequence,
    ) -> (Pipe, [PostProcess<'a>; 2]) {
        let extraction = packetizer.extract_all(FragmentCursor::new(&self.inbound, fragments));
        let steps = [
            PostProcess::CullAndMerge {
                residual: extraction.residual,
                extra: fragments,
            },
            PostProcess::PackWrite {
                records: extraction.records,
            },
        ];
        (self.clone(), steps)
    }
}

/// All pipes, keyed by connection token.
#[derive(Debug, Default)]
pub struct PipeSet {
    packetizer: Packetizer,
    pipes: BTreeMap<ConnectionToken, Pipe>,
}

impl PipeSet {
    pub fn new(packetizer: Packetizer) -> Self {
        PipeSet {
            packetizer,
            pipes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipes.is_empty()
    }

    pub fn get(&self, token: ConnectionToken) -> Option<&Pipe> {
        self.pipes.get(&token)
    }

    /// Creates an empty pipe for every live token that has none yet.
    pub fn merge_new_tokens(&mut self, live: &[ConnectionToken]) -> usize {
        let mut created = 0;
        for token in live {
            if !self.pipes.contains_key(token) {
                debug!("created pipe for connection {}", token);
                self.pipes.insert(*token, Pipe::new());
                created += 1;
            }
        }
        created
    }

    /// Packetizes every staged read, then applies the resulting mutations.
    ///
    /// No pipe is touched until all reads of the batch have been packetized.
    /// Returns the number of records completed by this batch.
    ///
    /// Panics if a token appears twice in `reads`; one poll stages at most
    /// one read per connection.
    pub fn apply_batch(&mut self, reads: &[StagedRead]) -> usize {
        let mut remade: BTreeMap<ConnectionToken, Pipe> = BTreeMap::new();
        let mut deferred: Vec<(ConnectionToken, PostProcess<'_>)> = Vec::new();
        let mut seen = BTreeSet::new();

        for read in reads {
            let Some(pipe) = self.pipes.get(&read.token) else {
                warn!("staged read for connection {} without a pipe", read.token);
                continue;
            };
            assert!(
                seen.insert(read.token),
                "connection {} staged twice in one batch",
                read.token
            );
            let (next, steps) = pipe.remake_for_read(&self.packetizer, &read.fragments);
            remade.insert(read.token, next);
            deferred.extend(steps.into_iter().map(|step| (read.token, step)));
        }

        let mut completed = 0;
        for (token, step) in deferred {
            if let PostProcess::PackWrite { records } = &step {
                completed += records.len();
            }
            if let Some(pipe) = remade.get_mut(&token) {
                step.apply(pipe);
            }
        }
        for (token, pipe) in remade {
            trace!(
                "connection {} holds {} buffered bytes",
                token,
                sequence_len(&pipe.inbound)
            );
            self.pipes.insert(token, pipe);
        }
        completed
    }

    pub fn take_records(&mut self, token: ConnectionToken) -> Vec<Bytes> {
        self.pipes
            .get_mut(&token)
            .map(Pipe::take_records)
            .unwrap_or_default()
    }

    pub fn buffered(&self, token: ConnectionToken) -> Option<Vec<u8>> {
        self.pipes.get(&token).map(|pipe| sequence_bytes(&pipe.inbound))
    }

    pub fn remove(&mut self, tokens: &[ConnectionToken]) {
        for token in tokens {
            if self.pipes.remove(token).is_some() {
                debug!("dropped pipe for connection {}", token);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::fragment::sequence_from;
    use crate::network::packetizer::PacketizerConfig;

    fn staged(token: u32, chunks: &[&'static str]) -> StagedRead {
        StagedRead {
            token: ConnectionToken::new(token),
            fragments: sequence_from(chunks.iter().copied()),
        }
    }

    #[test]
    fn test_remake_leaves_original_untouched() {
        let packetizer = Packetizer::default();
        let mut pipe = Pipe::new();
        let fragments = sequence_from(["ab\ncd"]);

        let (mut next, steps) = pipe.remake_for_read(&packetizer, &fragments);
        assert!(pipe.inbound().is_empty());
        assert!(next.inbound().is_empty());

        for step in steps {
            step.apply(&mut next);
        }
        assert_eq!(sequence_bytes(next.inbound()), b"cd");
        assert_eq!(next.take_records(), vec!["ab"]);
        assert!(pipe.take_records().is_empty());
    }

    #[test]
    fn test_merge_new_tokens_only_adds() {
        let mut pipes = PipeSet::default();
        let a = ConnectionToken::new(0);
        let b = ConnectionToken::new(1);

        assert_eq!(pipes.merge_new_tokens(&[a, b]), 2);
        assert_eq!(pipes.merge_new_tokens(&[b]), 0);
        // a token missing from the live set keeps its pipe
        assert!(pipes.get(a).is_some());
        assert_eq!(pipes.len(), 2);
    }

    #[test]
    fn test_batch_across_connections() {
        let mut pipes = PipeSet::new(Packetizer::new(PacketizerConfig::default()));
        let a = ConnectionToken::new(0);
        let b = ConnectionToken::new(1);
        pipes.merge_new_tokens(&[a, b]);

        assert_eq!(pipes.apply_batch(&[staged(0, &["aaa\n"]), staged(1, &["ccc"])]), 1);
        assert_eq!(pipes.apply_batch(&[staged(0, &["bbbb"]), staged(1, &["dddd\n"])]), 1);
        assert_eq!(pipes.apply_batch(&[staged(1, &["eeeee\n"])]), 1);

        assert_eq!(pipes.take_records(a), vec!["aaa"]);
        assert_eq!(pipes.buffered(a), Some(b"bbbb".to_vec()));
        assert_eq!(
            pipes.take_records(b),
            vec!["cccdddd", "eeeee"]
        );
        assert_eq!(pipes.buffered(b), Some(Vec::new()));
    }

    #[test]
    fn test_read_without_pipe_is_skipped() {
        let mut pipes = PipeSet::default();
        pipes.merge_new_tokens(&[ConnectionToken::new(0)]);

        let completed = pipes.apply_batch(&[staged(7, &["lost\n"]), staged(0, &["kept\n"])]);
        assert_eq!(completed, 1);
        assert!(pipes.get(ConnectionToken::new(7)).is_none());
        assert_eq!(pipes.take_records(ConnectionToken::new(0)), vec!["kept"]);
    }

    #[test]
    #[should_panic(expected = "staged twice in one batch")]
    fn test_duplicate_staged_read_panics() {
        let mut pipes = PipeSet::default();
        pipes.merge_new_tokens(&[ConnectionToken::new(0)]);
        pipes.apply_batch(&[staged(0, &["first\n"]), staged(0, &["second\n"])]);
    }

    #[test]
    fn test_remove_drops_pipes() {
        let mut pipes = PipeSet::default();
        let a = ConnectionToken::new(0);
        pipes.merge_new_tokens(&[a]);
        pipes.apply_batch(&[staged(0, &["partial"])]);

        pipes.remove(&[a]);
        assert!(pipes.is_empty());
        assert_eq!(pipes.buffered(a), None);
        assert!(pipes.take_records(a).is_empty());
    }
}
