//! Byte-pair encoding over token ids
//!
//! Merged ids are appended after the base vocabulary in learning order, so merge `i`
//! produces id `base_vocab_size + i`.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::HashMap;

use crate::error::{Result, TokenizerError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Merge {
    pub pair: (u32, u32),
    pub id: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bpe {
    pub base_vocab_size: u32,
    pub merges: Vec<Merge>,
}

impl Bpe {
    /// Default target size for a base vocabulary: 25% more ids
    pub fn default_target(base_vocab_size: u32) -> u32 {
        base_vocab_size * 5 / 4
    }

    /// Learn merges over a corpus of base-id sequences
    ///
    /// Ids below `special_count` never take part in a merge.
    pub fn learn(
        corpus: &[Vec<u32>],
        base_vocab_size: u32,
        target_vocab_size: u32,
        special_count: u32,
    ) -> Bpe {
        let mut sequences: Vec<Vec<u32>> = corpus.to_vec();
        let mut bpe = Bpe {
            base_vocab_size,
            merges: Vec::new(),
        };

        while bpe.vocab_size() < target_vocab_size {
            let counts = count_pairs(&sequences, special_count);
            let best = counts
                .into_iter()
                .max_by_key(|&(pair, count)| (count, Reverse(pair)));

            let Some((pair, count)) = best else { break };
            if count < 2 {
                break;
            }

            let merge = Merge {
                pair,
                id: bpe.vocab_size(),
            };
            sequences
                .par_iter_mut()
                .for_each(|seq| apply_merge(seq, merge));
            log::trace!("merge {:?} -> {} ({} occurrences)", pair, merge.id, count);
            bpe.merges.push(merge);
        }

        bpe
    }

    pub fn vocab_size(&self) -> u32 {
        self.base_vocab_size + self.merges.len() as u32
    }

    /// Apply every merge in learned order
    pub fn encode(&self, ids: &[u32]) -> Vec<u32> {
        let mut out = ids.to_vec();
        for &merge in &self.merges {
            apply_merge(&mut out, merge);
        }
        out
    }

    /// Expand merged ids back into base ids
    pub fn decode(&self, ids: &[u32]) -> Result<Vec<u32>> {
        let mut out = Vec::with_capacity(ids.len() * 2);
        let mut stack = Vec::new();

        for &id in ids {
            stack.push(id);
            while let Some(id) = stack.pop() {
                if id < self.base_vocab_size {
                    out.push(id);
                    continue;
                }
                let merge = self
                    .merges
                    .get((id - self.base_vocab_size) as usize)
                    .ok_or(TokenizerError::UnknownId {
                        id,
                        size: self.vocab_size() as usize,
                    })?;
                stack.push(merge.pair.1);
                stack.push(merge.pair.0);
            }
        }

        Ok(out)
    }
}

/// Adjacent pair counts over every sequence
fn count_pairs(sequences: &[Vec<u32>], special_count: u32) -> HashMap<(u32, u32), usize> {
    sequences
        .par_iter()
        .fold(HashMap::new, |mut counts, seq| {
            for window in seq.windows(2) {
                if window[0] >= special_count && window[1] >= special_count {
                    *counts.entry((window[0], window[1])).or_insert(0) += 1;
                }
            }
            counts
        })
        .reduce(HashMap::new, |mut a, b| {
            for (pair, count) in b {
                *a.entry(pair).or_insert(0) += count;
            }
            a
        })
}

/// Replace non-overlapping occurrences of a pair, left to right
fn apply_merge(seq: &mut Vec<u32>, merge: Merge) {
    if seq.len() < 2 {
        return;
    }
    let mut out = Vec::with_capacity(seq.len());
    let mut i = 0;
    while i < seq.len() {
        if i + 1 < seq.len() && (seq[i], seq[i + 1]) == merge.pair {
            out.push(merge.id);
            i += 2;
        } else {
            out.push(seq[i]);
            i += 1;
        }
    }
    *seq = out;
}
