//! Beam-search bookkeeping, independent of any tensor backend.

use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub struct BeamHypothesis {
    /// Generated ids, excluding the decoder start token.
    pub tokens: Vec<u32>,
    /// Sum of token log-probabilities.
    pub score: f32,
}

impl BeamHypothesis {
    pub fn normalized_score(&self, length_penalty: f32) -> f32 {
        let len = self.tokens.len().max(1) as f32;
        self.score / len.powf(length_penalty)
    }
}

/// Completed hypotheses, keeping only the best `num_beams`.
pub struct FinishedHypotheses {
    hypotheses: Vec<BeamHypothesis>,
    num_beams: usize,
    length_penalty: f32,
    worst_score: f32,
}

impl FinishedHypotheses {
    pub fn new(num_beams: usize, length_penalty: f32) -> Self {
        Self {
            hypotheses: Vec::with_capacity(num_beams + 1),
            num_beams,
            length_penalty,
            worst_score: f32::NEG_INFINITY,
        }
    }

    pub fn add(&mut self, hypothesis: BeamHypothesis) {
        if hypothesis.score == f32::NEG_INFINITY {
            return;
        }

        let score = hypothesis.normalized_score(self.length_penalty);
        if self.len() >= self.num_beams && score <= self.worst_score {
            return;
        }

        self.hypotheses.push(hypothesis);
        let penalty = self.length_penalty;
        self.hypotheses.sort_by(|a, b| {
            b.normalized_score(penalty)
                .partial_cmp(&a.normalized_score(penalty))
                .unwrap_or(Ordering::Equal)
        });
        self.hypotheses.truncate(self.num_beams);

        self.worst_score = self
            .hypotheses
            .last()
            .map(|h| h.normalized_score(penalty))
            .unwrap_or(f32::NEG_INFINITY);
    }

    pub fn len(&self) -> usize {
        self.hypotheses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hypotheses.is_empty()
    }

    /// Whether no running beam can still beat the finished set.
    pub fn is_done(&self, early_stopping: bool, best_running_score: f32, cur_len: usize) -> bool {
        if self.len() < self.num_beams {
            return false;
        }
        if early_stopping {
            return true;
        }
        let attainable = best_running_score / (cur_len.max(1) as f32).powf(self.length_penalty);
        self.worst_score >= attainable
    }

    pub fn into_best(self) -> Option<BeamHypothesis> {
        self.hypotheses.into_iter().next()
    }
}

/// One possible extension of a running beam.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeamCandidate {
    pub beam: usize,
    pub token: u32,
    pub score: f32,
}

/// Best `k` extensions across all beams, highest cumulative score first.
///
/// `log_probs[i]` is the next-token distribution of beam `i`, whose running
/// score is `beam_scores[i]`.
pub fn top_candidates(log_probs: &[Vec<f32>], beam_scores: &[f32], k: usize) -> Vec<BeamCandidate> {
    let mut candidates = Vec::with_capacity(log_probs.len() * k);

    for (beam, (row, base)) in log_probs.iter().zip(beam_scores).enumerate() {
        if *base == f32::NEG_INFINITY {
            continue;
        }
        let mut indexed: Vec<(usize, f32)> = row.iter().copied().enumerate().collect();
        let keep = k.min(indexed.len());
        if keep == 0 {
            continue;
        }
        indexed.select_nth_unstable_by(keep - 1, |a, b| {
            b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal)
        });
        candidates.extend(indexed.into_iter().take(keep).map(|(token, logp)| BeamCandidate {
            beam,
            token: token as u32,
            score: base + logp,
        }));
    }

    candidates.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    candidates.truncate(k);
    candidates
}
