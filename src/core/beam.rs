//! Beam search over decoder logits

use crate::core::errors::Result;

/// A partial or finished output sequence
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hypothesis {
    /// Generated tokens, without the decoder prefix and without EOS
    pub tokens: Vec<u32>,
    /// Sum of token log probabilities, EOS included once finished
    pub log_prob: f32,
    /// Whether EOS was generated
    pub finished: bool,
}

impl Hypothesis {
    /// Length-normalised log probability
    pub fn score(&self) -> f32 {
        let len = self.tokens.len() + usize::from(self.finished);
        if len == 0 {
            self.log_prob
        } else {
            self.log_prob / len as f32
        }
    }
}

/// Beam search decoder; a beam size of 1 is greedy decoding
#[derive(Debug, Clone)]
pub struct BeamSearch {
    beam_size: usize,
    max_new_tokens: usize,
    eos_token_id: u32,
}

impl BeamSearch {
    pub fn new(beam_size: usize, max_new_tokens: usize, eos_token_id: u32) -> Self {
        Self {
            beam_size: beam_size.max(1),
            max_new_tokens,
            eos_token_id,
        }
    }

    /// Run the search.
    ///
    /// `next_logits` returns the logits of the next position given the tokens
    /// generated so far. Stops once `beam_size` hypotheses have finished or
    /// `max_new_tokens` tokens were generated.
    pub fn search<F>(&self, mut next_logits: F) -> Result<Hypothesis>
    where
        F: FnMut(&[u32]) -> Result<Vec<f32>>,
    {
        let mut beam = vec![Hypothesis::default()];
        let mut finished: Vec<Hypothesis> = Vec::new();

        for _ in 0..self.max_new_tokens {
            let mut candidates = Vec::with_capacity(beam.len() * self.beam_size);

            for hypothesis in &beam {
                let log_probs = log_softmax(&next_logits(&hypothesis.tokens)?);
                for (token, log_prob) in top_k(&log_probs, self.beam_size) {
                    let mut next = hypothesis.clone();
                    next.log_prob += log_prob;
                    if token == self.eos_token_id {
                        next.finished = true;
                        finished.push(next);
                    } else {
                        next.tokens.push(token);
                        candidates.push(next);
                    }
                }
            }

            candidates.sort_by(|a, b| b.score().total_cmp(&a.score()));
            candidates.truncate(self.beam_size);
            beam = candidates;

            if beam.is_empty() || finished.len() >= self.beam_size {
                break;
            }
        }

        finished.extend(beam);
        Ok(finished
            .into_iter()
            .max_by(|a, b| a.score().total_cmp(&b.score()))
            .unwrap_or_default())
    }
}

fn log_softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f32::NEG_INFINITY, f32::max);
    let sum: f32 = logits
        .iter()
        .filter(|v| !v.is_nan())
        .map(|v| (v - max).exp())
        .sum();
    let log_sum = sum.ln() + max;
    logits.iter().map(|v| v - log_sum).collect()
}

/// The `k` best `(token, value)` pairs, best first
fn top_k(values: &[f32], k: usize) -> Vec<(u32, f32)> {
    let mut indexed: Vec<(u32, f32)> = values
        .iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .map(|(i, &v)| (i as u32, v))
        .collect();
    indexed.sort_by(|a, b| b.1.total_cmp(&a.1));
    indexed.truncate(k);
    indexed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::errors::TranslationError;

    const EOS: u32 = 2;

    /// Logits whose softmax is exactly `probs`
    fn logits(probs: [f32; 4]) -> Vec<f32> {
        probs.iter().map(|p| p.ln()).collect()
    }

    /// Greedy takes token 0 first and ends with a long, unlikely sequence;
    /// token 1 followed by EOS scores better overall
    fn toy_model(generated: &[u32]) -> Result<Vec<f32>> {
        Ok(match generated {
            [] => logits([0.5, 0.4, 0.05, 0.05]),
            [1] => logits([0.025, 0.025, 0.925, 0.025]),
            [0] => logits([0.35, 0.3, 0.05, 0.3]),
            _ => logits([0.05, 0.025, 0.9, 0.025]),
        })
    }

    #[test]
    fn test_beam_finds_better_sequence_than_greedy() {
        let greedy = BeamSearch::new(1, 16, EOS).search(toy_model).unwrap();
        assert_eq!(greedy.tokens, vec![0, 0]);
        assert!(greedy.finished);

        let beam = BeamSearch::new(4, 16, EOS).search(toy_model).unwrap();
        assert_eq!(beam.tokens, vec![1]);
        assert!(beam.finished);
        assert!(beam.score() > greedy.score());
    }

    #[test]
    fn test_stops_at_max_new_tokens() {
        let never_eos = |_: &[u32]| -> Result<Vec<f32>> { Ok(logits([0.7, 0.2, 0.001, 0.099])) };
        let best = BeamSearch::new(2, 3, EOS).search(never_eos).unwrap();
        assert_eq!(best.tokens, vec![0, 0, 0]);
        assert!(!best.finished);
    }

    #[test]
    fn test_model_error_is_propagated() {
        let failing = |_: &[u32]| -> Result<Vec<f32>> { Err(TranslationError::inference("boom")) };
        let err = BeamSearch::new(4, 8, EOS).search(failing).unwrap_err();
        assert!(matches!(err, TranslationError::Inference { .. }));
    }

    #[test]
    fn test_log_softmax_and_top_k() {
        let log_probs = log_softmax(&[1.0, 3.0, 2.0, f32::NAN]);
        let total: f32 = log_probs[..3].iter().map(|v| v.exp()).sum();
        assert!((total - 1.0).abs() < 1e-5);

        let best: Vec<u32> = top_k(&log_probs, 2).into_iter().map(|(t, _)| t).collect();
        assert_eq!(best, vec![1, 2]);
    }
}
