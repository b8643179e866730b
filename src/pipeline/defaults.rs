use std::sync::Arc;

use crate::config::DecodeStrategy;
use crate::decoding::alphabet::Alphabet;
use crate::decoding::beam::{decode_beam_search, BeamSearchOptions};
use crate::decoding::greedy::decode_best_path;
use crate::error::OcrError;
use crate::pipeline::traits::SequenceDecoder;
use crate::types::{Hypothesis, ProbabilityTensor};

pub struct GreedyCtcDecoder {
    alphabet: Arc<Alphabet>,
    max_len: Option<usize>,
}

impl GreedyCtcDecoder {
    pub fn new(alphabet: Arc<Alphabet>, max_len: Option<usize>) -> Self {
        Self { alphabet, max_len }
    }
}

impl SequenceDecoder for GreedyCtcDecoder {
    fn decode(&self, tensor: &ProbabilityTensor) -> Result<Hypothesis, OcrError> {
        decode_best_path(tensor, &self.alphabet, self.max_len)
    }

    fn name(&self) -> &'static str {
        "greedy"
    }
}

pub struct BeamSearchCtcDecoder {
    alphabet: Arc<Alphabet>,
    options: BeamSearchOptions,
}

impl BeamSearchCtcDecoder {
    pub fn new(alphabet: Arc<Alphabet>, options: BeamSearchOptions) -> Self {
        Self { alphabet, options }
    }

    /// Up to `top_paths` hypotheses, best first.
    pub fn decode_top_paths(&self, tensor: &ProbabilityTensor) -> Result<Vec<Hypothesis>, OcrError> {
        decode_beam_search(tensor, &self.alphabet, &self.options)
    }
}

impl SequenceDecoder for BeamSearchCtcDecoder {
    fn decode(&self, tensor: &ProbabilityTensor) -> Result<Hypothesis, OcrError> {
        self.decode_top_paths(tensor)?
            .into_iter()
            .next()
            .ok_or_else(|| OcrError::runtime("beam search", "search produced no hypotheses"))
    }

    fn name(&self) -> &'static str {
        "beam"
    }
}

pub fn decoder_for_strategy(
    strategy: DecodeStrategy,
    alphabet: Arc<Alphabet>,
    max_len: Option<usize>,
) -> Box<dyn SequenceDecoder> {
    match strategy {
        DecodeStrategy::Greedy => Box::new(GreedyCtcDecoder::new(alphabet, max_len)),
        DecodeStrategy::Beam {
            beam_width,
            top_paths,
        } => Box::new(BeamSearchCtcDecoder::new(
            alphabet,
            BeamSearchOptions {
                beam_width,
                top_paths,
                max_len,
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::alphabet::BlankPosition;

    fn ab_first() -> Arc<Alphabet> {
        Arc::new(Alphabet::new(['a', 'b'], BlankPosition::First).expect("valid alphabet"))
    }

    #[test]
    fn greedy_decoder_decode() {
        let decoder = GreedyCtcDecoder::new(ab_first(), None);
        let tensor = ProbabilityTensor::one_hot(&[1, 1, 0, 2, 2, 2], 3).expect("in-range path");
        assert_eq!(decoder.decode(&tensor).unwrap().text, "ab");
        assert_eq!(decoder.name(), "greedy");
    }

    #[test]
    fn beam_decoder_returns_best_of_top_paths() {
        let decoder = BeamSearchCtcDecoder::new(
            ab_first(),
            BeamSearchOptions {
                beam_width: 6,
                top_paths: 3,
                max_len: None,
            },
        );
        let tensor = ProbabilityTensor::new(vec![vec![0.2, 0.5, 0.3]; 2]);
        let top = decoder.decode_top_paths(&tensor).unwrap();
        let best = decoder.decode(&tensor).unwrap();
        assert_eq!(top.len(), 3);
        assert_eq!(best, top[0]);
    }

    #[test]
    fn strategy_selects_decoder() {
        let greedy = decoder_for_strategy(DecodeStrategy::Greedy, ab_first(), None);
        let beam = decoder_for_strategy(DecodeStrategy::default(), ab_first(), Some(5));
        assert_eq!(greedy.name(), "greedy");
        assert_eq!(beam.name(), "beam");
    }

    #[test]
    fn beam_width_one_agrees_with_greedy_decoder() {
        let alphabet = ab_first();
        let greedy = GreedyCtcDecoder::new(alphabet.clone(), None);
        let beam = decoder_for_strategy(
            DecodeStrategy::Beam {
                beam_width: 1,
                top_paths: 1,
            },
            alphabet,
            None,
        );
        let tensor = ProbabilityTensor::new(vec![
            vec![0.3, 0.4, 0.3],
            vec![0.2, 0.45, 0.35],
            vec![0.5, 0.1, 0.4],
            vec![0.1, 0.1, 0.8],
        ]);
        assert_eq!(
            beam.decode(&tensor).unwrap().text,
            greedy.decode(&tensor).unwrap().text
        );
    }
}
