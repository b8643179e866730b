use std::cmp::Ordering;
use std::collections::HashMap;

use crate::decoding::alphabet::Alphabet;
use crate::decoding::greedy::{best_path, check_class_width, collapse_ctc_path};
use crate::error::OcrError;
use crate::types::{Hypothesis, ProbabilityTensor};

const LOG_ZERO: f32 = -1.0e30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeamSearchOptions {
    pub beam_width: usize,
    pub top_paths: usize,
    pub max_len: Option<usize>,
}

impl Default for BeamSearchOptions {
    fn default() -> Self {
        Self {
            beam_width: 10,
            top_paths: 1,
            max_len: None,
        }
    }
}

/// Log-probabilities of a prefix split by whether its last frame was blank.
#[derive(Debug, Clone, Copy)]
struct BeamProb {
    blank: f32,
    non_blank: f32,
}

impl BeamProb {
    const ZERO: Self = Self {
        blank: LOG_ZERO,
        non_blank: LOG_ZERO,
    };

    fn total(&self) -> f32 {
        log_add(self.blank, self.non_blank)
    }
}

/// CTC prefix beam search.
///
/// Returns up to `top_paths` collapsed class sequences with their
/// log-probabilities, best first. Ties are ordered by class sequence so the
/// result does not depend on hash iteration order.
pub fn prefix_beam_search(
    tensor: &ProbabilityTensor,
    blank: usize,
    beam_width: usize,
    top_paths: usize,
) -> Vec<(Vec<usize>, f32)> {
    let beam_width = beam_width.max(1);
    let mut beams: Vec<(Vec<usize>, BeamProb)> = vec![(
        Vec::new(),
        BeamProb {
            blank: 0.0,
            non_blank: LOG_ZERO,
        },
    )];

    for row in &tensor.rows {
        let log_row: Vec<f32> = row.iter().map(|&p| safe_ln(p)).collect();
        let mut next: HashMap<Vec<usize>, BeamProb> = HashMap::with_capacity(beams.len() * 4);

        for (prefix, prob) in &beams {
            let total = prob.total();

            let same = next.entry(prefix.clone()).or_insert(BeamProb::ZERO);
            same.blank = log_add(same.blank, total + log_row[blank]);

            let last = prefix.last().copied();
            for (class, &log_p) in log_row.iter().enumerate() {
                if class == blank || log_p <= LOG_ZERO {
                    continue;
                }
                let mut extended = prefix.clone();
                extended.push(class);
                if last == Some(class) {
                    // A repeat without a separating blank folds into the prefix.
                    let same = next.entry(prefix.clone()).or_insert(BeamProb::ZERO);
                    same.non_blank = log_add(same.non_blank, prob.non_blank + log_p);
                    let ext = next.entry(extended).or_insert(BeamProb::ZERO);
                    ext.non_blank = log_add(ext.non_blank, prob.blank + log_p);
                } else {
                    let ext = next.entry(extended).or_insert(BeamProb::ZERO);
                    ext.non_blank = log_add(ext.non_blank, total + log_p);
                }
            }
        }

        let mut ranked: Vec<(Vec<usize>, BeamProb)> = next.into_iter().collect();
        ranked.sort_by(|(prefix_a, prob_a), (prefix_b, prob_b)| {
            prob_b
                .total()
                .partial_cmp(&prob_a.total())
                .unwrap_or(Ordering::Equal)
                .then_with(|| prefix_a.cmp(prefix_b))
        });
        ranked.truncate(beam_width);
        beams = ranked;
    }

    tracing::debug!(
        timesteps = tensor.timesteps(),
        beams = beams.len(),
        "prefix beam search finished"
    );
    beams
        .into_iter()
        .take(top_paths.clamp(1, beam_width))
        .map(|(prefix, prob)| (prefix, prob.total()))
        .collect()
}

/// Beam-search decoding of one tensor into up to `top_paths` hypotheses.
///
/// A beam width of 1 is served by best-path decoding.
pub fn decode_beam_search(
    tensor: &ProbabilityTensor,
    alphabet: &Alphabet,
    options: &BeamSearchOptions,
) -> Result<Vec<Hypothesis>, OcrError> {
    check_class_width(tensor, alphabet.num_classes())?;
    let blank = alphabet.blank();

    let paths = if options.beam_width <= 1 {
        let path = best_path(tensor);
        let log_prob = path
            .iter()
            .zip(&tensor.rows)
            .map(|(&class, row)| safe_ln(row[class]))
            .sum::<f32>();
        vec![(collapse_ctc_path(&path, blank), log_prob)]
    } else {
        // Truncation can fold distinct prefixes together, so keep the whole
        // beam until they are merged.
        let requested = if options.max_len.is_some() {
            options.beam_width
        } else {
            options.top_paths
        };
        prefix_beam_search(tensor, blank, options.beam_width, requested)
    };

    let mut merged: Vec<(Vec<usize>, f32)> = Vec::with_capacity(paths.len());
    for (mut classes, score) in paths {
        if let Some(max_len) = options.max_len {
            classes.truncate(max_len);
        }
        match merged.iter_mut().find(|(existing, _)| *existing == classes) {
            Some((_, total)) => *total = log_add(*total, score),
            None => merged.push((classes, score)),
        }
    }
    merged.sort_by(|(classes_a, score_a), (classes_b, score_b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(Ordering::Equal)
            .then_with(|| classes_a.cmp(classes_b))
    });
    merged.truncate(options.top_paths.max(1));

    merged
        .into_iter()
        .map(|(classes, score)| {
            Ok(Hypothesis {
                text: alphabet.classes_to_text(&classes)?,
                score,
            })
        })
        .collect()
}

fn safe_ln(p: f32) -> f32 {
    if p > 0.0 {
        p.ln().max(LOG_ZERO)
    } else {
        LOG_ZERO
    }
}

#[inline]
fn log_add(a: f32, b: f32) -> f32 {
    if a <= LOG_ZERO {
        return b;
    }
    if b <= LOG_ZERO {
        return a;
    }
    let m = a.max(b);
    m + ((a - m).exp() + (b - m).exp()).ln()
}
