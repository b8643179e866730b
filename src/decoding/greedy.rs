use crate::decoding::alphabet::Alphabet;
use crate::error::OcrError;
use crate::types::{Hypothesis, ProbabilityTensor};

/// Arg-max class of every timestep. Ties resolve to the lowest class index.
pub fn best_path(tensor: &ProbabilityTensor) -> Vec<usize> {
    tensor.rows.iter().map(|row| argmax(row).0).collect()
}

/// CTC collapse: merge consecutive repeats, then drop blanks.
///
/// A blank between two equal classes keeps both (`a _ a` -> `a a`).
pub fn collapse_ctc_path(path: &[usize], blank: usize) -> Vec<usize> {
    let mut out = Vec::with_capacity(path.len());
    let mut last = None;
    for &class in path {
        if Some(class) != last && class != blank {
            out.push(class);
        }
        last = Some(class);
    }
    out
}

/// Best-path decoding of one tensor.
///
/// The score is the mean of the per-timestep maximum probabilities.
pub fn decode_best_path(
    tensor: &ProbabilityTensor,
    alphabet: &Alphabet,
    max_len: Option<usize>,
) -> Result<Hypothesis, OcrError> {
    check_class_width(tensor, alphabet.num_classes())?;

    let mut path = Vec::with_capacity(tensor.timesteps());
    let mut prob_sum = 0.0f64;
    for row in &tensor.rows {
        let (class, prob) = argmax(row);
        path.push(class);
        prob_sum += prob as f64;
    }

    let mut classes = collapse_ctc_path(&path, alphabet.blank());
    if let Some(max_len) = max_len {
        classes.truncate(max_len);
    }
    let score = if path.is_empty() {
        0.0
    } else {
        (prob_sum / path.len() as f64) as f32
    };

    Ok(Hypothesis {
        text: alphabet.classes_to_text(&classes)?,
        score,
    })
}

/// Every row must hold exactly one value per alphabet class.
pub(crate) fn check_class_width(
    tensor: &ProbabilityTensor,
    num_classes: usize,
) -> Result<(), OcrError> {
    if let Some((t, row)) = tensor
        .rows
        .iter()
        .enumerate()
        .find(|(_, row)| row.len() != num_classes)
    {
        return Err(OcrError::invalid_input(format!(
            "probability row {t} has {} classes, alphabet expects {num_classes}",
            row.len()
        )));
    }
    Ok(())
}

fn argmax(row: &[f32]) -> (usize, f32) {
    let mut best = 0usize;
    let mut best_value = f32::NEG_INFINITY;
    for (class, &value) in row.iter().enumerate() {
        if value > best_value {
            best = class;
            best_value = value;
        }
    }
    (best, best_value.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoding::alphabet::BlankPosition;

    fn ab_first() -> Alphabet {
        Alphabet::new(['a', 'b'], BlankPosition::First).expect("valid alphabet")
    }

    #[test]
    fn collapse_merges_repeats_and_drops_blanks() {
        assert_eq!(collapse_ctc_path(&[1, 1, 0, 2, 2, 2], 0), vec![1, 2]);
    }

    #[test]
    fn collapse_keeps_repeats_separated_by_blank() {
        assert_eq!(collapse_ctc_path(&[1, 0, 1, 1], 0), vec![1, 1]);
    }

    #[test]
    fn collapse_of_empty_and_all_blank_paths() {
        assert!(collapse_ctc_path(&[], 0).is_empty());
        assert!(collapse_ctc_path(&[0, 0, 0], 0).is_empty());
    }

    #[test]
    fn best_path_prefers_lowest_index_on_tie() {
        let tensor = ProbabilityTensor::new(vec![vec![0.4, 0.4, 0.2]]);
        assert_eq!(best_path(&tensor), vec![0]);
    }

    #[test]
    fn decodes_reference_path_to_ab() {
        let tensor = ProbabilityTensor::one_hot(&[1, 1, 0, 2, 2, 2], 3).expect("in-range path");
        let hyp = decode_best_path(&tensor, &ab_first(), None).expect("decodable");
        assert_eq!(hyp.text, "ab");
        assert!((hyp.score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn all_blank_decodes_to_empty_string() {
        let tensor = ProbabilityTensor::one_hot(&[0; 8], 3).expect("in-range path");
        let hyp = decode_best_path(&tensor, &ab_first(), None).expect("decodable");
        assert_eq!(hyp.text, "");
    }

    #[test]
    fn constant_class_decodes_to_single_character() {
        let rows = vec![vec![0.1, 0.2, 0.7]; 12];
        let hyp = decode_best_path(&ProbabilityTensor::new(rows), &ab_first(), None)
            .expect("decodable");
        assert_eq!(hyp.text, "b");
    }

    #[test]
    fn zero_timesteps_decode_to_empty_string() {
        let hyp = decode_best_path(&ProbabilityTensor::default(), &ab_first(), None)
            .expect("decodable");
        assert_eq!(hyp.text, "");
        assert_eq!(hyp.score, 0.0);
    }

    #[test]
    fn truncates_at_max_len() {
        let tensor = ProbabilityTensor::one_hot(&[1, 0, 2, 0, 1, 0, 2], 3).expect("in-range path");
        let hyp = decode_best_path(&tensor, &ab_first(), Some(3)).expect("decodable");
        assert_eq!(hyp.text, "aba");
    }

    #[test]
    fn blank_last_alphabet_decodes() {
        let alphabet = Alphabet::new(['a', 'b'], BlankPosition::Last).expect("valid alphabet");
        let tensor = ProbabilityTensor::one_hot(&[0, 2, 1, 1, 2], 3).expect("in-range path");
        let hyp = decode_best_path(&tensor, &alphabet, None).expect("decodable");
        assert_eq!(hyp.text, "ab");
    }

    #[test]
    fn wrong_class_width_is_rejected() {
        let tensor = ProbabilityTensor::new(vec![vec![0.5, 0.5]]);
        let err = decode_best_path(&tensor, &ab_first(), None).expect_err("width mismatch");
        assert!(err.to_string().contains("alphabet expects 3"));
    }
}
