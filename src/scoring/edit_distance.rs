use serde::Serialize;

use crate::error::OcrError;

/// Levenshtein distance over Unicode scalar values with unit costs.
pub fn edit_distance(pred: &str, truth: &str) -> usize {
    let pred: Vec<char> = pred.chars().collect();
    let truth: Vec<char> = truth.chars().collect();
    levenshtein(&pred, &truth)
}

/// Edit distance divided by the ground-truth length.
///
/// An empty ground truth divides by `max(len(pred), 1)` instead, so two empty
/// strings score 0 and any prediction against an empty truth scores 1.
pub fn normalized_edit_distance(pred: &str, truth: &str) -> f64 {
    let pred: Vec<char> = pred.chars().collect();
    let truth: Vec<char> = truth.chars().collect();
    let distance = levenshtein(&pred, &truth);
    let divisor = if truth.is_empty() {
        pred.len().max(1)
    } else {
        truth.len()
    };
    distance as f64 / divisor as f64
}

pub fn mean_edit_distance<P, T>(preds: &[P], truths: &[T]) -> Result<Option<f64>, OcrError>
where
    P: AsRef<str>,
    T: AsRef<str>,
{
    check_batch_lengths(preds.len(), truths.len())?;
    let distances: Vec<f64> = preds
        .iter()
        .zip(truths)
        .map(|(p, t)| edit_distance(p.as_ref(), t.as_ref()) as f64)
        .collect();
    Ok(mean(&distances))
}

pub fn mean_normalized_edit_distance<P, T>(
    preds: &[P],
    truths: &[T],
) -> Result<Option<f64>, OcrError>
where
    P: AsRef<str>,
    T: AsRef<str>,
{
    check_batch_lengths(preds.len(), truths.len())?;
    let distances: Vec<f64> = preds
        .iter()
        .zip(truths)
        .map(|(p, t)| normalized_edit_distance(p.as_ref(), t.as_ref()))
        .collect();
    Ok(mean(&distances))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchScores {
    pub edit_distances: Vec<usize>,
    pub normalized_edit_distances: Vec<f64>,
    /// `None` for an empty batch.
    pub mean_edit_distance: Option<f64>,
    pub mean_normalized_edit_distance: Option<f64>,
    pub exact_match_ratio: Option<f64>,
    /// Total edits over total ground-truth characters.
    pub character_error_rate: Option<f64>,
}

pub fn score_batch<P, T>(preds: &[P], truths: &[T]) -> Result<BatchScores, OcrError>
where
    P: AsRef<str>,
    T: AsRef<str>,
{
    check_batch_lengths(preds.len(), truths.len())?;

    let mut edit_distances = Vec::with_capacity(preds.len());
    let mut normalized_edit_distances = Vec::with_capacity(preds.len());
    let mut exact_matches = 0usize;
    let mut truth_chars = 0usize;
    for (pred, truth) in preds.iter().zip(truths) {
        let (pred, truth) = (pred.as_ref(), truth.as_ref());
        edit_distances.push(edit_distance(pred, truth));
        normalized_edit_distances.push(normalized_edit_distance(pred, truth));
        if pred == truth {
            exact_matches += 1;
        }
        truth_chars += truth.chars().count();
    }

    let total_edits: usize = edit_distances.iter().sum();
    let as_f64: Vec<f64> = edit_distances.iter().map(|&d| d as f64).collect();
    let batch_len = preds.len();
    Ok(BatchScores {
        mean_edit_distance: mean(&as_f64),
        mean_normalized_edit_distance: mean(&normalized_edit_distances),
        exact_match_ratio: (batch_len > 0).then(|| exact_matches as f64 / batch_len as f64),
        character_error_rate: (batch_len > 0)
            .then(|| total_edits as f64 / truth_chars.max(1) as f64),
        edit_distances,
        normalized_edit_distances,
    })
}

pub(crate) fn check_batch_lengths(preds: usize, truths: usize) -> Result<(), OcrError> {
    if preds != truths {
        return Err(OcrError::invalid_input(format!(
            "prediction batch has {preds} entries but ground truth has {truths}"
        )));
    }
    Ok(())
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            let deletion = prev[j + 1] + 1;
            let insertion = curr[j] + 1;
            curr[j + 1] = substitution.min(deletion).min(insertion);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}
