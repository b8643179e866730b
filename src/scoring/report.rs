use std::cmp::Ordering;

use serde::Serialize;

use crate::error::OcrError;
use crate::scoring::edit_distance::{check_batch_lengths, edit_distance, normalized_edit_distance};
use crate::types::Prediction;

const OUTLIER_TOP_N: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub schema_version: u32,
    pub meta: Meta,
    pub samples: Vec<SampleReport>,
    pub aggregates: AggregateReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meta {
    pub generated_at: String,
    pub model_path: String,
    pub device: String,
    pub decoder: String,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReport {
    pub id: String,
    pub predicted: String,
    pub truth: String,
    pub edit_distance: u32,
    pub normalized_edit_distance: f32,
    pub exact_match: bool,
    pub predicted_len: u32,
    pub truth_len: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AggregateReport {
    pub count: u32,
    pub exact_matches: u32,
    pub mean_edit_distance: Option<f32>,
    pub mean_normalized_edit_distance: Option<f32>,
    pub exact_match_ratio: Option<f32>,
    pub character_error_rate: Option<f32>,
    pub edit_distance: Option<MetricDistribution>,
    pub normalized_edit_distance: Option<MetricDistribution>,
    pub outliers: Vec<OutlierEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDistribution {
    pub mean: f32,
    pub p50: f32,
    pub p90: f32,
    pub p95: f32,
    pub p99: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutlierEntry {
    pub id: String,
    pub value: f32,
}

pub fn compute_sample_report(
    id: &str,
    predicted: &str,
    truth: &str,
) -> Result<SampleReport, OcrError> {
    let distance = edit_distance(predicted, truth);
    let normalized = normalized_edit_distance(predicted, truth);
    Ok(SampleReport {
        id: id.to_string(),
        predicted: predicted.to_string(),
        truth: truth.to_string(),
        edit_distance: to_u32(distance),
        normalized_edit_distance: checked_f32(normalized, "normalized_edit_distance")?,
        exact_match: predicted == truth,
        predicted_len: to_u32(predicted.chars().count()),
        truth_len: to_u32(truth.chars().count()),
    })
}

/// Pairs predictions with ground truth by position.
pub fn compute_sample_reports(
    predictions: &[Prediction],
    truths: &[String],
) -> Result<Vec<SampleReport>, OcrError> {
    check_batch_lengths(predictions.len(), truths.len())?;
    predictions
        .iter()
        .zip(truths)
        .map(|(prediction, truth)| compute_sample_report(&prediction.source, &prediction.text, truth))
        .collect()
}

pub fn aggregate_reports(samples: &[SampleReport]) -> AggregateReport {
    let distances: Vec<f64> = samples.iter().map(|s| s.edit_distance as f64).collect();
    let normalized: Vec<f64> = samples
        .iter()
        .map(|s| s.normalized_edit_distance as f64)
        .collect();
    let exact_matches = samples.iter().filter(|s| s.exact_match).count();
    let total_edits: f64 = distances.iter().sum();
    let truth_chars: u64 = samples.iter().map(|s| s.truth_len as u64).sum();

    let non_empty = !samples.is_empty();
    AggregateReport {
        count: to_u32(samples.len()),
        exact_matches: to_u32(exact_matches),
        mean_edit_distance: non_empty
            .then(|| checked_f32(mean(&distances), "mean_edit_distance").ok())
            .flatten(),
        mean_normalized_edit_distance: non_empty
            .then(|| checked_f32(mean(&normalized), "mean_normalized_edit_distance").ok())
            .flatten(),
        exact_match_ratio: non_empty
            .then(|| exact_matches as f32 / samples.len() as f32),
        character_error_rate: non_empty
            .then(|| checked_f32(total_edits / truth_chars.max(1) as f64, "cer").ok())
            .flatten(),
        edit_distance: distribution_or_none(&distances),
        normalized_edit_distance: distribution_or_none(&normalized),
        outliers: worst_outliers(samples, OUTLIER_TOP_N),
    }
}

/// Samples with the highest normalized edit distance, ties ordered by id.
/// Exact matches are never outliers.
pub fn worst_outliers(samples: &[SampleReport], top_n: usize) -> Vec<OutlierEntry> {
    let mut entries: Vec<OutlierEntry> = samples
        .iter()
        .filter(|sample| !sample.exact_match)
        .map(|sample| OutlierEntry {
            id: sample.id.clone(),
            value: sample.normalized_edit_distance,
        })
        .collect();

    entries.sort_by(|a, b| {
        b.value
            .partial_cmp(&a.value)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    entries.truncate(top_n);
    entries
}

fn distribution_or_none(values: &[f64]) -> Option<MetricDistribution> {
    if values.is_empty() {
        return None;
    }

    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    Some(MetricDistribution {
        mean: checked_f32(mean(&sorted), "aggregate.mean").ok()?,
        p50: checked_f32(percentile_sorted(&sorted, 0.5), "aggregate.p50").ok()?,
        p90: checked_f32(percentile_sorted(&sorted, 0.9), "aggregate.p90").ok()?,
        p95: checked_f32(percentile_sorted(&sorted, 0.95), "aggregate.p95").ok()?,
        p99: checked_f32(percentile_sorted(&sorted, 0.99), "aggregate.p99").ok()?,
    })
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn percentile_sorted(sorted_values: &[f64], percentile: f64) -> f64 {
    if sorted_values.is_empty() {
        return 0.0;
    }
    if sorted_values.len() == 1 {
        return sorted_values[0];
    }

    let clamped = percentile.clamp(0.0, 1.0);
    let max_index = (sorted_values.len() - 1) as f64;
    let rank = clamped * max_index;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        sorted_values[lower]
    } else {
        let weight = rank - lower as f64;
        sorted_values[lower] * (1.0 - weight) + sorted_values[upper] * weight
    }
}

fn to_u32(value: usize) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn checked_f32(value: f64, metric_name: &str) -> Result<f32, OcrError> {
    if !value.is_finite() {
        return Err(OcrError::invalid_input(format!(
            "metric '{metric_name}' produced non-finite value: {value}"
        )));
    }
    if value < f32::MIN as f64 || value > f32::MAX as f64 {
        return Err(OcrError::invalid_input(format!(
            "metric '{metric_name}' out of f32 range: {value}"
        )));
    }
    Ok(value as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(source: &str, text: &str) -> Prediction {
        Prediction {
            source: source.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn sample_report_fields() {
        let report = compute_sample_report("img_1", "dog", "dot").expect("finite metrics");
        assert_eq!(report.edit_distance, 1);
        assert!((report.normalized_edit_distance - 1.0 / 3.0).abs() < 1e-6);
        assert!(!report.exact_match);
        assert_eq!(report.predicted_len, 3);
        assert_eq!(report.truth_len, 3);
    }

    #[test]
    fn aggregates_cat_dog_batch() {
        let predictions = vec![prediction("a.png", "cat"), prediction("b.png", "dog")];
        let truths = vec!["cat".to_string(), "dot".to_string()];
        let samples = compute_sample_reports(&predictions, &truths).expect("equal lengths");
        let aggregates = aggregate_reports(&samples);
        assert_eq!(aggregates.count, 2);
        assert_eq!(aggregates.exact_matches, 1);
        assert_eq!(aggregates.mean_edit_distance, Some(0.5));
        let mean_norm = aggregates.mean_normalized_edit_distance.expect("non-empty");
        assert!((mean_norm - 0.16667).abs() < 1e-4);
        assert_eq!(aggregates.exact_match_ratio, Some(0.5));
        assert_eq!(aggregates.outliers.len(), 1);
        assert_eq!(aggregates.outliers[0].id, "b.png");
    }

    #[test]
    fn empty_reports_have_no_metrics() {
        let aggregates = aggregate_reports(&[]);
        assert_eq!(aggregates.count, 0);
        assert_eq!(aggregates.mean_edit_distance, None);
        assert_eq!(aggregates.exact_match_ratio, None);
        assert!(aggregates.edit_distance.is_none());
        assert!(aggregates.outliers.is_empty());
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let predictions = vec![prediction("a.png", "cat")];
        assert!(compute_sample_reports(&predictions, &[]).is_err());
    }

    #[test]
    fn outliers_sorted_by_value_then_id() {
        let samples: Vec<SampleReport> = [("c", "ab", "xy"), ("a", "ab", "xy"), ("b", "ab", "ax")]
            .iter()
            .map(|(id, p, t)| compute_sample_report(id, p, t).expect("finite"))
            .collect();
        let outliers = worst_outliers(&samples, 2);
        let ids: Vec<&str> = outliers.iter().map(|o| o.id.as_str()).collect();
        assert_eq!(ids, ["a", "c"]);
    }

    #[test]
    fn percentile_interpolates_linearly() {
        let sorted = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(percentile_sorted(&sorted, 0.5), 2.0);
        assert!((percentile_sorted(&sorted, 0.9) - 3.6).abs() < 1e-12);
        assert_eq!(percentile_sorted(&[7.0], 0.99), 7.0);
    }

    #[test]
    fn report_serializes_to_json() {
        let samples = vec![compute_sample_report("x", "ab", "ab").expect("finite")];
        let report = ValidationReport {
            schema_version: 1,
            meta: Meta {
                generated_at: "2024-01-01T00:00:00Z".to_string(),
                model_path: "models/crnn".to_string(),
                device: "cpu".to_string(),
                decoder: "greedy".to_string(),
                sample_count: samples.len(),
            },
            aggregates: aggregate_reports(&samples),
            samples,
        };
        let json = serde_json::to_value(&report).expect("serializable");
        assert_eq!(json["aggregates"]["exact_matches"], 1);
        assert_eq!(json["samples"][0]["exact_match"], true);
    }
}
