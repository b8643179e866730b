use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;

use crate::config::CrnnModelConfig;
use crate::dataset::image_io::read_image_tensor;
use crate::decoding::alphabet::Alphabet;
use crate::decoding::greedy::check_class_width;
use crate::error::OcrError;
use crate::pipeline::traits::{RuntimeBackend, SequenceDecoder};
use crate::scoring::edit_distance::{check_batch_lengths, score_batch, BatchScores};
use crate::types::{Hypothesis, ImageTensor, Prediction, ProbabilityTensor, Sample};

pub struct Recognizer {
    runtime_backend: Box<dyn RuntimeBackend>,
    decoder: Box<dyn SequenceDecoder>,
    alphabet: Arc<Alphabet>,
    model_cfg: CrnnModelConfig,
    batch_size: usize,
    max_label_len: usize,
}

pub(crate) struct RecognizerParts {
    pub runtime_backend: Box<dyn RuntimeBackend>,
    pub decoder: Box<dyn SequenceDecoder>,
    pub alphabet: Arc<Alphabet>,
    pub model_cfg: CrnnModelConfig,
    pub batch_size: usize,
    pub max_label_len: usize,
}

impl Recognizer {
    pub(crate) fn from_parts(parts: RecognizerParts) -> Self {
        Self {
            runtime_backend: parts.runtime_backend,
            decoder: parts.decoder,
            alphabet: parts.alphabet,
            model_cfg: parts.model_cfg,
            batch_size: parts.batch_size,
            max_label_len: parts.max_label_len,
        }
    }

    pub fn alphabet(&self) -> &Alphabet {
        &self.alphabet
    }

    pub fn model_config(&self) -> &CrnnModelConfig {
        &self.model_cfg
    }

    pub fn max_label_len(&self) -> usize {
        self.max_label_len
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn device_label(&self) -> String {
        self.runtime_backend.device_label()
    }

    pub fn decoder_name(&self) -> &'static str {
        self.decoder.name()
    }

    /// Runs the model on one batch and decodes every output.
    pub fn predict_batch(&self, images: &[ImageTensor]) -> Result<Vec<Hypothesis>, OcrError> {
        if images.is_empty() {
            return Ok(Vec::new());
        }

        let mut batch = self.runtime_backend.infer(images)?;
        if batch.len() != images.len() {
            return Err(OcrError::invalid_input(format!(
                "model returned {} outputs for {} images",
                batch.len(),
                images.len()
            )));
        }

        let expected_timesteps = self.model_cfg.expected_timesteps();
        if let Some(tensor) = batch.iter().find(|t| t.timesteps() != expected_timesteps) {
            tracing::warn!(
                expected = expected_timesteps,
                actual = tensor.timesteps(),
                "model output timesteps differ from img_width / downsample_factor"
            );
        }

        if self.model_cfg.outputs_logits {
            batch.par_iter_mut().for_each(softmax_rows);
        }

        decode_batch(
            self.decoder.as_ref(),
            self.alphabet.num_classes(),
            &batch,
        )
    }

    /// Reads, predicts and decodes `samples` in chunks of `batch_size`.
    ///
    /// `on_batch` sees each chunk's predictions as soon as they are decoded.
    pub fn predict_samples<F>(
        &self,
        samples: &[Sample],
        mut on_batch: F,
    ) -> Result<Vec<Prediction>, OcrError>
    where
        F: FnMut(&[Prediction]) -> Result<(), OcrError>,
    {
        let (height, width) = (self.model_cfg.img_height, self.model_cfg.img_width);
        let started = Instant::now();
        let mut predictions = Vec::with_capacity(samples.len());

        for (batch_idx, chunk) in samples.chunks(self.batch_size).enumerate() {
            let batch_started = Instant::now();
            let images = chunk
                .par_iter()
                .map(|sample| read_image_tensor(&sample.path, height, width))
                .collect::<Result<Vec<_>, _>>()?;
            let read_ms = batch_started.elapsed().as_secs_f64() * 1000.0;

            let hypotheses = self.predict_batch(&images)?;
            let batch_predictions: Vec<Prediction> = chunk
                .iter()
                .zip(hypotheses)
                .map(|(sample, hypothesis)| Prediction {
                    source: sample.path.display().to_string(),
                    text: hypothesis.text,
                })
                .collect();

            tracing::debug!(
                batch = batch_idx,
                size = chunk.len(),
                read_ms,
                total_ms = batch_started.elapsed().as_secs_f64() * 1000.0,
                "batch predicted"
            );
            on_batch(&batch_predictions)?;
            predictions.extend(batch_predictions);
        }

        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;
        let ms_per_sample = elapsed_ms / predictions.len().max(1) as f64;
        tracing::info!(
            samples = predictions.len(),
            elapsed_ms,
            ms_per_sample,
            "prediction finished"
        );
        Ok(predictions)
    }

    /// Ground-truth text for each sample, normalized the way the model sees
    /// it: case-folded, truncated to `max_label_len`.
    ///
    /// Unlabelled samples and labels with characters outside the alphabet are
    /// `None`.
    pub fn ground_truth(&self, samples: &[Sample]) -> Vec<Option<String>> {
        samples
            .iter()
            .map(|sample| {
                let label = sample.label.as_deref()?;
                match self.alphabet.encode_label(label, self.max_label_len) {
                    Ok(encoded) => Some(self.alphabet.labels_to_text(&encoded)),
                    Err(err) => {
                        tracing::warn!(
                            path = %sample.path.display(),
                            error = %err,
                            "skipping sample with unusable label"
                        );
                        None
                    }
                }
            })
            .collect()
    }

    /// Keeps the samples whose label survives [`Recognizer::ground_truth`],
    /// paired with that label.
    pub fn labelled_samples(&self, samples: Vec<Sample>) -> (Vec<Sample>, Vec<String>) {
        let truths = self.ground_truth(&samples);
        samples
            .into_iter()
            .zip(truths)
            .filter_map(|(sample, truth)| truth.map(|truth| (sample, truth)))
            .unzip()
    }

    pub fn validate(
        &self,
        predictions: &[Prediction],
        truths: &[String],
    ) -> Result<BatchScores, OcrError> {
        check_batch_lengths(predictions.len(), truths.len())?;
        let texts: Vec<&str> = predictions.iter().map(|p| p.text.as_str()).collect();
        score_batch(&texts, truths)
    }
}

/// Decodes each tensor of a batch in parallel, preserving order.
///
/// Every tensor is checked against `num_classes` before any decoding starts.
pub fn decode_batch(
    decoder: &dyn SequenceDecoder,
    num_classes: usize,
    batch: &[ProbabilityTensor],
) -> Result<Vec<Hypothesis>, OcrError> {
    for (i, tensor) in batch.iter().enumerate() {
        check_class_width(tensor, num_classes).map_err(|err| {
            OcrError::invalid_input(format!("batch item {i}: {err}"))
        })?;
    }
    batch
        .par_iter()
        .map(|tensor| decoder.decode(tensor))
        .collect()
}

fn softmax_rows(tensor: &mut ProbabilityTensor) {
    for row in &mut tensor.rows {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        if !max.is_finite() {
            continue;
        }
        let mut sum = 0.0f32;
        for value in row.iter_mut() {
            *value = (*value - max).exp();
            sum += *value;
        }
        if sum > 0.0 {
            for value in row.iter_mut() {
                *value /= sum;
            }
        }
    }
}
