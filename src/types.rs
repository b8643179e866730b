use std::path::PathBuf;

use serde::Serialize;

use crate::error::OcrError;

/// Padding value for label positions past the end of a transcription.
pub const LABEL_PAD: i32 = -1;

/// Per-timestep class probabilities produced by the model for one image.
///
/// Rows are timesteps; every row holds one probability per alphabet class,
/// blank included.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbabilityTensor {
    pub rows: Vec<Vec<f32>>,
}

impl ProbabilityTensor {
    pub fn new(rows: Vec<Vec<f32>>) -> Self {
        Self { rows }
    }

    /// Builds a tensor whose every row puts all mass on the class of `path`.
    pub fn one_hot(path: &[usize], num_classes: usize) -> Result<Self, OcrError> {
        path.iter()
            .map(|&class| {
                if class >= num_classes {
                    return Err(OcrError::invalid_input(format!(
                        "class {class} is out of range for {num_classes} classes"
                    )));
                }
                let mut row = vec![0.0f32; num_classes];
                row[class] = 1.0;
                Ok(row)
            })
            .collect::<Result<_, _>>()
            .map(Self::new)
    }

    pub fn timesteps(&self) -> usize {
        self.rows.len()
    }

    /// Class count of the first row, `None` for an empty tensor.
    pub fn num_classes(&self) -> Option<usize> {
        self.rows.first().map(Vec::len)
    }
}

pub type ProbabilityBatch = Vec<ProbabilityTensor>;

/// Ground-truth class indices padded to a fixed length with [`LABEL_PAD`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSequence {
    pub padded: Vec<i32>,
    pub length: usize,
}

impl LabelSequence {
    /// The unpadded class indices.
    pub fn classes(&self) -> impl Iterator<Item = usize> + '_ {
        self.padded
            .iter()
            .take(self.length)
            .filter(|&&id| id >= 0)
            .map(|&id| id as usize)
    }
}

/// Single-channel normalized image, row-major, values in `[0, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub height: usize,
    pub width: usize,
    pub pixels: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub path: PathBuf,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prediction {
    pub source: String,
    pub text: String,
}

/// A decoded string with the score the decoder assigned to it.
///
/// Beam search reports the log-probability of the prefix; best-path decoding
/// reports the mean of the per-timestep maximum probabilities.
#[derive(Debug, Clone, PartialEq)]
pub struct Hypothesis {
    pub text: String,
    pub score: f32,
}
