use crate::error::OcrError;
use crate::types::{Hypothesis, ImageTensor, Prediction, ProbabilityBatch, ProbabilityTensor};

/// The model: a batch of normalized images in, one probability tensor per
/// image out.
pub trait RuntimeBackend: Send + Sync {
    fn infer(&self, images: &[ImageTensor]) -> Result<ProbabilityBatch, OcrError>;

    fn device_label(&self) -> String;
}

pub trait SequenceDecoder: Send + Sync {
    /// Best hypothesis for one tensor.
    fn decode(&self, tensor: &ProbabilityTensor) -> Result<Hypothesis, OcrError>;

    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;
}

/// Consumer of `(source, predicted text)` rows.
pub trait ResultSink {
    fn write_predictions(&mut self, predictions: &[Prediction]) -> Result<(), OcrError>;
}
