pub mod config;
pub mod dataset;
pub mod decoding;
pub mod error;
pub mod export;
pub mod pipeline;
pub mod scoring;
pub mod types;

pub use config::{CrnnConfig, CrnnModelConfig, DecodeStrategy};
pub use dataset::{
    read_image_tensor, sample_instances, DatasetLoader, DirectoryLoader, DirectorySplit,
    MjsynthLoader,
};
pub use decoding::{Alphabet, BeamSearchOptions, BlankPosition};
pub use error::OcrError;
pub use export::CsvResultSink;
pub use pipeline::builder::RecognizerBuilder;
pub use pipeline::defaults::{BeamSearchCtcDecoder, GreedyCtcDecoder};
pub use pipeline::runtime::{decode_batch, Recognizer};
pub use pipeline::traits::{ResultSink, RuntimeBackend, SequenceDecoder};
pub use scoring::report::{
    aggregate_reports, compute_sample_report, compute_sample_reports, AggregateReport, Meta,
    SampleReport, ValidationReport,
};
pub use scoring::{edit_distance, normalized_edit_distance, score_batch, BatchScores};
pub use types::{
    Hypothesis, ImageTensor, LabelSequence, Prediction, ProbabilityBatch, ProbabilityTensor,
    Sample, LABEL_PAD,
};
