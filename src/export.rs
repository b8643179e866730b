use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::OcrError;
use crate::pipeline::traits::ResultSink;
use crate::types::Prediction;

pub const PREDICTION_FILE_NAME: &str = "prediction.csv";

/// Writes `,fname,prediction` rows with a leading row index.
pub struct CsvResultSink<W: Write> {
    writer: csv::Writer<W>,
    next_index: usize,
    header_written: bool,
}

impl CsvResultSink<File> {
    /// Creates `<dir>/prediction.csv`, making `dir` if needed.
    pub fn create_in_dir(dir: &Path) -> Result<(Self, PathBuf), OcrError> {
        fs::create_dir_all(dir).map_err(|e| {
            OcrError::io(format!("create result directory '{}'", dir.display()), e)
        })?;
        let path = dir.join(PREDICTION_FILE_NAME);
        let file = File::create(&path)
            .map_err(|e| OcrError::io(format!("create '{}'", path.display()), e))?;
        Ok((Self::from_writer(file), path))
    }
}

impl<W: Write> CsvResultSink<W> {
    pub fn from_writer(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
            next_index: 0,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> Result<W, OcrError> {
        self.writer
            .into_inner()
            .map_err(|e| OcrError::io("flush prediction csv", e.into_error()))
    }
}

impl<W: Write> ResultSink for CsvResultSink<W> {
    fn write_predictions(&mut self, predictions: &[Prediction]) -> Result<(), OcrError> {
        if !self.header_written {
            self.writer
                .write_record(["", "fname", "prediction"])
                .map_err(|e| OcrError::csv("write prediction header", e))?;
            self.header_written = true;
        }
        for prediction in predictions {
            let index = self.next_index.to_string();
            self.writer
                .write_record([
                    index.as_str(),
                    prediction.source.as_str(),
                    prediction.text.as_str(),
                ])
                .map_err(|e| OcrError::csv("write prediction row", e))?;
            self.next_index += 1;
        }
        self.writer
            .flush()
            .map_err(|e| OcrError::io("flush prediction csv", e))
    }
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
    fn writes_indexed_rows_across_calls() {
        let mut sink = CsvResultSink::from_writer(Vec::new());
        sink.write_predictions(&[prediction("a.png", "cat")]).unwrap();
        sink.write_predictions(&[prediction("b.png", "d,og")]).unwrap();
        let bytes = sink.into_inner().unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, ",fname,prediction\n0,a.png,cat\n1,b.png,\"d,og\"\n");
    }

    #[test]
    fn empty_batch_writes_header_only() {
        let mut sink = CsvResultSink::from_writer(Vec::new());
        sink.write_predictions(&[]).unwrap();
        let text = String::from_utf8(sink.into_inner().unwrap()).unwrap();
        assert_eq!(text, ",fname,prediction\n");
    }

    #[test]
    fn creates_file_in_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let out_dir = dir.path().join("results");
        let (mut sink, path) = CsvResultSink::create_in_dir(&out_dir).expect("creatable");
        sink.write_predictions(&[prediction("x.jpg", "")]).unwrap();
        drop(sink);
        assert_eq!(path, out_dir.join(PREDICTION_FILE_NAME));
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.ends_with("0,x.jpg,\"\"\n") || text.ends_with("0,x.jpg,\n"));
    }
}
