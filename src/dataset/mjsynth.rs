use std::path::{Path, PathBuf};

use crate::dataset::DatasetLoader;
use crate::error::OcrError;
use crate::types::Sample;

/// Reads an mjsynth annotation file.
///
/// Each line is `./<dir>/<dir>/<n>_<WORD>_<lexicon id>.jpg <lexicon id>`; the
/// label is the `<WORD>` field of the file name.
#[derive(Debug, Clone)]
pub struct MjsynthLoader {
    root: PathBuf,
    annotation_file: PathBuf,
}

impl MjsynthLoader {
    /// `annotation_file` is resolved against `root` when relative.
    pub fn new(root: impl Into<PathBuf>, annotation_file: impl AsRef<Path>) -> Self {
        let root = root.into();
        let annotation_file = root.join(annotation_file);
        Self {
            root,
            annotation_file,
        }
    }
}

impl DatasetLoader for MjsynthLoader {
    fn load_samples(&self) -> Result<Vec<Sample>, OcrError> {
        let contents = std::fs::read_to_string(&self.annotation_file).map_err(|e| {
            OcrError::io(
                format!("read annotation file '{}'", self.annotation_file.display()),
                e,
            )
        })?;

        let mut samples = Vec::new();
        for (line_no, raw_line) in contents.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(relative) = line.split_whitespace().next() else {
                continue;
            };
            let label = parse_mjsynth_label(relative).ok_or_else(|| {
                OcrError::invalid_input(format!(
                    "malformed mjsynth entry at line {} of '{}': {relative:?}",
                    line_no + 1,
                    self.annotation_file.display()
                ))
            })?;
            let relative = relative.strip_prefix("./").unwrap_or(relative);
            samples.push(Sample {
                path: self.root.join(relative),
                label: Some(label),
            });
        }

        tracing::debug!(
            count = samples.len(),
            annotation = %self.annotation_file.display(),
            "loaded mjsynth annotations"
        );
        Ok(samples)
    }
}

/// `<n>_<WORD>_<id>.jpg` -> `WORD`.
pub fn parse_mjsynth_label(path: &str) -> Option<String> {
    let stem = Path::new(path).file_stem()?.to_str()?;
    let mut fields = stem.split('_');
    let _index = fields.next()?;
    let word = fields.next()?;
    fields.next()?;
    (!word.is_empty()).then(|| word.to_string())
}
