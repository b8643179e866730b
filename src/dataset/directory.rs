use std::fs;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::dataset::DatasetLoader;
use crate::error::OcrError;
use crate::types::Sample;

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpeg", "jpg"];
const VALIDATION_FRACTION: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectorySplit {
    All,
    /// Shuffle with `seed` and keep the last tenth.
    Validation { seed: u64 },
}

/// Recursively collects images under a directory.
///
/// The label of `<prefix>_<label>.png` is `<label>`; a stem without `_` is
/// used whole.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    root: PathBuf,
    split: DirectorySplit,
}

impl DirectoryLoader {
    pub fn new(root: impl Into<PathBuf>, split: DirectorySplit) -> Self {
        Self {
            root: root.into(),
            split,
        }
    }
}

impl DatasetLoader for DirectoryLoader {
    fn load_samples(&self) -> Result<Vec<Sample>, OcrError> {
        let mut paths = Vec::new();
        collect_image_files(&self.root, &mut paths)?;
        paths.sort();

        if let DirectorySplit::Validation { seed } = self.split {
            let mut rng = StdRng::seed_from_u64(seed);
            paths.shuffle(&mut rng);
            let start = (paths.len() as f64 * (1.0 - VALIDATION_FRACTION)) as usize;
            paths.drain(..start);
        }

        tracing::debug!(
            count = paths.len(),
            root = %self.root.display(),
            "collected image files"
        );
        Ok(paths
            .into_iter()
            .map(|path| {
                let label = label_from_file_name(&path);
                Sample { path, label }
            })
            .collect())
    }
}

pub fn label_from_file_name(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let label = stem.split_once('_').map_or(stem, |(_, rest)| rest);
    (!label.is_empty()).then(|| label.to_string())
}

fn collect_image_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), OcrError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| OcrError::io(format!("read directory '{}'", dir.display()), err))?;
    for entry in entries {
        let entry = entry.map_err(|err| {
            OcrError::io(format!("read directory entry in '{}'", dir.display()), err)
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_image_files(&path, out)?;
            continue;
        }
        if path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
        {
            out.push(path);
        }
    }
    Ok(())
}
