//! Sample discovery and image reading.

pub mod directory;
pub mod image_io;
pub mod mjsynth;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::OcrError;
use crate::types::Sample;

pub use directory::{DirectoryLoader, DirectorySplit};
pub use image_io::read_image_tensor;
pub use mjsynth::MjsynthLoader;

pub trait DatasetLoader: Send + Sync {
    fn load_samples(&self) -> Result<Vec<Sample>, OcrError>;
}

/// Seeded random subset of at most `n` samples, in shuffled order.
pub fn sample_instances(mut samples: Vec<Sample>, n: usize, seed: u64) -> Vec<Sample> {
    if n >= samples.len() {
        return samples;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let (chosen, _) = samples.partial_shuffle(&mut rng, n);
    chosen.to_vec()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    fn samples(n: usize) -> Vec<Sample> {
        (0..n)
            .map(|i| Sample {
                path: PathBuf::from(format!("{i}.png")),
                label: None,
            })
            .collect()
    }

    #[test]
    fn sample_instances_is_seeded() {
        let a = sample_instances(samples(50), 10, 7);
        let b = sample_instances(samples(50), 10, 7);
        assert_eq!(a.len(), 10);
        assert_eq!(a, b);
    }

    #[test]
    fn sample_instances_without_replacement() {
        let picked = sample_instances(samples(20), 20, 1);
        assert_eq!(picked.len(), 20);
        let mut picked = sample_instances(samples(20), 15, 1);
        picked.sort_by(|a, b| a.path.cmp(&b.path));
        picked.dedup();
        assert_eq!(picked.len(), 15);
    }

    #[test]
    fn sample_instances_keeps_small_sets() {
        assert_eq!(sample_instances(samples(3), 10, 42).len(), 3);
    }
}
