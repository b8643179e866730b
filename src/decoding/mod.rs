//! CTC decoding of per-timestep class probabilities into text.

pub mod alphabet;
pub mod beam;
pub mod greedy;

pub use alphabet::{Alphabet, BlankPosition};
pub use beam::{decode_beam_search, prefix_beam_search, BeamSearchOptions};
pub use greedy::{best_path, collapse_ctc_path, decode_best_path};
