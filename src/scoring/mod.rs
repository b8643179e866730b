pub mod edit_distance;
pub mod report;

pub use edit_distance::{
    edit_distance, mean_edit_distance, mean_normalized_edit_distance, normalized_edit_distance,
    score_batch, BatchScores,
};
