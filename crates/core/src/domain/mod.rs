pub mod prediction;
pub mod score;
pub mod snapshot;
