//! Feature engineering, model training, and prediction.

pub mod features;
pub mod model;
pub mod predict;
pub mod registry;
pub mod scaler;
pub mod store;
pub mod train;
