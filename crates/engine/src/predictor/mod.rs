mod component;
mod scorer;
mod store;
mod trend;

pub use component::Component;
pub use scorer::{Prediction, PredictionTable, PredictiveScorer};
pub use store::PredictionStore;
pub use trend::{analyze, linear_fit, Trend};
