mod anomalies;
mod devices;
mod health;
mod metrics;
mod predictions;
mod readings;
mod router;
mod rules;

pub use router::{router, AppState};
