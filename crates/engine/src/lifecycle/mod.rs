mod anomaly;
mod manager;
mod store;

pub use anomaly::{Anomaly, AnomalySource, AnomalyStatus, LifecycleError};
pub use manager::{LifecycleManager, LifecycleUpdate};
pub use store::AnomalyStore;
