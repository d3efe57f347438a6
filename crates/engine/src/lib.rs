pub mod config;
pub mod evaluator;
pub mod harness;
pub mod ingress;
pub mod lifecycle;
pub mod metrics;
pub mod notifier;
pub mod predictor;
pub mod query;
pub mod reading;
pub mod rules;
pub mod runtime;
pub mod storage;
