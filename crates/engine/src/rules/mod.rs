mod rule;
mod store;

pub use rule::{AlertRule, Channel, Op, RuleError, Severity};
pub use store::{RuleFilter, RuleStore};
