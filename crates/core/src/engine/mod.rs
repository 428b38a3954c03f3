pub mod chain;
pub mod eligibility;
pub mod resolver;
pub mod state;
