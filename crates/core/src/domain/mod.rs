pub mod decision;
pub mod expense;
pub mod policy;
pub mod user;
