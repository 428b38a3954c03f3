pub mod connection;
pub mod fixtures;
pub mod migrations;
pub mod repositories;
pub mod service;

pub use connection::{connect, connect_with_settings, DbPool};
pub use fixtures::DemoDataset;
pub use service::{ApprovalService, PendingApproval, ServiceError};
