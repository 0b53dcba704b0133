//! Workflow services over the database.
//!
//! Handlers call into these; each operation checks access through
//! [`Principal`](crate::engine::Principal), applies the rules in
//! [`engine`](crate::engine) and persists the result.

pub mod cleanup;
pub mod directory;
pub mod error;
pub mod registration;
pub mod tickets;
pub mod validation;

pub use directory::Directory;
pub use error::{ServiceError, ServiceResult};
pub use registration::RoleRequestWorkflow;
pub use tickets::TicketStore;
