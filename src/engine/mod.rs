//! Pure workflow rules: routing, SLA windows, the status graph and access checks.
//!
//! Nothing in here touches the database; the services layer loads records and
//! asks these modules what is allowed.

pub mod access;
pub mod assignment;
pub mod lifecycle;
pub mod sla;

pub use access::Principal;
pub use assignment::{suggested_department, Department};
pub use lifecycle::TransitionKind;
pub use sla::{is_overdue, SlaPolicy};
