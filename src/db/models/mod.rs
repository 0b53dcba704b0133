//! Database models split into domain-specific modules.

pub mod common;
pub mod registration;
pub mod ticket;
pub mod user;

pub use common::*;
pub use registration::*;
pub use ticket::*;
pub use user::*;
