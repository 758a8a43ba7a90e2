//! Session management
//!
//! [`Session`] binds one user identity to one transport and tracks the
//! connection state that transport reports.

mod manager;
mod state;

pub use manager::{ConnectionHandle, Session};
pub use state::{ConnectionState, Delivery, DropReason};
