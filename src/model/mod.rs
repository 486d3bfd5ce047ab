//! Core entities shared across every component.
//!
//! Identifiers are opaque UUIDs; entities carry only the ids of the rows
//! they relate to, never materialized object graphs. Components pass ids
//! through layers and dereference at the leaves via the repository traits
//! in [`crate::repository`].

pub mod assignment;
pub mod audit_event;
pub mod landlord;
pub mod permission;
pub mod policy;
pub mod reset_token;
pub mod role;
pub mod session;
pub mod tenant;
pub mod user;

pub use assignment::{PermissionAssignment, RoleAssignment};
pub use audit_event::AuditEvent;
pub use landlord::Landlord;
pub use permission::Permission;
pub use policy::{Effect, Policy};
pub use reset_token::ResetToken;
pub use role::Role;
pub use session::Session;
pub use tenant::Tenant;
pub use user::User;

use uuid::Uuid;

/// Opaque 128-bit identifier used by every entity in the data model.
pub type Id = Uuid;

/// Generate a fresh opaque identifier.
pub fn new_id() -> Id {
    Uuid::new_v4()
}
