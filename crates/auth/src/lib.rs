//! `shopdesk-auth`: role-based access boundary.
//!
//! Every mutating or printing operation is classified as an [`Action`]; each
//! action requires one [`Permission`]; each [`Role`] grants a fixed set of
//! permissions. The [`AccessPolicy`] holds which role (group) each account is in
//! and answers `check(actor, action)` before the service touches any state.
//!
//! Group membership only changes through explicit calls
//! (`assign_initial_group` when an account is created, `reassign_role` when an
//! employee's role changes).

pub mod authorize;
pub mod permissions;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AuthzError, authorize};
pub use permissions::{Action, Permission};
pub use policy::{AccessPolicy, InMemoryAccessPolicy};
pub use principal::{Actor, Principal};
pub use roles::Role;
