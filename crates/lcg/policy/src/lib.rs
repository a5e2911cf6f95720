//! LCG authorization layer.
//!
//! Two independent gates guard every state transition:
//! - the pure role-action matrix (`can_perform`): may this *role* perform
//!   this kind of action at all;
//! - the entitlement authority: is this *user* entitled to the governance
//!   domain(s) the record belongs to.
//!
//! Domain entitlement applies only to submit/confirm/return. Reads are never
//! gated beyond authentication.

#![deny(unsafe_code)]
#![warn(rust_2018_idioms)]

mod authority;
mod matrix;

pub use authority::{EntitlementAuthority, PolicyError, PolicyResult};
pub use matrix::{can_perform, require_role};
