//! Authentication and session security for privileged operator accounts.
//!
//! The core ([`auth`]) is transport-agnostic and talks to the outside world
//! through four seams: [`identity::IdentityRepository`],
//! [`store::ExpiringKeyValueStore`], [`notify::Notifier`], and
//! [`auth::AuditSink`]. The [`api`] module serves the HTTP boundary and
//! [`cli`] wires configuration and telemetry.

pub mod api;
pub mod auth;
pub mod cli;
pub mod identity;
pub mod notify;
pub mod store;
