//! # Gardi (Step-up MFA Assurance Engine)
//!
//! `gardi` is the step-up authentication assurance service for a
//! finance/subscription tracker whose records and identity primitives live at
//! an external platform. It decides whether a session is sufficiently
//! authenticated for sensitive operations, enforces the factor-strength
//! hierarchy and the cooling period when second factors are disabled, and
//! guarantees that credential-changing operations revoke prior sessions and
//! leave an audit trail.
//!
//! ## Assurance Model (AAL1 / AAL2)
//!
//! Sessions carry an Authentication Assurance Level: `AAL1` (password only)
//! or `AAL2` (password plus a verified second factor presented this session).
//! The level is always re-derived from the signed token claims, never from
//! cached client state, and every denial fails closed.
//!
//! - **Step-up:** a live AAL1 session upgrades to AAL2 by completing a factor
//!   challenge; it never downgrades implicitly.
//! - **Recovery sessions:** a session authenticated only by a one-time
//!   possession proof (`amr` exactly `[otp]`) is routed to credential reset
//!   and refused everywhere else.
//!
//! ## Factor Removal Policy
//!
//! Disabling a factor is blocked while a strictly stronger verified factor
//! remains on the account (hardware key > app code > SMS code > email code),
//! and removing the last verified factor is blocked for 24 hours after the
//! most recent MFA change. Both rules are evaluated from server-held state
//! and re-checked atomically at commit time.
//!
//! ## Security boundaries
//!
//! Passwords and factor codes are forwarded to the identity provider and are
//! never logged or stored here. Session revocation after a committed
//! credential change is mandatory; a failed revocation is surfaced as an
//! operation failure. Audit writes are best-effort and never gate the flow.

pub mod api;
pub mod assurance;
pub mod audit;
pub mod cli;
pub mod idp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
