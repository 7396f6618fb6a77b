//! API handlers for the assurance service.
//!
//! This module organizes the route handlers: the step-up auth endpoints,
//! the guarded profile endpoint, and the health/root plumbing.

pub mod auth;
pub mod health;
pub mod me;
pub mod root;
