//! Skymeter Gateway API Library
//!
//! This crate provides library components for the skymeter API server:
//! the account store, plan catalog, usage accounting ledger, authentication
//! gate, the upstream weather collaborator, and the axum route handlers.

pub mod accounts;
pub mod auth;
pub mod notify;
pub mod plans;
pub mod routes;
pub mod usage;
pub mod weather;
