//! Thin client for the Synapse REST API, grouped by resource.

pub mod auth;
pub mod client;
pub mod engagement;
pub mod notifications;
pub mod presence;

pub use client::{ApiClient, AuthEvent};
