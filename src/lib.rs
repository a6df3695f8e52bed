//! Role-based clinical record and prescription routing core.
//!
//! Doctors author medical records and prescriptions and dispatch them to
//! pharmacies; pharmacists progress prescriptions through the fixed
//! dispensing workflow CREATED → RECEIVED → DISPENSING → COMPLETED. The
//! crate is the synchronous domain core a transport layer would call into:
//! callers arrive as an [`auth::Identity`] from an external authentication
//! boundary and every operation resolves it to exactly one role-scoped
//! profile before touching data.

pub mod accounts;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod prescriptions;
pub mod records;
pub mod views;

use tracing_subscriber::EnvFilter;

/// Initialize tracing for a host binary. RUST_LOG wins when set.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();
}
