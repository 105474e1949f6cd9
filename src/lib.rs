//! # Revsync Library
//!
//! Core functionality for the Google Business Profile review sync
//! service: connection status resolution, token lifecycle, review
//! reconciliation, and batch orchestration.

pub mod auth;
pub mod config;
pub mod crypto;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod orchestrator;
pub mod provider;
pub mod reconcile;
pub mod repositories;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod telemetry;
pub mod token;
pub use migration;
