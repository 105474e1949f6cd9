//! # Data Models
//!
//! This module contains all the data models used throughout the revsync
//! service.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod connection;
pub mod location;
pub mod review;
pub mod sync_run;

pub use connection::Entity as Connection;
pub use location::Entity as Location;
pub use review::Entity as Review;
pub use sync_run::Entity as SyncRun;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "revsync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
