//! Repository layer
//!
//! Encapsulates SeaORM operations per table, keeping handlers and the
//! orchestrator free of query-building details.

pub mod connection;
pub mod location;
pub mod review;
pub mod sync_run;

pub use connection::ConnectionRepository;
pub use location::LocationRepository;
pub use review::ReviewRepository;
pub use sync_run::SyncRunRepository;
