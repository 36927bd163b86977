//! Harvester - bulk collector for a public repository catalogue.
//!
//! The library pages through the upstream search index, fetches the detail
//! record of every repository under a shared request rate, and upserts the
//! results into a SQL store keyed by upstream id.
//!
//! # Features
//!
//! - `sqlite` / `postgres` - Database backends.
//! - `migrate` - Enables database migration support. When enabled, you can use
//!   [`connect_and_migrate`] to create the schema on connection.
//!
//! # Example
//!
//! ```ignore
//! use harvester::{connect_and_migrate, repository};
//!
//! let db = connect_and_migrate("sqlite://harvest.db?mode=rwc").await?;
//! let top = repository::top_by_stars(&db, 10).await?;
//! ```

pub mod db;
pub mod entity;
pub mod export;
pub mod harvest;
pub mod http;
pub mod rate_limit;
pub mod repository;
pub mod retry;
pub mod server;
pub mod shutdown;
pub mod upstream;

#[cfg(feature = "migrate")]
pub mod migration;

#[cfg(test)]
mod test_support;

pub use db::connect;
#[cfg(feature = "migrate")]
pub use db::connect_and_migrate;
pub use entity::prelude::*;
pub use harvest::{HarvestError, HarvestOptions, HarvestReport, Harvester};
pub use repository::RepositoryError;
pub use shutdown::Shutdown;
