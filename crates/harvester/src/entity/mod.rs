//! SeaORM entity definitions for the harvester database schema.

pub mod prelude;
pub mod repository;
