//! Repository entity - one row per upstream repository, keyed by upstream id.

use sea_orm::Set;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

use crate::upstream::RepositoryRecord;

/// Harvested repository metadata.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "repositories")]
pub struct Model {
    /// Upstream numeric id. Stable across runs; the upsert key.
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,

    // ─── Naming ──────────────────────────────────────────────────────────────
    /// `owner/name`.
    pub full_name: String,

    // ─── Timestamps ──────────────────────────────────────────────────────────
    pub created_at: DateTimeWithTimeZone,
    pub updated_at: DateTimeWithTimeZone,

    // ─── State ───────────────────────────────────────────────────────────────
    #[sea_orm(default_value = false)]
    pub archived: bool,

    // ─── Statistics ──────────────────────────────────────────────────────────
    pub stars_count: i64,
    /// Size in KiB, as reported upstream.
    pub size: i64,
    pub release_counter: i64,
    pub tag_count: i64,

    // ─── Tracking ────────────────────────────────────────────────────────────
    /// When this row was last written by a harvest run.
    pub synced_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl ActiveModel {
    /// Build a fully-set active model from a fetched record.
    pub fn from_record(record: &RepositoryRecord, synced_at: DateTimeWithTimeZone) -> Self {
        Self {
            id: Set(record.id),
            full_name: Set(record.full_name.clone()),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
            archived: Set(record.archived),
            stars_count: Set(record.stars_count),
            size: Set(record.size),
            release_counter: Set(record.release_counter),
            tag_count: Set(record.tag_count),
            synced_at: Set(synced_at),
        }
    }
}

impl From<Model> for RepositoryRecord {
    fn from(model: Model) -> Self {
        Self {
            id: model.id,
            full_name: model.full_name,
            created_at: model.created_at,
            updated_at: model.updated_at,
            archived: model.archived,
            stars_count: model.stars_count,
            size: model.size,
            release_counter: model.release_counter,
            tag_count: model.tag_count,
        }
    }
}
