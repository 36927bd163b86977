use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait, QueryOrder, QuerySelect};

use crate::entity::repository::{Column, Entity as Repository, Model};

use super::errors::{RepositoryError, Result};

/// Pagination parameters for list queries.
#[derive(Debug, Clone)]
pub struct Pagination {
    /// Page number (0-indexed).
    pub page: u64,
    /// Items per page.
    pub per_page: u64,
}

impl Pagination {
    pub fn new(page: u64, per_page: u64) -> Self {
        Self {
            page,
            per_page: per_page.max(MIN_PER_PAGE),
        }
    }
}

const MIN_PER_PAGE: u64 = 1;

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 0,
            per_page: 1000,
        }
    }
}

/// Result of a paginated query.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    /// The items for the current page.
    pub items: Vec<T>,
    /// Total number of items across all pages.
    pub total: u64,
    /// Current page number (0-indexed).
    pub page: u64,
    /// Items per page.
    pub per_page: u64,
    /// Total number of pages.
    pub total_pages: u64,
}

// ─── Query Operations ────────────────────────────────────────────────────────

/// One page of repositories, ordered by id.
pub async fn find_all(
    db: &DatabaseConnection,
    pagination: Pagination,
) -> Result<PaginatedResult<Model>> {
    let paginator = Repository::find()
        .order_by_asc(Column::Id)
        .paginate(db, pagination.per_page);

    let total = paginator.num_items().await?;
    let total_pages = paginator.num_pages().await?;
    let items = paginator.fetch_page(pagination.page).await?;

    Ok(PaginatedResult {
        items,
        total,
        page: pagination.page,
        per_page: pagination.per_page,
        total_pages,
    })
}

/// Every stored repository, ordered by id.
pub async fn list_all(db: &DatabaseConnection) -> Result<Vec<Model>> {
    Ok(Repository::find().order_by_asc(Column::Id).all(db).await?)
}

/// Look up one repository by upstream id.
pub async fn find_by_id(db: &DatabaseConnection, id: i64) -> Result<Model> {
    Repository::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| RepositoryError::not_found_by_id(id))
}

/// Number of stored repositories.
pub async fn count(db: &DatabaseConnection) -> Result<u64> {
    Ok(Repository::find().count(db).await?)
}

/// The `limit` most-starred repositories, ties broken by id.
pub async fn top_by_stars(db: &DatabaseConnection, limit: u64) -> Result<Vec<Model>> {
    Ok(Repository::find()
        .order_by_desc(Column::StarsCount)
        .order_by_asc(Column::Id)
        .limit(limit)
        .all(db)
        .await?)
}
