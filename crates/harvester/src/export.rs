//! Dataset export: every stored repository as CSV and as an Excel sheet.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use rust_xlsxwriter::{Workbook, XlsxError};
use sea_orm::DatabaseConnection;
use serde::Serialize;
use thiserror::Error;

use crate::entity::repository::Model;
use crate::repository::{self, RepositoryError};

/// Default output directory, relative to the working directory.
pub const DEFAULT_EXPORT_DIR: &str = "dataset/tables";

/// Worksheet name in the Excel export.
pub const SHEET_NAME: &str = "Repos";

const FILE_STEM: &str = "repos";
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

const HEADERS: [&str; 9] = [
    "id",
    "full_name",
    "created_at",
    "updated_at",
    "archived",
    "stars_count",
    "size",
    "release_counter",
    "tag_count",
];

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Excel error: {0}")]
    Xlsx(#[from] XlsxError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Files written by one export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportPaths {
    pub csv: PathBuf,
    pub xlsx: PathBuf,
    pub rows: usize,
}

/// One exported row. Field order is the column order.
#[derive(Debug, Serialize)]
struct ExportRow<'a> {
    id: i64,
    full_name: &'a str,
    created_at: String,
    updated_at: String,
    archived: bool,
    stars_count: i64,
    size: i64,
    release_counter: i64,
    tag_count: i64,
}

impl<'a> From<&'a Model> for ExportRow<'a> {
    fn from(model: &'a Model) -> Self {
        Self {
            id: model.id,
            full_name: &model.full_name,
            created_at: model.created_at.to_rfc3339(),
            updated_at: model.updated_at.to_rfc3339(),
            archived: model.archived,
            stars_count: model.stars_count,
            size: model.size,
            release_counter: model.release_counter,
            tag_count: model.tag_count,
        }
    }
}

/// File paths for an export taken at `now`.
#[must_use]
pub fn export_paths(output_dir: &Path, now: NaiveDateTime) -> (PathBuf, PathBuf) {
    let stem = format!("{FILE_STEM}_{}", now.format(TIMESTAMP_FORMAT));
    (
        output_dir.join(format!("{stem}.csv")),
        output_dir.join(format!("{stem}.xlsx")),
    )
}

/// Write every stored repository, ordered by id, to a CSV file and an Excel
/// workbook under `output_dir`. The directory is created when missing.
///
/// # Errors
/// Fails on a store read error or on any file write error.
pub async fn export_dataset(
    db: &DatabaseConnection,
    output_dir: &Path,
    now: NaiveDateTime,
) -> Result<ExportPaths, ExportError> {
    let models = repository::list_all(db).await?;
    fs::create_dir_all(output_dir)?;

    let (csv_path, xlsx_path) = export_paths(output_dir, now);
    write_csv(&csv_path, &models)?;
    write_xlsx(&xlsx_path, &models)?;

    tracing::info!(
        rows = models.len(),
        csv = %csv_path.display(),
        xlsx = %xlsx_path.display(),
        "Export written"
    );

    Ok(ExportPaths {
        csv: csv_path,
        xlsx: xlsx_path,
        rows: models.len(),
    })
}

fn write_csv(path: &Path, models: &[Model]) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(BufWriter::new(File::create(path)?));
    if models.is_empty() {
        // serialize() only emits headers alongside the first record.
        writer.write_record(HEADERS)?;
    }
    for model in models {
        writer.serialize(ExportRow::from(model))?;
    }
    writer.flush()?;
    Ok(())
}

fn write_xlsx(path: &Path, models: &[Model]) -> Result<(), ExportError> {
    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in (0u16..).zip(HEADERS) {
        sheet.write_string(0, col, header)?;
    }

    for (row, model) in (1u32..).zip(models) {
        sheet.write_number(row, 0, model.id as f64)?;
        sheet.write_string(row, 1, &model.full_name)?;
        sheet.write_string(row, 2, model.created_at.to_rfc3339())?;
        sheet.write_string(row, 3, model.updated_at.to_rfc3339())?;
        sheet.write_boolean(row, 4, model.archived)?;
        sheet.write_number(row, 5, model.stars_count as f64)?;
        sheet.write_number(row, 6, model.size as f64)?;
        sheet.write_number(row, 7, model.release_counter as f64)?;
        sheet.write_number(row, 8, model.tag_count as f64)?;
    }

    workbook.save(path)?;
    Ok(())
}
