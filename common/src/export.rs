// Spreadsheet export of registered users

use crate::db::repositories::UserRepository;
use crate::errors::ExportError;
use crate::models::User;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

pub const SHEET_NAME: &str = "Users";
pub const HEADER: [&str; 6] = ["id", "first_name", "last_name", "phone", "email", "created_at"];
pub const FILE_NAME: &str = "users.xlsx";
pub const CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const CREATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Workbook bytes with one header row and one row per user, in the given order
pub fn users_workbook(users: &[User]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;
    write_users(worksheet, users)?;
    Ok(workbook.save_to_buffer()?)
}

fn write_users(worksheet: &mut Worksheet, users: &[User]) -> Result<(), ExportError> {
    let bold = Format::new().set_bold();
    for (col, name) in HEADER.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *name, &bold)?;
    }

    for (idx, user) in users.iter().enumerate() {
        let row = idx as u32 + 1;
        worksheet.write_number(row, 0, user.id as f64)?;
        worksheet.write_string(row, 1, &user.first_name)?;
        worksheet.write_string(row, 2, &user.last_name)?;
        worksheet.write_string(row, 3, &user.phone)?;
        worksheet.write_string(row, 4, &user.email)?;
        worksheet.write_string(row, 5, user.created_at.format(CREATED_AT_FORMAT).to_string())?;
    }
    Ok(())
}

/// All users ordered by id
#[instrument(skip(users))]
pub async fn export_all(users: &UserRepository) -> Result<(Vec<u8>, usize), ExportError> {
    let all = users.find_all_by_id().await?;
    let bytes = users_workbook(&all)?;
    info!(users = all.len(), bytes = bytes.len(), "Built users workbook");
    Ok((bytes, all.len()))
}

/// Write the export under `dir`, creating it; returns the file path and user count
pub async fn export_to_dir(
    users: &UserRepository,
    dir: &Path,
) -> Result<(PathBuf, usize), ExportError> {
    let (bytes, count) = export_all(users).await?;
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(FILE_NAME);
    tokio::fs::write(&path, bytes).await?;
    Ok((path, count))
}
