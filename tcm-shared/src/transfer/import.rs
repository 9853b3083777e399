/// Importing a spreadsheet into a suite

use serde::Serialize;
use sqlx::PgPool;
use tracing::info;
use uuid::Uuid;

use super::reader::read_rows;
use super::sheet::{parse_sheet, RowError};
use super::{Format, TransferError};
use crate::models::test_case::{CreateTestCase, TestCase};

/// Outcome of an import
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    /// Test cases created
    pub imported: usize,

    /// Test cases found in the file but not created
    pub skipped: usize,

    pub errors: Vec<RowError>,

    /// Case IDs of the created cases, in file order
    pub imported_case_ids: Vec<String>,
}

/// Parses a file and creates its test cases in a suite
///
/// Cases whose ID already exists in the module are skipped and reported; all
/// other valid cases are written in a single transaction.
pub async fn import_into_suite(
    pool: &PgPool,
    suite_id: Uuid,
    module_id: Uuid,
    format: Format,
    bytes: &[u8],
) -> Result<ImportReport, TransferError> {
    let rows = read_rows(format, bytes)?;
    let parsed = parse_sheet(&rows)?;

    let mut report = ImportReport {
        skipped: parsed.rejected,
        errors: parsed.errors,
        ..Default::default()
    };

    let mut tx = pool.begin().await?;
    let existing = TestCase::case_ids_in_module(&mut *tx, module_id).await?;

    for case in parsed.cases {
        if existing.contains(&case.case_id) {
            report.errors.push(RowError::new(
                case.row,
                Some(&case.case_id),
                "Test case ID already exists in this module",
            ));
            report.skipped += 1;
            continue;
        }

        TestCase::create(
            &mut *tx,
            CreateTestCase {
                suite_id,
                case_id: case.case_id.clone(),
                title: case.title,
                description: case.description,
                priority: case.priority,
                steps: case.steps,
            },
        )
        .await?;

        report.imported += 1;
        report.imported_case_ids.push(case.case_id);
    }

    tx.commit().await?;

    report.errors.sort_by_key(|e| e.row);

    info!(
        suite_id = %suite_id,
        imported = report.imported,
        skipped = report.skipped,
        "Imported test cases"
    );

    Ok(report)
}
