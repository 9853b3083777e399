/// Encoding test cases as CSV or XLSX

use rust_xlsxwriter::{Format as CellFormat, Workbook};

use super::{Format, TransferError, HEADERS};
use crate::models::test_case::TestCaseWithSteps;

const SHEET_NAME: &str = "Test Cases";

/// Rows of the export, header excluded
///
/// One row per step. Case columns are only filled on a case's first row; a
/// case without steps still gets a row.
pub fn export_rows(cases: &[TestCaseWithSteps]) -> Vec<[String; 7]> {
    let mut rows = Vec::new();

    for case in cases {
        let tc = &case.test_case;
        let head = [
            tc.case_id.clone(),
            tc.title.clone(),
            tc.description.clone().unwrap_or_default(),
            tc.priority.as_str().to_string(),
        ];

        if case.steps.is_empty() {
            let [id, title, description, priority] = head;
            rows.push([id, title, description, priority, String::new(), String::new(), String::new()]);
            continue;
        }

        for (index, step) in case.steps.iter().enumerate() {
            let [id, title, description, priority] = if index == 0 {
                head.clone()
            } else {
                Default::default()
            };

            rows.push([
                id,
                title,
                description,
                priority,
                step.step_number.to_string(),
                step.action.clone(),
                step.expected_result.clone().unwrap_or_default(),
            ]);
        }
    }

    rows
}

/// Encodes test cases in the given format
pub fn export_cases(format: Format, cases: &[TestCaseWithSteps]) -> Result<Vec<u8>, TransferError> {
    let rows = export_rows(cases);

    match format {
        Format::Csv => write_csv(&rows),
        Format::Xlsx => write_xlsx(&rows),
    }
}

fn write_csv(rows: &[[String; 7]]) -> Result<Vec<u8>, TransferError> {
    let mut writer = csv::Writer::from_writer(vec![]);

    writer.write_record(HEADERS)?;
    for row in rows {
        writer.write_record(row)?;
    }

    writer
        .into_inner()
        .map_err(|e| TransferError::Csv(e.into_error().into()))
}

fn write_xlsx(rows: &[[String; 7]]) -> Result<Vec<u8>, TransferError> {
    let mut workbook = Workbook::new();
    let bold = CellFormat::new().set_bold();

    let sheet = workbook.add_worksheet();
    sheet.set_name(SHEET_NAME)?;

    for (col, header) in HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col as u16, *header, &bold)?;
    }

    for (index, row) in rows.iter().enumerate() {
        let row_number = (index + 1) as u32;
        for (col, value) in row.iter().enumerate() {
            if !value.is_empty() {
                sheet.write_string(row_number, col as u16, value)?;
            }
        }
    }

    sheet.set_column_width(1, 40)?;
    sheet.set_column_width(5, 50)?;
    sheet.set_column_width(6, 50)?;

    Ok(workbook.save_to_buffer()?)
}
