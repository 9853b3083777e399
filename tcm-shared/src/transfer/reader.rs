/// Decoding uploaded files into a grid of cell strings

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use std::io::Cursor;

use super::{Format, TransferError};

/// Reads every row of the file; for workbooks only the first sheet is read
pub fn read_rows(format: Format, bytes: &[u8]) -> Result<Vec<Vec<String>>, TransferError> {
    match format {
        Format::Csv => read_csv(bytes),
        Format::Xlsx => read_xlsx(bytes),
    }
}

fn read_csv(bytes: &[u8]) -> Result<Vec<Vec<String>>, TransferError> {
    // Excel writes a BOM in front of UTF-8 CSV
    let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(bytes);

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }

    Ok(rows)
}

fn read_xlsx(bytes: &[u8]) -> Result<Vec<Vec<String>>, TransferError> {
    let mut workbook: Xlsx<_> = open_workbook_from_rs(Cursor::new(bytes))
        .map_err(|e: calamine::XlsxError| TransferError::Workbook(e.to_string()))?;

    let range = workbook
        .worksheet_range_at(0)
        .ok_or(TransferError::EmptySheet)?
        .map_err(|e| TransferError::Workbook(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(value) => value.clone(),
        Data::Int(value) => value.to_string(),
        // Numbers typed into a sheet come back as floats; 3.0 is step "3"
        Data::Float(value) if value.fract() == 0.0 && value.abs() < 1e15 => {
            format!("{}", *value as i64)
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv_strips_bom_and_allows_ragged_rows() {
        let bytes = b"\xEF\xBB\xBFTest Case ID,Title,Action\nTC-1,\"Login, basic\",Open\n,,Submit,extra\n";

        let rows = read_rows(Format::Csv, bytes).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][0], "Test Case ID");
        assert_eq!(rows[1][1], "Login, basic");
        assert_eq!(rows[2].len(), 4);
    }

    #[test]
    fn test_cell_text() {
        assert_eq!(cell_text(&Data::Float(3.0)), "3");
        assert_eq!(cell_text(&Data::Float(2.5)), "2.5");
        assert_eq!(cell_text(&Data::Int(7)), "7");
        assert_eq!(cell_text(&Data::Empty), "");
        assert_eq!(cell_text(&Data::String("x".to_string())), "x");
    }

    #[test]
    fn test_read_invalid_workbook() {
        let result = read_rows(Format::Xlsx, b"not a zip file");
        assert!(matches!(result, Err(TransferError::Workbook(_))));
    }
}
