/// Grouping spreadsheet rows into test cases
///
/// Input is a grid of cell strings, already decoded from CSV or XLSX. The
/// first non-empty row is the header; columns are matched by name ignoring
/// case, spaces and punctuation, so "Test Case ID", "test_case_id" and
/// "TestCaseId" are the same column.
///
/// Problems are collected per row instead of failing the whole file. A case
/// with a problem on any of its rows is rejected as a whole.

use serde::Serialize;
use std::collections::HashSet;

use super::TransferError;
use crate::models::test_case::{Priority, StepInput, MAX_CASE_ID_CHARS, MAX_TITLE_CHARS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    CaseId,
    Title,
    Description,
    Priority,
    StepNumber,
    Action,
    ExpectedResult,
}

impl Column {
    fn label(&self) -> &'static str {
        match self {
            Column::CaseId => "Test Case ID",
            Column::Title => "Title",
            Column::Description => "Description",
            Column::Priority => "Priority",
            Column::StepNumber => "Step Number",
            Column::Action => "Action",
            Column::ExpectedResult => "Expected Result",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        match normalize_header(header).as_str() {
            "testcaseid" | "caseid" | "testid" | "id" => Some(Column::CaseId),
            "title" | "testcasetitle" | "testcasename" | "name" | "summary" => Some(Column::Title),
            "description" | "testcasedescription" | "desc" => Some(Column::Description),
            "priority" => Some(Column::Priority),
            "stepnumber" | "stepno" | "stepnum" | "step" => Some(Column::StepNumber),
            "action" | "stepaction" | "teststep" | "stepdescription" | "steps" => Some(Column::Action),
            "expectedresult" | "expectedresults" | "expected" | "expectedoutcome" => {
                Some(Column::ExpectedResult)
            }
            _ => None,
        }
    }
}

/// Lowercases and strips everything but letters and digits
pub fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Column positions found in the header row
#[derive(Debug, Default)]
struct Layout {
    positions: Vec<(Column, usize)>,
}

impl Layout {
    fn from_header(row: &[String]) -> Result<Self, TransferError> {
        let mut layout = Layout::default();

        for (index, cell) in row.iter().enumerate() {
            if let Some(column) = Column::from_header(cell) {
                // First matching header wins
                if layout.index(column).is_none() {
                    layout.positions.push((column, index));
                }
            }
        }

        let missing: Vec<&'static str> = [Column::CaseId, Column::Title, Column::Action]
            .into_iter()
            .filter(|column| layout.index(*column).is_none())
            .map(|column| column.label())
            .collect();

        if missing.is_empty() {
            Ok(layout)
        } else {
            Err(TransferError::MissingColumns(missing))
        }
    }

    fn index(&self, column: Column) -> Option<usize> {
        self.positions
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, index)| *index)
    }

    fn cell<'a>(&self, row: &'a [String], column: Column) -> Option<&'a str> {
        self.index(column)
            .and_then(|index| row.get(index))
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

/// A test case read from a sheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportedCase {
    /// 1-based sheet row where the case starts
    pub row: usize,

    pub case_id: String,

    pub title: String,

    pub description: Option<String>,

    pub priority: Priority,

    /// Steps in final order; numbering is assigned on insert
    pub steps: Vec<StepInput>,
}

/// A problem found on one row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    /// 1-based sheet row
    pub row: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,

    pub message: String,
}

impl RowError {
    pub fn new(row: usize, case_id: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            row,
            case_id: case_id.map(str::to_string),
            message: message.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct ParsedSheet {
    pub cases: Vec<ImportedCase>,

    pub errors: Vec<RowError>,

    /// Cases seen in the file but rejected because of errors
    pub rejected: usize,
}

/// A case being assembled while rows are read
struct Draft {
    case: ImportedCase,
    /// (sort key, step) in file order
    steps: Vec<(u32, StepInput)>,
    last_key: u32,
    valid: bool,
}

impl Draft {
    fn finish(mut self) -> Option<ImportedCase> {
        if !self.valid {
            return None;
        }

        // Stable: equal keys keep file order
        self.steps.sort_by_key(|(key, _)| *key);
        self.case.steps = self.steps.into_iter().map(|(_, step)| step).collect();

        Some(self.case)
    }
}

/// Parses a decoded grid into cases and row errors
///
/// # Errors
///
/// Fails only when the sheet has no header row or the header lacks one of
/// the required columns; everything else is reported in `ParsedSheet::errors`.
pub fn parse_sheet(rows: &[Vec<String>]) -> Result<ParsedSheet, TransferError> {
    let mut rows = rows
        .iter()
        .enumerate()
        .map(|(index, row)| (index + 1, row))
        .filter(|(_, row)| row.iter().any(|cell| !cell.trim().is_empty()));

    let (_, header) = rows.next().ok_or(TransferError::EmptySheet)?;
    let layout = Layout::from_header(header)?;

    let mut parsed = ParsedSheet::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut current: Option<Draft> = None;

    for (row_number, row) in rows {
        let case_id = layout.cell(row, Column::CaseId);

        let continues_current = match (case_id, &current) {
            (None, _) => true,
            (Some(id), Some(draft)) => draft.case.case_id == id,
            (Some(_), None) => false,
        };

        if !continues_current {
            if let Some(draft) = current.take() {
                finish_draft(draft, &mut parsed);
            }

            // Guarded by `continues_current`: a new case always has an ID
            let Some(id) = case_id else { continue };
            current = Some(start_case(&layout, row, row_number, id, &mut seen, &mut parsed.errors));
        }

        let Some(draft) = current.as_mut() else {
            parsed.errors.push(RowError::new(
                row_number,
                None,
                "Row has no test case ID and follows no test case",
            ));
            continue;
        };

        add_step(&layout, row, row_number, draft, &mut parsed.errors);
    }

    if let Some(draft) = current.take() {
        finish_draft(draft, &mut parsed);
    }

    Ok(parsed)
}

fn finish_draft(draft: Draft, parsed: &mut ParsedSheet) {
    match draft.finish() {
        Some(case) => parsed.cases.push(case),
        None => parsed.rejected += 1,
    }
}

fn start_case(
    layout: &Layout,
    row: &[String],
    row_number: usize,
    case_id: &str,
    seen: &mut HashSet<String>,
    errors: &mut Vec<RowError>,
) -> Draft {
    let mut valid = true;

    if !seen.insert(case_id.to_string()) {
        errors.push(RowError::new(row_number, Some(case_id), "Duplicate test case ID in file"));
        valid = false;
    }

    if case_id.chars().count() > MAX_CASE_ID_CHARS {
        errors.push(RowError::new(
            row_number,
            Some(case_id),
            format!("Test case ID is longer than {} characters", MAX_CASE_ID_CHARS),
        ));
        valid = false;
    }

    let title = layout.cell(row, Column::Title).unwrap_or_default();
    if title.is_empty() {
        errors.push(RowError::new(row_number, Some(case_id), "Title is required"));
        valid = false;
    } else if title.chars().count() > MAX_TITLE_CHARS {
        errors.push(RowError::new(
            row_number,
            Some(case_id),
            format!("Title is longer than {} characters", MAX_TITLE_CHARS),
        ));
        valid = false;
    }

    let priority = match layout.cell(row, Column::Priority) {
        None => Priority::default(),
        Some(value) => Priority::parse(value).unwrap_or_else(|| {
            errors.push(RowError::new(
                row_number,
                Some(case_id),
                format!("Invalid priority '{}'", value),
            ));
            valid = false;
            Priority::default()
        }),
    };

    Draft {
        case: ImportedCase {
            row: row_number,
            case_id: case_id.to_string(),
            title: title.to_string(),
            description: layout.cell(row, Column::Description).map(str::to_string),
            priority,
            steps: Vec::new(),
        },
        steps: Vec::new(),
        last_key: 0,
        valid,
    }
}

fn add_step(
    layout: &Layout,
    row: &[String],
    row_number: usize,
    draft: &mut Draft,
    errors: &mut Vec<RowError>,
) {
    let Some(action) = layout.cell(row, Column::Action) else {
        return;
    };

    // A blank step number sorts right after the step before it
    let key = match layout.cell(row, Column::StepNumber) {
        None => draft.last_key,
        Some(value) => match parse_step_number(value) {
            Some(number) => number,
            None => {
                errors.push(RowError::new(
                    row_number,
                    Some(&draft.case.case_id),
                    format!("Invalid step number '{}'", value),
                ));
                draft.valid = false;
                return;
            }
        },
    };

    draft.last_key = key;
    draft.steps.push((
        key,
        StepInput {
            action: action.to_string(),
            expected_result: layout.cell(row, Column::ExpectedResult).map(str::to_string),
        },
    ));
}

/// Accepts positive integers, also written as "3.0" by spreadsheet tools
fn parse_step_number(value: &str) -> Option<u32> {
    let value = value.trim();
    let integral = value.strip_suffix(".0").unwrap_or(value);

    integral.parse::<u32>().ok().filter(|n| *n > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(rows: &[&[&str]]) -> Vec<Vec<String>> {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }

    const HEADER: &[&str] = &[
        "Test Case ID",
        "Title",
        "Description",
        "Priority",
        "Step Number",
        "Action",
        "Expected Result",
    ];

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("Test Case ID"), "testcaseid");
        assert_eq!(normalize_header("expected_result"), "expectedresult");
        assert_eq!(normalize_header(" Step #No. "), "stepno");
    }

    #[test]
    fn test_groups_rows_into_cases() {
        let rows = grid(&[
            HEADER,
            &["TC-1", "Login", "Valid login", "high", "1", "Open page", "Form shown"],
            &["", "", "", "", "2", "Submit", "Dashboard shown"],
            &["TC-2", "Logout", "", "", "", "Click logout", ""],
        ]);

        let parsed = parse_sheet(&rows).unwrap();

        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.cases.len(), 2);

        let first = &parsed.cases[0];
        assert_eq!(first.row, 2);
        assert_eq!(first.case_id, "TC-1");
        assert_eq!(first.priority, Priority::High);
        assert_eq!(first.description.as_deref(), Some("Valid login"));
        assert_eq!(first.steps.len(), 2);
        assert_eq!(first.steps[1].expected_result.as_deref(), Some("Dashboard shown"));

        let second = &parsed.cases[1];
        assert_eq!(second.priority, Priority::Medium);
        assert_eq!(second.steps[0].expected_result, None);
    }

    #[test]
    fn test_repeated_case_id_continues_case() {
        let rows = grid(&[
            &["ID", "Title", "Action"],
            &["TC-1", "Login", "Step one"],
            &["TC-1", "Login", "Step two"],
        ]);

        let parsed = parse_sheet(&rows).unwrap();
        assert_eq!(parsed.cases.len(), 1);
        assert_eq!(parsed.cases[0].steps.len(), 2);
    }

    #[test]
    fn test_steps_sorted_by_number_then_file_order() {
        let rows = grid(&[
            HEADER,
            &["TC-1", "Sorted", "", "", "3", "third", ""],
            &["", "", "", "", "1", "first", ""],
            &["", "", "", "", "", "after first", ""],
            &["", "", "", "", "2", "second", ""],
        ]);

        let parsed = parse_sheet(&rows).unwrap();
        let actions: Vec<&str> = parsed.cases[0].steps.iter().map(|s| s.action.as_str()).collect();

        assert_eq!(actions, vec!["first", "after first", "second", "third"]);
    }

    #[test]
    fn test_rows_without_action_add_no_step() {
        let rows = grid(&[
            &["Test Case ID", "Title", "Action"],
            &["TC-1", "No steps", ""],
        ]);

        let parsed = parse_sheet(&rows).unwrap();
        assert_eq!(parsed.cases.len(), 1);
        assert!(parsed.cases[0].steps.is_empty());
    }

    #[test]
    fn test_duplicate_case_id_in_file_is_rejected() {
        let rows = grid(&[
            &["Test Case ID", "Title", "Action"],
            &["TC-1", "First", "a"],
            &["TC-2", "Second", "b"],
            &["TC-1", "Again", "c"],
        ]);

        let parsed = parse_sheet(&rows).unwrap();

        assert_eq!(parsed.cases.len(), 2);
        assert_eq!(parsed.rejected, 1);
        assert_eq!(parsed.errors.len(), 1);
        assert_eq!(parsed.errors[0].row, 4);
        assert_eq!(parsed.errors[0].case_id.as_deref(), Some("TC-1"));
    }

    #[test]
    fn test_invalid_case_rejects_all_its_rows() {
        let rows = grid(&[
            HEADER,
            &["TC-1", "", "", "", "1", "a", ""],
            &["", "", "", "", "2", "b", ""],
            &["TC-2", "Fine", "", "urgent", "", "c", ""],
            &["TC-3", "Bad step", "", "", "x", "d", ""],
            &["TC-4", "Good", "", "low", "1", "e", ""],
        ]);

        let parsed = parse_sheet(&rows).unwrap();

        assert_eq!(parsed.cases.len(), 1);
        assert_eq!(parsed.cases[0].case_id, "TC-4");
        assert_eq!(parsed.rejected, 3);

        let messages: Vec<&str> = parsed.errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["Title is required", "Invalid priority 'urgent'", "Invalid step number 'x'"]
        );
    }

    #[test]
    fn test_overlong_id_or_title_rejects_only_that_case() {
        let long_id = "X".repeat(MAX_CASE_ID_CHARS + 1);
        let long_title = "t".repeat(MAX_TITLE_CHARS + 1);
        let rows = grid(&[
            HEADER,
            &["TC-1", "Fine", "", "", "1", "Open", ""],
            &[long_id.as_str(), "Too long ID", "", "", "1", "Open", ""],
            &["TC-3", long_title.as_str(), "", "", "1", "Open", ""],
        ]);

        let parsed = parse_sheet(&rows).unwrap();

        assert_eq!(parsed.cases.len(), 1);
        assert_eq!(parsed.cases[0].case_id, "TC-1");
        assert_eq!(parsed.rejected, 2);
        let rows: Vec<usize> = parsed.errors.iter().map(|e| e.row).collect();
        assert_eq!(rows, vec![3, 4]);
    }

    #[test]
    fn test_orphan_row_is_reported() {
        let rows = grid(&[
            &["Test Case ID", "Title", "Action"],
            &["", "", "orphan step"],
            &["TC-1", "Real", "step"],
        ]);

        let parsed = parse_sheet(&rows).unwrap();

        assert_eq!(parsed.cases.len(), 1);
        assert_eq!(parsed.errors[0].row, 2);
        assert_eq!(parsed.errors[0].case_id, None);
    }

    #[test]
    fn test_leading_blank_rows_and_spreadsheet_numbers() {
        let rows = grid(&[
            &["", "", ""],
            &["case id", "TITLE", "Step", "action"],
            &["TC-1", "Numbers", "2.0", "second"],
            &["", "", "1", "first"],
        ]);

        let parsed = parse_sheet(&rows).unwrap();
        assert_eq!(parsed.cases[0].row, 3);
        assert_eq!(parsed.cases[0].steps[0].action, "first");
    }

    #[test]
    fn test_missing_required_columns() {
        let rows = grid(&[&["Test Case ID", "Description"]]);

        match parse_sheet(&rows) {
            Err(TransferError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["Title", "Action"]);
            }
            other => panic!("expected missing columns, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_sheet() {
        assert!(matches!(parse_sheet(&[]), Err(TransferError::EmptySheet)));
        assert!(matches!(
            parse_sheet(&grid(&[&["", " "]])),
            Err(TransferError::EmptySheet)
        ));
    }
}
