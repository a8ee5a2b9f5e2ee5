use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};

use super::{collect_cases, CaseError, CaseSet, LabRequirement};

/// Workbook extensions handled by calamine.
const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "xlsb", "ods"];

/// Load cases from a workbook sheet or a CSV file.
///
/// The format is chosen by extension. `sheet` is ignored for CSV.
pub fn load_cases(
    path: &Path,
    sheet: &str,
    requirement: LabRequirement,
) -> Result<CaseSet, CaseError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let rows = if WORKBOOK_EXTENSIONS.contains(&extension.as_str()) {
        read_workbook_rows(path, sheet)?
    } else if extension == "csv" {
        read_csv_rows(path)?
    } else {
        return Err(CaseError::UnsupportedFormat(path.display().to_string()));
    };

    let set = collect_cases(rows, requirement)?;
    tracing::info!(
        path = %path.display(),
        cases = set.len(),
        excluded = set.excluded().len(),
        "Loaded cases"
    );
    Ok(set)
}

/// Read every row of a workbook sheet as trimmed optional text.
fn read_workbook_rows(path: &Path, sheet: &str) -> Result<Vec<Vec<Option<String>>>, CaseError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| CaseError::Workbook(e.to_string()))?;

    let names = workbook.sheet_names();
    if !names.iter().any(|n| n == sheet) {
        return Err(CaseError::SheetNotFound {
            sheet: sheet.to_string(),
            available: names.join(", "),
        });
    }

    let range = workbook
        .worksheet_range(sheet)
        .map_err(|e| CaseError::Workbook(e.to_string()))?;

    Ok(range
        .rows()
        .map(|row| row.iter().map(cell_text).collect())
        .collect())
}

/// Read every record of a CSV file (header included) as trimmed optional text.
fn read_csv_rows(path: &Path) -> Result<Vec<Vec<Option<String>>>, CaseError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(normalize_text).collect());
    }
    Ok(rows)
}

/// Text of a workbook cell. Empty and error cells count as missing.
fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) => normalize_text(s),
        // Numeric ids come back as floats: 3.0 → "3"
        Data::Float(n) if n.fract() == 0.0 && n.abs() < 1e15 => Some(format!("{}", *n as i64)),
        other => normalize_text(&other.to_string()),
    }
}

fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
