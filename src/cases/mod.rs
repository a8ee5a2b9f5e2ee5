//! Clinical cases: one row of the input table per case.
//!
//! Rows are read in file order. Incomplete rows are excluded before any
//! processing starts; every exclusion is kept (with its reason) so a run can
//! report how many cases it never saw.

pub mod loader;

pub use loader::*;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::results::sanitize_file_stem;

/// Header of the case identifier column.
pub const CASE_COLUMN: &str = "Case";
/// Header of the symptoms/history narrative column.
pub const NARRATIVE_COLUMN: &str = "SS";
/// Header of the lab-result narrative column.
pub const LAB_COLUMN: &str = "LR";

#[derive(Error, Debug)]
pub enum CaseError {
    #[error("Unsupported case file format: {0}")]
    UnsupportedFormat(String),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Sheet '{sheet}' not found (available: {available})")]
    SheetNotFound { sheet: String, available: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Case table has no header row")]
    MissingHeader,

    #[error("Required column '{0}' not found in header")]
    MissingColumn(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A single clinical case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Case {
    pub id: String,
    pub narrative: String,
    pub lab_results: Option<String>,
}

/// Whether rows without lab results are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabRequirement {
    /// Lab results go into the prompt: rows without them are excluded.
    Required,
    /// Lab results are not used: rows without them are kept.
    Optional,
}

impl LabRequirement {
    pub fn from_flag(with_lab_results: bool) -> Self {
        if with_lab_results {
            Self::Required
        } else {
            Self::Optional
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionReason {
    MissingId,
    MissingNarrative,
    MissingLabResults,
    DuplicateId,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => write!(f, "missing case identifier"),
            Self::MissingNarrative => write!(f, "missing symptoms/history text"),
            Self::MissingLabResults => write!(f, "missing lab results"),
            Self::DuplicateId => write!(f, "duplicate case identifier"),
        }
    }
}

/// A row that was dropped before processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExcludedCase {
    /// 1-based row number in the source table (header is row 1).
    pub row: usize,
    pub id: Option<String>,
    pub reason: ExclusionReason,
}

/// Cases in deterministic (file) order, plus the rows that were excluded.
#[derive(Debug, Clone, Default)]
pub struct CaseSet {
    cases: Vec<Case>,
    excluded: Vec<ExcludedCase>,
}

impl CaseSet {
    pub fn cases(&self) -> &[Case] {
        &self.cases
    }

    pub fn excluded(&self) -> &[ExcludedCase] {
        &self.excluded
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Cases left after skipping the first `start` (resume after interruption).
    pub fn resume_from(&self, start: usize) -> &[Case] {
        self.cases.get(start..).unwrap_or(&[])
    }
}

/// Column positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    case: usize,
    narrative: usize,
    lab: Option<usize>,
}

impl ColumnMap {
    fn from_header(header: &[Option<String>]) -> Result<Self, CaseError> {
        let find = |name: &str| {
            header.iter().position(|cell| {
                cell.as_deref()
                    .is_some_and(|h| h.trim().eq_ignore_ascii_case(name))
            })
        };

        Ok(Self {
            case: find(CASE_COLUMN).ok_or(CaseError::MissingColumn(CASE_COLUMN))?,
            narrative: find(NARRATIVE_COLUMN)
                .ok_or(CaseError::MissingColumn(NARRATIVE_COLUMN))?,
            lab: find(LAB_COLUMN),
        })
    }
}

/// Build the case set from raw table rows (first row is the header).
///
/// Cells are expected to be trimmed already, with blanks as `None`.
pub fn collect_cases<I>(rows: I, requirement: LabRequirement) -> Result<CaseSet, CaseError>
where
    I: IntoIterator<Item = Vec<Option<String>>>,
{
    let mut rows = rows.into_iter();
    let header = rows.next().ok_or(CaseError::MissingHeader)?;
    let columns = ColumnMap::from_header(&header)?;

    let mut set = CaseSet::default();
    // File-safe stems: two ids that map to the same per-case file collide.
    let mut seen: HashSet<String> = HashSet::new();

    for (index, row) in rows.enumerate() {
        let row_number = index + 2;
        if row.iter().all(Option::is_none) {
            continue;
        }

        let cell = |col: usize| row.get(col).cloned().flatten();
        let id = cell(columns.case);
        let narrative = cell(columns.narrative);
        let lab_results = columns.lab.and_then(cell);

        let reason = match (&id, &narrative) {
            (None, _) => Some(ExclusionReason::MissingId),
            (Some(_), None) => Some(ExclusionReason::MissingNarrative),
            (Some(id), Some(_)) if seen.contains(&sanitize_file_stem(id)) => {
                Some(ExclusionReason::DuplicateId)
            }
            _ if requirement == LabRequirement::Required && lab_results.is_none() => {
                Some(ExclusionReason::MissingLabResults)
            }
            _ => None,
        };

        if let Some(reason) = reason {
            tracing::warn!(
                row = row_number,
                case = id.as_deref().unwrap_or("<none>"),
                %reason,
                "Excluding case"
            );
            set.excluded.push(ExcludedCase {
                row: row_number,
                id,
                reason,
            });
            continue;
        }

        // Both present: checked above.
        if let (Some(id), Some(narrative)) = (id, narrative) {
            seen.insert(sanitize_file_stem(&id));
            set.cases.push(Case {
                id,
                narrative,
                lab_results,
            });
        }
    }

    Ok(set)
}
