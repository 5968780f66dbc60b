//! Entrance-exam score intake: stanine validation, the bulk CSV import the
//! admission office uses after each testing day, and the matching upload
//! template.

use std::io;

use serde::Serialize;

/// Columns of the score upload template. Header matching on import is
/// case-insensitive and treats underscores as spaces.
pub const SCORE_TEMPLATE_HEADERS: [&str; 4] =
    ["Control Number", "First Name", "Last Name", "Stanine Score"];

/// Stanine scores are a 1-9 scale.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stanine score must be between 1 and 9, got {0}")]
pub struct InvalidStanine(pub i64);

pub fn validate_stanine(raw: i64) -> Result<u8, InvalidStanine> {
    if (1..=9).contains(&raw) {
        Ok(raw as u8)
    } else {
        Err(InvalidStanine(raw))
    }
}

/// One usable row from an uploaded score sheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreRow {
    pub line: u64,
    pub control_number: String,
    pub stanine: u8,
}

/// A row that could not be used, with the reason the office will see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScoreRowFailure {
    pub line: u64,
    pub control_number: String,
    pub reason: String,
}

/// Outcome of a bulk import: posted rows and per-row failures. A bad row
/// never aborts the batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScoreImportSummary {
    pub posted: u32,
    pub failures: Vec<ScoreRowFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum ScoreImportError {
    #[error("required columns 'Control Number' and 'Stanine Score' not found in upload")]
    MissingColumns,
    #[error("score sheet could not be parsed: {0}")]
    Csv(#[from] csv::Error),
    #[error("score sheet could not be read: {0}")]
    Io(#[from] io::Error),
}

/// Parse a score CSV. Returns usable rows plus failures for rows with a
/// missing control number or a non-stanine score.
pub fn parse_score_sheet<R: io::Read>(
    reader: R,
) -> Result<(Vec<ScoreRow>, Vec<ScoreRowFailure>), ScoreImportError> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();
    let control_idx = normalized.iter().position(|h| h == "control number");
    let stanine_idx = normalized.iter().position(|h| h == "stanine score");
    let (control_idx, stanine_idx) = match (control_idx, stanine_idx) {
        (Some(c), Some(s)) => (c, s),
        _ => return Err(ScoreImportError::MissingColumns),
    };

    let mut rows = Vec::new();
    let mut failures = Vec::new();
    for (offset, result) in csv_reader.records().enumerate() {
        let line = offset as u64 + 2; // 1-based, after the header row
        let record = result?;
        let control_number = record
            .get(control_idx)
            .map(str::trim)
            .unwrap_or_default()
            .to_string();
        if control_number.is_empty() {
            // Blank filler rows (the template ships with instruction lines).
            continue;
        }

        let raw_score = record.get(stanine_idx).map(str::trim).unwrap_or_default();
        let stanine = match raw_score.parse::<i64>().ok().map(validate_stanine) {
            Some(Ok(score)) => score,
            _ => {
                failures.push(ScoreRowFailure {
                    line,
                    control_number,
                    reason: format!("invalid stanine score '{raw_score}'"),
                });
                continue;
            }
        };

        rows.push(ScoreRow {
            line,
            control_number,
            stanine,
        });
    }

    Ok((rows, failures))
}

/// Write the upload template: the header row plus one example line.
pub fn write_score_template<W: io::Write>(writer: W) -> Result<(), ScoreImportError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record(SCORE_TEMPLATE_HEADERS)?;
    csv_writer.write_record(["ADM-000001", "Juan", "Dela Cruz", "5"])?;
    csv_writer.flush()?;
    Ok(())
}

fn normalize_header(header: &str) -> String {
    header.trim().replace('_', " ").to_ascii_lowercase()
}
