//! Loads [`Record`]s from a CSV table.
//!
//! A missing file is not an error: the built-in demo set is substituted so a
//! fresh checkout can run end to end. A file that exists but cannot be read
//! or parsed is fatal.

use std::io::{self, Read};
use std::path::Path;

use crate::error::{FatalError, FatalResult};
use crate::models::Record;

/// Accepted name headers, in priority order. Compared case-insensitively.
pub const NAME_HEADERS: &[&str] = &["part name", "part_name", "name", "part", "item"];
pub const DESCRIPTION_HEADERS: &[&str] = &[
    "description",
    "part description",
    "part_description",
    "desc",
];

pub fn demo_records() -> Vec<Record> {
    vec![
        Record::new("Alloy Wheel", "A shiny chrome alloy wheel."),
        Record::new("Spoiler", "A sleek carbon fiber spoiler."),
        Record::new("Turbocharger", "A polished turbocharger with visible turbine blades."),
        Record::new("Brake Caliper", "A red performance brake caliper over a drilled disc."),
    ]
}

pub fn load_records(path: &Path) -> FatalResult<Vec<Record>> {
    match std::fs::metadata(path) {
        Ok(_) => {}
        Err(err)
            if matches!(
                err.kind(),
                io::ErrorKind::NotFound | io::ErrorKind::NotADirectory
            ) =>
        {
            log::warn!(
                "Input '{}' not found, using {} built-in demo records",
                path.display(),
                demo_records().len()
            );
            return Ok(demo_records());
        }
        Err(err) => return Err(malformed(path, format!("unable to access file: {err}"))),
    }

    let file = std::fs::File::open(path)
        .map_err(|err| malformed(path, format!("unable to open file: {err}")))?;
    let records = read_records(file, path)?;
    log::info!("Loaded {} records from '{}'", records.len(), path.display());
    Ok(records)
}

/// Parses CSV with a header row. `origin` is only used in error messages.
pub fn read_records<R: Read>(input: R, origin: &Path) -> FatalResult<Vec<Record>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|err| malformed(origin, format!("unable to read header row: {err}")))?
        .clone();
    let normalized: Vec<String> = headers.iter().map(normalize_header).collect();

    let name_column = find_column(&normalized, NAME_HEADERS).ok_or_else(|| {
        malformed(
            origin,
            format!(
                "no name column; expected one of {:?}, found {:?}",
                NAME_HEADERS,
                headers.iter().collect::<Vec<_>>()
            ),
        )
    })?;
    let description_column = find_column(&normalized, DESCRIPTION_HEADERS);

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        let fields =
            result.map_err(|err| malformed(origin, format!("row {}: {err}", row + 1)))?;
        let name = fields.get(name_column).unwrap_or_default();
        let description = description_column
            .and_then(|column| fields.get(column))
            .unwrap_or_default();
        records.push(Record::new(name, description));
    }

    Ok(records)
}

fn normalize_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_lowercase()
}

fn find_column(headers: &[String], accepted: &[&str]) -> Option<usize> {
    accepted
        .iter()
        .find_map(|wanted| headers.iter().position(|header| header == wanted))
}

fn malformed(path: &Path, reason: String) -> FatalError {
    FatalError::MalformedInput {
        path: path.to_path_buf(),
        reason,
    }
}
