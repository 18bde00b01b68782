//! Identifier source: turns an uploaded table into an ordered batch of OCLC numbers
//!
//! Only the identifier column is read. Rows with an empty cell are skipped, values
//! that are not OCLC numbers are skipped with a warning, and duplicates collapse onto
//! their first occurrence so the API is never asked for the same record twice.

use crate::config::InputConfig;
use crate::error::InputError;
use crate::types::Identifier;
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;
use tracing::{debug, info, warn};

/// Parse identifiers from delimited text with a header row
///
/// # Errors
///
/// - [`InputError::MissingColumn`] if no header matches the configured column or aliases
/// - [`InputError::Malformed`] if the table cannot be read
/// - [`InputError::Empty`] if the column holds no usable identifier
///
/// # Examples
///
/// ```
/// use bibrecord_dl::config::InputConfig;
/// use bibrecord_dl::input::parse_identifiers;
///
/// let table = "Title;OCLC Number\nDune;123\nDune again;ocm00000123\nEmma;456\n";
/// let ids = parse_identifiers(table.as_bytes(), &InputConfig::default()).unwrap();
/// let ids: Vec<_> = ids.iter().map(|id| id.as_str()).collect();
/// assert_eq!(ids, ["123", "456"]);
/// ```
pub fn parse_identifiers<R: Read>(
    reader: R,
    config: &InputConfig,
) -> Result<Vec<Identifier>, InputError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(config)?)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let column = find_identifier_column(&headers, config).ok_or_else(|| {
        InputError::MissingColumn {
            expected: config.identifier_column.clone(),
            found: headers.iter().map(clean_header).collect(),
        }
    })?;
    debug!(column, "identifier column located");

    let mut seen = HashSet::new();
    let mut identifiers = Vec::new();
    let mut duplicates = 0usize;
    let mut rejected = 0usize;

    for (row, record) in csv_reader.records().enumerate() {
        let record = record?;
        let Some(raw) = record.get(column).filter(|v| !v.is_empty()) else {
            continue;
        };

        match Identifier::parse(raw) {
            Some(id) => {
                if seen.insert(id.clone()) {
                    identifiers.push(id);
                } else {
                    duplicates += 1;
                }
            }
            None => {
                rejected += 1;
                // header is line 1
                warn!(line = row + 2, value = raw, "skipping value that is not an OCLC number");
            }
        }
    }

    if identifiers.is_empty() {
        return Err(InputError::Empty);
    }

    info!(
        identifiers = identifiers.len(),
        duplicates, rejected, "parsed identifier table"
    );
    Ok(identifiers)
}

/// Read and parse an identifier table from a file
pub fn parse_identifiers_from_path(
    path: impl AsRef<Path>,
    config: &InputConfig,
) -> Result<Vec<Identifier>, InputError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|e| InputError::Malformed {
        line: 0,
        reason: format!("cannot open {}: {}", path.display(), e),
    })?;
    parse_identifiers(std::io::BufReader::new(file), config)
}

fn delimiter_byte(config: &InputConfig) -> Result<u8, InputError> {
    u8::try_from(config.delimiter)
        .ok()
        .filter(u8::is_ascii)
        .ok_or_else(|| InputError::Malformed {
            line: 0,
            reason: format!("unsupported delimiter {:?}", config.delimiter),
        })
}

fn clean_header(header: &str) -> String {
    header.trim_start_matches('\u{feff}').trim().to_string()
}

fn find_identifier_column(headers: &csv::StringRecord, config: &InputConfig) -> Option<usize> {
    let headers: Vec<String> = headers.iter().map(clean_header).collect();
    let wanted = config.identifier_column.trim();

    headers.iter().position(|h| h == wanted).or_else(|| {
        headers.iter().position(|h| {
            h.eq_ignore_ascii_case(wanted)
                || config
                    .column_aliases
                    .iter()
                    .any(|alias| h.eq_ignore_ascii_case(alias.trim()))
        })
    })
}
