//! Bulk stock import from a delimited export.
//!
//! Column names vary between source systems, so the header is located by
//! synonym rather than by position. Quantities must be whole, non-negative
//! numbers; anything else rejects that row only.

use serde::{Deserialize, Serialize};

use mekgoro_core::{ItemKey, LedgerError, LedgerResult};

const ITEM_COLUMNS: &[&str] = &[
    "description",
    "item",
    "item description",
    "item name",
    "product",
    "product name",
    "name",
];

const QUANTITY_COLUMNS: &[&str] = &["qty on hand", "quantity on hand", "quantity", "qty", "on hand", "stock"];

/// Preamble rows (titles, export dates) tolerated before the header.
const HEADER_SCAN_ROWS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRow {
    /// 1-based line in the source file.
    pub line: u64,
    pub item_key: ItemKey,
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedImport {
    pub rows: Vec<ImportRow>,
    pub rejected: Vec<RejectedRow>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub source: String,
    pub created: usize,
    pub skipped_existing: usize,
    pub rejected: Vec<RejectedRow>,
}

impl ImportReport {
    pub fn new(source: impl Into<String>, rejected: Vec<RejectedRow>) -> Self {
        Self {
            source: source.into(),
            rejected,
            ..Self::default()
        }
    }
}

#[derive(Debug, Copy, Clone)]
struct Columns {
    item: usize,
    quantity: usize,
}

fn normalize_header(raw: &str) -> String {
    raw.trim_start_matches('\u{feff}')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn find_column(record: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    // Earlier synonyms win when a sheet carries several candidates.
    synonyms.iter().find_map(|wanted| {
        record
            .iter()
            .position(|field| normalize_header(field) == *wanted)
    })
}

fn detect_columns(record: &csv::StringRecord) -> Option<Columns> {
    let item = find_column(record, ITEM_COLUMNS)?;
    let quantity = find_column(record, QUANTITY_COLUMNS)?;
    (item != quantity).then_some(Columns { item, quantity })
}

/// Parse an opening quantity: `12`, `12.0` and `1,200` are accepted.
pub fn parse_quantity(raw: &str) -> Result<i64, String> {
    let cleaned: String = raw.chars().filter(|c| *c != ',' && !c.is_whitespace()).collect();
    if cleaned.is_empty() {
        return Err("missing quantity".to_string());
    }
    if cleaned.starts_with('-') {
        return Err(format!("negative quantity '{}'", raw.trim()));
    }

    let unsigned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    let (whole, fraction) = match unsigned.split_once('.') {
        Some((whole, fraction)) => (whole, fraction),
        None => (unsigned, ""),
    };

    let digits_only = |s: &str| s.chars().all(|c| c.is_ascii_digit());
    if whole.is_empty() || !digits_only(whole) || !digits_only(fraction) {
        return Err(format!("quantity '{}' is not a number", raw.trim()));
    }
    if fraction.chars().any(|c| c != '0') {
        return Err(format!("fractional quantity '{}'", raw.trim()));
    }

    whole
        .parse::<i64>()
        .map_err(|_| format!("quantity '{}' is out of range", raw.trim()))
}

/// Parse a stock export into seedable rows.
///
/// Fails with `ImportFormat` when no header with both an item and a quantity
/// column is found near the top of the file.
pub fn parse_stock_csv(input: &[u8]) -> LedgerResult<ParsedImport> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let mut columns: Option<Columns> = None;
    let mut scanned = 0usize;
    let mut parsed = ParsedImport::default();

    for result in reader.records() {
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                let line = err.position().map(|p| p.line()).unwrap_or(0);
                if columns.is_none() {
                    return Err(LedgerError::import_format(format!("unreadable header area: {err}")));
                }
                parsed.rejected.push(RejectedRow {
                    line,
                    reason: format!("unreadable row: {err}"),
                });
                continue;
            }
        };
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let Some(cols) = columns else {
            scanned += 1;
            columns = detect_columns(&record);
            if columns.is_none() && scanned >= HEADER_SCAN_ROWS {
                break;
            }
            continue;
        };

        if record.iter().all(str::is_empty) {
            continue;
        }

        let item = record.get(cols.item).unwrap_or_default();
        let item_key = match ItemKey::parse(item) {
            Ok(key) => key,
            Err(_) => {
                parsed.rejected.push(RejectedRow {
                    line,
                    reason: "missing item description".to_string(),
                });
                continue;
            }
        };

        match parse_quantity(record.get(cols.quantity).unwrap_or_default()) {
            Ok(quantity) => parsed.rows.push(ImportRow { line, item_key, quantity }),
            Err(reason) => parsed.rejected.push(RejectedRow {
                line,
                reason: format!("{item_key}: {reason}"),
            }),
        }
    }

    if columns.is_none() {
        return Err(LedgerError::import_format(
            "no header row with both an item description and a quantity column",
        ));
    }
    Ok(parsed)
}
