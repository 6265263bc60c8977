use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use calamine::{Data, Reader, open_workbook_auto};
use chrono::Utc;
use regex::Regex;
use tracing::warn;

use crate::country::country_for_callsign;
use crate::dates::{date_at_country_midnight, parse_flexible_date};
use crate::error::ImportError;
use crate::extract::{ExtractContext, ExtractOutcome, RosterExtractor};
use crate::model::IncomingRow;
use crate::normalize::normalize_ascii;

/// Extractor for the single known national spreadsheet layout (Chilean
/// SUBTEL export). There is no generic fallback: a workbook whose first
/// row is missing any required header is a format mismatch.
pub struct ExcelRoster {
    pub expected_country: String,
}

impl Default for ExcelRoster {
    fn default() -> Self {
        Self {
            expected_country: "CHL".to_string(),
        }
    }
}

/// Required header tokens, ASCII-folded and lowercased.
const REQUIRED_HEADERS: &[&str] = &[
    "licencia",
    "senal distintiva",
    "nombre",
    "rut",
    "region",
    "comuna",
    "fecha vencimiento",
];

#[derive(Debug)]
struct ColumnMapping {
    license: usize,
    callsign: usize,
    name: usize,
    region: usize,
    comuna: usize,
    expiration: usize,
}

impl RosterExtractor for ExcelRoster {
    fn extract(&self, source: &Path, context: &ExtractContext) -> Result<ExtractOutcome> {
        let mut workbook = open_workbook_auto(source)
            .with_context(|| format!("failed to open workbook {}", source.display()))?;

        let sheet_names = workbook.sheet_names().to_vec();
        let Some(sheet_name) = sheet_names.first() else {
            return Err(format_mismatch(source, "workbook has no sheets").into());
        };

        let range = workbook
            .worksheet_range(sheet_name)
            .with_context(|| format!("failed to read sheet '{sheet_name}'"))?;

        let mut sheet_rows = range.rows();
        let headers = sheet_rows
            .next()
            .map(|row| row.iter().map(cell_string).collect::<Vec<String>>())
            .unwrap_or_default();

        let mapping = match map_columns(&headers) {
            Ok(mapping) => mapping,
            Err(reason) => return Err(format_mismatch(source, &reason).into()),
        };

        let cutoff = cutoff_from_filename(source, &self.expected_country);

        let total_rows = range.get_size().0.saturating_sub(1);
        let mut rows = Vec::<IncomingRow>::new();
        let mut seen = HashSet::<String>::new();
        let mut rows_skipped = 0usize;
        let mut warnings = Vec::<String>::new();

        for (index, sheet_row) in sheet_rows.enumerate() {
            context.check_cancelled()?;
            context.report((index + 1) as i64, total_rows as i64);

            if sheet_row.iter().all(|cell| cell_string(cell).trim().is_empty()) {
                continue;
            }

            let raw_callsign = cell_at(sheet_row, mapping.callsign);
            if raw_callsign.trim().is_empty() {
                rows_skipped += 1;
                continue;
            }

            // Spreadsheet callsigns are plain; only embedded whitespace is
            // removed, no hyphen resolution.
            let callsign = normalize_ascii(&raw_callsign)
                .chars()
                .filter(|character| !character.is_whitespace())
                .collect::<String>();

            if country_for_callsign(&callsign) != Some(self.expected_country.as_str()) {
                warn!(callsign = %callsign, "callsign outside the expected country, skipping");
                rows_skipped += 1;
                continue;
            }
            if !seen.insert(callsign.clone()) {
                continue;
            }

            let region = cell_at(sheet_row, mapping.region);
            let comuna = cell_at(sheet_row, mapping.comuna);

            let mut row = IncomingRow::new(callsign);
            row.name = cell_at(sheet_row, mapping.name);
            row.license = cell_at(sheet_row, mapping.license);
            row.region = combined_region(&region, &comuna);
            row.district = comuna;
            row.country = self.expected_country.clone();
            row.cutoff_at = cutoff;
            row.expires_at = expiration_instant(
                sheet_row.get(mapping.expiration),
                &self.expected_country,
            );
            rows.push(row);
        }

        if rows.is_empty() {
            warnings.push(format!(
                "no usable rows in sheet '{sheet_name}' of {}",
                source.display()
            ));
        }

        Ok(ExtractOutcome {
            country: self.expected_country.clone(),
            cutoff,
            pages_processed: 1,
            rows_skipped,
            warnings,
            rows,
        })
    }
}

fn format_mismatch(source: &Path, reason: &str) -> ImportError {
    ImportError::FormatMismatch {
        path: source.display().to_string(),
        reason: reason.to_string(),
    }
}

fn cell_string(cell: &Data) -> String {
    match cell {
        Data::String(value) => value.trim().to_string(),
        Data::Empty => String::new(),
        other => other.to_string().trim().to_string(),
    }
}

fn cell_at(row: &[Data], index: usize) -> String {
    row.get(index).map(cell_string).unwrap_or_default()
}

fn normalize_header(header: &str) -> String {
    normalize_ascii(header)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

fn find_column(headers: &[String], token: &str) -> Option<usize> {
    headers
        .iter()
        .position(|header| normalize_header(header).contains(token))
}

fn map_columns(headers: &[String]) -> Result<ColumnMapping, String> {
    let missing = REQUIRED_HEADERS
        .iter()
        .filter(|token| find_column(headers, token).is_none())
        .copied()
        .collect::<Vec<&str>>();
    if !missing.is_empty() {
        return Err(format!(
            "first row does not look like the known national layout, missing: {}",
            missing.join(", ")
        ));
    }

    Ok(ColumnMapping {
        license: find_column(headers, "licencia").unwrap_or(0),
        callsign: find_column(headers, "senal distintiva").unwrap_or(0),
        name: find_column(headers, "nombre").unwrap_or(0),
        region: find_column(headers, "region").unwrap_or(0),
        comuna: find_column(headers, "comuna").unwrap_or(0),
        expiration: find_column(headers, "fecha vencimiento").unwrap_or(0),
    })
}

fn combined_region(region: &str, comuna: &str) -> String {
    match (region.is_empty(), comuna.is_empty()) {
        (false, false) => format!("{region} - {comuna}"),
        (false, true) => region.to_string(),
        (true, false) => comuna.to_string(),
        (true, true) => String::new(),
    }
}

fn expiration_instant(cell: Option<&Data>, country: &str) -> Option<chrono::DateTime<Utc>> {
    let cell = cell?;

    if let Data::DateTime(value) = cell {
        let naive = value.as_datetime()?;
        return date_at_country_midnight(naive.date(), country);
    }

    let text = cell_string(cell);
    if text.is_empty() {
        return None;
    }
    parse_flexible_date(&text).and_then(|date| date_at_country_midnight(date, country))
}

/// The export filename embeds its generation date as month-day-year in a
/// few digit groupings; without one the batch falls back to the current
/// instant.
fn cutoff_from_filename(source: &Path, country: &str) -> Option<chrono::DateTime<Utc>> {
    let filename = source
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or_default();

    parse_month_day_year(filename)
        .and_then(|date| date_at_country_midnight(date, country))
        .or_else(|| Some(Utc::now()))
}

fn parse_month_day_year(filename: &str) -> Option<chrono::NaiveDate> {
    let separated = Regex::new(r"(\d{1,2})[-_.](\d{1,2})[-_.](\d{4})").ok()?;
    if let Some(captures) = separated.captures(filename) {
        let month: u32 = captures[1].parse().ok()?;
        let day: u32 = captures[2].parse().ok()?;
        let year: i32 = captures[3].parse().ok()?;
        return chrono::NaiveDate::from_ymd_opt(year, month, day);
    }

    let compact = Regex::new(r"(\d{2})(\d{2})(\d{4})").ok()?;
    if let Some(captures) = compact.captures(filename) {
        let month: u32 = captures[1].parse().ok()?;
        let day: u32 = captures[2].parse().ok()?;
        let year: i32 = captures[3].parse().ok()?;
        return chrono::NaiveDate::from_ymd_opt(year, month, day);
    }

    None
}
