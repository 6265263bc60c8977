use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use tracing::warn;

use crate::country::{country_code_for_name, country_for_callsign};
use crate::dates::{date_at_country_midnight, parse_updated_at};
use crate::extract::{ExtractContext, ExtractOutcome, RosterExtractor, majority_country};
use crate::model::IncomingRow;
use crate::normalize::{normalize_ascii, normalize_callsign};

/// Extractor for ad-hoc CSV exports: delimiter sniffed from a sample,
/// bilingual headers, tolerant per-row skip policy. CSV batches carry no
/// cutoff instant, since a filtered export asserts nothing about roster
/// validity.
pub struct CsvRoster;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Field {
    Callsign,
    Name,
    Category,
    Type,
    Region,
    District,
    Province,
    Department,
    License,
    Resolution,
    Expiration,
    Enabled,
    Country,
    UpdatedAt,
}

/// Bilingual header synonyms, matched exactly first and by substring
/// containment (either direction) second. Keys are ASCII-folded and
/// lowercased.
const HEADER_SYNONYMS: &[(&str, Field)] = &[
    ("indicativo", Field::Callsign),
    ("callsign", Field::Callsign),
    ("call sign", Field::Callsign),
    ("senal distintiva", Field::Callsign),
    ("nombre", Field::Name),
    ("name", Field::Name),
    ("categoria", Field::Category),
    ("category", Field::Category),
    ("tipo", Field::Type),
    ("type", Field::Type),
    ("region", Field::Region),
    ("distrito", Field::District),
    ("district", Field::District),
    ("provincia", Field::Province),
    ("province", Field::Province),
    ("departamento", Field::Department),
    ("department", Field::Department),
    ("licencia", Field::License),
    ("license", Field::License),
    ("resolucion", Field::Resolution),
    ("resolution", Field::Resolution),
    ("fecha vencimiento", Field::Expiration),
    ("vencimiento", Field::Expiration),
    ("expiration", Field::Expiration),
    ("expires", Field::Expiration),
    ("habilitado", Field::Enabled),
    ("enabled", Field::Enabled),
    ("activo", Field::Enabled),
    ("pais", Field::Country),
    ("country", Field::Country),
    ("actualizado", Field::UpdatedAt),
    ("updated at", Field::UpdatedAt),
    ("updated_at", Field::UpdatedAt),
];

const CATEGORY_SYNONYMS: &[(&str, &str)] = &[
    ("novicio", "NOVICIO"),
    ("novice", "NOVICIO"),
    ("intermedio", "INTERMEDIO"),
    ("intermedia", "INTERMEDIO"),
    ("intermediate", "INTERMEDIO"),
    ("general", "GENERAL"),
    ("superior", "SUPERIOR"),
    ("advanced", "SUPERIOR"),
    ("extra", "EXTRA"),
];

impl RosterExtractor for CsvRoster {
    fn extract(&self, source: &Path, context: &ExtractContext) -> Result<ExtractOutcome> {
        let content = fs::read_to_string(source)
            .with_context(|| format!("failed to read {}", source.display()))?;

        let outcome = extract_from_text(&content, context)?;
        Ok(outcome)
    }
}

fn extract_from_text(content: &str, context: &ExtractContext) -> Result<ExtractOutcome> {
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader
        .headers()
        .context("failed to read CSV header row")?
        .clone();
    let fields = map_headers(&headers);

    let mut rows = Vec::<IncomingRow>::new();
    let mut seen = HashSet::<String>::new();
    let mut rows_skipped = 0usize;
    let mut warnings = Vec::<String>::new();

    for (index, record) in reader.records().enumerate() {
        context.check_cancelled()?;
        context.report((index + 1) as i64, -1);

        let record = match record {
            Ok(record) => record,
            Err(error) => {
                warn!(line = index + 2, error = %error, "skipping malformed CSV row");
                rows_skipped += 1;
                continue;
            }
        };

        let value = |field: Field| -> String {
            fields
                .get(&field)
                .and_then(|column| record.get(*column))
                .unwrap_or_default()
                .trim()
                .to_string()
        };

        let raw_callsign = value(Field::Callsign);
        let name = value(Field::Name);
        if raw_callsign.is_empty() || name.is_empty() {
            warn!(line = index + 2, "row is missing callsign or name, skipping");
            rows_skipped += 1;
            continue;
        }

        let callsign = normalize_callsign(&raw_callsign);
        if !seen.insert(callsign.clone()) {
            continue;
        }

        let country = resolve_country(&value(Field::Country), &callsign);

        let mut row = IncomingRow::new(callsign);
        row.name = name;
        row.category = resolve_category(&value(Field::Category));
        row.operator_type = value(Field::Type);
        row.region = value(Field::Region);
        row.district = value(Field::District);
        row.province = value(Field::Province);
        row.department = value(Field::Department);
        row.license = value(Field::License);
        row.resolution = value(Field::Resolution);
        row.enabled = resolve_enabled(&value(Field::Enabled));
        row.expires_at = parse_row_date(&value(Field::Expiration))
            .and_then(|date| date_at_country_midnight(date, &country));
        row.updated_at = parse_updated_at(&value(Field::UpdatedAt));
        row.country = country;
        rows.push(row);
    }

    if rows.is_empty() {
        warnings.push("no usable rows in CSV source".to_string());
    }

    Ok(ExtractOutcome {
        country: majority_country(&rows),
        cutoff: None,
        pages_processed: 1,
        rows_skipped,
        warnings,
        rows,
    })
}

/// Count candidate delimiters over a short sample; comma wins ties and
/// empty samples.
fn sniff_delimiter(content: &str) -> u8 {
    let sample = content.lines().take(10).collect::<Vec<&str>>().join("\n");

    let mut best = b',';
    let mut best_count = 0usize;
    for candidate in [b',', b';', b'\t', b'|'] {
        let count = sample.bytes().filter(|byte| *byte == candidate).count();
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

fn normalize_header(header: &str) -> String {
    normalize_ascii(header)
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
}

fn map_headers(headers: &csv::StringRecord) -> HashMap<Field, usize> {
    let mut fields = HashMap::<Field, usize>::new();

    for (index, header) in headers.iter().enumerate() {
        let normalized = normalize_header(header);
        if normalized.is_empty() {
            continue;
        }

        let exact = HEADER_SYNONYMS
            .iter()
            .find(|(known, _)| *known == normalized);
        let matched = exact.or_else(|| {
            HEADER_SYNONYMS.iter().find(|(known, _)| {
                normalized.contains(known) || known.contains(normalized.as_str())
            })
        });

        if let Some((_, field)) = matched {
            fields.entry(*field).or_insert(index);
        }
    }

    fields
}

fn resolve_category(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let normalized = normalize_ascii(raw).to_lowercase();
    CATEGORY_SYNONYMS
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, canonical)| canonical.to_string())
        .unwrap_or_else(|| normalize_ascii(raw))
}

fn resolve_enabled(raw: &str) -> bool {
    match normalize_ascii(raw).to_lowercase().as_str() {
        "no" | "0" | "false" => false,
        // "sí"/"si"/"yes"/"1"/"true" and anything unrecognized enable.
        _ => true,
    }
}

/// Country cells longer than three characters are full names and go
/// through the reverse lookup; short ones are taken as codes. An empty
/// cell falls back to the callsign prefix.
fn resolve_country(raw: &str, callsign: &str) -> String {
    if raw.is_empty() {
        return country_for_callsign(callsign).unwrap_or_default().to_string();
    }

    if raw.chars().count() > 3 {
        if let Some(code) = country_code_for_name(raw) {
            return code.to_string();
        }
    }
    normalize_ascii(raw)
}

fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    if raw.is_empty() {
        return None;
    }
    for format in ["%d/%m/%Y", "%Y-%m-%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }
    None
}
