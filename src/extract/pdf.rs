use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use regex::Regex;

use crate::country::country_for_callsign;
use crate::dates::{
    extract_cutoff_from_document_text, extract_cutoff_from_filename, parse_local_date_to_utc,
};
use crate::extract::{ExtractContext, ExtractOutcome, RosterExtractor, majority_country};
use crate::model::IncomingRow;
use crate::normalize::{normalize_ascii, normalize_callsign};

/// Extractor for government roster PDFs. Page text comes from the
/// `pdftotext` text layer in layout mode; table structure is recovered
/// per page by an ordered cascade of detection strategies.
pub struct PdfRoster {
    pub max_pages: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    Callsign,
    Name,
    Surname,
    Category,
    Type,
    Region,
    District,
    Province,
    Department,
    License,
    Resolution,
    Expiration,
}

type ColumnMap = HashMap<Column, usize>;

/// Header synonyms folded before token matching; keys are already
/// ASCII-folded and lowercased.
const HEADER_SYNONYMS: &[(&str, &str)] = &[
    ("razon social", "nombre"),
    ("fecha de vencimiento", "fecha"),
    ("fecha vencimiento", "fecha"),
    ("distintivo de llamada", "indicativo"),
    ("senal distintiva", "indicativo"),
];

const FIELD_TOKENS: &[(&str, Column)] = &[
    ("indicativo", Column::Callsign),
    ("nombre", Column::Name),
    ("apellido", Column::Surname),
    ("categoria", Column::Category),
    ("tipo", Column::Type),
    ("region", Column::Region),
    ("distrito", Column::District),
    ("provincia", Column::Province),
    ("departamento", Column::Department),
    ("permiso", Column::License),
    ("licencia", Column::License),
    ("resolucion", Column::Resolution),
    ("fecha", Column::Expiration),
];

struct HeaderProfile {
    tokens: &'static [&'static str],
    required: &'static [Column],
}

const HEADER_PROFILES: &[HeaderProfile] = &[
    HeaderProfile {
        tokens: &["indicativo", "nombre", "categoria", "fecha"],
        required: &[
            Column::Callsign,
            Column::Name,
            Column::Category,
            Column::Expiration,
        ],
    },
    // Uruguayan layout: permit number plus split name columns.
    HeaderProfile {
        tokens: &["permiso", "nombre", "apellido"],
        required: &[Column::License, Column::Name],
    },
];

impl RosterExtractor for PdfRoster {
    fn extract(&self, source: &Path, context: &ExtractContext) -> Result<ExtractOutcome> {
        let pages = extract_pages_with_pdftotext(source, self.max_pages)?;
        let mut outcome = extract_rows_from_pages(&pages, context)?;

        if outcome.cutoff.is_none() {
            let filename = source
                .file_name()
                .and_then(|name| name.to_str())
                .unwrap_or_default();
            if let Some(date) = extract_cutoff_from_filename(filename) {
                outcome.cutoff = parse_local_date_to_utc(&date, &outcome.country);
            }
        }
        for row in &mut outcome.rows {
            row.cutoff_at = outcome.cutoff;
        }

        Ok(outcome)
    }
}

fn extract_pages_with_pdftotext(
    pdf_path: &Path,
    max_pages: Option<usize>,
) -> Result<Vec<String>> {
    let mut command = Command::new("pdftotext");
    command.arg("-layout").arg("-enc").arg("UTF-8").arg("-f").arg("1");
    if let Some(max_pages) = max_pages {
        command.arg("-l").arg(max_pages.to_string());
    }
    command.arg(pdf_path).arg("-");

    let output = command
        .output()
        .with_context(|| format!("failed to execute pdftotext for {}", pdf_path.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!(
            "pdftotext returned non-zero exit status for {}: {}",
            pdf_path.display(),
            stderr.trim()
        );
    }

    let raw = String::from_utf8_lossy(&output.stdout);
    let mut pages: Vec<String> = raw
        .split('\u{000C}')
        .map(|chunk| chunk.replace('\u{0000}', ""))
        .collect();

    while let Some(last_page) = pages.last() {
        if last_page.trim().is_empty() {
            pages.pop();
            continue;
        }
        break;
    }

    Ok(pages)
}

/// Walk the page texts, recovering table rows and converting them to
/// incoming records. The last located column mapping is carried forward
/// for continuation pages that repeat no header.
fn extract_rows_from_pages(pages: &[String], context: &ExtractContext) -> Result<ExtractOutcome> {
    let callsign_regex = Regex::new(r"([A-Z0-9]*[0-9][A-Z0-9]*)\s*-\s*([A-Z0-9]+)")
        .context("failed to compile callsign regex")?;

    let mut rows = Vec::<IncomingRow>::new();
    let mut seen = HashSet::<String>::new();
    let mut remembered: Option<ColumnMap> = None;
    let mut rows_skipped = 0usize;

    for (index, page) in pages.iter().enumerate() {
        context.check_cancelled()?;
        context.report((index + 1) as i64, pages.len() as i64);

        let table = page_table_rows(page);
        if table.is_empty() {
            continue;
        }

        let (data_start, map) = match locate_header(&table) {
            Some((header_index, map)) => {
                remembered = Some(map.clone());
                (header_index + 1, map)
            }
            None => match remembered.clone() {
                Some(map) => (0, map),
                None => continue,
            },
        };

        for cells in &table[data_start..] {
            let raw_callsign = cell_text(cells, &map, Column::Callsign);
            if raw_callsign.is_empty() {
                continue;
            }

            let Some(callsign) = recover_callsign(&raw_callsign, &callsign_regex) else {
                rows_skipped += 1;
                continue;
            };
            if !seen.insert(callsign.clone()) {
                continue;
            }

            let country = country_for_callsign(&callsign).unwrap_or_default();

            let mut row = IncomingRow::new(callsign);
            row.name = joined_name(cells, &map);
            row.category = cell_text(cells, &map, Column::Category);
            row.operator_type = cell_text(cells, &map, Column::Type);
            row.region = cell_text(cells, &map, Column::Region);
            row.district = cell_text(cells, &map, Column::District);
            row.province = cell_text(cells, &map, Column::Province);
            row.department = cell_text(cells, &map, Column::Department);
            row.license = cell_text(cells, &map, Column::License);
            row.resolution = cell_text(cells, &map, Column::Resolution);
            row.country = country.to_string();

            let expiration = cell_text(cells, &map, Column::Expiration);
            if !expiration.is_empty() {
                row.expires_at = parse_local_date_to_utc(&expiration, country);
            }

            rows.push(row);
        }
    }

    let country = majority_country(&rows);
    let cutoff = pages
        .first()
        .and_then(|page| extract_cutoff_from_document_text(page))
        .and_then(|date| parse_local_date_to_utc(&date, &country));

    Ok(ExtractOutcome {
        country,
        cutoff,
        pages_processed: pages.len(),
        rows_skipped,
        warnings: Vec::new(),
        rows,
    })
}

/// Try the detection strategies in priority order; the first one that
/// yields any rows wins the page and the rest are not consulted.
fn page_table_rows(page: &str) -> Vec<Vec<String>> {
    let strategies: &[fn(&str) -> Vec<Vec<String>>] = &[
        strategy_delimited,
        strategy_aligned_columns,
        strategy_header_gap_columns,
        strategy_whitespace_split,
    ];

    for strategy in strategies {
        let rows = strategy(page);
        if !rows.is_empty() {
            return rows;
        }
    }

    Vec::new()
}

/// Explicitly ruled tables: cells separated by pipe characters.
fn strategy_delimited(page: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for line in page.lines() {
        if line.matches('|').count() < 2 {
            continue;
        }

        let cells = line
            .split('|')
            .map(collapse_whitespace)
            .collect::<Vec<String>>();
        let trimmed = trim_edge_cells(cells);
        if trimmed.iter().filter(|cell| !cell.is_empty()).count() >= 2 {
            rows.push(trimmed);
        }
    }
    rows
}

/// Default heuristic: character columns that stay blank across every
/// table line form the column gutters. Prose lines (titles, footers)
/// carry no wide internal gap and are left out of the consensus.
fn strategy_aligned_columns(page: &str) -> Vec<Vec<String>> {
    let lines = page
        .lines()
        .filter(|line| line.trim().contains("  "))
        .collect::<Vec<&str>>();
    if lines.len() < 3 {
        return Vec::new();
    }

    let width = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0);
    if width == 0 {
        return Vec::new();
    }

    let mut blank = vec![true; width];
    for line in &lines {
        for (position, character) in line.chars().enumerate() {
            if character != ' ' {
                blank[position] = false;
            }
        }
    }

    let spans = column_spans(&blank);
    if spans.len() < 2 {
        return Vec::new();
    }

    lines
        .iter()
        .map(|line| slice_line(line, &spans))
        .filter(|cells| cells.iter().any(|cell| !cell.is_empty()))
        .collect()
}

/// Column boundaries taken from the header line's own gaps, rows split
/// textually from the header onward.
fn strategy_header_gap_columns(page: &str) -> Vec<Vec<String>> {
    let lines = page.lines().collect::<Vec<&str>>();

    let header_position = lines.iter().position(|line| {
        let normalized = normalize_header_cell(line);
        HEADER_PROFILES
            .iter()
            .any(|profile| profile.tokens.iter().all(|token| normalized.contains(token)))
    });
    let Some(header_position) = header_position else {
        return Vec::new();
    };

    let header_line = lines[header_position];
    let width = header_line.chars().count();
    let mut blank = vec![false; width];
    for (position, character) in header_line.chars().enumerate() {
        if character == ' ' {
            blank[position] = true;
        }
    }

    let spans = column_spans(&blank);
    if spans.len() < 2 {
        return Vec::new();
    }

    lines[header_position..]
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| slice_line(line, &spans))
        .filter(|cells| cells.iter().any(|cell| !cell.is_empty()))
        .collect()
}

/// Last resort: split every line on runs of two or more spaces.
fn strategy_whitespace_split(page: &str) -> Vec<Vec<String>> {
    let Ok(gap) = Regex::new(r"\s{2,}") else {
        return Vec::new();
    };

    let mut rows = Vec::new();
    for line in page.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let cells = gap
            .split(trimmed)
            .map(collapse_whitespace)
            .filter(|cell| !cell.is_empty())
            .collect::<Vec<String>>();
        if cells.len() >= 2 {
            rows.push(cells);
        }
    }
    rows
}

/// Maximal gutter runs of width >= 2 split the line into column spans.
/// The final span is open-ended so ragged last columns survive.
fn column_spans(blank: &[bool]) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    let mut gap_run = 0usize;

    for (position, is_blank) in blank.iter().enumerate() {
        if *is_blank {
            gap_run += 1;
            if gap_run == 2
                && let Some(span_start) = start.take()
            {
                spans.push((span_start, position - 1));
            }
        } else {
            gap_run = 0;
            if start.is_none() {
                start = Some(position);
            }
        }
    }

    if let Some(span_start) = start {
        spans.push((span_start, usize::MAX));
    } else if let Some(last) = spans.last_mut() {
        last.1 = usize::MAX;
    }

    spans
}

fn slice_line(line: &str, spans: &[(usize, usize)]) -> Vec<String> {
    let characters = line.chars().collect::<Vec<char>>();
    spans
        .iter()
        .map(|(start, end)| {
            if *start >= characters.len() {
                return String::new();
            }
            let end = (*end).min(characters.len());
            let cell = characters[*start..end].iter().collect::<String>();
            collapse_whitespace(&cell)
        })
        .collect()
}

fn collapse_whitespace<S: AsRef<str>>(text: S) -> String {
    text.as_ref().split_whitespace().collect::<Vec<&str>>().join(" ")
}

fn trim_edge_cells(mut cells: Vec<String>) -> Vec<String> {
    while cells.first().map(|cell| cell.is_empty()).unwrap_or(false) {
        cells.remove(0);
    }
    while cells.last().map(|cell| cell.is_empty()).unwrap_or(false) {
        cells.pop();
    }
    cells
}

fn normalize_header_cell(cell: &str) -> String {
    let mut normalized = collapse_whitespace(normalize_ascii(cell).to_lowercase());
    for (synonym, canonical) in HEADER_SYNONYMS {
        normalized = normalized.replace(synonym, canonical);
    }
    normalized
}

/// Find the header row and build the canonical-field → column-index map.
/// A candidate is rejected when a required field stays unmapped or two
/// required fields land on the same column (ambiguous header); scanning
/// then continues with later rows.
fn locate_header(rows: &[Vec<String>]) -> Option<(usize, ColumnMap)> {
    for (index, cells) in rows.iter().enumerate() {
        let joined = cells
            .iter()
            .map(|cell| normalize_header_cell(cell))
            .collect::<Vec<String>>()
            .join(" ");

        for profile in HEADER_PROFILES {
            if !profile.tokens.iter().all(|token| joined.contains(token)) {
                continue;
            }
            if let Some(map) = build_column_map(cells, profile.required) {
                return Some((index, map));
            }
        }
    }
    None
}

fn build_column_map(cells: &[String], required: &[Column]) -> Option<ColumnMap> {
    let mut map = ColumnMap::new();

    for (index, cell) in cells.iter().enumerate() {
        let normalized = normalize_header_cell(cell);
        if normalized.is_empty() {
            continue;
        }

        for (token, column) in FIELD_TOKENS {
            if normalized.contains(token) {
                map.entry(*column).or_insert(index);
            }
        }
    }

    let mut used = HashSet::new();
    for column in required {
        let index = map.get(column)?;
        if !used.insert(*index) {
            return None;
        }
    }

    Some(map)
}

fn cell_text(cells: &[String], map: &ColumnMap, column: Column) -> String {
    map.get(&column)
        .and_then(|index| cells.get(*index))
        .map(|cell| collapse_whitespace(cell))
        .unwrap_or_default()
}

fn joined_name(cells: &[String], map: &ColumnMap) -> String {
    let name = cell_text(cells, map, Column::Name);
    let surname = cell_text(cells, map, Column::Surname);
    collapse_whitespace(format!("{name} {surname}"))
}

/// Strip surrounding noise from a callsign cell: scan for the
/// digit-bearing-prefix hyphen form, then canonicalize.
fn recover_callsign(raw: &str, pattern: &Regex) -> Option<String> {
    let cleaned = normalize_ascii(raw);
    let captures = pattern.captures(&cleaned)?;
    Some(normalize_callsign(&format!("{}-{}", &captures[1], &captures[2])))
}
