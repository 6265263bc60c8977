use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::normalize::normalize_ascii;

/// Fixed 3-letter Spanish month abbreviations. September appears both as
/// SEP and the Rioplatense SET.
const MONTH_ABBREVIATIONS: &[(&str, u32)] = &[
    ("ENE", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("ABR", 4),
    ("MAY", 5),
    ("JUN", 6),
    ("JUL", 7),
    ("AGO", 8),
    ("SEP", 9),
    ("SET", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DIC", 12),
];

const MONTH_NAMES: &[(&str, u32)] = &[
    ("ENERO", 1),
    ("FEBRERO", 2),
    ("MARZO", 3),
    ("ABRIL", 4),
    ("MAYO", 5),
    ("JUNIO", 6),
    ("JULIO", 7),
    ("AGOSTO", 8),
    ("SEPTIEMBRE", 9),
    ("SETIEMBRE", 9),
    ("OCTUBRE", 10),
    ("NOVIEMBRE", 11),
    ("DICIEMBRE", 12),
];

/// Approximate fixed offset for a source country's local time, in hours
/// east of UTC. Roster validity dates are calendar dates in the issuing
/// administration's zone.
fn country_offset_hours(country: &str) -> i32 {
    match country {
        "URY" => -3,
        "PER" => -5,
        _ => 0,
    }
}

fn month_from_name(token: &str) -> Option<u32> {
    let token = normalize_ascii(token);
    MONTH_NAMES
        .iter()
        .find(|(name, _)| *name == token)
        .map(|(_, month)| *month)
}

fn month_from_abbreviation(token: &str) -> Option<u32> {
    let token = normalize_ascii(token);
    let token = token.trim_end_matches('.');
    MONTH_ABBREVIATIONS
        .iter()
        .find(|(abbr, _)| *abbr == token)
        .map(|(_, month)| *month)
}

fn month_from_token(token: &str) -> Option<u32> {
    if let Some(month) = month_from_name(token) {
        return Some(month);
    }

    let token = normalize_ascii(token);
    let short = token.get(..3)?;
    month_from_abbreviation(short)
}

/// Interpret a naive calendar date as midnight in the country's fixed
/// offset and convert to an absolute UTC instant.
pub fn date_at_country_midnight(date: NaiveDate, country: &str) -> Option<DateTime<Utc>> {
    let offset = FixedOffset::east_opt(country_offset_hours(country) * 3600)?;
    let naive = date.and_hms_opt(0, 0, 0)?;
    Some(offset.from_local_datetime(&naive).single()?.with_timezone(&Utc))
}

/// Parse a heterogeneous local-date string into a UTC instant, trying in
/// order: `dd/mm/yyyy`, `dd MMM. yyyy`, `dd FULLMONTH yyyy` (with optional
/// DE/DEL connectors), `dd mm yyyy`. Returns `None` when no pattern
/// matches or the values are out of calendar range.
pub fn parse_local_date_to_utc(date_string: &str, country: &str) -> Option<DateTime<Utc>> {
    let text = normalize_ascii(date_string.trim());

    let (day, month, year) = parse_day_month_year(&text)?;
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    date_at_country_midnight(date, country)
}

fn parse_day_month_year(text: &str) -> Option<(u32, u32, i32)> {
    let slash = Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})$").ok()?;
    if let Some(captures) = slash.captures(text) {
        return Some((
            captures[1].parse().ok()?,
            captures[2].parse().ok()?,
            captures[3].parse().ok()?,
        ));
    }

    let abbreviated = Regex::new(r"^(\d{1,2})\s+([A-Z]{3})\.?\s+(\d{4})$").ok()?;
    if let Some(captures) = abbreviated.captures(text) {
        let month = month_from_abbreviation(&captures[2])?;
        return Some((captures[1].parse().ok()?, month, captures[3].parse().ok()?));
    }

    let full = Regex::new(r"^(\d{1,2})\s+(?:DE\s+)?([A-Z]+)\s+(?:DEL?\s+)?(\d{4})$").ok()?;
    if let Some(captures) = full.captures(text) {
        let month = month_from_name(&captures[2])?;
        return Some((captures[1].parse().ok()?, month, captures[3].parse().ok()?));
    }

    let spaced = Regex::new(r"^(\d{1,2})\s+(\d{1,2})\s+(\d{4})$").ok()?;
    if let Some(captures) = spaced.captures(text) {
        return Some((
            captures[1].parse().ok()?,
            captures[2].parse().ok()?,
            captures[3].parse().ok()?,
        ));
    }

    None
}

/// Scan document text for the stated validity date,
/// "AL <day> <MONTH-NAME> <year>", returning it as `dd/mm/yyyy`.
pub fn extract_cutoff_from_document_text(text: &str) -> Option<String> {
    let normalized = normalize_ascii(text);
    let pattern = Regex::new(r"\bAL\s+(\d{1,2})\s+(?:DE\s+)?([A-Z]+)\s+(?:DEL?\s+)?(\d{4})").ok()?;

    let captures = pattern.captures(&normalized)?;
    let day: u32 = captures[1].parse().ok()?;
    let month = month_from_name(&captures[2])?;
    let year: i32 = captures[3].parse().ok()?;

    NaiveDate::from_ymd_opt(year, month, day)?;
    Some(format!("{day:02}/{month:02}/{year}"))
}

/// Recover a validity date from the source filename when the document text
/// carries none. "al <day> <month> <year>" wins; a bare
/// "vigentes <month> <year>" defaults the day to 1.
pub fn extract_cutoff_from_filename(filename: &str) -> Option<String> {
    let normalized = normalize_ascii(filename).to_lowercase();

    let dated =
        Regex::new(r"al[^a-z0-9]+(\d{1,2})[^a-z0-9]+(?:de[^a-z0-9]+)?([a-z]{3,9})[^a-z0-9]+(\d{4})")
            .ok()?;
    if let Some(captures) = dated.captures(&normalized) {
        let day: u32 = captures[1].parse().ok()?;
        let month = month_from_token(&captures[2])?;
        let year: i32 = captures[3].parse().ok()?;
        NaiveDate::from_ymd_opt(year, month, day)?;
        return Some(format!("{day:02}/{month:02}/{year}"));
    }

    let monthly = Regex::new(r"vigentes[^a-z0-9]+([a-z]{3,9})[^a-z0-9]+(\d{4})").ok()?;
    if let Some(captures) = monthly.captures(&normalized) {
        let month = month_from_token(&captures[1])?;
        let year: i32 = captures[2].parse().ok()?;
        return Some(format!("01/{month:02}/{year}"));
    }

    None
}

/// Multi-format calendar-date parsing for spreadsheet cells. Day-first
/// formats are tried before month-first so ambiguous values resolve the
/// way the source countries write them.
pub fn parse_flexible_date(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in ["%d/%m/%Y", "%m/%d/%Y", "%Y-%m-%d", "%d-%m-%Y", "%Y/%m/%d"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    None
}

/// Parse a CSV `updated_at` cell, trying `HH:MM dd/mm/yyyy` then
/// `yyyy-mm-dd HH:MM:SS`. Values are taken as UTC.
pub fn parse_updated_at(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    for format in ["%H:%M %d/%m/%Y", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peru_local_date(instant: DateTime<Utc>) -> NaiveDate {
        let lima = FixedOffset::west_opt(5 * 3600).unwrap();
        instant.with_timezone(&lima).date_naive()
    }

    #[test]
    fn parse_local_date_round_trips_in_country_zone() {
        let instant = parse_local_date_to_utc("13/08/2025", "PER").unwrap();
        assert_eq!(peru_local_date(instant), NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());
        assert_eq!(
            instant,
            Utc.with_ymd_and_hms(2025, 8, 13, 5, 0, 0).unwrap()
        );
    }

    #[test]
    fn parse_local_date_applies_uruguay_offset() {
        let instant = parse_local_date_to_utc("01/02/2026", "URY").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 2, 1, 3, 0, 0).unwrap());
    }

    #[test]
    fn parse_local_date_defaults_unknown_countries_to_utc() {
        let instant = parse_local_date_to_utc("01/02/2026", "XXX").unwrap();
        assert_eq!(instant, Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn parse_local_date_accepts_abbreviated_months() {
        let instant = parse_local_date_to_utc("05 ENE. 2026", "PER").unwrap();
        assert_eq!(peru_local_date(instant), NaiveDate::from_ymd_opt(2026, 1, 5).unwrap());

        let set = parse_local_date_to_utc("05 SET 2025", "PER").unwrap();
        assert_eq!(peru_local_date(set), NaiveDate::from_ymd_opt(2025, 9, 5).unwrap());
    }

    #[test]
    fn parse_local_date_accepts_full_month_names() {
        let instant = parse_local_date_to_utc("13 DE AGOSTO DEL 2025", "PER").unwrap();
        assert_eq!(peru_local_date(instant), NaiveDate::from_ymd_opt(2025, 8, 13).unwrap());

        let setiembre = parse_local_date_to_utc("02 SETIEMBRE 2025", "PER").unwrap();
        let septiembre = parse_local_date_to_utc("02 SEPTIEMBRE 2025", "PER").unwrap();
        assert_eq!(setiembre, septiembre);
    }

    #[test]
    fn parse_local_date_accepts_space_delimited_numeric() {
        let instant = parse_local_date_to_utc("05 09 2025", "PER").unwrap();
        assert_eq!(peru_local_date(instant), NaiveDate::from_ymd_opt(2025, 9, 5).unwrap());
    }

    #[test]
    fn parse_local_date_rejects_garbage_and_out_of_range() {
        assert!(parse_local_date_to_utc("", "PER").is_none());
        assert!(parse_local_date_to_utc("pending", "PER").is_none());
        assert!(parse_local_date_to_utc("32/01/2025", "PER").is_none());
        assert!(parse_local_date_to_utc("13/13/2025", "PER").is_none());
    }

    #[test]
    fn extract_cutoff_from_document_text_finds_stated_validity() {
        let text = "RELACION DE PERMISOS VIGENTES AL 13 DE AGOSTO DEL 2025\nIndicativo Nombre";
        assert_eq!(
            extract_cutoff_from_document_text(text).as_deref(),
            Some("13/08/2025")
        );
    }

    #[test]
    fn extract_cutoff_from_document_text_handles_accents() {
        let text = "vigentes al 1 de setiembre del 2025";
        assert_eq!(
            extract_cutoff_from_document_text(text).as_deref(),
            Some("01/09/2025")
        );
        assert!(extract_cutoff_from_document_text("no date here").is_none());
    }

    #[test]
    fn extract_cutoff_from_filename_prefers_dated_pattern() {
        assert_eq!(
            extract_cutoff_from_filename("vigentes_al_13_agosto_2025.pdf").as_deref(),
            Some("13/08/2025")
        );
        assert_eq!(
            extract_cutoff_from_filename("relacion al 5 de ago 2025.pdf").as_deref(),
            Some("05/08/2025")
        );
    }

    #[test]
    fn extract_cutoff_from_filename_falls_back_to_month_only() {
        assert_eq!(
            extract_cutoff_from_filename("indicativos_vigentes_setiembre_2025.pdf").as_deref(),
            Some("01/09/2025")
        );
        assert!(extract_cutoff_from_filename("listado.pdf").is_none());
    }

    #[test]
    fn parse_flexible_date_tries_day_first_before_month_first() {
        assert_eq!(
            parse_flexible_date("05/04/2026"),
            NaiveDate::from_ymd_opt(2026, 4, 5)
        );
        assert_eq!(
            parse_flexible_date("2026-04-05"),
            NaiveDate::from_ymd_opt(2026, 4, 5)
        );
        assert_eq!(
            parse_flexible_date("25/12/2026"),
            NaiveDate::from_ymd_opt(2026, 12, 25)
        );
        assert!(parse_flexible_date("soon").is_none());
    }

    #[test]
    fn parse_updated_at_accepts_both_layouts() {
        assert_eq!(
            parse_updated_at("14:30 13/08/2025"),
            Some(Utc.with_ymd_and_hms(2025, 8, 13, 14, 30, 0).unwrap())
        );
        assert_eq!(
            parse_updated_at("2025-08-13 14:30:00"),
            Some(Utc.with_ymd_and_hms(2025, 8, 13, 14, 30, 0).unwrap())
        );
        assert!(parse_updated_at("yesterday").is_none());
    }
}
