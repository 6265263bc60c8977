use crate::normalize::normalize_ascii;

/// ITU callsign prefix allocations for the administrations seen in the
/// supported rosters, plus the neighbours that show up as portable
/// operators. Lookup is longest-matching-prefix-first.
const ITU_PREFIXES: &[(&str, &str)] = &[
    ("OA", "PER"),
    ("OB", "PER"),
    ("OC", "PER"),
    ("4T", "PER"),
    ("CA", "CHL"),
    ("CB", "CHL"),
    ("CC", "CHL"),
    ("CD", "CHL"),
    ("CE", "CHL"),
    ("XQ", "CHL"),
    ("XR", "CHL"),
    ("3G", "CHL"),
    ("CV", "URY"),
    ("CW", "URY"),
    ("CX", "URY"),
    ("LO", "ARG"),
    ("LP", "ARG"),
    ("LQ", "ARG"),
    ("LR", "ARG"),
    ("LS", "ARG"),
    ("LT", "ARG"),
    ("LU", "ARG"),
    ("LV", "ARG"),
    ("LW", "ARG"),
    ("AY", "ARG"),
    ("AZ", "ARG"),
    ("CP", "BOL"),
    ("PP", "BRA"),
    ("PQ", "BRA"),
    ("PR", "BRA"),
    ("PS", "BRA"),
    ("PT", "BRA"),
    ("PU", "BRA"),
    ("PV", "BRA"),
    ("PW", "BRA"),
    ("PX", "BRA"),
    ("PY", "BRA"),
    ("ZV", "BRA"),
    ("ZW", "BRA"),
    ("ZX", "BRA"),
    ("ZY", "BRA"),
    ("ZZ", "BRA"),
    ("HC", "ECU"),
    ("HD", "ECU"),
    ("HJ", "COL"),
    ("HK", "COL"),
    ("ZP", "PRY"),
    ("YV", "VEN"),
    ("YW", "VEN"),
    ("YX", "VEN"),
    ("YY", "VEN"),
    ("XE", "MEX"),
    ("XF", "MEX"),
    ("EA", "ESP"),
    ("EB", "ESP"),
    ("EC", "ESP"),
    ("ED", "ESP"),
    ("EE", "ESP"),
    ("K", "USA"),
    ("N", "USA"),
    ("W", "USA"),
    ("VA", "CAN"),
    ("VE", "CAN"),
    ("VY", "CAN"),
    ("ON", "BEL"),
    ("OO", "BEL"),
    ("G", "GBR"),
    ("M", "GBR"),
    ("DL", "DEU"),
    ("I", "ITA"),
];

const COUNTRY_NAMES: &[(&str, &str)] = &[
    ("PERU", "PER"),
    ("CHILE", "CHL"),
    ("URUGUAY", "URY"),
    ("ARGENTINA", "ARG"),
    ("BOLIVIA", "BOL"),
    ("BRASIL", "BRA"),
    ("BRAZIL", "BRA"),
    ("ECUADOR", "ECU"),
    ("COLOMBIA", "COL"),
    ("PARAGUAY", "PRY"),
    ("VENEZUELA", "VEN"),
    ("MEXICO", "MEX"),
    ("ESPANA", "ESP"),
    ("SPAIN", "ESP"),
    ("ESTADOS UNIDOS", "USA"),
    ("UNITED STATES", "USA"),
    ("CANADA", "CAN"),
    ("BELGICA", "BEL"),
    ("BELGIUM", "BEL"),
];

/// The prefix a national full-roster source lists its own licensees under;
/// used to derive the default absence-disabling scope for that source.
const PRIMARY_PREFIXES: &[(&str, &str)] = &[
    ("PER", "OA"),
    ("CHL", "CA"),
    ("URY", "CX"),
    ("ARG", "LU"),
    ("BOL", "CP"),
    ("BRA", "PY"),
    ("ECU", "HC"),
    ("COL", "HK"),
    ("PRY", "ZP"),
    ("VEN", "YV"),
];

fn longest_prefix_match(segment: &str) -> Option<&'static str> {
    let mut best: Option<(&str, &str)> = None;
    for (prefix, country) in ITU_PREFIXES {
        if segment.starts_with(prefix)
            && best.map(|(current, _)| prefix.len() > current.len()).unwrap_or(true)
        {
            best = Some((prefix, country));
        }
    }
    best.map(|(_, country)| country)
}

/// Resolve a canonical callsign to its issuing country. Portable forms
/// ("OA8/ON5VLG") are split on slash/hyphen and the shortest segment is
/// tried first, so the zone prefix wins over the home call.
pub fn country_for_callsign(callsign: &str) -> Option<&'static str> {
    let mut segments = callsign
        .split(['/', '-'])
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<&str>>();
    segments.sort_by_key(|segment| segment.len());

    segments.into_iter().find_map(longest_prefix_match)
}

/// Map a spelled-out country name (Spanish or English) to its ITU-style
/// code. Returns `None` for unrecognized names.
pub fn country_code_for_name(name: &str) -> Option<&'static str> {
    let normalized = normalize_ascii(name.trim());
    COUNTRY_NAMES
        .iter()
        .find(|(known, _)| *known == normalized)
        .map(|(_, code)| *code)
}

pub fn primary_prefix(country: &str) -> Option<&'static str> {
    PRIMARY_PREFIXES
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, prefix)| *prefix)
}
