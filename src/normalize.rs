use unicode_normalization::UnicodeNormalization;
use unicode_normalization::char::is_combining_mark;

/// Decompose (NFD), drop combining marks, and uppercase.
pub fn normalize_ascii(text: &str) -> String {
    text.nfd()
        .filter(|character| !is_combining_mark(*character))
        .collect::<String>()
        .to_uppercase()
}

/// Canonicalize a raw callsign token.
///
/// A hyphen with a digit-free prefix is treated as noise. A hyphenated
/// suffix that itself contains a digit is a portable/foreign-operator call
/// and becomes `prefix/suffix`; a digit-free suffix is a same-zone suffix
/// and is concatenated onto the prefix.
pub fn normalize_callsign(raw: &str) -> String {
    let cleaned = normalize_ascii(raw)
        .split_whitespace()
        .collect::<Vec<&str>>()
        .join(" ")
        .replace(" - ", "-")
        .replace("- ", "-")
        .replace(" -", "-");

    let Some((prefix, rest)) = cleaned.split_once('-') else {
        return cleaned;
    };

    if !prefix.chars().any(|character| character.is_ascii_digit()) {
        return format!("{prefix}{rest}").replace('-', "");
    }

    let suffix = rest.replace('-', "");
    if suffix.chars().any(|character| character.is_ascii_digit()) {
        format!("{prefix}/{suffix}")
    } else {
        format!("{prefix}{suffix}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_ascii_strips_diacritics_and_uppercases() {
        assert_eq!(normalize_ascii("señal distintiva"), "SENAL DISTINTIVA");
        assert_eq!(normalize_ascii("Categoría"), "CATEGORIA");
        assert_eq!(normalize_ascii("ÁÉÍÓÚÜÑ"), "AEIOUUN");
    }

    #[test]
    fn normalize_callsign_concatenates_same_zone_suffix() {
        assert_eq!(normalize_callsign("OA4-BAU"), "OA4BAU");
    }

    #[test]
    fn normalize_callsign_slashes_foreign_operator_suffix() {
        assert_eq!(normalize_callsign("OA8-ON5VLG"), "OA8/ON5VLG");
    }

    #[test]
    fn normalize_callsign_cleans_spacing_and_case() {
        assert_eq!(normalize_callsign("  oa4 - bau "), "OA4BAU");
        assert_eq!(normalize_callsign("oa4 -bau"), "OA4BAU");
        assert_eq!(normalize_callsign("oa4- bau"), "OA4BAU");
    }

    #[test]
    fn normalize_callsign_drops_noise_hyphen_when_prefix_has_no_digit() {
        assert_eq!(normalize_callsign("OA-4BAU"), "OA4BAU");
    }

    #[test]
    fn normalize_callsign_rejoins_multiple_hyphens() {
        assert_eq!(normalize_callsign("OA8-ON5-VLG"), "OA8/ON5VLG");
    }

    #[test]
    fn normalize_callsign_leaves_unhyphenated_calls_alone() {
        assert_eq!(normalize_callsign("CX2ABC"), "CX2ABC");
        assert_eq!(normalize_callsign("OA8/ON5VLG"), "OA8/ON5VLG");
    }

    #[test]
    fn normalize_callsign_is_idempotent() {
        for raw in ["OA4-BAU", "OA8-ON5VLG", "  oa4 - bau ", "lu1abc", "OA-4BAU"] {
            let once = normalize_callsign(raw);
            assert_eq!(normalize_callsign(&once), once);
        }
    }
}
