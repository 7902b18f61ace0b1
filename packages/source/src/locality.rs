//! Locality names as the results page expects them.

/// Single-word localities whose name alone matches something that is not
/// a place, paired with the country suffix that disambiguates them.
const AMBIGUOUS_LOCALITIES: &[(&str, &str)] = &[("alba", "italy")];

/// Formats a locality for the results URL.
///
/// Spaces become `+`, and names on the fixed ambiguity list get their
/// country appended (`"Alba"` becomes `"Alba+italy"`).
#[must_use]
pub fn format_locality(locality: &str) -> String {
    let trimmed = locality.trim();
    let mut formatted = trimmed.replace(' ', "+");

    let lower = trimmed.to_lowercase();
    if let Some((_, suffix)) = AMBIGUOUS_LOCALITIES.iter().find(|(name, _)| *name == lower) {
        formatted.push('+');
        formatted.push_str(suffix);
    }

    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_spaces() {
        assert_eq!(format_locality("Bassano del Grappa"), "Bassano+del+Grappa");
    }

    #[test]
    fn leaves_single_words_alone() {
        assert_eq!(format_locality("Venice"), "Venice");
    }

    #[test]
    fn disambiguates_listed_names_case_insensitively() {
        assert_eq!(format_locality("Alba"), "Alba+italy");
        assert_eq!(format_locality("ALBA"), "ALBA+italy");
    }

    #[test]
    fn does_not_disambiguate_partial_matches() {
        assert_eq!(format_locality("Alba Adriatica"), "Alba+Adriatica");
    }
}
