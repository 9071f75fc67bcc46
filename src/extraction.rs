use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

const MAPS_SEARCH_URL: &str = "https://www.google.com/maps/search/?api=1&query=";

// Neither pattern can match across a newline. The incremental scanner in
// `accumulator` relies on that.
static COUNTY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Best county for selling(?:\*\*)?:(?:\*\*)?[ \t]*(.+)")
        .expect("county pattern is valid")
});

static COORDINATES_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"Coordinates(?:\*\*)?:(?:\*\*)?[ \t]*([+-]?\d+(?:\.\d+)?)[ \t]*,[ \t]*([+-]?\d+(?:\.\d+)?)",
    )
    .expect("coordinates pattern is valid")
});

/// Structured fields derived from a transcript. Never authoritative: recomputed
/// from the transcript on every update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtractedFields {
    pub best_county: Option<String>,
    pub maps_link: Option<String>,
}

impl ExtractedFields {
    /// Fields found in `newer` text replace ours; absent ones keep ours.
    pub(crate) fn overlay(self, newer: ExtractedFields) -> ExtractedFields {
        ExtractedFields {
            best_county: newer.best_county.or(self.best_county),
            maps_link: newer.maps_link.or(self.maps_link),
        }
    }
}

/// Extract fields from `text`. When a pattern matches more than once the last
/// match wins.
pub fn extract(text: &str) -> ExtractedFields {
    ExtractedFields {
        best_county: last_county(text),
        maps_link: last_coordinates(text).map(|(lat, lon)| maps_link(lat, lon)),
    }
}

/// Build a map search link. Coordinates are passed through unvalidated.
pub fn maps_link(latitude: &str, longitude: &str) -> String {
    format!("{MAPS_SEARCH_URL}{latitude},{longitude}")
}

fn last_county(text: &str) -> Option<String> {
    COUNTY_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let value = caps
                .get(1)?
                .as_str()
                .trim_matches(|c: char| c.is_whitespace() || c == '*');
            (!value.is_empty()).then(|| value.to_string())
        })
        .last()
}

fn last_coordinates(text: &str) -> Option<(&str, &str)> {
    COORDINATES_RE
        .captures_iter(text)
        .filter_map(|caps| Some((caps.get(1)?.as_str(), caps.get(2)?.as_str())))
        .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_county_and_link() {
        let fields = extract(
            "Tomato looks ripe.\nBest county for selling: Nakuru\nCoordinates: -0.303,36.080\n",
        );
        assert_eq!(fields.best_county.as_deref(), Some("Nakuru"));
        assert_eq!(
            fields.maps_link.as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=-0.303,36.080")
        );
    }

    #[test]
    fn tolerates_markdown_bold_labels() {
        let fields = extract(
            "● **Best county for selling:** Kiambu County\n● **Coordinates:** -1.1714, 36.8356\n",
        );
        assert_eq!(fields.best_county.as_deref(), Some("Kiambu County"));
        assert_eq!(
            fields.maps_link.as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=-1.1714,36.8356")
        );
    }

    #[test]
    fn last_match_wins() {
        let fields = extract(
            "## Mango\nBest county for selling: Machakos\nCoordinates: -1.52,37.26\n\
             ## Avocado\nBest county for selling: Murang'a\nCoordinates: -0.72,37.15\n",
        );
        assert_eq!(fields.best_county.as_deref(), Some("Murang'a"));
        assert_eq!(
            fields.maps_link.as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=-0.72,37.15")
        );
    }

    #[test]
    fn absent_fields_stay_unset() {
        let fields = extract("No location information was produced.");
        assert_eq!(fields, ExtractedFields::default());
    }

    #[test]
    fn empty_county_value_is_not_a_match() {
        let fields = extract("Best county for selling: Kisumu\nBest county for selling: **\n");
        assert_eq!(fields.best_county.as_deref(), Some("Kisumu"));
    }

    #[test]
    fn out_of_range_coordinates_pass_through() {
        let fields = extract("Coordinates: 123.4,-500");
        assert_eq!(
            fields.maps_link.as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=123.4,-500")
        );
    }

    #[test]
    fn explicit_plus_sign_is_accepted() {
        let fields = extract("Coordinates: +1.2, -36.8\nCoordinates: +0.5,+37");
        assert_eq!(
            fields.maps_link.as_deref(),
            Some("https://www.google.com/maps/search/?api=1&query=+0.5,+37")
        );
    }

    #[test]
    fn overlay_prefers_newer_values() {
        let older = ExtractedFields {
            best_county: Some("Nyeri".to_string()),
            maps_link: Some("old".to_string()),
        };
        let newer = ExtractedFields {
            best_county: None,
            maps_link: Some("new".to_string()),
        };
        let merged = older.overlay(newer);
        assert_eq!(merged.best_county.as_deref(), Some("Nyeri"));
        assert_eq!(merged.maps_link.as_deref(), Some("new"));
    }
}
