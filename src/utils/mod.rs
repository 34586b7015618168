//! Utility functions and helpers.

pub mod http;

use unicode_segmentation::UnicodeSegmentation;

/// Extract the first integer from a text fragment.
///
/// Scraped cells rarely contain a bare number ("12 places restantes",
/// "Seats: 7"), so the first run of digits wins.
pub fn first_int(text: &str) -> Option<u32> {
    let re = regex::Regex::new(r"(\d+)").ok()?;
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Parse a price out of a text fragment, normalized to currency minor units.
///
/// Handles both "1,234.56" and "1 234,56" style amounts: the last separator
/// followed by exactly one or two digits is taken as the decimal mark, any
/// other separator as grouping.
pub fn parse_price_cents(text: &str) -> Option<i64> {
    let re = regex::Regex::new(r"(\d[\d\s.,\u{a0}]*\d|\d)").ok()?;
    let raw = re.captures(text)?.get(1)?.as_str();

    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();

    let (int_part, frac_part) = match cleaned.rfind(['.', ',']) {
        Some(pos) => {
            let frac = &cleaned[pos + 1..];
            if frac.len() == 1 || frac.len() == 2 {
                (cleaned[..pos].to_string(), frac.to_string())
            } else {
                // Trailing group of 3+ digits is a thousands group
                (cleaned.clone(), String::new())
            }
        }
        None => (cleaned.clone(), String::new()),
    };

    let digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }

    let whole: i64 = digits.parse().ok()?;
    let cents: i64 = match frac_part.len() {
        0 => 0,
        1 => frac_part.parse::<i64>().ok()? * 10,
        _ => frac_part.parse().ok()?,
    };
    Some(whole * 100 + cents)
}

/// Truncate a string to at most `max` grapheme clusters.
///
/// Used for raw-content excerpts in error logs; never splits a character.
pub fn truncate_graphemes(s: &str, max: usize) -> String {
    let mut out: String = s.graphemes(true).take(max).collect();
    if s.graphemes(true).count() > max {
        out.push('…');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_int() {
        assert_eq!(first_int("12 places restantes"), Some(12));
        assert_eq!(first_int("Seats: 7 / 16"), Some(7));
        assert_eq!(first_int("complet"), None);
        assert_eq!(first_int("0"), Some(0));
    }

    #[test]
    fn test_parse_price_dot_decimal() {
        assert_eq!(parse_price_cents("$1,234.56"), Some(123456));
        assert_eq!(parse_price_cents("1299.00 EUR"), Some(129900));
        assert_eq!(parse_price_cents("from 849.5"), Some(84950));
    }

    #[test]
    fn test_parse_price_comma_decimal() {
        assert_eq!(parse_price_cents("1 234,56 €"), Some(123456));
        assert_eq!(parse_price_cents("849,90"), Some(84990));
    }

    #[test]
    fn test_parse_price_no_decimal() {
        assert_eq!(parse_price_cents("1299 €"), Some(129900));
        assert_eq!(parse_price_cents("1.299 EUR"), Some(129900));
        assert_eq!(parse_price_cents("no price here"), None);
    }

    #[test]
    fn test_truncate_graphemes() {
        assert_eq!(truncate_graphemes("hello", 10), "hello");
        assert_eq!(truncate_graphemes("hello", 3), "hel…");
        // Combining characters stay intact
        assert_eq!(truncate_graphemes("ééé", 2), "éé…");
    }
}
