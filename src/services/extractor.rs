//! Field extractor service.
//!
//! Converts raw fetched content into a typed [`FetchedAvailability`]
//! using a source's extraction rules. Every field is independently
//! optional: an unset rule and a non-matching locator both yield `None`
//! for that field, and neither is an error. Only wholly unparsable
//! content fails the extraction.

use chrono::NaiveDate;
use scraper::{Html, Selector};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::{ExtractionConfig, ExtractionRules, FetchedAvailability};
use crate::services::RawContent;
use crate::utils::{first_int, parse_price_cents, truncate_graphemes};

/// Default CSS locators for web-scraping sources.
pub const DEFAULT_PLACES_AVAILABLE: &str = ".places-available";
pub const DEFAULT_PLACES_TOTAL: &str = ".places-total";
pub const DEFAULT_DEPARTURE_DATES: &str = ".departure-dates";
pub const DEFAULT_BOOKING_STATUS: &str = ".booking-status";
pub const DEFAULT_PRICE: &str = ".price";

/// Default field paths for API sources.
const API_PLACES_AVAILABLE: &str = "places_available";
const API_PLACES_TOTAL: &str = "places_total";
const API_DEPARTURE_DATES: &str = "departure_dates";
const API_BOOKING_STATUS: &str = "booking_status";
const API_PRICE: &str = "price";

/// Extract a typed availability value from raw content.
pub fn extract(
    content: &RawContent,
    rules: &ExtractionRules,
    config: &ExtractionConfig,
) -> Result<FetchedAvailability> {
    match content {
        RawContent::Html(html) => extract_html(html, rules, config),
        RawContent::Json(json) => extract_json(json, rules, config),
    }
}

fn extract_html(
    html: &str,
    rules: &ExtractionRules,
    config: &ExtractionConfig,
) -> Result<FetchedAvailability> {
    if html.trim().is_empty() {
        return Err(AppError::extraction("empty HTML document", ""));
    }

    let document = Html::parse_document(html);
    let text = |rule: &Option<String>, default: &str| {
        select_text(&document, rule.as_deref().unwrap_or(default))
    };

    Ok(FetchedAvailability {
        available_seats: text(&rules.places_available, DEFAULT_PLACES_AVAILABLE)
            .as_deref()
            .and_then(first_int),
        total_seats: text(&rules.places_total, DEFAULT_PLACES_TOTAL)
            .as_deref()
            .and_then(first_int),
        status: text(&rules.booking_status, DEFAULT_BOOKING_STATUS)
            .and_then(|t| config.parse_status(&t)),
        price_cents: text(&rules.price, DEFAULT_PRICE)
            .as_deref()
            .and_then(parse_price_cents),
        next_departure_date: text(&rules.departure_dates, DEFAULT_DEPARTURE_DATES)
            .and_then(|t| parse_date(&t, &config.date_formats)),
    })
}

/// Select the text of the first element matched by a CSS locator.
///
/// An unparsable locator is treated exactly like a non-matching one:
/// the field is simply absent this fetch.
fn select_text(document: &Html, locator: &str) -> Option<String> {
    let selector = match Selector::parse(locator) {
        Ok(s) => s,
        Err(e) => {
            log::warn!("Ignoring unparsable locator '{}': {:?}", locator, e);
            return None;
        }
    };
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>())
}

fn extract_json(
    json: &str,
    rules: &ExtractionRules,
    config: &ExtractionConfig,
) -> Result<FetchedAvailability> {
    let value: Value = serde_json::from_str(json).map_err(|e| {
        AppError::extraction(
            format!("malformed JSON: {e}"),
            truncate_graphemes(json, config.excerpt_graphemes),
        )
    })?;

    let field =
        |rule: &Option<String>, default: &str| json_path(&value, rule.as_deref().unwrap_or(default));

    Ok(FetchedAvailability {
        available_seats: field(&rules.places_available, API_PLACES_AVAILABLE).and_then(json_u32),
        total_seats: field(&rules.places_total, API_PLACES_TOTAL).and_then(json_u32),
        status: field(&rules.booking_status, API_BOOKING_STATUS)
            .and_then(Value::as_str)
            .and_then(|s| config.parse_status(s)),
        price_cents: field(&rules.price, API_PRICE).and_then(json_price_cents),
        next_departure_date: field(&rules.departure_dates, API_DEPARTURE_DATES)
            .and_then(Value::as_str)
            .and_then(|s| parse_date(s, &config.date_formats)),
    })
}

/// Walk a dot-separated field path into a JSON document.
fn json_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(value, |v, key| v.get(key))
}

/// Read a seat count from a JSON value (number, or string holding one).
fn json_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => first_int(s),
        _ => None,
    }
}

/// Read a price in minor units from a JSON value.
///
/// JSON numbers are assumed to be major units (e.g. `1299.5` euros).
fn json_price_cents(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_f64().map(|f| (f * 100.0).round() as i64),
        Value::String(s) => parse_price_cents(s),
        _ => None,
    }
}

/// Parse a departure date out of free-form text.
///
/// Looks for a date-shaped token first so surrounding prose ("Prochain
/// départ: 15/09/2026") does not defeat the format list.
fn parse_date(text: &str, formats: &[String]) -> Option<NaiveDate> {
    let token = regex::Regex::new(r"\d{1,4}[./-]\d{1,2}[./-]\d{1,4}")
        .ok()
        .and_then(|re| re.find(text).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| text.trim().to_string());

    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(&token, format).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DepartureStatus;

    const PARTNER_PAGE: &str = r#"
        <html><body>
          <div class="tour">
            <span class="places-available">4 places restantes</span>
            <span class="places-total">16</span>
            <span class="booking-status">Réservations ouvertes - places disponibles</span>
            <span class="departure-dates">Prochain départ: 15/09/2026</span>
            <span class="price">1 299,00 €</span>
          </div>
        </body></html>"#;

    #[test]
    fn test_extract_html_default_locators() {
        let content = RawContent::Html(PARTNER_PAGE.to_string());
        let fetched = extract(
            &content,
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        )
        .unwrap();

        assert_eq!(fetched.available_seats, Some(4));
        assert_eq!(fetched.total_seats, Some(16));
        assert_eq!(fetched.status, Some(DepartureStatus::Open));
        assert_eq!(fetched.price_cents, Some(129900));
        assert_eq!(
            fetched.next_departure_date,
            NaiveDate::from_ymd_opt(2026, 9, 15)
        );
    }

    #[test]
    fn test_extract_html_custom_locator() {
        let html = r#"<table><tr><td id="seats">7 / 16</td></tr></table>"#;
        let rules = ExtractionRules {
            places_available: Some("#seats".to_string()),
            ..ExtractionRules::default()
        };
        let fetched = extract(
            &RawContent::Html(html.to_string()),
            &rules,
            &ExtractionConfig::default(),
        )
        .unwrap();

        assert_eq!(fetched.available_seats, Some(7));
        // Nothing else matches; every other field is unknown
        assert_eq!(fetched.total_seats, None);
        assert_eq!(fetched.status, None);
    }

    #[test]
    fn test_missing_field_is_not_an_error() {
        let html = r#"<div class="places-available">3</div>"#;
        let fetched = extract(
            &RawContent::Html(html.to_string()),
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        )
        .unwrap();

        assert_eq!(fetched.available_seats, Some(3));
        assert_eq!(fetched.total_seats, None);
        assert_eq!(fetched.price_cents, None);
    }

    #[test]
    fn test_unparsable_locator_yields_none() {
        let rules = ExtractionRules {
            places_available: Some("[[not-a-selector".to_string()),
            ..ExtractionRules::default()
        };
        let fetched = extract(
            &RawContent::Html(PARTNER_PAGE.to_string()),
            &rules,
            &ExtractionConfig::default(),
        )
        .unwrap();

        // Misconfigured and not-present are indistinguishable here
        assert_eq!(fetched.available_seats, None);
        assert_eq!(fetched.total_seats, Some(16));
    }

    #[test]
    fn test_empty_html_is_extraction_error() {
        let result = extract(
            &RawContent::Html("   ".to_string()),
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        );
        assert!(matches!(result, Err(AppError::Extraction { .. })));
    }

    #[test]
    fn test_extract_json_paths() {
        let json = r#"{
            "tour": {"availability": {"left": 5, "capacity": 20}},
            "state": "sold out",
            "pricing": {"amount": "849,90"},
            "next": "2026-10-01"
        }"#;
        let rules = ExtractionRules {
            places_available: Some("tour.availability.left".to_string()),
            places_total: Some("tour.availability.capacity".to_string()),
            booking_status: Some("state".to_string()),
            price: Some("pricing.amount".to_string()),
            departure_dates: Some("next".to_string()),
        };
        let fetched = extract(
            &RawContent::Json(json.to_string()),
            &rules,
            &ExtractionConfig::default(),
        )
        .unwrap();

        assert_eq!(fetched.available_seats, Some(5));
        assert_eq!(fetched.total_seats, Some(20));
        assert_eq!(fetched.status, Some(DepartureStatus::Full));
        assert_eq!(fetched.price_cents, Some(84990));
        assert_eq!(
            fetched.next_departure_date,
            NaiveDate::from_ymd_opt(2026, 10, 1)
        );
    }

    #[test]
    fn test_extract_json_numeric_price_is_major_units() {
        let json = r#"{"price": 1299.5}"#;
        let fetched = extract(
            &RawContent::Json(json.to_string()),
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert_eq!(fetched.price_cents, Some(129950));
    }

    #[test]
    fn test_malformed_json_is_extraction_error() {
        let result = extract(
            &RawContent::Json("{not json".to_string()),
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        );
        match result {
            Err(AppError::Extraction { excerpt, .. }) => assert!(excerpt.contains("{not json")),
            other => panic!("expected extraction error, got {other:?}"),
        }
    }

    #[test]
    fn test_json_missing_path_yields_none() {
        let json = r#"{"something": "else"}"#;
        let fetched = extract(
            &RawContent::Json(json.to_string()),
            &ExtractionRules::default(),
            &ExtractionConfig::default(),
        )
        .unwrap();
        assert!(fetched.is_empty());
    }
}
