//! Name, Address, Phone consistency between a location and its citations.

use db::models::{
    citation::{Citation, NapStatus},
    location::Location,
};
use serde::Serialize;
use ts_rs::TS;

/// Address words spelled out or abbreviated interchangeably.
const ADDRESS_ABBREVIATIONS: &[(&str, &str)] = &[
    ("street", "st"),
    ("avenue", "ave"),
    ("road", "rd"),
    ("boulevard", "blvd"),
    ("drive", "dr"),
    ("lane", "ln"),
    ("court", "ct"),
    ("place", "pl"),
    ("square", "sq"),
    ("parkway", "pkwy"),
    ("highway", "hwy"),
    ("suite", "ste"),
    ("apartment", "apt"),
    ("building", "bldg"),
    ("floor", "fl"),
    ("north", "n"),
    ("south", "s"),
    ("east", "e"),
    ("west", "w"),
    ("northeast", "ne"),
    ("northwest", "nw"),
    ("southeast", "se"),
    ("southwest", "sw"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
pub struct NapReport {
    pub status: NapStatus,
    /// Any of `name`, `address`, `phone`.
    pub mismatched: Vec<String>,
}

/// Lowercase, punctuation dropped, whitespace collapsed.
fn simplify(value: &str) -> Vec<String> {
    value
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() || c.is_whitespace() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

pub fn normalize_name(name: &str) -> String {
    simplify(&name.replace('&', " and ")).join(" ")
}

pub fn normalize_address(address: &str) -> String {
    simplify(address)
        .into_iter()
        .map(|word| {
            ADDRESS_ABBREVIATIONS
                .iter()
                .find(|(long, _)| *long == word)
                .map(|(_, short)| short.to_string())
                .unwrap_or(word)
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Digits only; the North American country code is dropped from 11-digit
/// numbers.
pub fn normalize_phone(phone: &str) -> String {
    let digits: String = phone.chars().filter(char::is_ascii_digit).collect();
    match digits.strip_prefix('1') {
        Some(rest) if digits.len() == 11 => rest.to_string(),
        _ => digits,
    }
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Compare the fields a citation lists against the location. Fields the
/// citation leaves blank are not compared.
pub fn check(location: &Location, citation: &Citation) -> NapReport {
    let name = present(citation.listed_name.as_deref());
    let address = present(citation.listed_address.as_deref());
    let phone = present(citation.listed_phone.as_deref());

    if name.is_none() && address.is_none() && phone.is_none() {
        return NapReport {
            status: NapStatus::Missing,
            mismatched: Vec::new(),
        };
    }

    let mut mismatched = Vec::new();
    if let Some(name) = name
        && normalize_name(name) != normalize_name(&location.title)
    {
        mismatched.push("name".to_string());
    }
    if let Some(address) = address
        && !address_matches(address, location)
    {
        mismatched.push("address".to_string());
    }
    if let Some(phone) = phone
        && location
            .phone
            .as_deref()
            .is_none_or(|own| normalize_phone(own) != normalize_phone(phone))
    {
        mismatched.push("phone".to_string());
    }

    NapReport {
        status: if mismatched.is_empty() {
            NapStatus::Consistent
        } else {
            NapStatus::Inconsistent
        },
        mismatched,
    }
}

/// Directories list either the street line alone or the full address.
fn address_matches(listed: &str, location: &Location) -> bool {
    let listed = normalize_address(listed);
    let full = normalize_address(&location.full_address());
    if listed == full {
        return true;
    }
    location
        .address
        .as_deref()
        .is_some_and(|street| normalize_address(street) == listed)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use sqlx::types::Json;
    use uuid::Uuid;

    use super::*;

    fn location() -> Location {
        let now = Utc::now();
        Location {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            account_id: None,
            google_name: None,
            title: "Smith & Sons Bakery".into(),
            address: Some("123 Main Street, Suite 4".into()),
            locality: Some("Springfield".into()),
            region: Some("IL".into()),
            postal_code: Some("62701".into()),
            country_code: Some("US".into()),
            phone: Some("(217) 555-0100".into()),
            website_uri: None,
            primary_category: None,
            latitude: None,
            longitude: None,
            maps_uri: None,
            place_id: None,
            raw: None,
            last_synced_at: None,
            deleted_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn citation(name: Option<&str>, address: Option<&str>, phone: Option<&str>) -> Citation {
        let now = Utc::now();
        Citation {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            location_id: Uuid::new_v4(),
            directory: "Yelp".into(),
            listing_url: None,
            listed_name: name.map(Into::into),
            listed_address: address.map(Into::into),
            listed_phone: phone.map(Into::into),
            nap_status: NapStatus::Unchecked,
            mismatched_fields: Json(Vec::new()),
            last_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_normalizers() {
        assert_eq!(normalize_name("Smith & Sons Bakery, LLC."), "smith and sons bakery llc");
        assert_eq!(
            normalize_address("123 Main Street, Suite 4"),
            normalize_address("123 main st. ste 4")
        );
        assert_eq!(normalize_phone("+1 (217) 555-0100"), "2175550100");
        assert_eq!(normalize_phone("217.555.0100"), "2175550100");
        assert_eq!(normalize_phone("+44 20 7946 0958"), "442079460958");
    }

    #[test]
    fn test_consistent_listing() {
        let report = check(
            &location(),
            &citation(
                Some("Smith and Sons Bakery"),
                Some("123 Main St, Ste 4, Springfield, IL 62701"),
                Some("+1 217-555-0100"),
            ),
        );
        assert_eq!(report.status, NapStatus::Consistent);
        assert!(report.mismatched.is_empty());
    }

    #[test]
    fn test_street_only_address_matches() {
        let report = check(&location(), &citation(None, Some("123 Main St Ste 4"), None));
        assert_eq!(report.status, NapStatus::Consistent);
    }

    #[test]
    fn test_inconsistent_fields_are_listed() {
        let report = check(
            &location(),
            &citation(Some("Smith Bakery"), None, Some("217-555-0199")),
        );
        assert_eq!(report.status, NapStatus::Inconsistent);
        assert_eq!(report.mismatched, vec!["name", "phone"]);
    }

    #[test]
    fn test_empty_listing_is_missing() {
        let report = check(&location(), &citation(Some("  "), None, None));
        assert_eq!(report.status, NapStatus::Missing);
    }
}
