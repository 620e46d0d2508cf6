//! Translation of sparse search query parameters into a listing filter.
//!
//! The builder never executes anything. It produces a [`SearchFilter`], a
//! conjunction of predicates, which the store either renders into a MongoDB
//! query document or evaluates directly against listings.
//!
//! Absent (or empty) parameters never add a clause. Numeric parameters that
//! fail to parse produce a clause that matches nothing.

use mongodb::bson::{Bson, Document};
use serde::Deserialize;

use crate::models::Listing;

/// Raw query parameters. Everything arrives as text.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchCriteria {
    #[serde(rename = "for")]
    pub listing_for: Option<String>,
    pub city: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub furnishing: Option<String>,
    pub no_of_bedrooms: Option<String>,
    pub min_price: Option<String>,
    pub max_price: Option<String>,
    pub min_area: Option<String>,
    pub max_area: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    For,
    City,
    Description,
    Type,
    Furnishing,
    NoOfBedrooms,
    Price,
    BuiltUpArea,
}

impl Field {
    pub fn name(&self) -> &'static str {
        match self {
            Field::For => "for",
            Field::City => "city",
            Field::Description => "description",
            Field::Type => "type",
            Field::Furnishing => "furnishing",
            Field::NoOfBedrooms => "noOfBedrooms",
            Field::Price => "price",
            Field::BuiltUpArea => "builtUpArea",
        }
    }

    fn text<'a>(&self, listing: &'a Listing) -> Option<&'a str> {
        match self {
            Field::For => Some(listing.listing_for.as_str()),
            Field::City => Some(listing.city.as_str()),
            Field::Description => Some(listing.description.as_str()),
            Field::Type => Some(listing.kind.as_str()),
            Field::Furnishing => Some(listing.furnishing.as_str()),
            _ => None,
        }
    }

    fn number(&self, listing: &Listing) -> Option<f64> {
        match self {
            Field::NoOfBedrooms => Some(f64::from(listing.no_of_bedrooms)),
            Field::Price => Some(listing.price),
            Field::BuiltUpArea => Some(listing.built_up_area),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Equals { field: Field, value: Value },
    /// Case-insensitive substring match of `term` against any of `fields`.
    ContainsAny { fields: Vec<Field>, term: String },
    /// Inclusive range; a missing bound is open.
    Range {
        field: Field,
        min: Option<f64>,
        max: Option<f64>,
    },
    Never,
}

impl Predicate {
    pub fn matches(&self, listing: &Listing) -> bool {
        match self {
            Predicate::Equals { field, value } => match value {
                Value::Text(expected) => field.text(listing) == Some(expected.as_str()),
                Value::Number(expected) => field.number(listing) == Some(*expected),
            },
            Predicate::ContainsAny { fields, term } => {
                let needle = term.to_lowercase();
                fields.iter().any(|field| {
                    field
                        .text(listing)
                        .map_or(false, |text| text.to_lowercase().contains(&needle))
                })
            }
            Predicate::Range { field, min, max } => match field.number(listing) {
                Some(actual) => {
                    min.map_or(true, |min| actual >= min) && max.map_or(true, |max| actual <= max)
                }
                None => false,
            },
            Predicate::Never => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchFilter {
    predicates: Vec<Predicate>,
}

impl SearchFilter {
    pub fn predicates(&self) -> &[Predicate] {
        &self.predicates
    }

    pub fn matches(&self, listing: &Listing) -> bool {
        self.predicates.iter().all(|p| p.matches(listing))
    }

    pub fn to_document(&self) -> Document {
        let mut filter = Document::new();
        for predicate in &self.predicates {
            match predicate {
                Predicate::Equals { field, value } => {
                    let value = match value {
                        Value::Text(text) => Bson::String(text.clone()),
                        Value::Number(number) => Bson::Double(*number),
                    };
                    filter.insert(field.name(), value);
                }
                Predicate::ContainsAny { fields, term } => {
                    let pattern = regex::escape(term);
                    let alternatives: Vec<Bson> = fields
                        .iter()
                        .map(|field| {
                            let mut matcher = Document::new();
                            matcher.insert("$regex", pattern.clone());
                            matcher.insert("$options", "i");
                            let mut clause = Document::new();
                            clause.insert(field.name(), matcher);
                            Bson::Document(clause)
                        })
                        .collect();
                    filter.insert("$or", alternatives);
                }
                Predicate::Range { field, min, max } => {
                    let mut bounds = Document::new();
                    if let Some(min) = min {
                        bounds.insert("$gte", *min);
                    }
                    if let Some(max) = max {
                        bounds.insert("$lte", *max);
                    }
                    filter.insert(field.name(), bounds);
                }
                Predicate::Never => {
                    filter.insert("$expr", false);
                }
            }
        }
        filter
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

fn parse_number(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn range(field: Field, min: &Option<String>, max: &Option<String>) -> Option<Predicate> {
    let (min, max) = (present(min), present(max));
    if min.is_none() && max.is_none() {
        return None;
    }
    let min = match min.map(parse_number) {
        Some(None) => return Some(Predicate::Never),
        other => other.flatten(),
    };
    let max = match max.map(parse_number) {
        Some(None) => return Some(Predicate::Never),
        other => other.flatten(),
    };
    Some(Predicate::Range { field, min, max })
}

pub fn build_filter(criteria: &SearchCriteria) -> SearchFilter {
    let mut predicates = Vec::new();

    if let Some(listing_for) = present(&criteria.listing_for) {
        predicates.push(Predicate::Equals {
            field: Field::For,
            value: Value::Text(listing_for.to_string()),
        });
    }

    if let Some(term) = present(&criteria.city) {
        predicates.push(Predicate::ContainsAny {
            fields: vec![Field::City, Field::Description],
            term: term.to_string(),
        });
    }

    for (field, value) in [
        (Field::Type, &criteria.kind),
        (Field::Furnishing, &criteria.furnishing),
    ] {
        if let Some(value) = present(value) {
            predicates.push(Predicate::Equals {
                field,
                value: Value::Text(value.to_string()),
            });
        }
    }

    if let Some(bedrooms) = present(&criteria.no_of_bedrooms) {
        predicates.push(match parse_number(bedrooms) {
            Some(n) => Predicate::Equals {
                field: Field::NoOfBedrooms,
                value: Value::Number(n),
            },
            None => Predicate::Never,
        });
    }

    predicates.extend(range(Field::Price, &criteria.min_price, &criteria.max_price));
    predicates.extend(range(
        Field::BuiltUpArea,
        &criteria.min_area,
        &criteria.max_area,
    ));

    SearchFilter { predicates }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingFor, ListingInput};
    use mongodb::bson::{doc, oid::ObjectId};

    fn listing(city: &str, description: &str, price: f64) -> Listing {
        Listing::new(
            ObjectId::new(),
            ListingInput {
                rera_number: "R-1".into(),
                listing_for: ListingFor::Rent,
                kind: "apartment".into(),
                city: city.into(),
                description: description.into(),
                furnishing: "full".into(),
                no_of_bedrooms: 2,
                price,
                built_up_area: 900.0,
            },
        )
    }

    fn criteria() -> SearchCriteria {
        SearchCriteria {
            listing_for: Some("rent".into()),
            city: Some("pune".into()),
            ..Default::default()
        }
    }

    #[test]
    fn max_price_only_has_open_lower_bound() {
        let filter = build_filter(&SearchCriteria {
            max_price: Some("20000".into()),
            ..criteria()
        });
        let document = filter.to_document();
        assert_eq!(
            document.get_document("price").unwrap(),
            &doc! { "$lte": 20000.0 }
        );
        assert_eq!(document.get_str("for").unwrap(), "rent");
    }

    #[test]
    fn min_price_only_is_kept() {
        let filter = build_filter(&SearchCriteria {
            min_price: Some("15000".into()),
            ..criteria()
        });
        assert!(filter.predicates().contains(&Predicate::Range {
            field: Field::Price,
            min: Some(15000.0),
            max: None,
        }));
        assert!(!filter.matches(&listing("Pune", "", 12000.0)));
        assert!(filter.matches(&listing("Pune", "", 16000.0)));
    }

    #[test]
    fn city_term_matches_description_case_insensitively() {
        let filter = build_filter(&criteria());
        assert!(filter.matches(&listing("Mumbai", "Close to PUNE highway", 1.0)));
        assert!(filter.matches(&listing("pune", "", 1.0)));
        assert!(!filter.matches(&listing("Nagpur", "quiet lane", 1.0)));
    }

    #[test]
    fn city_term_is_escaped_for_regex() {
        let filter = build_filter(&SearchCriteria {
            city: Some("a.b(".into()),
            ..Default::default()
        });
        let document = filter.to_document();
        let alternatives = document.get_array("$or").unwrap();
        let first = alternatives[0].as_document().unwrap();
        assert_eq!(
            first.get_document("city").unwrap().get_str("$regex").unwrap(),
            r"a\.b\("
        );
    }

    #[test]
    fn non_numeric_bedrooms_never_match() {
        let filter = build_filter(&SearchCriteria {
            no_of_bedrooms: Some("two".into()),
            ..criteria()
        });
        assert!(filter.predicates().contains(&Predicate::Never));
        assert!(!filter.matches(&listing("Pune", "", 1.0)));
        assert_eq!(filter.to_document().get_bool("$expr").unwrap(), false);
    }

    #[test]
    fn empty_values_add_nothing() {
        let filter = build_filter(&SearchCriteria {
            kind: Some(String::new()),
            min_area: Some(String::new()),
            ..Default::default()
        });
        assert!(filter.predicates().is_empty());
        assert!(filter.to_document().is_empty());
    }

    #[test]
    fn bedrooms_are_exact() {
        let filter = build_filter(&SearchCriteria {
            no_of_bedrooms: Some("3".into()),
            ..Default::default()
        });
        assert!(!filter.matches(&listing("Pune", "", 1.0)));
        assert_eq!(filter.to_document().get_f64("noOfBedrooms").unwrap(), 3.0);
    }
}
