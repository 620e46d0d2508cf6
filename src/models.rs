use chrono::{DateTime, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingFor {
    Sale,
    Rent,
}

impl ListingFor {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingFor::Sale => "sale",
            ListingFor::Rent => "rent",
        }
    }
}

/// A property posted for sale or rent.
///
/// `posted_by` is the only identity allowed to mutate or delete the listing.
/// `premium_until` is set together with `premium` once a payment is confirmed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub posted_by: ObjectId,
    pub rera_number: String,
    #[serde(rename = "for")]
    pub listing_for: ListingFor,
    #[serde(rename = "type")]
    pub kind: String,
    pub city: String,
    pub description: String,
    #[serde(default)]
    pub furnishing: String,
    pub no_of_bedrooms: u32,
    pub price: f64,
    pub built_up_area: f64,
    #[serde(default)]
    pub premium: bool,
    #[serde(default)]
    pub premium_plan: Option<String>,
    #[serde(default, with = "optional_bson_datetime")]
    pub premium_until: Option<DateTime<Utc>>,
    /// Checkout sessions already turned into a premium window.
    #[serde(default)]
    pub premium_sessions: Vec<String>,
    #[serde(default)]
    pub interested_users: Vec<ObjectId>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl Listing {
    pub fn new(posted_by: ObjectId, input: ListingInput) -> Self {
        Listing {
            id: ObjectId::new(),
            posted_by,
            rera_number: input.rera_number,
            listing_for: input.listing_for,
            kind: input.kind,
            city: input.city,
            description: input.description,
            furnishing: input.furnishing,
            no_of_bedrooms: input.no_of_bedrooms,
            price: input.price,
            built_up_area: input.built_up_area,
            premium: false,
            premium_plan: None,
            premium_until: None,
            premium_sessions: Vec::new(),
            interested_users: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn is_owned_by(&self, user: &ObjectId) -> bool {
        &self.posted_by == user
    }

    pub fn has_settled(&self, session_id: &str) -> bool {
        self.premium_sessions.iter().any(|s| s == session_id)
    }

    /// Full replace of the owner-editable fields. Identity, ownership,
    /// premium state and the interest log are kept.
    pub fn apply(&mut self, input: ListingInput) {
        self.rera_number = input.rera_number;
        self.listing_for = input.listing_for;
        self.kind = input.kind;
        self.city = input.city;
        self.description = input.description;
        self.furnishing = input.furnishing;
        self.no_of_bedrooms = input.no_of_bedrooms;
        self.price = input.price;
        self.built_up_area = input.built_up_area;
    }
}

/// Fields a poster submits on create and update. Anything else in the body,
/// `postedBy` included, is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingInput {
    pub rera_number: String,
    #[serde(rename = "for")]
    pub listing_for: ListingFor,
    #[serde(rename = "type")]
    pub kind: String,
    pub city: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub furnishing: String,
    pub no_of_bedrooms: u32,
    pub price: f64,
    pub built_up_area: f64,
}

impl ListingInput {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.rera_number.trim().is_empty() {
            return Err(ApiError::BadRequest("reraNumber is required!".to_string()));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ApiError::BadRequest(
                "price must be a non-negative number!".to_string(),
            ));
        }
        if !self.built_up_area.is_finite() || self.built_up_area < 0.0 {
            return Err(ApiError::BadRequest(
                "builtUpArea must be a non-negative number!".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl UserProfile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.firstname, self.lastname)
    }
}

/// What a buyer gets back after contacting an owner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerProfile {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub firstname: String,
    pub lastname: String,
    pub email: String,
    pub phone: Option<String>,
}

impl From<UserProfile> for OwnerProfile {
    fn from(user: UserProfile) -> Self {
        OwnerProfile {
            id: user.id,
            firstname: user.firstname,
            lastname: user.lastname,
            email: user.email,
            phone: user.phone,
        }
    }
}

/// Append-only record of a buyer expressing interest in a listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InterestQuery {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user: ObjectId,
    pub property: ObjectId,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
}

impl InterestQuery {
    pub fn new(user: ObjectId, property: ObjectId) -> Self {
        InterestQuery {
            id: ObjectId::new(),
            user,
            property,
            created_at: Utc::now(),
        }
    }
}

/// `Option<DateTime<Utc>>` stored as a BSON date rather than a string.
mod optional_bson_datetime {
    use chrono::{DateTime, Utc};
    use mongodb::bson;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        value.map(bson::DateTime::from_chrono).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Ok(Option::<bson::DateTime>::deserialize(deserializer)?.map(|dt| dt.to_chrono()))
    }
}
