//! Premium plans and the premium upgrade state machine.
//!
//! `Standard -> (checkout, not persisted) -> Premium(valid_until) -> Standard`
//!
//! Starting a checkout never changes a listing. Only a confirmed payment
//! moves it to `Premium`, and an expired premium window reads as `Standard`.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::models::Listing;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub name: String,
    /// Minor currency units.
    pub price: i64,
    /// Validity in days from activation.
    pub valid: u32,
}

impl Plan {
    pub fn expires_at(&self, activated: DateTime<Utc>) -> DateTime<Utc> {
        activated + Duration::days(i64::from(self.valid))
    }
}

/// Read-only plan lookup table, built once at startup.
#[derive(Debug, Clone)]
pub struct PlanCatalog {
    plans: BTreeMap<String, Plan>,
}

impl PlanCatalog {
    pub fn new(plans: impl IntoIterator<Item = (String, Plan)>) -> Self {
        PlanCatalog {
            plans: plans.into_iter().collect(),
        }
    }

    pub fn get(&self, key: &str) -> Result<&Plan, ApiError> {
        self.plans
            .get(key)
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown premium plan '{}'!", key)))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.plans.keys().map(String::as_str)
    }
}

impl Default for PlanCatalog {
    fn default() -> Self {
        let plan = |name: &str, price: i64, valid: u32| Plan {
            name: name.to_string(),
            price,
            valid,
        };
        PlanCatalog::new([
            ("silver".to_string(), plan("Silver", 49_900, 30)),
            ("gold".to_string(), plan("Gold", 129_900, 90)),
            ("platinum".to_string(), plan("Platinum", 229_900, 180)),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PremiumState {
    Standard,
    Premium { valid_until: Option<DateTime<Utc>> },
}

impl PremiumState {
    pub fn of(listing: &Listing, now: DateTime<Utc>) -> Self {
        if !listing.premium {
            return PremiumState::Standard;
        }
        match listing.premium_until {
            Some(until) if until <= now => PremiumState::Standard,
            valid_until => PremiumState::Premium { valid_until },
        }
    }

    /// Gate for starting a checkout.
    pub fn ensure_upgradable(&self) -> Result<(), ApiError> {
        match self {
            PremiumState::Standard => Ok(()),
            PremiumState::Premium { .. } => Err(ApiError::Forbidden(
                "Already a premium property!".to_string(),
            )),
        }
    }
}

/// The field values a confirmed payment writes to a listing. Each checkout
/// session settles at most one activation per listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    pub plan_key: String,
    pub session_id: String,
    pub valid_until: DateTime<Utc>,
}

impl Activation {
    pub fn new(plan_key: &str, plan: &Plan, session_id: &str, now: DateTime<Utc>) -> Self {
        Activation {
            plan_key: plan_key.to_string(),
            session_id: session_id.to_string(),
            valid_until: plan.expires_at(now),
        }
    }

    /// Returns `false`, leaving the listing untouched, when the session was
    /// already settled.
    pub fn apply(&self, listing: &mut Listing) -> bool {
        if listing.has_settled(&self.session_id) {
            return false;
        }
        listing.premium = true;
        listing.premium_plan = Some(self.plan_key.clone());
        listing.premium_until = Some(self.valid_until);
        listing.premium_sessions.push(self.session_id.clone());
        true
    }
}
