//! Payment contract used by the premium upgrade flow.

mod stripe;
mod webhook;

pub use stripe::StripeGateway;
pub use webhook::{sign, verify_signature, SignatureError, WebhookEvent, SIGNATURE_TOLERANCE_SECS};

use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::premium::Plan;

pub const METADATA_LISTING: &str = "listing_id";
pub const METADATA_PLAN: &str = "plan";

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment provider unreachable: {0}")]
    Http(#[from] reqwest::Error),

    #[error("payment provider rejected the request ({status}): {message}")]
    Provider { status: u16, message: String },

    #[error("checkout session {0} has no redirect url")]
    MissingUrl(String),
}

#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub listing_id: ObjectId,
    pub plan_key: String,
    pub plan: Plan,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub payment_status: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn listing_id(&self) -> Option<&str> {
        self.metadata.get(METADATA_LISTING).map(String::as_str)
    }

    pub fn plan_key(&self) -> Option<&str> {
        self.metadata.get(METADATA_PLAN).map(String::as_str)
    }

    /// True when the provider reports this session as paid for exactly
    /// `listing` on `plan`.
    pub fn settles(&self, listing: &ObjectId, plan: &str) -> bool {
        let listing = listing.to_hex();
        self.is_paid()
            && self.listing_id() == Some(listing.as_str())
            && self.plan_key() == Some(plan)
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError>;

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError>;
}
