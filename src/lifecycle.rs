//! Listing lifecycle: creation, owner-gated mutation, buyer interest and the
//! premium upgrade. Handlers in [`crate::controllers`] only add the HTTP
//! envelope around these operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::filter::{build_filter, SearchCriteria};
use crate::models::{InterestQuery, Listing, ListingInput, OwnerProfile};
use crate::notify::Mailer;
use crate::payments::{verify_signature, CheckoutRequest, WebhookEvent};
use crate::premium::{Activation, Plan, PremiumState};
use crate::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct PremiumCheckout {
    pub plan: String,
    pub success_url: String,
    pub cancel_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutStarted {
    pub plan: Plan,
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfirmation {
    pub plan: String,
    pub session_id: String,
}

/// Runs an outbound call under the configured deadline.
async fn bounded<F, T>(timeout: Duration, what: &str, call: F) -> Result<T, ApiError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| ApiError::Upstream(format!("{} timed out after {:?}", what, timeout)))
}

/// A mail whose failure is logged and never reported to the caller.
struct Notification {
    mailer: Arc<dyn Mailer>,
    timeout: Duration,
    to: String,
    subject: String,
    body: String,
}

impl Notification {
    fn new(state: &AppState, to: &str, subject: &str, body: String) -> Self {
        Notification {
            mailer: state.mailer.clone(),
            timeout: state.external_timeout,
            to: to.to_string(),
            subject: subject.to_string(),
            body,
        }
    }

    async fn deliver(self, operation: &'static str) {
        let sent = bounded(
            self.timeout,
            "mail delivery",
            self.mailer.send(&self.to, &self.subject, &self.body),
        )
        .await;
        match sent {
            Ok(Ok(())) => log::debug!("{} --> mail sent to {}", operation, self.to),
            Ok(Err(e)) => log::error!("{} --> {}", operation, e),
            Err(e) => log::error!("{} --> {}", operation, e),
        }
    }
}

pub fn parse_id(raw: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(raw)
        .map_err(|_| ApiError::BadRequest(format!("Invalid property id '{}'!", raw)))
}

fn listing_input(body: Map<String, Value>) -> Result<ListingInput, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest(
            "Request body is empty and need to have property details!".to_string(),
        ));
    }
    let input: ListingInput = serde_json::from_value(Value::Object(body))
        .map_err(|e| ApiError::BadRequest(format!("Invalid property details: {}", e)))?;
    input.validate()?;
    Ok(input)
}

async fn fetch(state: &AppState, id: &ObjectId) -> Result<Listing, ApiError> {
    state
        .store
        .find_by_id(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Property {} not found!", id)))
}

fn session_used() -> ApiError {
    ApiError::Forbidden("Payment session has already been used!".to_string())
}

/// Writes the activation. `None` when its session already settled the listing.
async fn settle(
    state: &AppState,
    id: &ObjectId,
    activation: &Activation,
) -> Result<Option<Listing>, ApiError> {
    if let Some(listing) = state.store.make_premium(id, activation).await? {
        return Ok(Some(listing));
    }
    match state.store.find_by_id(id).await? {
        Some(_) => Ok(None),
        None => Err(ApiError::NotFound(format!("Property {} not found!", id))),
    }
}

/// Loads the stored listing and checks the caller against its stored owner.
async fn fetch_owned(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
    denied: &str,
) -> Result<Listing, ApiError> {
    let listing = fetch(state, id).await?;
    if !listing.is_owned_by(&caller.id) {
        return Err(ApiError::Unauthorized(denied.to_string()));
    }
    Ok(listing)
}

pub async fn create_listing(
    state: &AppState,
    caller: &Caller,
    body: Map<String, Value>,
) -> Result<Listing, ApiError> {
    let input = listing_input(body)?;

    // Early, friendlier error. The unique index still decides races.
    if state.store.find_by_rera(&input.rera_number).await?.is_some() {
        return Err(ApiError::BadRequest(
            "Property with RERA already exists!".to_string(),
        ));
    }

    let listing = state.store.insert(Listing::new(caller.id, input)).await?;

    let mail = Notification::new(
        state,
        &caller.email,
        "Posted a property!",
        "Under verification!".to_string(),
    );
    actix_web::rt::spawn(mail.deliver("create_listing"));

    Ok(listing)
}

pub async fn search_listings(
    state: &AppState,
    criteria: &SearchCriteria,
) -> Result<Vec<Listing>, ApiError> {
    let filter = build_filter(criteria);
    Ok(state.store.search(&filter).await?)
}

pub async fn get_listing(state: &AppState, id: &ObjectId) -> Result<Listing, ApiError> {
    fetch(state, id).await
}

pub async fn listings_of(state: &AppState, caller: &Caller) -> Result<Vec<Listing>, ApiError> {
    Ok(state.store.find_by_owner(&caller.id).await?)
}

pub async fn update_listing(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
    body: Map<String, Value>,
) -> Result<Listing, ApiError> {
    let input = listing_input(body)?;
    let mut listing = fetch_owned(state, caller, id, "Only owner can update the details!").await?;
    listing.apply(input);
    state
        .store
        .replace(listing)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Property {} not found!", id)))
}

pub async fn delete_listing(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
) -> Result<u64, ApiError> {
    fetch_owned(state, caller, id, "Only owner can delete the property!").await?;
    Ok(state.store.delete(id).await?)
}

pub async fn contact_owner(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
) -> Result<OwnerProfile, ApiError> {
    let listing = fetch(state, id).await?;
    let owner = state
        .store
        .find_user(&listing.posted_by)
        .await?
        .ok_or_else(|| ApiError::NotFound("Property owner not found!".to_string()))?;

    state.store.add_query(&caller.id, id).await?;

    let buyer = match state.store.find_user(&caller.id).await? {
        Some(user) => user.full_name(),
        None => caller.email.clone(),
    };

    Notification::new(
        state,
        &owner.email,
        "Property query!",
        format!("{} has shown interest in your property!", buyer),
    )
    .deliver("contact_owner")
    .await;

    Ok(owner.into())
}

pub async fn interested_buyers(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
) -> Result<Vec<InterestQuery>, ApiError> {
    fetch_owned(state, caller, id, "Only owner can see interested users!").await?;
    Ok(state.store.queries_for_listing(id).await?)
}

pub async fn queried_listings(
    state: &AppState,
    caller: &Caller,
) -> Result<Vec<Listing>, ApiError> {
    Ok(state.store.queried_by(&caller.id).await?)
}

/// Opens a hosted checkout. The listing is not touched here.
pub async fn buy_premium(
    state: &AppState,
    caller: &Caller,
    id: &ObjectId,
    checkout: PremiumCheckout,
) -> Result<CheckoutStarted, ApiError> {
    let listing = fetch_owned(state, caller, id, "Only owner can buy premium!").await?;
    PremiumState::of(&listing, Utc::now()).ensure_upgradable()?;

    let plan = state.plans.get(&checkout.plan)?.clone();
    if checkout.success_url.is_empty() || checkout.cancel_url.is_empty() {
        return Err(ApiError::BadRequest(
            "success_url and cancel_url are required!".to_string(),
        ));
    }

    let request = CheckoutRequest {
        listing_id: *id,
        plan_key: checkout.plan,
        plan: plan.clone(),
        success_url: checkout.success_url,
        cancel_url: checkout.cancel_url,
    };
    let session = bounded(
        state.external_timeout,
        "checkout session",
        state.payments.create_checkout_session(&request),
    )
    .await??;

    let url = session.url.ok_or_else(|| {
        ApiError::Upstream(format!("checkout session {} has no url", session.id))
    })?;
    Ok(CheckoutStarted {
        plan,
        url,
        session_id: session.id,
    })
}

/// Activates premium once the provider confirms the session was paid for
/// this listing and plan.
pub async fn payment_successful(
    state: &AppState,
    id: &ObjectId,
    confirmation: PaymentConfirmation,
) -> Result<Listing, ApiError> {
    let plan = state.plans.get(&confirmation.plan)?;
    if fetch(state, id).await?.has_settled(&confirmation.session_id) {
        return Err(session_used());
    }

    let session = bounded(
        state.external_timeout,
        "checkout session lookup",
        state
            .payments
            .retrieve_checkout_session(&confirmation.session_id),
    )
    .await??;
    if !session.settles(id, &confirmation.plan) {
        return Err(ApiError::Forbidden(
            "Payment has not been completed for this property!".to_string(),
        ));
    }

    let activation = Activation::new(
        &confirmation.plan,
        plan,
        &confirmation.session_id,
        Utc::now(),
    );
    settle(state, id, &activation).await?.ok_or_else(session_used)
}

/// Handles a signed provider callback. Returns the upgraded listing when the
/// event settled a checkout, `None` for events that need no action.
pub async fn payment_webhook(
    state: &AppState,
    payload: &[u8],
    signature: Option<&str>,
) -> Result<Option<Listing>, ApiError> {
    if state.webhook_secret.is_empty() {
        return Err(ApiError::Forbidden(
            "Payment webhook is not configured!".to_string(),
        ));
    }
    let signature = signature
        .ok_or_else(|| ApiError::Unauthorized("missing payment signature".to_string()))?;
    verify_signature(payload, signature, &state.webhook_secret, Utc::now().timestamp())?;

    let event: WebhookEvent = serde_json::from_slice(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid payment event: {}", e)))?;
    let session = match event.completed_session() {
        Some(session) => session,
        None => {
            log::debug!("payment_webhook --> ignoring {} event", event.kind);
            return Ok(None);
        }
    };

    let id = parse_id(session.listing_id().unwrap_or_default())?;
    let plan_key = session
        .plan_key()
        .ok_or_else(|| ApiError::BadRequest("Payment event has no plan!".to_string()))?;
    let plan = state.plans.get(plan_key)?;

    let activation = Activation::new(plan_key, plan, &session.id, Utc::now());
    let listing = match settle(state, &id, &activation).await? {
        Some(listing) => listing,
        None => {
            log::info!("payment_webhook --> session {} already settled", session.id);
            return Ok(None);
        }
    };
    log::info!(
        "payment_webhook --> listing {} premium until {}",
        listing.id,
        activation.valid_until
    );
    Ok(Some(listing))
}
