use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::auth::Caller;
use crate::error::ApiError;
use crate::filter::SearchCriteria;
use crate::lifecycle::{self, parse_id, PaymentConfirmation, PremiumCheckout};
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Serialize)]
pub struct Envelope<T> {
    status: &'static str,
    data: T,
}

fn success<T: Serialize>(data: T) -> Envelope<T> {
    Envelope {
        status: "success",
        data,
    }
}

#[derive(Serialize)]
struct Deleted {
    deleted: u64,
}

type Handled = Result<HttpResponse, ApiError>;

#[post("/api/property")]
pub async fn create_listing(
    state: web::Data<AppState>,
    caller: Caller,
    body: web::Json<Map<String, Value>>,
) -> Handled {
    let listing = lifecycle::create_listing(&state, &caller, body.into_inner())
        .await
        .map_err(|e| e.logged("create_listing"))?;
    Ok(HttpResponse::Created().json(success(listing)))
}

#[get("/api/property")]
pub async fn search_listings(
    state: web::Data<AppState>,
    criteria: web::Query<SearchCriteria>,
) -> Handled {
    let listings = lifecycle::search_listings(&state, &criteria)
        .await
        .map_err(|e| e.logged("search_listings"))?;
    Ok(HttpResponse::Ok().json(success(listings)))
}

#[get("/api/property/mine")]
pub async fn my_listings(state: web::Data<AppState>, caller: Caller) -> Handled {
    let listings = lifecycle::listings_of(&state, &caller)
        .await
        .map_err(|e| e.logged("my_listings"))?;
    Ok(HttpResponse::Ok().json(success(listings)))
}

#[get("/api/property/queried")]
pub async fn my_queried_listings(state: web::Data<AppState>, caller: Caller) -> Handled {
    let listings = lifecycle::queried_listings(&state, &caller)
        .await
        .map_err(|e| e.logged("my_queried_listings"))?;
    Ok(HttpResponse::Ok().json(success(listings)))
}

#[get("/api/property/{id}")]
pub async fn get_listing(
    state: web::Data<AppState>,
    _caller: Caller,
    path: web::Path<String>,
) -> Handled {
    let id = parse_id(&path)?;
    let listing = lifecycle::get_listing(&state, &id)
        .await
        .map_err(|e| e.logged("get_listing"))?;
    Ok(HttpResponse::Ok().json(success(listing)))
}

#[put("/api/property/{id}")]
pub async fn update_listing(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<String>,
    body: web::Json<Map<String, Value>>,
) -> Handled {
    let id = parse_id(&path)?;
    let listing = lifecycle::update_listing(&state, &caller, &id, body.into_inner())
        .await
        .map_err(|e| e.logged("update_listing"))?;
    Ok(HttpResponse::Created().json(success(listing)))
}

#[delete("/api/property/{id}")]
pub async fn delete_listing(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<String>,
) -> Handled {
    let id = parse_id(&path)?;
    let deleted = lifecycle::delete_listing(&state, &caller, &id)
        .await
        .map_err(|e| e.logged("delete_listing"))?;
    Ok(HttpResponse::Created().json(success(Deleted { deleted })))
}

#[post("/api/property/{id}/contact")]
pub async fn contact_owner(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<String>,
) -> Handled {
    let id = parse_id(&path)?;
    let owner = lifecycle::contact_owner(&state, &caller, &id)
        .await
        .map_err(|e| e.logged("contact_owner"))?;
    Ok(HttpResponse::Ok().json(success(owner)))
}

#[get("/api/property/{id}/interested")]
pub async fn interested_buyers(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<String>,
) -> Handled {
    let id = parse_id(&path)?;
    let queries = lifecycle::interested_buyers(&state, &caller, &id)
        .await
        .map_err(|e| e.logged("interested_buyers"))?;
    Ok(HttpResponse::Ok().json(success(queries)))
}

#[post("/api/property/{id}/premium")]
pub async fn buy_premium(
    state: web::Data<AppState>,
    caller: Caller,
    path: web::Path<String>,
    body: web::Json<PremiumCheckout>,
) -> Handled {
    let id = parse_id(&path)?;
    let started = lifecycle::buy_premium(&state, &caller, &id, body.into_inner())
        .await
        .map_err(|e| e.logged("buy_premium"))?;
    Ok(HttpResponse::Ok().json(started))
}

#[post("/api/property/{id}/premium/confirm")]
pub async fn payment_successful(
    state: web::Data<AppState>,
    _caller: Caller,
    path: web::Path<String>,
    body: web::Json<PaymentConfirmation>,
) -> Handled {
    let id = parse_id(&path)?;
    let listing = lifecycle::payment_successful(&state, &id, body.into_inner())
        .await
        .map_err(|e| e.logged("payment_successful"))?;
    Ok(HttpResponse::Ok().json(success(listing)))
}

#[post("/api/webhooks/payment")]
pub async fn payment_webhook(
    state: web::Data<AppState>,
    request: HttpRequest,
    payload: web::Bytes,
) -> Handled {
    let signature = request
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());
    let upgraded = lifecycle::payment_webhook(&state, &payload, signature)
        .await
        .map_err(|e| e.logged("payment_webhook"))?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "received": true,
        "upgraded": upgraded.map(|listing| listing.id.to_hex()),
    })))
}

/// Registers every handler. Literal routes come before `{id}` routes.
pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid request body: {}", err)).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid query: {}", err)).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        ApiError::BadRequest(format!("Invalid path: {}", err)).into()
    }))
    .service(create_listing)
    .service(search_listings)
    .service(my_listings)
    .service(my_queried_listings)
    .service(get_listing)
    .service(update_listing)
    .service(delete_listing)
    .service(contact_owner)
    .service(interested_buyers)
    .service(buy_premium)
    .service(payment_successful)
    .service(payment_webhook);
}
