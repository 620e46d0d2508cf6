//! The trusted caller identity, decoded from a bearer JWT.

use actix_web::dev::Payload;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{Duration, Utc};
use futures::future::{ready, Ready};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct JWTClaim {
    pub sub: String,
    pub email: String,
    pub exp: usize,
    pub iat: usize,
}

/// Authenticated identity attached to a request.
#[derive(Debug, Clone)]
pub struct Caller {
    pub id: ObjectId,
    pub email: String,
}

pub fn issue_token(
    secret: &str,
    user: &ObjectId,
    email: &str,
    ttl: Duration,
) -> Result<String, ApiError> {
    let now = Utc::now();
    let claim = JWTClaim {
        sub: user.to_hex(),
        email: email.to_string(),
        exp: (now + ttl).timestamp() as usize,
        iat: now.timestamp() as usize,
    };
    encode(
        &Header::default(),
        &claim,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("could_not_encode_jwt_token: {}", e)))
}

fn authenticate(req: &HttpRequest) -> Result<Caller, ApiError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| ApiError::Internal("application state not configured".to_string()))?;

    let token = req
        .headers()
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("missing_authorization_header".to_string()))?
        .to_str()
        .map_err(|_| ApiError::Unauthorized("invalid_authorization_header".to_string()))?
        .trim_start_matches("Bearer ")
        .trim();

    let claim = decode::<JWTClaim>(
        token,
        &DecodingKey::from_secret(state.jwt_secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| ApiError::Unauthorized(e.to_string()))?;

    let id = ObjectId::parse_str(&claim.claims.sub)
        .map_err(|_| ApiError::Unauthorized("could_not_parse_userId".to_string()))?;

    Ok(Caller {
        id,
        email: claim.claims.email,
    })
}

impl FromRequest for Caller {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(authenticate(req))
    }
}
