use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{
    CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway, METADATA_LISTING,
    METADATA_PLAN,
};

/// Stripe Checkout over its form-encoded REST API.
#[derive(Clone)]
pub struct StripeGateway {
    http: reqwest::Client,
    api_base: String,
    secret_key: String,
    currency: String,
}

#[derive(Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Deserialize)]
struct StripeErrorDetail {
    message: String,
}

impl StripeGateway {
    pub fn new(
        api_base: &str,
        secret_key: &str,
        currency: &str,
        timeout: Duration,
    ) -> Result<Self, PaymentError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(StripeGateway {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            currency: currency.to_lowercase(),
        })
    }

    fn form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", self.currency.clone()),
            (
                "line_items[0][price_data][unit_amount]",
                request.plan.price.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                request.plan.name.clone(),
            ),
            ("success_url", request.success_url.clone()),
            ("cancel_url", request.cancel_url.clone()),
            ("client_reference_id", request.listing_id.to_hex()),
            ("metadata[listing_id]", request.listing_id.to_hex()),
            ("metadata[plan]", request.plan_key.clone()),
        ]
    }

    async fn parse(response: reqwest::Response) -> Result<CheckoutSession, PaymentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<CheckoutSession>().await?);
        }
        let message = match response.json::<StripeErrorBody>().await {
            Ok(body) => body.error.message,
            Err(_) => status.canonical_reason().unwrap_or("unknown").to_string(),
        };
        Err(PaymentError::Provider {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&self.form(request))
            .send()
            .await?;
        let session = Self::parse(response).await?;
        if session.url.is_none() {
            return Err(PaymentError::MissingUrl(session.id));
        }
        log::info!(
            "checkout session {} opened for listing {} ({}={})",
            session.id,
            request.listing_id,
            METADATA_PLAN,
            request.plan_key
        );
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let session = Self::parse(response).await?;
        log::debug!(
            "checkout session {} status={} {}={:?}",
            session.id,
            session.payment_status,
            METADATA_LISTING,
            session.listing_id()
        );
        Ok(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::premium::Plan;
    use mongodb::bson::oid::ObjectId;

    #[test]
    fn form_carries_plan_and_listing_metadata() {
        let gateway =
            StripeGateway::new("https://api.stripe.com/", "sk_test", "INR", Duration::from_secs(5))
                .unwrap();
        let listing_id = ObjectId::new();
        let request = CheckoutRequest {
            listing_id,
            plan_key: "gold".into(),
            plan: Plan {
                name: "Gold".into(),
                price: 129_900,
                valid: 90,
            },
            success_url: "https://app.example/ok".into(),
            cancel_url: "https://app.example/cancel".into(),
        };
        let form = gateway.form(&request);
        let get = |key: &str| {
            form.iter()
                .find(|(k, _)| *k == key)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(gateway.api_base, "https://api.stripe.com");
        assert_eq!(get("line_items[0][price_data][currency]"), Some("inr"));
        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("129900"));
        assert_eq!(get("metadata[plan]"), Some("gold"));
        assert_eq!(
            get("metadata[listing_id]"),
            Some(listing_id.to_hex().as_str())
        );
    }
}
