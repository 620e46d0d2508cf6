#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::web;
use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use proprust::auth::issue_token;
use proprust::models::UserProfile;
use proprust::notify::{Mailer, NotifyError};
use proprust::payments::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway};
use proprust::premium::PlanCatalog;
use proprust::state::AppState;
use proprust::store::MemoryStore;
use serde::Deserialize;
use serde_json::{json, Value};

pub const JWT_SECRET: &str = "test-secret";
pub const WEBHOOK_SECRET: &str = "whsec_test";

#[derive(Debug, Deserialize)]
pub struct Success<T> {
    pub status: String,
    pub data: T,
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<(String, String, String)>>,
}

impl RecordingMailer {
    pub fn with_subject(&self, subject: &str) -> Vec<(String, String, String)> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, s, _)| s == subject)
            .cloned()
            .collect()
    }

    /// Waits for a mail sent from a spawned task.
    pub async fn eventually(&self, subject: &str) -> Vec<(String, String, String)> {
        for _ in 0..100 {
            let sent = self.with_subject(subject);
            if !sent.is_empty() {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        Vec::new()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}

/// Every delivery fails.
#[derive(Default)]
pub struct FailingMailer {
    pub attempts: AtomicUsize,
}

#[async_trait]
impl Mailer for FailingMailer {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Delivery(format!("mailbox {} unavailable", to)))
    }
}

/// Every delivery takes the given time before succeeding.
pub struct SlowMailer(pub Duration);

#[async_trait]
impl Mailer for SlowMailer {
    async fn send(&self, _to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        tokio::time::sleep(self.0).await;
        Ok(())
    }
}

/// Checkout provider double. Sessions start unpaid until `mark_paid`.
#[derive(Default)]
pub struct FakeGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    next: AtomicUsize,
    pub delay: Option<Duration>,
}

impl FakeGateway {
    pub fn slow(delay: Duration) -> Self {
        FakeGateway {
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn mark_paid(&self, id: &str) {
        if let Some(session) = self.sessions.lock().unwrap().get_mut(id) {
            session.payment_status = "paid".to_string();
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let id = format!("cs_test_{}", self.next.fetch_add(1, Ordering::SeqCst));
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/pay/{}", id)),
            payment_status: "unpaid".to_string(),
            metadata: HashMap::from([
                ("listing_id".to_string(), request.listing_id.to_hex()),
                ("plan".to_string(), request.plan_key.clone()),
            ]),
        };
        self.sessions.lock().unwrap().insert(id, session.clone());
        Ok(session)
    }

    async fn retrieve_checkout_session(&self, id: &str) -> Result<CheckoutSession, PaymentError> {
        self.sessions
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| PaymentError::Provider {
                status: 404,
                message: format!("No such checkout.session: {}", id),
            })
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub mailer: Arc<RecordingMailer>,
    pub payments: Arc<FakeGateway>,
    pub state: web::Data<AppState>,
    pub owner: UserProfile,
    pub buyer: UserProfile,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_gateway(FakeGateway::default(), Duration::from_secs(5)).await
    }

    pub async fn with_gateway(gateway: FakeGateway, timeout: Duration) -> Self {
        let mailer = Arc::new(RecordingMailer::default());
        Self::assemble(gateway, mailer.clone(), mailer, timeout).await
    }

    /// Wires `delivery` as the application's mailer. `self.mailer` then
    /// records nothing.
    pub async fn with_mailer(delivery: Arc<dyn Mailer>, timeout: Duration) -> Self {
        let unused = Arc::new(RecordingMailer::default());
        Self::assemble(FakeGateway::default(), unused, delivery, timeout).await
    }

    async fn assemble(
        gateway: FakeGateway,
        mailer: Arc<RecordingMailer>,
        delivery: Arc<dyn Mailer>,
        timeout: Duration,
    ) -> Self {
        let store = Arc::new(MemoryStore::new());
        let payments = Arc::new(gateway);

        let owner = user("Asha", "Kulkarni", "asha@example.com");
        let buyer = user("Rohan", "Mehta", "rohan@example.com");
        store.insert_user(owner.clone()).await;
        store.insert_user(buyer.clone()).await;

        let state = web::Data::new(AppState {
            store: store.clone(),
            mailer: delivery,
            payments: payments.clone(),
            plans: PlanCatalog::default(),
            jwt_secret: JWT_SECRET.to_string(),
            webhook_secret: WEBHOOK_SECRET.to_string(),
            external_timeout: timeout,
        });

        Harness {
            store,
            mailer,
            payments,
            state,
            owner,
            buyer,
        }
    }

    pub fn owner_token(&self) -> String {
        bearer(&self.owner)
    }

    pub fn buyer_token(&self) -> String {
        bearer(&self.buyer)
    }
}

fn user(firstname: &str, lastname: &str, email: &str) -> UserProfile {
    UserProfile {
        id: ObjectId::new(),
        firstname: firstname.to_string(),
        lastname: lastname.to_string(),
        email: email.to_string(),
        phone: None,
    }
}

pub fn bearer(user: &UserProfile) -> String {
    let token = issue_token(JWT_SECRET, &user.id, &user.email, chrono::Duration::hours(1))
        .expect("token");
    format!("Bearer {}", token)
}

pub fn listing_body(rera: &str, listing_for: &str, city: &str, price: f64) -> Value {
    json!({
        "reraNumber": rera,
        "for": listing_for,
        "type": "apartment",
        "city": city,
        "description": format!("Well lit flat in {}", city),
        "furnishing": "semi",
        "noOfBedrooms": 2,
        "price": price,
        "builtUpArea": 950
    })
}
