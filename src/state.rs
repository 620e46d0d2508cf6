use std::sync::Arc;
use std::time::Duration;

use crate::notify::Mailer;
use crate::payments::PaymentGateway;
use crate::premium::PlanCatalog;
use crate::store::ListingStore;

/// Collaborators and read-only configuration shared by every handler.
pub struct AppState {
    pub store: Arc<dyn ListingStore>,
    pub mailer: Arc<dyn Mailer>,
    pub payments: Arc<dyn PaymentGateway>,
    pub plans: PlanCatalog,
    pub jwt_secret: String,
    pub webhook_secret: String,
    pub external_timeout: Duration,
}
