//! Persistence contract for listings, users and the interest log.

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use thiserror::Error;

use crate::filter::SearchFilter;
use crate::models::{InterestQuery, Listing, UserProfile};
use crate::premium::Activation;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Unique `reraNumber` constraint violated.
    #[error("duplicate rera number: {0}")]
    Duplicate(String),

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn find_by_rera(&self, rera_number: &str) -> StoreResult<Option<Listing>>;

    /// Fails with [`StoreError::Duplicate`] when the rera number is taken.
    async fn insert(&self, listing: Listing) -> StoreResult<Listing>;

    async fn search(&self, filter: &SearchFilter) -> StoreResult<Vec<Listing>>;

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Listing>>;

    async fn find_by_owner(&self, owner: &ObjectId) -> StoreResult<Vec<Listing>>;

    /// Full replace. Returns `None` when the listing no longer exists.
    async fn replace(&self, listing: Listing) -> StoreResult<Option<Listing>>;

    /// Returns the number of removed listings.
    async fn delete(&self, id: &ObjectId) -> StoreResult<u64>;

    /// Appends to the interest log and adds the buyer to the listing's
    /// interested users.
    async fn add_query(&self, user: &ObjectId, listing: &ObjectId) -> StoreResult<InterestQuery>;

    async fn queries_for_listing(&self, listing: &ObjectId) -> StoreResult<Vec<InterestQuery>>;

    async fn queried_by(&self, user: &ObjectId) -> StoreResult<Vec<Listing>>;

    /// Applies the activation unless its checkout session already settled
    /// this listing. `None` when the listing is missing or the session was
    /// used before.
    async fn make_premium(
        &self,
        id: &ObjectId,
        activation: &Activation,
    ) -> StoreResult<Option<Listing>>;

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<UserProfile>>;
}
