use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use mongodb::bson::oid::ObjectId;
use tokio::sync::Mutex;

use super::{ListingStore, StoreError, StoreResult};
use crate::filter::SearchFilter;
use crate::models::{InterestQuery, Listing, UserProfile};
use crate::premium::Activation;

/// Process-local store. Backs the `memory` database backend and the tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    listings: Vec<Listing>,
    users: HashMap<ObjectId, UserProfile>,
    queries: Vec<InterestQuery>,
}

impl Inner {
    fn listing_mut(&mut self, id: &ObjectId) -> Option<&mut Listing> {
        self.listings.iter_mut().find(|l| &l.id == id)
    }

    fn rera_taken(&self, rera_number: &str, except: Option<&ObjectId>) -> bool {
        self.listings
            .iter()
            .any(|l| l.rera_number == rera_number && Some(&l.id) != except)
    }

    fn collect_visible<F>(&self, keep: F) -> Vec<Listing>
    where
        F: Fn(&Listing) -> bool,
    {
        let mut found: Vec<Listing> = self.listings.iter().filter(|l| keep(l)).cloned().collect();
        found.sort_by(|a, b| match b.premium.cmp(&a.premium) {
            Ordering::Equal => b.created_at.cmp(&a.created_at),
            other => other,
        });
        found
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserProfile) {
        self.inner.lock().await.users.insert(user.id, user);
    }

    pub async fn listing_count(&self) -> usize {
        self.inner.lock().await.listings.len()
    }
}

#[async_trait]
impl ListingStore for MemoryStore {
    async fn find_by_rera(&self, rera_number: &str) -> StoreResult<Option<Listing>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .listings
            .iter()
            .find(|l| l.rera_number == rera_number)
            .cloned())
    }

    async fn insert(&self, listing: Listing) -> StoreResult<Listing> {
        let mut inner = self.inner.lock().await;
        if inner.rera_taken(&listing.rera_number, None) {
            return Err(StoreError::Duplicate(listing.rera_number));
        }
        inner.listings.push(listing.clone());
        Ok(listing)
    }

    async fn search(&self, filter: &SearchFilter) -> StoreResult<Vec<Listing>> {
        let inner = self.inner.lock().await;
        Ok(inner.collect_visible(|l| filter.matches(l)))
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Listing>> {
        let inner = self.inner.lock().await;
        Ok(inner.listings.iter().find(|l| &l.id == id).cloned())
    }

    async fn find_by_owner(&self, owner: &ObjectId) -> StoreResult<Vec<Listing>> {
        let inner = self.inner.lock().await;
        Ok(inner.collect_visible(|l| &l.posted_by == owner))
    }

    async fn replace(&self, listing: Listing) -> StoreResult<Option<Listing>> {
        let mut inner = self.inner.lock().await;
        if inner.rera_taken(&listing.rera_number, Some(&listing.id)) {
            return Err(StoreError::Duplicate(listing.rera_number));
        }
        Ok(inner.listing_mut(&listing.id).map(|stored| {
            *stored = listing.clone();
            listing
        }))
    }

    async fn delete(&self, id: &ObjectId) -> StoreResult<u64> {
        let mut inner = self.inner.lock().await;
        let before = inner.listings.len();
        inner.listings.retain(|l| &l.id != id);
        Ok((before - inner.listings.len()) as u64)
    }

    async fn add_query(&self, user: &ObjectId, listing: &ObjectId) -> StoreResult<InterestQuery> {
        let mut inner = self.inner.lock().await;
        let query = InterestQuery::new(*user, *listing);
        inner.queries.push(query.clone());
        if let Some(stored) = inner.listing_mut(listing) {
            if !stored.interested_users.contains(user) {
                stored.interested_users.push(*user);
            }
        }
        Ok(query)
    }

    async fn queries_for_listing(&self, listing: &ObjectId) -> StoreResult<Vec<InterestQuery>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .queries
            .iter()
            .rev()
            .filter(|q| &q.property == listing)
            .cloned()
            .collect())
    }

    async fn queried_by(&self, user: &ObjectId) -> StoreResult<Vec<Listing>> {
        let inner = self.inner.lock().await;
        Ok(inner.collect_visible(|l| l.interested_users.contains(user)))
    }

    async fn make_premium(
        &self,
        id: &ObjectId,
        activation: &Activation,
    ) -> StoreResult<Option<Listing>> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .listing_mut(id)
            .and_then(|stored| activation.apply(stored).then(|| stored.clone())))
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<UserProfile>> {
        Ok(self.inner.lock().await.users.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ListingFor, ListingInput};

    fn listing(rera: &str) -> Listing {
        Listing::new(
            ObjectId::new(),
            ListingInput {
                rera_number: rera.into(),
                listing_for: ListingFor::Sale,
                kind: "apartment".into(),
                city: "Thane".into(),
                description: String::new(),
                furnishing: String::new(),
                no_of_bedrooms: 1,
                price: 4_000_000.0,
                built_up_area: 600.0,
            },
        )
    }

    #[tokio::test]
    async fn insert_enforces_unique_rera() {
        let store = MemoryStore::new();
        store.insert(listing("A1")).await.unwrap();
        let err = store.insert(listing("A1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(r) if r == "A1"));
        assert_eq!(store.listing_count().await, 1);
    }

    #[tokio::test]
    async fn replace_rejects_taken_rera_but_allows_own() {
        let store = MemoryStore::new();
        let first = store.insert(listing("A1")).await.unwrap();
        let mut second = store.insert(listing("B2")).await.unwrap();

        let mut same = first.clone();
        same.price = 1.0;
        assert!(store.replace(same).await.unwrap().is_some());

        second.rera_number = "A1".into();
        assert!(matches!(
            store.replace(second).await,
            Err(StoreError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn interest_is_logged_once_per_buyer_on_listing() {
        let store = MemoryStore::new();
        let stored = store.insert(listing("A1")).await.unwrap();
        let buyer = ObjectId::new();

        store.add_query(&buyer, &stored.id).await.unwrap();
        store.add_query(&buyer, &stored.id).await.unwrap();

        assert_eq!(store.queries_for_listing(&stored.id).await.unwrap().len(), 2);
        let queried = store.queried_by(&buyer).await.unwrap();
        assert_eq!(queried.len(), 1);
        assert_eq!(queried[0].interested_users, vec![buyer]);
    }

    #[tokio::test]
    async fn premium_listings_come_first() {
        let store = MemoryStore::new();
        let plain = store.insert(listing("A1")).await.unwrap();
        let boosted = store.insert(listing("B2")).await.unwrap();
        let activation = Activation {
            plan_key: "gold".into(),
            session_id: "cs_1".into(),
            valid_until: chrono::Utc::now() + chrono::Duration::days(1),
        };
        store.make_premium(&boosted.id, &activation).await.unwrap();

        let all = store.search(&SearchFilter::default()).await.unwrap();
        assert_eq!(all[0].id, boosted.id);
        assert_eq!(all[1].id, plain.id);
    }

    #[tokio::test]
    async fn settled_session_is_not_applied_again() {
        let store = MemoryStore::new();
        let stored = store.insert(listing("A1")).await.unwrap();
        let first = Activation {
            plan_key: "silver".into(),
            session_id: "cs_1".into(),
            valid_until: chrono::Utc::now() + chrono::Duration::days(30),
        };
        assert!(store.make_premium(&stored.id, &first).await.unwrap().is_some());

        let replay = Activation {
            valid_until: first.valid_until + chrono::Duration::days(30),
            ..first.clone()
        };
        assert!(store.make_premium(&stored.id, &replay).await.unwrap().is_none());
        let after = store.find_by_id(&stored.id).await.unwrap().unwrap();
        assert_eq!(after.premium_until, Some(first.valid_until));
    }
}
