use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime};
use mongodb::error::ErrorKind::Write;
use mongodb::error::WriteFailure;
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOneOptions, FindOptions, IndexOptions,
    ReturnDocument,
};
use mongodb::{Client, Collection, Database, IndexModel};

use super::{ListingStore, StoreError, StoreResult};
use crate::filter::SearchFilter;
use crate::models::{InterestQuery, Listing, UserProfile};
use crate::premium::Activation;

const COLLECTION_LISTINGS: &str = "properties";
const COLLECTION_USERS: &str = "users";
const COLLECTION_QUERIES: &str = "queries";

const DUPLICATE_KEY: i32 = 11000;

#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    pub async fn connect(uri: &str, database: &str) -> StoreResult<Self> {
        let mut client_options = ClientOptions::parse(uri).await?;
        client_options.app_name = Some("proprust".to_string());
        let client = Client::with_options(client_options)?;
        let store = MongoStore {
            db: client.database(database),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    /// The unique index is the authoritative guard against concurrent
    /// duplicate submissions.
    async fn ensure_indexes(&self) -> StoreResult<()> {
        let unique_rera = IndexModel::builder()
            .keys(doc! { "reraNumber": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.listings().create_index(unique_rera, None).await?;

        let by_listing = IndexModel::builder()
            .keys(doc! { "property": 1, "createdAt": -1 })
            .build();
        self.queries().create_index(by_listing, None).await?;
        Ok(())
    }

    fn listings(&self) -> Collection<Listing> {
        self.db.collection::<Listing>(COLLECTION_LISTINGS)
    }

    fn queries(&self) -> Collection<InterestQuery> {
        self.db.collection::<InterestQuery>(COLLECTION_QUERIES)
    }

    fn users(&self) -> Collection<UserProfile> {
        self.db.collection::<UserProfile>(COLLECTION_USERS)
    }

    fn visibility_order() -> FindOptions {
        FindOptions::builder()
            .sort(doc! { "premium": -1, "createdAt": -1 })
            .build()
    }
}

fn map_write_error(err: mongodb::error::Error, rera_number: &str) -> StoreError {
    match err.kind.as_ref() {
        Write(WriteFailure::WriteError(e)) if e.code == DUPLICATE_KEY => {
            StoreError::Duplicate(rera_number.to_string())
        }
        _ => StoreError::Database(err),
    }
}

#[async_trait]
impl ListingStore for MongoStore {
    async fn find_by_rera(&self, rera_number: &str) -> StoreResult<Option<Listing>> {
        Ok(self
            .listings()
            .find_one(doc! { "reraNumber": rera_number }, None)
            .await?)
    }

    async fn insert(&self, listing: Listing) -> StoreResult<Listing> {
        let result = self
            .listings()
            .insert_one(&listing, None)
            .await
            .map_err(|e| map_write_error(e, &listing.rera_number))?;
        log::info!("New listing inserted with id {}", result.inserted_id);
        Ok(listing)
    }

    async fn search(&self, filter: &SearchFilter) -> StoreResult<Vec<Listing>> {
        let cursor = self
            .listings()
            .find(filter.to_document(), Self::visibility_order())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn find_by_id(&self, id: &ObjectId) -> StoreResult<Option<Listing>> {
        Ok(self.listings().find_one(doc! { "_id": *id }, None).await?)
    }

    async fn find_by_owner(&self, owner: &ObjectId) -> StoreResult<Vec<Listing>> {
        let cursor = self
            .listings()
            .find(doc! { "postedBy": *owner }, Self::visibility_order())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn replace(&self, listing: Listing) -> StoreResult<Option<Listing>> {
        let result = self
            .listings()
            .replace_one(doc! { "_id": listing.id }, &listing, None)
            .await
            .map_err(|e| map_write_error(e, &listing.rera_number))?;
        Ok((result.matched_count > 0).then_some(listing))
    }

    async fn delete(&self, id: &ObjectId) -> StoreResult<u64> {
        let result = self.listings().delete_one(doc! { "_id": *id }, None).await?;
        Ok(result.deleted_count)
    }

    async fn add_query(&self, user: &ObjectId, listing: &ObjectId) -> StoreResult<InterestQuery> {
        let query = InterestQuery::new(*user, *listing);
        self.queries().insert_one(&query, None).await?;
        self.listings()
            .update_one(
                doc! { "_id": *listing },
                doc! { "$addToSet": { "interestedUsers": *user } },
                None,
            )
            .await?;
        Ok(query)
    }

    async fn queries_for_listing(&self, listing: &ObjectId) -> StoreResult<Vec<InterestQuery>> {
        let options = FindOptions::builder().sort(doc! { "createdAt": -1 }).build();
        let cursor = self
            .queries()
            .find(doc! { "property": *listing }, options)
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn queried_by(&self, user: &ObjectId) -> StoreResult<Vec<Listing>> {
        let cursor = self
            .listings()
            .find(doc! { "interestedUsers": *user }, Self::visibility_order())
            .await?;
        Ok(cursor.try_collect().await?)
    }

    async fn make_premium(
        &self,
        id: &ObjectId,
        activation: &Activation,
    ) -> StoreResult<Option<Listing>> {
        // Matching on the session ledger makes settle-once atomic.
        let filter = doc! {
            "_id": *id,
            "premiumSessions": { "$ne": activation.session_id.clone() },
        };
        let update = doc! {
            "$set": {
                "premium": true,
                "premiumPlan": activation.plan_key.clone(),
                "premiumUntil": DateTime::from_chrono(activation.valid_until),
            },
            "$push": { "premiumSessions": activation.session_id.clone() },
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::After)
            .build();
        Ok(self
            .listings()
            .find_one_and_update(filter, update, options)
            .await?)
    }

    async fn find_user(&self, id: &ObjectId) -> StoreResult<Option<UserProfile>> {
        let find_one_options = FindOneOptions::builder()
            .projection(doc! { "password": 0 })
            .build();
        Ok(self
            .users()
            .find_one(doc! { "_id": *id }, find_one_options)
            .await?)
    }
}
