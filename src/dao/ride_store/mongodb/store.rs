use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoNotificationDocument, MongoProfileDocument, MongoRideDocument, doc_id,
        ride_update_pipeline,
    },
};
use crate::{
    dao::{
        models::{NotificationEntity, ProfileEntity, RideEntity, RidePatch},
        ride_store::{RideStore, UpdateOutcome},
        storage::StorageResult,
    },
    state::{lifecycle::RideStatus, session::ActorRole},
};

const RIDE_COLLECTION_NAME: &str = "rides";
const PROFILE_COLLECTION_NAME: &str = "profiles";
const NOTIFICATION_COLLECTION_NAME: &str = "notifications";

/// MongoDB-backed [`RideStore`]; conditional writes use `findOneAndUpdate`.
#[derive(Clone)]
pub struct MongoRideStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoRideStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;
        let indexes: [(&'static str, &'static str, Document); 4] = [
            (
                RIDE_COLLECTION_NAME,
                "ride_status_created_idx",
                doc! { "status": 1, "created_at": 1 },
            ),
            (
                RIDE_COLLECTION_NAME,
                "ride_passenger_idx",
                doc! { "passenger_id": 1, "created_at": -1 },
            ),
            (
                RIDE_COLLECTION_NAME,
                "ride_rider_idx",
                doc! { "rider_id": 1, "created_at": -1 },
            ),
            (
                NOTIFICATION_COLLECTION_NAME,
                "notification_recipient_idx",
                doc! { "recipient_id": 1, "created_at": -1 },
            ),
        ];

        for (collection, name, keys) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(IndexOptions::builder().name(Some(name.to_owned())).build())
                .build();
            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index: name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn rides(&self) -> Collection<MongoRideDocument> {
        self.database().await.collection(RIDE_COLLECTION_NAME)
    }

    async fn profiles(&self) -> Collection<MongoProfileDocument> {
        self.database().await.collection(PROFILE_COLLECTION_NAME)
    }

    async fn notifications(&self) -> Collection<MongoNotificationDocument> {
        self.database().await.collection(NOTIFICATION_COLLECTION_NAME)
    }

    async fn insert_ride(&self, ride: RideEntity) -> MongoResult<()> {
        let id = ride.id.to_string();
        let document: MongoRideDocument = ride.into();
        self.rides()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::WriteRide { id, source })?;
        Ok(())
    }

    async fn find_ride(&self, id: Uuid) -> MongoResult<Option<RideEntity>> {
        let document = self
            .rides()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRide {
                id: id.to_string(),
                source,
            })?;
        document.map(RideEntity::try_from).transpose()
    }

    async fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatch,
        expected: Option<RideStatus>,
    ) -> MongoResult<UpdateOutcome> {
        let mut filter = doc_id(id);
        if let Some(expected) = expected {
            filter.insert("status", expected.as_str());
        }

        let updated = self
            .rides()
            .await
            .find_one_and_update(filter, ride_update_pipeline(&patch))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::WriteRide {
                id: id.to_string(),
                source,
            })?;

        if let Some(document) = updated {
            return Ok(UpdateOutcome::Applied(document.try_into()?));
        }

        // The filter missed: either the ride is gone or its status moved on.
        match self.find_ride(id).await? {
            Some(current) => Ok(UpdateOutcome::StatusMismatch {
                actual: current.status,
            }),
            None => Ok(UpdateOutcome::NotFound),
        }
    }

    async fn query_rides(&self, filter: Document, sort: Document) -> MongoResult<Vec<RideEntity>> {
        let documents: Vec<MongoRideDocument> = self
            .rides()
            .await
            .find(filter)
            .sort(sort)
            .await
            .map_err(|source| MongoDaoError::ListRides { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListRides { source })?;

        documents.into_iter().map(RideEntity::try_from).collect()
    }

    async fn find_profile(&self, user_id: String) -> MongoResult<Option<ProfileEntity>> {
        let document = self
            .profiles()
            .await
            .find_one(doc! { "_id": user_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::LoadProfile { user_id, source })?;
        document.map(ProfileEntity::try_from).transpose()
    }

    async fn save_profile(&self, profile: ProfileEntity) -> MongoResult<()> {
        let user_id = profile.user_id.clone();
        let document: MongoProfileDocument = profile.into();
        self.profiles()
            .await
            .replace_one(doc! { "_id": user_id.as_str() }, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::WriteProfile { user_id, source })?;
        Ok(())
    }

    async fn update_rider_rating(
        &self,
        user_id: String,
        expected_total: u32,
        rating: f64,
        total_ratings: u32,
    ) -> MongoResult<bool> {
        let result = self
            .profiles()
            .await
            .update_one(
                doc! { "_id": user_id.as_str(), "total_ratings": i64::from(expected_total) },
                doc! { "$set": {
                    "rating": rating,
                    "total_ratings": i64::from(total_ratings),
                    "updated_at": DateTime::now(),
                } },
            )
            .await
            .map_err(|source| MongoDaoError::WriteProfile { user_id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn append_notification(&self, notification: NotificationEntity) -> MongoResult<()> {
        let recipient_id = notification.recipient_id.clone();
        let document: MongoNotificationDocument = notification.into();
        self.notifications()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::Inbox {
                recipient_id,
                source,
            })?;
        Ok(())
    }

    async fn list_notifications(&self, recipient_id: String) -> MongoResult<Vec<NotificationEntity>> {
        let documents: Vec<MongoNotificationDocument> = self
            .notifications()
            .await
            .find(doc! { "recipient_id": recipient_id.as_str() })
            .sort(doc! { "created_at": -1 })
            .await
            .map_err(|source| MongoDaoError::Inbox {
                recipient_id: recipient_id.clone(),
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::Inbox {
                recipient_id,
                source,
            })?;

        documents.into_iter().map(NotificationEntity::try_from).collect()
    }

    async fn mark_notification_read(&self, recipient_id: String, id: Uuid) -> MongoResult<bool> {
        let result = self
            .notifications()
            .await
            .update_one(
                doc! { "_id": id.to_string(), "recipient_id": recipient_id.as_str() },
                doc! { "$set": { "read": true } },
            )
            .await
            .map_err(|source| MongoDaoError::Inbox {
                recipient_id,
                source,
            })?;
        Ok(result.matched_count > 0)
    }

    async fn clear_notifications(&self, recipient_id: String) -> MongoResult<u64> {
        let result = self
            .notifications()
            .await
            .delete_many(doc! { "recipient_id": recipient_id.as_str() })
            .await
            .map_err(|source| MongoDaoError::Inbox {
                recipient_id,
                source,
            })?;
        Ok(result.deleted_count)
    }
}

impl RideStore for MongoRideStore {
    fn insert_ride(&self, ride: RideEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_ride(ride).await.map_err(Into::into) })
    }

    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_ride(id).await.map_err(Into::into) })
    }

    fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatch,
        expected: Option<RideStatus>,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_ride(id, patch, expected)
                .await
                .map_err(Into::into)
        })
    }

    fn list_rides_by_status(
        &self,
        status: RideStatus,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .query_rides(doc! { "status": status.as_str() }, doc! { "created_at": 1 })
                .await
                .map_err(Into::into)
        })
    }

    fn list_rides_for_user(
        &self,
        user_id: String,
        role: ActorRole,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let filter = match role {
                ActorRole::Passenger => doc! { "passenger_id": user_id },
                ActorRole::Rider => doc! { "rider_id": user_id },
            };
            store
                .query_rides(filter, doc! { "created_at": -1 })
                .await
                .map_err(Into::into)
        })
    }

    fn find_profile(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_profile(user_id).await.map_err(Into::into) })
    }

    fn save_profile(&self, profile: ProfileEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_profile(profile).await.map_err(Into::into) })
    }

    fn update_rider_rating(
        &self,
        user_id: String,
        expected_total: u32,
        rating: f64,
        total_ratings: u32,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_rider_rating(user_id, expected_total, rating, total_ratings)
                .await
                .map_err(Into::into)
        })
    }

    fn append_notification(
        &self,
        notification: NotificationEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .append_notification(notification)
                .await
                .map_err(Into::into)
        })
    }

    fn list_notifications(
        &self,
        recipient_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .list_notifications(recipient_id)
                .await
                .map_err(Into::into)
        })
    }

    fn mark_notification_read(
        &self,
        recipient_id: String,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .mark_notification_read(recipient_id, id)
                .await
                .map_err(Into::into)
        })
    }

    fn clear_notifications(&self, recipient_id: String) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .clear_notifications(recipient_id)
                .await
                .map_err(Into::into)
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
