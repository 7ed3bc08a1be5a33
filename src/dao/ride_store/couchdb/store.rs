use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::from_value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    dao::{
        models::{NotificationEntity, ProfileEntity, RideEntity, RidePatch},
        ride_store::{RideStore, UpdateOutcome},
        storage::StorageResult,
    },
    state::{lifecycle::RideStatus, session::ActorRole},
};

use super::{
    config::CouchConfig,
    error::{CouchDaoError, CouchResult},
    models::{
        AllDocsResponse, BulkDocsRequest, CouchNotificationDocument, CouchProfileDocument,
        CouchRideDocument, DeletedDocument, END_SUFFIX, FIND_PAGE_SIZE, FindRequest,
        FindResponse, IndexRequest, RIDE_INDEXED_FIELDS, inbox_prefix, notification_doc_id,
        profile_doc_id, ride_doc_id, ride_selector,
    },
};

/// Attempts at a read-check-write before a `_rev` race is reported as a failure.
const MAX_CONFLICT_RETRIES: u32 = 5;

/// CouchDB-backed [`RideStore`]; conditional writes rely on `_rev` checks.
#[derive(Clone)]
pub struct CouchRideStore {
    client: Client,
    database_url: Arc<Url>,
    database: Arc<str>,
    auth: Option<(Arc<str>, Arc<str>)>,
}

impl CouchRideStore {
    /// Establish a connection to CouchDB and ensure the database exists.
    pub async fn connect(config: CouchConfig) -> CouchResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| CouchDaoError::ClientBuilder { source })?;

        let raw_url = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.database
        );
        let database_url = Url::parse(&raw_url)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or(CouchDaoError::InvalidBaseUrl { url: raw_url })?;
        let database = Arc::<str>::from(config.database);
        let auth = config
            .username
            .zip(config.password)
            .map(|(u, p)| (Arc::<str>::from(u), Arc::<str>::from(p)));

        let store = Self {
            client,
            database_url: Arc::new(database_url),
            database,
            auth,
        };

        store.ensure_database().await?;
        store.ensure_ride_indexes().await?;
        Ok(store)
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some((ref user, ref pass)) = self.auth {
            builder.basic_auth(user.as_ref(), Some(pass.as_ref()))
        } else {
            builder
        }
    }

    /// Request against `path` inside the database; the path is percent-encoded as one segment.
    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut url = (*self.database_url).clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(path);
        }
        self.authed(self.client.request(method, url))
    }

    async fn ensure_database(&self) -> CouchResult<()> {
        let database = self.database.to_string();
        let url = (*self.database_url).clone();

        let response = self
            .authed(self.client.get(url.clone()))
            .send()
            .await
            .map_err(|source| CouchDaoError::DatabaseQuery {
                database: database.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => {
                let create = self
                    .authed(self.client.put(url))
                    .send()
                    .await
                    .map_err(|source| CouchDaoError::DatabaseCreate {
                        database: database.clone(),
                        source,
                    })?;
                if create.status().is_success() {
                    Ok(())
                } else {
                    Err(CouchDaoError::DatabaseStatus {
                        database,
                        status: create.status(),
                    })
                }
            }
            other => Err(CouchDaoError::DatabaseStatus {
                database,
                status: other,
            }),
        }
    }

    async fn ensure_ride_indexes(&self) -> CouchResult<()> {
        const INDEX: &str = "_index";
        for field in RIDE_INDEXED_FIELDS {
            let response = self
                .request(Method::POST, INDEX)
                .json(&IndexRequest::ride_field(field))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: INDEX.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: INDEX.to_string(),
                    status: response.status(),
                });
            }
        }
        debug!(database = %self.database, "ride indexes ready");
        Ok(())
    }

    async fn get_document<T>(&self, doc_id: &str) -> CouchResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, doc_id)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.json::<T>().await.map(Some).map_err(|source| {
                    CouchDaoError::DecodeResponse {
                        path: doc_id.to_string(),
                        source,
                    }
                })
            }
            other => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status: other,
            }),
        }
    }

    /// PUT a document; a stale or missing `_rev` surfaces as [`CouchDaoError::Conflict`].
    async fn put_document<T>(&self, doc_id: &str, document: &T) -> CouchResult<()>
    where
        T: ?Sized + Serialize,
    {
        let response = self
            .request(Method::PUT, doc_id)
            .json(document)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: doc_id.to_string(),
                source,
            })?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(CouchDaoError::Conflict {
                path: doc_id.to_string(),
            }),
            status => Err(CouchDaoError::RequestStatus {
                path: doc_id.to_string(),
                status,
            }),
        }
    }

    async fn list_documents<T>(&self, prefix: &str) -> CouchResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        const ALL_DOCS: &str = "_all_docs";
        let query = [
            ("include_docs", "true".to_string()),
            ("startkey", serde_json::Value::from(prefix).to_string()),
            (
                "endkey",
                serde_json::Value::from(format!("{}{}", prefix, END_SUFFIX)).to_string(),
            ),
        ];

        let response = self
            .request(Method::GET, ALL_DOCS)
            .query(&query)
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: ALL_DOCS.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(CouchDaoError::RequestStatus {
                path: ALL_DOCS.to_string(),
                status: response.status(),
            });
        }

        let payload = response.json::<AllDocsResponse>().await.map_err(|source| {
            CouchDaoError::DecodeResponse {
                path: ALL_DOCS.to_string(),
                source,
            }
        })?;

        let mut documents = Vec::new();
        for row in payload.rows {
            if let Some(doc) = row.doc {
                let parsed = from_value(doc).map_err(|source| CouchDaoError::DeserializeValue {
                    path: row.id,
                    source,
                })?;
                documents.push(parsed);
            }
        }

        Ok(documents)
    }

    /// Rides whose `field` equals `value`, following `_find` bookmarks until a short page.
    async fn find_rides(&self, field: &str, value: &str) -> CouchResult<Vec<RideEntity>> {
        const FIND: &str = "_find";
        let selector = ride_selector(field, value);
        let mut rides = Vec::new();
        let mut bookmark = None;

        loop {
            let body = FindRequest {
                selector: selector.clone(),
                limit: FIND_PAGE_SIZE,
                bookmark: bookmark.take(),
            };
            let response = self
                .request(Method::POST, FIND)
                .json(&body)
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: FIND.to_string(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(CouchDaoError::RequestStatus {
                    path: FIND.to_string(),
                    status: response.status(),
                });
            }
            let page = response.json::<FindResponse>().await.map_err(|source| {
                CouchDaoError::DecodeResponse {
                    path: FIND.to_string(),
                    source,
                }
            })?;

            let fetched = page.docs.len();
            for doc in page.docs {
                let doc = from_value::<CouchRideDocument>(doc).map_err(|source| {
                    CouchDaoError::DeserializeValue {
                        path: FIND.to_string(),
                        source,
                    }
                })?;
                rides.push(RideEntity::try_from(doc)?);
            }

            match page.bookmark {
                Some(next) if fetched == FIND_PAGE_SIZE => bookmark = Some(next),
                _ => return Ok(rides),
            }
        }
    }

    async fn update_ride(
        &self,
        id: Uuid,
        patch: RidePatch,
        expected: Option<RideStatus>,
    ) -> CouchResult<UpdateOutcome> {
        let doc_id = ride_doc_id(id);

        for attempt in 1..=MAX_CONFLICT_RETRIES {
            let Some(current) = self.get_document::<CouchRideDocument>(&doc_id).await? else {
                return Ok(UpdateOutcome::NotFound);
            };
            if let Some(expected) = expected {
                if current.ride.status != expected {
                    return Ok(UpdateOutcome::StatusMismatch {
                        actual: current.ride.status,
                    });
                }
            }

            let mut ride = RideEntity::try_from(current.clone())?;
            patch.apply_to(&mut ride);
            let next = CouchRideDocument::from((ride.clone(), current.rev));
            match self.put_document(&doc_id, &next).await {
                Ok(()) => return Ok(UpdateOutcome::Applied(ride)),
                Err(CouchDaoError::Conflict { .. }) => {
                    debug!(ride_id = %id, attempt, "ride revision conflict; re-reading");
                }
                Err(err) => return Err(err),
            }
        }

        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn save_profile(&self, profile: ProfileEntity) -> CouchResult<()> {
        let doc_id = profile_doc_id(&profile.user_id);
        for _ in 0..MAX_CONFLICT_RETRIES {
            let rev = self
                .get_document::<CouchProfileDocument>(&doc_id)
                .await?
                .and_then(|existing| existing.rev);
            let doc = CouchProfileDocument::from((profile.clone(), rev));
            match self.put_document(&doc_id, &doc).await {
                Err(CouchDaoError::Conflict { .. }) => continue,
                other => return other,
            }
        }
        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn update_rider_rating(
        &self,
        user_id: String,
        expected_total: u32,
        rating: f64,
        total_ratings: u32,
    ) -> CouchResult<bool> {
        let doc_id = profile_doc_id(&user_id);
        let Some(mut doc) = self.get_document::<CouchProfileDocument>(&doc_id).await? else {
            return Ok(false);
        };
        if doc.profile.total_ratings != expected_total {
            return Ok(false);
        }
        doc.profile.rating = rating;
        doc.profile.total_ratings = total_ratings;
        doc.profile.updated_at = std::time::SystemTime::now();
        match self.put_document(&doc_id, &doc).await {
            Ok(()) => Ok(true),
            Err(CouchDaoError::Conflict { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn inbox(&self, recipient_id: &str) -> CouchResult<Vec<CouchNotificationDocument>> {
        let mut docs = self
            .list_documents::<CouchNotificationDocument>(&inbox_prefix(recipient_id))
            .await?;
        docs.retain(|doc| doc.notification.recipient_id == recipient_id);
        Ok(docs)
    }

    async fn mark_notification_read(&self, recipient_id: String, id: Uuid) -> CouchResult<bool> {
        let doc_id = notification_doc_id(&recipient_id, id);
        for _ in 0..MAX_CONFLICT_RETRIES {
            let Some(mut doc) = self
                .get_document::<CouchNotificationDocument>(&doc_id)
                .await?
            else {
                return Ok(false);
            };
            if doc.notification.read {
                return Ok(true);
            }
            doc.notification.read = true;
            match self.put_document(&doc_id, &doc).await {
                Ok(()) => return Ok(true),
                Err(CouchDaoError::Conflict { .. }) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(CouchDaoError::ConflictRetriesExhausted {
            path: doc_id,
            attempts: MAX_CONFLICT_RETRIES,
        })
    }

    async fn clear_notifications(&self, recipient_id: String) -> CouchResult<u64> {
        const BULK_DOCS: &str = "_bulk_docs";
        let tombstones: Vec<DeletedDocument> = self
            .inbox(&recipient_id)
            .await?
            .into_iter()
            .filter_map(|doc| {
                doc.rev.map(|rev| DeletedDocument {
                    id: doc.id,
                    rev,
                    deleted: true,
                })
            })
            .collect();
        if tombstones.is_empty() {
            return Ok(0);
        }

        let removed = tombstones.len() as u64;
        let response = self
            .request(Method::POST, BULK_DOCS)
            .json(&BulkDocsRequest { docs: tombstones })
            .send()
            .await
            .map_err(|source| CouchDaoError::RequestSend {
                path: BULK_DOCS.to_string(),
                source,
            })?;

        if response.status().is_success() {
            Ok(removed)
        } else {
            Err(CouchDaoError::RequestStatus {
                path: BULK_DOCS.to_string(),
                status: response.status(),
            })
        }
    }
}

impl RideStore for CouchRideStore {
    fn insert_ride(&self, ride: RideEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = ride_doc_id(ride.id);
            let doc = CouchRideDocument::from((ride, None));
            store.put_document(&doc_id, &doc).await.map_err(Into::into)
        })
    }

    fn find_ride(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = ride_doc_id(id);
            let maybe_doc = store.get_document::<CouchRideDocument>(&doc_id).await?;
            Ok(maybe_doc.map(RideEntity::try_from).transpose()?)
        })
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
            let mut rides = store.find_rides("status", status.as_str()).await?;
            rides.sort_by_key(|ride| ride.created_at);
            Ok(rides)
        })
    }

    fn list_rides_for_user(
        &self,
        user_id: String,
        role: ActorRole,
    ) -> BoxFuture<'static, StorageResult<Vec<RideEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let field = match role {
                ActorRole::Passenger => "passenger_id",
                ActorRole::Rider => "rider_id",
            };
            let mut rides = store.find_rides(field, &user_id).await?;
            rides.sort_by_key(|ride| std::cmp::Reverse(ride.created_at));
            Ok(rides)
        })
    }

    fn find_profile(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<ProfileEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let doc_id = profile_doc_id(&user_id);
            let maybe_doc = store.get_document::<CouchProfileDocument>(&doc_id).await?;
            Ok(maybe_doc.map(|doc| doc.profile))
        })
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
            let doc = CouchNotificationDocument::from((notification, None));
            store.put_document(&doc.id, &doc).await.map_err(Into::into)
        })
    }

    fn list_notifications(
        &self,
        recipient_id: String,
    ) -> BoxFuture<'static, StorageResult<Vec<NotificationEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut inbox: Vec<NotificationEntity> = store
                .inbox(&recipient_id)
                .await?
                .into_iter()
                .map(|doc| doc.notification)
                .collect();
            inbox.sort_by_key(|entry| std::cmp::Reverse(entry.created_at));
            Ok(inbox)
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
        Box::pin(async move {
            let url = (*store.database_url).clone();
            let response = store
                .authed(store.client.get(url.clone()))
                .send()
                .await
                .map_err(|source| CouchDaoError::RequestSend {
                    path: url.to_string(),
                    source,
                })?;

            if response.status().is_success() {
                Ok(())
            } else {
                Err(CouchDaoError::RequestStatus {
                    path: url.to_string(),
                    status: response.status(),
                }
                .into())
            }
        })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.ensure_database().await?;
            store.ensure_ride_indexes().await.map_err(Into::into)
        })
    }
}
