use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;

use super::error::CouchDaoError;
use crate::dao::models::{NotificationEntity, ProfileEntity, RideEntity};

pub const RIDE_PREFIX: &str = "ride::";
pub const PROFILE_PREFIX: &str = "profile::";
pub const NOTIFICATION_PREFIX: &str = "notification::";
pub const END_SUFFIX: &str = "\u{ffff}";

#[derive(Debug, Deserialize)]
pub struct AllDocsResponse {
    pub rows: Vec<AllDocsRow>,
}

#[derive(Debug, Deserialize)]
pub struct AllDocsRow {
    pub id: String,
    #[serde(default)]
    pub doc: Option<Value>,
}

/// Ride fields backed by a Mango index so listings avoid a full scan.
pub const RIDE_INDEXED_FIELDS: [&str; 3] = ["status", "passenger_id", "rider_id"];

/// Rows returned per `_find` page; later pages follow the bookmark.
pub const FIND_PAGE_SIZE: usize = 200;

/// Body of a Mango `_find` query.
#[derive(Debug, Serialize)]
pub struct FindRequest {
    pub selector: Value,
    pub limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bookmark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FindResponse {
    pub docs: Vec<Value>,
    #[serde(default)]
    pub bookmark: Option<String>,
}

/// Body of an `_index` request; CouchDB answers `exists` when it is already there.
#[derive(Debug, Serialize)]
pub struct IndexRequest {
    pub index: IndexFields,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct IndexFields {
    pub fields: Vec<&'static str>,
}

impl IndexRequest {
    pub fn ride_field(field: &'static str) -> Self {
        Self {
            index: IndexFields {
                fields: vec![field],
            },
            name: format!("rides-by-{field}"),
            kind: "json",
        }
    }
}

/// Selector matching ride documents whose `field` equals `value`.
pub fn ride_selector(field: &str, value: &str) -> Value {
    let mut selector = Map::new();
    selector.insert(
        "_id".into(),
        json!({ "$gt": RIDE_PREFIX, "$lt": format!("{RIDE_PREFIX}{END_SUFFIX}") }),
    );
    selector.insert(field.into(), Value::from(value));
    Value::Object(selector)
}

/// Tombstone entry for `_bulk_docs`.
#[derive(Debug, Serialize)]
pub struct DeletedDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev")]
    pub rev: String,
    #[serde(rename = "_deleted")]
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct BulkDocsRequest<T> {
    pub docs: Vec<T>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchRideDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub ride: RideEntity,
}

impl From<(RideEntity, Option<String>)> for CouchRideDocument {
    fn from((ride, rev): (RideEntity, Option<String>)) -> Self {
        Self {
            id: ride_doc_id(ride.id),
            rev,
            ride,
        }
    }
}

impl TryFrom<CouchRideDocument> for RideEntity {
    type Error = CouchDaoError;

    fn try_from(doc: CouchRideDocument) -> Result<Self, Self::Error> {
        if extract_uuid(&doc.id)? != doc.ride.id {
            return Err(CouchDaoError::InvalidDocId {
                doc_id: doc.id,
                kind: "body id does not match document id",
            });
        }
        Ok(doc.ride)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchProfileDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileEntity,
}

impl From<(ProfileEntity, Option<String>)> for CouchProfileDocument {
    fn from((profile, rev): (ProfileEntity, Option<String>)) -> Self {
        Self {
            id: profile_doc_id(&profile.user_id),
            rev,
            profile,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CouchNotificationDocument {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_rev", skip_serializing_if = "Option::is_none")]
    pub rev: Option<String>,
    #[serde(flatten)]
    pub notification: NotificationEntity,
}

impl From<(NotificationEntity, Option<String>)> for CouchNotificationDocument {
    fn from((notification, rev): (NotificationEntity, Option<String>)) -> Self {
        Self {
            id: notification_doc_id(&notification.recipient_id, notification.id),
            rev,
            notification,
        }
    }
}

pub fn ride_doc_id(id: Uuid) -> String {
    format!("{}{}", RIDE_PREFIX, id)
}

pub fn profile_doc_id(user_id: &str) -> String {
    format!("{}{}", PROFILE_PREFIX, user_id)
}

/// Inbox prefix of `recipient_id`; entries sort by id within it.
pub fn inbox_prefix(recipient_id: &str) -> String {
    format!("{}{}::", NOTIFICATION_PREFIX, recipient_id)
}

pub fn notification_doc_id(recipient_id: &str, id: Uuid) -> String {
    format!("{}{}", inbox_prefix(recipient_id), id)
}

pub fn extract_uuid(doc_id: &str) -> Result<Uuid, CouchDaoError> {
    let (_, id) = doc_id
        .rsplit_once("::")
        .ok_or_else(|| CouchDaoError::InvalidDocId {
            doc_id: doc_id.to_string(),
            kind: "missing separator",
        })?;

    Uuid::parse_str(id).map_err(|_| CouchDaoError::InvalidDocId {
        doc_id: doc_id.to_string(),
        kind: "invalid UUID",
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{LocationEntity, NotificationKind};

    #[test]
    fn notification_ids_nest_under_recipient_prefix() {
        let id = Uuid::new_v4();
        let doc_id = notification_doc_id("user-7", id);
        assert!(doc_id.starts_with(&inbox_prefix("user-7")));
        assert_eq!(extract_uuid(&doc_id).unwrap(), id);
    }

    #[test]
    fn ride_document_flattens_entity_next_to_couch_keys() {
        let ride = RideEntity::new_request(
            "p1".into(),
            LocationEntity::labelled("Accra Mall"),
            LocationEntity::labelled("Circle"),
            None,
            None,
        );
        let doc = CouchRideDocument::from((ride.clone(), Some("1-abc".into())));
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["_id"], format!("ride::{}", ride.id));
        assert_eq!(json["_rev"], "1-abc");
        assert_eq!(json["status"], "pending");

        let parsed: CouchRideDocument = serde_json::from_value(json).unwrap();
        assert_eq!(RideEntity::try_from(parsed).unwrap(), ride);
    }

    #[test]
    fn ride_selector_scopes_to_ride_documents() {
        let selector = ride_selector("rider_id", "r1");
        assert_eq!(selector["rider_id"], "r1");
        assert_eq!(selector["_id"]["$gt"], RIDE_PREFIX);
        assert_eq!(selector["_id"]["$lt"], format!("ride::{END_SUFFIX}"));

        let request = FindRequest {
            selector,
            limit: FIND_PAGE_SIZE,
            bookmark: None,
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["limit"], FIND_PAGE_SIZE);
        assert!(body.get("bookmark").is_none());
    }

    #[test]
    fn ride_index_names_follow_the_field() {
        let body = serde_json::to_value(IndexRequest::ride_field("status")).unwrap();
        assert_eq!(body["index"]["fields"], json!(["status"]));
        assert_eq!(body["name"], "rides-by-status");
        assert_eq!(body["type"], "json");
    }

    #[test]
    fn mismatched_body_id_is_rejected() {
        let ride = RideEntity::new_request(
            "p1".into(),
            LocationEntity::labelled("a"),
            LocationEntity::labelled("b"),
            None,
            None,
        );
        let mut doc = CouchRideDocument::from((ride, None));
        doc.id = ride_doc_id(Uuid::new_v4());
        assert!(RideEntity::try_from(doc).is_err());

        let entry = NotificationEntity::new(
            "p1".into(),
            NotificationKind::NewRating,
            "t".into(),
            "b".into(),
            None,
        );
        let doc = CouchNotificationDocument::from((entry, None));
        assert!(doc.id.starts_with("notification::p1::"));
    }
}
