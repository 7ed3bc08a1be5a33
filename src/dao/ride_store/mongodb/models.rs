use mongodb::bson::{Bson, DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::MongoDaoError;
use crate::{
    dao::models::{
        LocationEntity, NotificationEntity, NotificationKind, OnboardingStatus, ProfileEntity,
        RideEntity, RidePatch, RiderInfoEntity, VehicleEntity,
    },
    state::{lifecycle::RideStatus, session::ActorRole},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRideDocument {
    #[serde(rename = "_id")]
    id: String,
    revision: i64,
    status: RideStatus,
    passenger_id: String,
    rider_id: Option<String>,
    pickup: LocationEntity,
    dropoff: LocationEntity,
    rider_info: Option<RiderInfoEntity>,
    fare: Option<f64>,
    estimated_duration: Option<f64>,
    cancelled_by: Option<ActorRole>,
    cancellation_reason: Option<String>,
    passenger_rating: Option<i32>,
    passenger_feedback: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
    accepted_at: Option<DateTime>,
    picked_up_at: Option<DateTime>,
    completed_at: Option<DateTime>,
    cancelled_at: Option<DateTime>,
    rated_at: Option<DateTime>,
}

impl From<RideEntity> for MongoRideDocument {
    fn from(value: RideEntity) -> Self {
        Self {
            id: value.id.to_string(),
            revision: i64::try_from(value.revision).unwrap_or(i64::MAX),
            status: value.status,
            passenger_id: value.passenger_id,
            rider_id: value.rider_id,
            pickup: value.pickup,
            dropoff: value.dropoff,
            rider_info: value.rider_info,
            fare: value.fare,
            estimated_duration: value.estimated_duration,
            cancelled_by: value.cancelled_by,
            cancellation_reason: value.cancellation_reason,
            passenger_rating: value.passenger_rating.map(i32::from),
            passenger_feedback: value.passenger_feedback,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            accepted_at: value.accepted_at.map(DateTime::from_system_time),
            picked_up_at: value.picked_up_at.map(DateTime::from_system_time),
            completed_at: value.completed_at.map(DateTime::from_system_time),
            cancelled_at: value.cancelled_at.map(DateTime::from_system_time),
            rated_at: value.rated_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoRideDocument> for RideEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRideDocument) -> Result<Self, Self::Error> {
        let id = parse_uuid(&value.id)?;
        let revision = u64::try_from(value.revision).map_err(|_| corrupt(&value.id, "negative revision"))?;
        let passenger_rating = value
            .passenger_rating
            .map(u8::try_from)
            .transpose()
            .map_err(|_| corrupt(&value.id, "rating out of range"))?;

        Ok(Self {
            id,
            revision,
            status: value.status,
            passenger_id: value.passenger_id,
            rider_id: value.rider_id,
            pickup: value.pickup,
            dropoff: value.dropoff,
            rider_info: value.rider_info,
            fare: value.fare,
            estimated_duration: value.estimated_duration,
            cancelled_by: value.cancelled_by,
            cancellation_reason: value.cancellation_reason,
            passenger_rating,
            passenger_feedback: value.passenger_feedback,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            accepted_at: value.accepted_at.map(DateTime::to_system_time),
            picked_up_at: value.picked_up_at.map(DateTime::to_system_time),
            completed_at: value.completed_at.map(DateTime::to_system_time),
            cancelled_at: value.cancelled_at.map(DateTime::to_system_time),
            rated_at: value.rated_at.map(DateTime::to_system_time),
        })
    }
}

/// Aggregation pipeline applying a [`RidePatch`] in a single server-side write.
///
/// Optional fields go through `$ifNull` so a value already stored is kept,
/// and every value is wrapped in `$literal` so user text starting with `$`
/// is never read as a field path.
pub fn ride_update_pipeline(patch: &RidePatch) -> Vec<Document> {
    let mut set = doc! {
        "updated_at": DateTime::from_system_time(patch.updated_at),
        "revision": { "$add": ["$revision", 1_i64] },
    };
    if let Some(status) = patch.status {
        set.insert("status", doc! { "$literal": status.as_str() });
    }

    let fills: [(&str, Option<Bson>); 11] = [
        ("rider_id", patch.rider_id.clone().map(Bson::from)),
        ("rider_info", patch.rider_info.as_ref().map(rider_info_bson)),
        (
            "cancelled_by",
            patch.cancelled_by.map(|role| Bson::from(role.as_str())),
        ),
        (
            "cancellation_reason",
            patch.cancellation_reason.clone().map(Bson::from),
        ),
        (
            "passenger_rating",
            patch.passenger_rating.map(|stars| Bson::Int32(i32::from(stars))),
        ),
        (
            "passenger_feedback",
            patch.passenger_feedback.clone().map(Bson::from),
        ),
        ("accepted_at", patch.accepted_at.map(timestamp)),
        ("picked_up_at", patch.picked_up_at.map(timestamp)),
        ("completed_at", patch.completed_at.map(timestamp)),
        ("cancelled_at", patch.cancelled_at.map(timestamp)),
        ("rated_at", patch.rated_at.map(timestamp)),
    ];
    for (field, value) in fills {
        if let Some(value) = value {
            set.insert(
                field,
                doc! { "$ifNull": [format!("${field}"), { "$literal": value }] },
            );
        }
    }

    vec![doc! { "$set": set }]
}

fn timestamp(at: std::time::SystemTime) -> Bson {
    Bson::DateTime(DateTime::from_system_time(at))
}

fn rider_info_bson(info: &RiderInfoEntity) -> Bson {
    Bson::Document(doc! {
        "name": info.name.clone(),
        "phone": info.phone.clone(),
        "profile_pic": info.profile_pic.clone(),
        "rating": info.rating,
        "total_ratings": i64::from(info.total_ratings),
        "vehicle": {
            "model": info.vehicle.model.clone(),
            "plate_number": info.vehicle.plate_number.clone(),
            "color": info.vehicle.color.clone(),
        },
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoProfileDocument {
    #[serde(rename = "_id")]
    user_id: String,
    role: ActorRole,
    name: String,
    phone: Option<String>,
    profile_pic: Option<String>,
    vehicle: Option<VehicleEntity>,
    rating: f64,
    total_ratings: i64,
    onboarding_status: OnboardingStatus,
    push_token: Option<String>,
    created_at: DateTime,
    updated_at: DateTime,
}

impl From<ProfileEntity> for MongoProfileDocument {
    fn from(value: ProfileEntity) -> Self {
        Self {
            user_id: value.user_id,
            role: value.role,
            name: value.name,
            phone: value.phone,
            profile_pic: value.profile_pic,
            vehicle: value.vehicle,
            rating: value.rating,
            total_ratings: i64::from(value.total_ratings),
            onboarding_status: value.onboarding_status,
            push_token: value.push_token,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoProfileDocument> for ProfileEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoProfileDocument) -> Result<Self, Self::Error> {
        let total_ratings = u32::try_from(value.total_ratings)
            .map_err(|_| corrupt(&value.user_id, "total_ratings out of range"))?;
        Ok(Self {
            user_id: value.user_id,
            role: value.role,
            name: value.name,
            phone: value.phone,
            profile_pic: value.profile_pic,
            vehicle: value.vehicle,
            rating: value.rating,
            total_ratings,
            onboarding_status: value.onboarding_status,
            push_token: value.push_token,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoNotificationDocument {
    #[serde(rename = "_id")]
    id: String,
    recipient_id: String,
    kind: NotificationKind,
    title: String,
    body: String,
    ride_id: Option<String>,
    read: bool,
    created_at: DateTime,
}

impl From<NotificationEntity> for MongoNotificationDocument {
    fn from(value: NotificationEntity) -> Self {
        Self {
            id: value.id.to_string(),
            recipient_id: value.recipient_id,
            kind: value.kind,
            title: value.title,
            body: value.body,
            ride_id: value.ride_id.map(|id| id.to_string()),
            read: value.read,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoNotificationDocument> for NotificationEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoNotificationDocument) -> Result<Self, Self::Error> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            recipient_id: value.recipient_id,
            kind: value.kind,
            title: value.title,
            body: value.body,
            ride_id: value.ride_id.as_deref().map(parse_uuid).transpose()?,
            read: value.read,
            created_at: value.created_at.to_system_time(),
        })
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

fn parse_uuid(raw: &str) -> Result<Uuid, MongoDaoError> {
    Uuid::parse_str(raw).map_err(|_| corrupt(raw, "invalid UUID"))
}

fn corrupt(id: &str, message: &str) -> MongoDaoError {
    MongoDaoError::CorruptDocument {
        id: id.to_owned(),
        message: message.to_owned(),
    }
}
