use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::{
        models::{OnboardingStatus, RideEntity, RidePatch, RiderInfoEntity},
        ride_store::{RideStore, UpdateOutcome},
    },
    dto::ride::{CreateRideRequest, RatingResponse, RideView, SubmitRatingRequest},
    error::ServiceError,
    services::notification_service::{self, rating_notice, transition_notice},
    state::{
        SharedState,
        lifecycle::{PlanError, RideEvent, RideStatus, TransitionPlan, next_status},
        rating::running_mean,
        session::{ActorRole, Session},
    },
};

const MAX_REASON_CHARS: usize = 500;

/// Result of a claim attempt. Losing the race is an expected outcome, not an error.
#[derive(Debug)]
pub enum ClaimOutcome {
    /// The session rider is now bound to the ride.
    Claimed(RideView),
    /// Another writer moved the ride out of `pending` first; nothing was written.
    AlreadyTaken {
        /// Status the ride had at write time.
        status: RideStatus,
    },
}

/// Create a pending ride for the session passenger.
pub async fn create_ride(
    state: &SharedState,
    session: &Session,
    request: CreateRideRequest,
) -> Result<RideView, ServiceError> {
    next_status(None, RideEvent::Request, session.role)?;
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let CreateRideRequest {
        pickup,
        dropoff,
        fare,
        estimated_duration,
    } = request;
    let ride = RideEntity::new_request(
        session.user_id.clone(),
        pickup.into(),
        dropoff.into(),
        fare,
        estimated_duration,
    );

    let store = state.require_ride_store().await?;
    state
        .run_store_call("insert_ride", store.insert_ride(ride.clone()))
        .await?;
    info!(ride_id = %ride.id, passenger = %ride.passenger_id, "ride requested");

    state.feed().publish(&ride, None);
    Ok(ride.into())
}

/// Bind the session rider to a pending ride, first writer wins.
///
/// The write is conditional on the stored status still being `pending`, so
/// of any number of concurrent claims exactly one is applied.
pub async fn claim_ride(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
) -> Result<ClaimOutcome, ServiceError> {
    if !RideEvent::Claim.allows(session.role) {
        return Err(PlanError::ActorNotAllowed {
            event: RideEvent::Claim,
            actor: session.role,
        }
        .into());
    }

    let store = state.require_ride_store().await?;
    let ride = load_ride(state, &store, ride_id).await?;
    if ride.status != RideStatus::Pending {
        debug!(%ride_id, status = %ride.status, "claim on a ride that is no longer pending");
        return Ok(ClaimOutcome::AlreadyTaken {
            status: ride.status,
        });
    }

    let profile = state
        .run_store_call("find_profile", store.find_profile(session.user_id.clone()))
        .await?
        .filter(|profile| profile.role == ActorRole::Rider)
        .ok_or_else(|| ServiceError::Forbidden("rider profile not found".into()))?;
    if profile.onboarding_status != OnboardingStatus::Approved {
        return Err(ServiceError::Forbidden(
            "rider onboarding is not approved".into(),
        ));
    }

    let plan = TransitionPlan::new(&ride, RideEvent::Claim, session.role)?;
    let mut patch = plan.patch();
    patch.rider_id = Some(session.user_id.clone());
    patch.rider_info = Some(RiderInfoEntity::from(&profile));

    match state
        .run_store_call(
            "claim_ride",
            store.update_ride(ride_id, patch, Some(plan.from)),
        )
        .await?
    {
        UpdateOutcome::Applied(ride) => {
            info!(%ride_id, rider = %session.user_id, "ride claimed");
            announce(state, &ride, plan.from, plan.actor).await;
            Ok(ClaimOutcome::Claimed(ride.into()))
        }
        UpdateOutcome::StatusMismatch { actual } => {
            info!(%ride_id, rider = %session.user_id, status = %actual, "claim lost the race");
            Ok(ClaimOutcome::AlreadyTaken { status: actual })
        }
        UpdateOutcome::NotFound => Err(ride_not_found(ride_id)),
    }
}

/// Move a ride to `target` on behalf of the session user.
///
/// `accepted` goes through [`claim_ride`] and `cancelled` through
/// [`cancel_ride`]; `rated` is only reachable with [`submit_rating`].
pub async fn advance_status(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
    target: RideStatus,
) -> Result<RideView, ServiceError> {
    match target {
        RideStatus::Accepted => match claim_ride(state, session, ride_id).await? {
            ClaimOutcome::Claimed(view) => Ok(view),
            ClaimOutcome::AlreadyTaken { status } => Err(ServiceError::InvalidTransition(
                format!("ride is no longer pending (now {status})"),
            )),
        },
        RideStatus::Cancelled => cancel_ride(state, session, ride_id, None).await,
        RideStatus::Rated => Err(ServiceError::InvalidInput(
            "rides are rated by submitting a rating".into(),
        )),
        RideStatus::Pending => Err(ServiceError::InvalidTransition(
            "no transition leads back to pending".into(),
        )),
        RideStatus::PickedUp | RideStatus::Completed => {
            let Some(event) = RideEvent::for_target(target) else {
                return Err(ServiceError::InvalidTransition(format!(
                    "no transition leads to {target}"
                )));
            };
            let store = state.require_ride_store().await?;
            let ride = load_ride(state, &store, ride_id).await?;
            let plan = TransitionPlan::new(&ride, event, session.role)?;
            authorize(&ride, session)?;
            let ride = commit(state, &store, &plan, plan.patch()).await?;
            Ok(ride.into())
        }
    }
}

/// Cancel a ride from `pending`, `accepted` or `picked_up`.
pub async fn cancel_ride(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
    reason: Option<String>,
) -> Result<RideView, ServiceError> {
    let reason = reason
        .map(|reason| reason.trim().to_owned())
        .filter(|reason| !reason.is_empty());
    if reason
        .as_ref()
        .is_some_and(|reason| reason.chars().count() > MAX_REASON_CHARS)
    {
        return Err(ServiceError::InvalidInput(format!(
            "cancellation reason must be at most {MAX_REASON_CHARS} characters"
        )));
    }

    let store = state.require_ride_store().await?;
    let ride = load_ride(state, &store, ride_id).await?;
    let plan = TransitionPlan::new(&ride, RideEvent::Cancel, session.role)?;
    authorize(&ride, session)?;
    let mut patch = plan.patch();
    patch.cancellation_reason = reason;

    let ride = commit(state, &store, &plan, patch).await?;
    Ok(ride.into())
}

/// Record the passenger's rating, mark the ride `rated` and fold the stars into the rider's aggregate.
///
/// The aggregate update runs after the ride write; if it cannot be applied
/// the rating on the ride still stands and the response carries no aggregate.
pub async fn submit_rating(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
    request: SubmitRatingRequest,
) -> Result<RatingResponse, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    let store = state.require_ride_store().await?;
    let ride = load_ride(state, &store, ride_id).await?;
    let plan = TransitionPlan::new(&ride, RideEvent::Rate, session.role)?;
    authorize(&ride, session)?;
    let mut patch = plan.patch();
    patch.passenger_rating = Some(request.stars);
    patch.passenger_feedback = request
        .feedback
        .map(|feedback| feedback.trim().to_owned())
        .filter(|feedback| !feedback.is_empty());

    let ride = commit(state, &store, &plan, patch).await?;

    let aggregate = match ride.rider_id.clone() {
        Some(rider_id) => fold_rating(state, &store, rider_id, request.stars).await,
        None => None,
    };

    let passenger_name = match state
        .run_store_call("find_profile", store.find_profile(ride.passenger_id.clone()))
        .await
    {
        Ok(Some(profile)) => profile.name,
        _ => "A passenger".to_owned(),
    };
    if let Some(notice) = rating_notice(&ride, &passenger_name, request.stars) {
        notification_service::notify(state, notice).await;
    }

    Ok(RatingResponse {
        ride: ride.into(),
        rider_rating: aggregate.map(|(rating, _)| rating),
        rider_total_ratings: aggregate.map(|(_, total)| total),
    })
}

/// Fetch a ride the session user may see: one they are part of, or any pending ride for a rider.
pub async fn get_ride(
    state: &SharedState,
    session: &Session,
    ride_id: Uuid,
) -> Result<RideView, ServiceError> {
    let store = state.require_ride_store().await?;
    let ride = load_ride(state, &store, ride_id).await?;
    let claimable = session.role == ActorRole::Rider && ride.status == RideStatus::Pending;
    if !ride.involves(&session.user_id) && !claimable {
        return Err(ServiceError::Forbidden("not a party to this ride".into()));
    }
    Ok(ride.into())
}

/// Rides of the session user in their current role, newest first.
pub async fn ride_history(
    state: &SharedState,
    session: &Session,
) -> Result<Vec<RideView>, ServiceError> {
    let store = state.require_ride_store().await?;
    let rides = state
        .run_store_call(
            "list_rides_for_user",
            store.list_rides_for_user(session.user_id.clone(), session.role),
        )
        .await?;
    Ok(rides.into_iter().map(Into::into).collect())
}

pub(crate) async fn load_ride(
    state: &SharedState,
    store: &Arc<dyn RideStore>,
    ride_id: Uuid,
) -> Result<RideEntity, ServiceError> {
    state
        .run_store_call("find_ride", store.find_ride(ride_id))
        .await?
        .ok_or_else(|| ride_not_found(ride_id))
}

fn ride_not_found(ride_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("ride `{ride_id}` not found"))
}

/// Only the ride's own passenger, or its bound rider, may act on it.
fn authorize(ride: &RideEntity, session: &Session) -> Result<(), ServiceError> {
    let owner = match session.role {
        ActorRole::Passenger => ride.passenger_id == session.user_id,
        ActorRole::Rider => ride.rider_id.as_deref() == Some(session.user_id.as_str()),
    };
    if owner {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "{} `{}` is not bound to ride `{}`",
            session.role, session.user_id, ride.id
        )))
    }
}

/// Write `patch` conditioned on the status the plan was made against, then fan out.
async fn commit(
    state: &SharedState,
    store: &Arc<dyn RideStore>,
    plan: &TransitionPlan,
    patch: RidePatch,
) -> Result<RideEntity, ServiceError> {
    match state
        .run_store_call(
            "update_ride",
            store.update_ride(plan.ride_id, patch, Some(plan.from)),
        )
        .await?
    {
        UpdateOutcome::Applied(ride) => {
            info!(
                ride_id = %ride.id,
                actor = %plan.actor,
                from = %plan.from,
                to = %ride.status,
                "ride transitioned"
            );
            announce(state, &ride, plan.from, plan.actor).await;
            Ok(ride)
        }
        UpdateOutcome::StatusMismatch { actual } => {
            info!(ride_id = %plan.ride_id, expected = %plan.from, %actual, "transition raced another write");
            Err(ServiceError::InvalidTransition(format!(
                "ride moved to {actual} before {:?} could be applied",
                plan.event
            )))
        }
        UpdateOutcome::NotFound => Err(ride_not_found(plan.ride_id)),
    }
}

async fn announce(state: &SharedState, ride: &RideEntity, previous: RideStatus, actor: ActorRole) {
    state.feed().publish(ride, Some(previous));
    if let Some(notice) = transition_notice(ride, actor) {
        notification_service::notify(state, notice).await;
    }
}

/// Compare-and-swap the rider aggregate, retrying while other ratings land in between.
async fn fold_rating(
    state: &SharedState,
    store: &Arc<dyn RideStore>,
    rider_id: String,
    stars: u8,
) -> Option<(f64, u32)> {
    for attempt in 1..=state.config().rating_retry_budget {
        let profile = match state
            .run_store_call("find_profile", store.find_profile(rider_id.clone()))
            .await
        {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                warn!(rider = %rider_id, "rated rider has no profile; aggregate not updated");
                return None;
            }
            Err(err) => {
                warn!(rider = %rider_id, error = %err, "failed to load rider profile for rating");
                return None;
            }
        };

        let (rating, total) = running_mean(profile.rating, profile.total_ratings, stars);
        match state
            .run_store_call(
                "update_rider_rating",
                store.update_rider_rating(rider_id.clone(), profile.total_ratings, rating, total),
            )
            .await
        {
            Ok(true) => return Some((rating, total)),
            Ok(false) => debug!(rider = %rider_id, attempt, "rating aggregate changed underneath; retrying"),
            Err(err) => {
                warn!(rider = %rider_id, error = %err, "failed to update rider rating");
                return None;
            }
        }
    }

    warn!(rider = %rider_id, "rating retry budget exhausted; aggregate not updated");
    None
}
