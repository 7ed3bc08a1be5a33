use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{mpsc, watch};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};

use crate::{
    dto::{
        notification::NotificationView,
        ride::RideView,
        sse::{Handshake, PendingRidesEvent, RideReactionEvent, ServerEvent, SystemStatus},
    },
    error::ServiceError,
    services::subscription_service::{
        InboxSubscription, PendingRidesSubscription, RideDelivery, RideSubscription,
    },
    state::{
        SharedState,
        reactions::{StatusEdgeTracker, claim_lost, reactions_for},
        session::Session,
    },
};

type EventSender = mpsc::Sender<Result<Event, Infallible>>;

/// Stream a ride: `ride.snapshot` for every delivery, `ride.reaction` on each status edge.
///
/// The stream ends after the first terminal status has been delivered, or once
/// another rider claims the pending ride a rider was watching.
pub fn ride_stream(
    state: SharedState,
    session: Session,
    mut subscription: RideSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let ride_id = subscription.ride_id();
        let mut degraded = state.degraded_watcher();
        let mut tracker = StatusEdgeTracker::new();
        let exit_delay = state.config().terminal_exit_delay;

        if send_handshake(&tx, "ride", &state).await {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    status = degraded_change(&mut degraded) => {
                        if !send(&tx, "system_status", &status).await {
                            break;
                        }
                    }
                    next = subscription.next() => match next {
                        Ok(Some(RideDelivery::Taken { status })) => {
                            let event = RideReactionEvent {
                                ride_id,
                                previous: tracker.last(),
                                status,
                                reactions: claim_lost(),
                            };
                            send(&tx, "ride.reaction", &event).await;
                            break;
                        }
                        Ok(Some(RideDelivery::Snapshot(ride))) => {
                            let status = ride.status;
                            if !send(&tx, "ride.snapshot", &RideView::from(ride)).await {
                                break;
                            }
                            if let Some((previous, status)) = tracker.observe(status) {
                                let event = RideReactionEvent {
                                    ride_id,
                                    previous,
                                    status,
                                    reactions: reactions_for(session.role, previous, status, exit_delay),
                                };
                                if !send(&tx, "ride.reaction", &event).await {
                                    break;
                                }
                            }
                            if status.is_terminal() {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            send_error(&tx, &err).await;
                            break;
                        }
                    }
                }
            }
        }

        drop(subscription);
        info!(%ride_id, user = %session.user_id, "ride SSE stream closed");
    });

    into_sse(rx)
}

/// Stream the claimable set as `pending_rides` events.
pub fn pending_stream(
    state: SharedState,
    session: Session,
    mut subscription: PendingRidesSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let mut degraded = state.degraded_watcher();

        if send_handshake(&tx, "pending", &state).await {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    status = degraded_change(&mut degraded) => {
                        if !send(&tx, "system_status", &status).await {
                            break;
                        }
                    }
                    next = subscription.next() => match next {
                        Ok(Some(rides)) => {
                            let event = PendingRidesEvent {
                                rides: rides.into_iter().map(Into::into).collect(),
                            };
                            if !send(&tx, "pending_rides", &event).await {
                                break;
                            }
                        }
                        Ok(None) => break,
                        Err(err) => {
                            send_error(&tx, &err).await;
                            break;
                        }
                    }
                }
            }
        }

        info!(rider = %session.user_id, "rider went offline");
    });

    into_sse(rx)
}

/// Stream new inbox entries as `notification` events.
pub fn inbox_stream(
    state: SharedState,
    session: Session,
    mut subscription: InboxSubscription,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        if send_handshake(&tx, "inbox", &state).await {
            loop {
                tokio::select! {
                    _ = tx.closed() => break,
                    next = subscription.next() => match next {
                        Some(entry) => {
                            if !send(&tx, "notification", &NotificationView::from(entry)).await {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }

        drop(subscription);
        info!(user = %session.user_id, "inbox SSE stream closed");
    });

    into_sse(rx)
}

/// Wait for the next degraded flag change; pends forever once the sender is gone.
async fn degraded_change(receiver: &mut watch::Receiver<bool>) -> SystemStatus {
    match receiver.changed().await {
        Ok(()) => SystemStatus {
            degraded: *receiver.borrow_and_update(),
        },
        Err(_) => std::future::pending().await,
    }
}

async fn send_handshake(tx: &EventSender, stream: &str, state: &SharedState) -> bool {
    let handshake = Handshake {
        stream: stream.to_owned(),
        message: format!("{stream} stream connected"),
        degraded: state.is_degraded(),
    };
    send(tx, "handshake", &handshake).await
}

async fn send_error(tx: &EventSender, err: &ServiceError) {
    #[derive(serde::Serialize)]
    struct StreamError {
        message: String,
        retryable: bool,
    }

    warn!(error = %err, "SSE stream aborted");
    let payload = StreamError {
        message: err.to_string(),
        retryable: err.is_retryable(),
    };
    send(tx, "error", &payload).await;
}

/// Serialise and forward one event; returns `false` once the client is gone.
async fn send<T: serde::Serialize>(tx: &EventSender, name: &str, payload: &T) -> bool {
    let message = match ServerEvent::json(Some(name.to_owned()), payload) {
        Ok(message) => message,
        Err(err) => {
            warn!(event = name, error = %err, "failed to serialise SSE payload");
            return true;
        }
    };

    let mut event = Event::default().data(message.data);
    if let Some(name) = message.event {
        event = event.event(name);
    }
    tx.send(Ok(event)).await.is_ok()
}

fn into_sse(
    rx: mpsc::Receiver<Result<Event, Infallible>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
