/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Per-user inbox and the notification dispatcher.
pub mod notification_service;
/// Rider and passenger profiles.
pub mod profile_service;
/// Device push relay clients.
pub mod push_relay;
/// Ride lifecycle operations: request, claim, advance, cancel, rate.
pub mod ride_service;
/// Server-Sent Events forwarding.
pub mod sse_service;
/// Storage connection supervisor toggling degraded mode.
pub mod storage_supervisor;
/// Live ride, pending-rides and inbox subscriptions.
pub mod subscription_service;
