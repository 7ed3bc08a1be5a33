use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        path::{Parameter, ParameterBuilder, ParameterIn},
    },
};

use crate::routes::session::{USER_ID_HEADER, USER_ROLE_HEADER};

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the ride relay backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::rides::create_ride,
        crate::routes::rides::ride_history,
        crate::routes::rides::get_ride,
        crate::routes::rides::claim_ride,
        crate::routes::rides::advance_status,
        crate::routes::rides::cancel_ride,
        crate::routes::rides::submit_rating,
        crate::routes::sse::ride_stream,
        crate::routes::sse::pending_stream,
        crate::routes::sse::inbox_stream,
        crate::routes::notifications::list_notifications,
        crate::routes::notifications::mark_read,
        crate::routes::notifications::clear_notifications,
        crate::routes::profiles::get_profile,
        crate::routes::profiles::upsert_profile,
        crate::routes::profiles::set_push_token,
        crate::routes::profiles::advance_onboarding,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::ride::RideView,
            crate::dto::ride::ClaimRejection,
            crate::dto::sse::Handshake,
            crate::dto::sse::RideReactionEvent,
            crate::dto::sse::PendingRidesEvent,
            crate::dto::sse::SystemStatus,
            crate::state::reactions::Reaction,
            crate::state::reactions::Screen,
        )
    ),
    modifiers(&SessionHeaders),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "rides", description = "Ride lifecycle operations"),
        (name = "sse", description = "Server-sent events streams"),
        (name = "notifications", description = "Per-user inbox"),
        (name = "profiles", description = "Caller profile and rider onboarding"),
    )
)]
pub struct ApiDoc;

/// Documents the identity headers on every operation except the health check.
struct SessionHeaders;

impl Modify for SessionHeaders {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        for (path, item) in openapi.paths.paths.iter_mut() {
            if path == "/healthcheck" {
                continue;
            }
            let operations = [
                item.get.as_mut(),
                item.put.as_mut(),
                item.post.as_mut(),
                item.delete.as_mut(),
            ];
            for operation in operations.into_iter().flatten() {
                operation
                    .parameters
                    .get_or_insert_with(Vec::new)
                    .extend([
                        header(USER_ID_HEADER, "Caller id issued by the identity provider"),
                        header(USER_ROLE_HEADER, "`passenger` or `rider`"),
                    ]);
            }
        }
    }
}

fn header(name: &str, description: &str) -> Parameter {
    ParameterBuilder::new()
        .name(name)
        .parameter_in(ParameterIn::Header)
        .required(openapi::Required::True)
        .description(Some(description))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_operations_are_documented_with_session_headers() {
        let doc = ApiDoc::openapi();
        let claim = doc
            .paths
            .paths
            .get("/rides/{id}/claim")
            .and_then(|item| item.post.as_ref())
            .unwrap();
        let names: Vec<_> = claim
            .parameters
            .iter()
            .flatten()
            .map(|parameter| parameter.name.as_str())
            .collect();
        assert!(names.contains(&USER_ID_HEADER));
        assert!(names.contains(&USER_ROLE_HEADER));
        assert!(doc.paths.paths.contains_key("/sse/rides/pending"));
    }
}
