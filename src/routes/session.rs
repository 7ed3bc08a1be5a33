use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    error::AppError,
    state::session::{ActorRole, Session},
};

/// Header carrying the caller id, set by the upstream identity provider.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the app the caller uses, `passenger` or `rider`.
pub const USER_ROLE_HEADER: &str = "x-user-role";

impl<S> FromRequestParts<S> for Session
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user_id = header(parts, USER_ID_HEADER)?;
        let role = header(parts, USER_ROLE_HEADER)?
            .parse::<ActorRole>()
            .map_err(AppError::Unauthorized)?;
        Ok(Session::new(user_id, role))
    }
}

fn header<'a>(parts: &'a Parts, name: &'static str) -> Result<&'a str, AppError> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::Unauthorized(format!("missing `{name}` header")))
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    async fn extract(request: Request<()>) -> Result<Session, AppError> {
        let (mut parts, ()) = request.into_parts();
        Session::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn headers_build_a_session() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "r1")
            .header(USER_ROLE_HEADER, "Rider")
            .body(())
            .unwrap();
        assert_eq!(extract(request).await.unwrap(), Session::rider("r1"));
    }

    #[tokio::test]
    async fn missing_or_unknown_role_is_unauthorized() {
        let request = Request::builder()
            .header(USER_ID_HEADER, "p1")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));

        let request = Request::builder()
            .header(USER_ID_HEADER, "p1")
            .header(USER_ROLE_HEADER, "driver")
            .body(())
            .unwrap();
        assert!(matches!(extract(request).await, Err(AppError::Unauthorized(_))));
    }
}
