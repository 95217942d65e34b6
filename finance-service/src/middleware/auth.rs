//! Request authentication for the finance API.
//!
//! Every `/api` handler takes a [`CurrentUser`], resolved from the
//! `Authorization: Bearer <token>` header against the users read model.
//! Staff-only rules (manual adjustments at closing time) check the
//! `is_staff` flag carried here. [`RequestMeta`] captures the caller's
//! address and user agent for the audit trail; it never rejects.

use crate::startup::AppState;
use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use service_core::error::AppError;
use uuid::Uuid;

/// The authenticated user behind the current request.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub full_name: String,
    pub is_staff: bool,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get("Authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Missing Authorization header")))?;

        let token = header
            .strip_prefix("Bearer ")
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppError::AuthError(anyhow::anyhow!("Authorization header is not a Bearer token"))
            })?;

        let user = state
            .db
            .find_user_by_token(token)
            .await?
            .ok_or_else(|| AppError::AuthError(anyhow::anyhow!("Invalid or expired token")))?;

        let (id, full_name, is_staff) = user;

        let span = tracing::Span::current();
        span.record("user_id", id.to_string().as_str());

        Ok(CurrentUser {
            id,
            full_name,
            is_staff,
        })
    }
}

/// Client address and user agent, recorded alongside audited actions.
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestMeta
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let ip_address = parts
            .headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(|v| v.trim().to_string())
            .or_else(|| {
                parts
                    .headers
                    .get("x-real-ip")
                    .and_then(|v| v.to_str().ok())
                    .map(|v| v.trim().to_string())
            });

        let user_agent = parts
            .headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(RequestMeta {
            ip_address,
            user_agent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn request_meta_prefers_forwarded_for() {
        let mut parts = parts_with(&[
            ("x-forwarded-for", "203.0.113.9, 10.0.0.1"),
            ("x-real-ip", "10.0.0.1"),
            ("user-agent", "integration-test"),
        ]);
        let meta = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(meta.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(meta.user_agent.as_deref(), Some("integration-test"));
    }

    #[tokio::test]
    async fn request_meta_is_empty_without_headers() {
        let mut parts = parts_with(&[]);
        let meta = RequestMeta::from_request_parts(&mut parts, &()).await.unwrap();
        assert!(meta.ip_address.is_none());
        assert!(meta.user_agent.is_none());
    }
}
