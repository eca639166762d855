//! Axum middleware layers and per-request extractors.
//!
//! The router applies request tracing, timeout enforcement, and response
//! compression. [`KeyServiceCtx`] bounds each handler's key-service calls.

use std::convert::Infallible;
use std::time::Duration;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use fieldcrypt::CallContext;

use super::state::AppState;

/// Default per-request timeout applied to all routes.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`CallContext`] expiring after the configured key-service timeout and
/// cancelled when the server shuts down.
///
/// Dropping the handler future (client disconnect, [`REQUEST_TIMEOUT`])
/// aborts any in-flight key-service call with it.
pub struct KeyServiceCtx(pub CallContext);

#[async_trait]
impl FromRequestParts<AppState> for KeyServiceCtx {
    type Rejection = Infallible;

    async fn from_request_parts(_parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let ctx = CallContext::from_token(state.shutdown.child_token())
            .timeout(state.key_service_timeout);
        Ok(Self(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::state::tests::test_state;
    use axum::http::Request;

    async fn extract(state: &AppState) -> CallContext {
        let (mut parts, _) = Request::new(()).into_parts();
        let KeyServiceCtx(ctx) = KeyServiceCtx::from_request_parts(&mut parts, state)
            .await
            .unwrap();
        ctx
    }

    #[tokio::test]
    async fn context_carries_key_service_deadline() {
        let state = test_state();
        let ctx = extract(&state).await;
        assert!(!ctx.is_cancelled());
        assert!(ctx.deadline().is_some());
    }

    #[tokio::test]
    async fn shutdown_cancels_request_contexts() {
        let state = test_state();
        let ctx = extract(&state).await;
        state.shutdown.cancel();
        assert!(ctx.is_cancelled());
    }
}
