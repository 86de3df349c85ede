// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Axum middleware for pre-flight budget checks.
//!
//! The middleware resolves user/feature attribution from request headers,
//! queries the guard over a configured rolling window, and rejects the
//! request before it reaches a metered client once a spend ceiling is
//! reached. It implements no policy of its own — the guard's `query` is
//! the only decision input. On pass-through the guard is inserted into
//! request extensions so handlers can record usage post-flight.

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::warn;

use tollgate_core::UsageFilter;
use tollgate_guard::CostGuard;

/// Attribution resolver over request headers.
pub type HeaderResolver = Arc<dyn Fn(&HeaderMap) -> Option<String> + Send + Sync>;

/// Spend ceiling checked before the request is allowed through.
#[derive(Debug, Clone, Copy)]
pub struct Precheck {
    /// Reject once window spend reaches this amount.
    pub max_spend_usd: f64,
    /// Rolling window the spend is summed over.
    pub window_ms: i64,
}

/// Shared state for [`budget_gate_middleware`].
#[derive(Clone)]
pub struct BudgetGateState {
    guard: Arc<CostGuard>,
    precheck: Option<Precheck>,
    over_budget_status: StatusCode,
    over_budget_message: String,
    user_resolver: HeaderResolver,
    feature_resolver: HeaderResolver,
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

impl BudgetGateState {
    /// State with no precheck: attribution is resolved and the guard is
    /// exposed to handlers, but nothing is rejected.
    pub fn new(guard: Arc<CostGuard>) -> Self {
        Self {
            guard,
            precheck: None,
            over_budget_status: StatusCode::TOO_MANY_REQUESTS,
            over_budget_message: "Budget exceeded".to_string(),
            user_resolver: Arc::new(|headers| header_value(headers, "x-user-id")),
            feature_resolver: Arc::new(|headers| header_value(headers, "x-feature")),
        }
    }

    /// Enable the pre-flight spend ceiling.
    #[must_use]
    pub fn with_precheck(mut self, precheck: Precheck) -> Self {
        self.precheck = Some(precheck);
        self
    }

    /// Override the rejection status code.
    #[must_use]
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.over_budget_status = status;
        self
    }

    /// Override the rejection message.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.over_budget_message = message.into();
        self
    }

    /// Override how the user id is resolved from headers.
    #[must_use]
    pub fn with_user_resolver(
        mut self,
        resolver: impl Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.user_resolver = Arc::new(resolver);
        self
    }

    /// Override how the feature is resolved from headers.
    #[must_use]
    pub fn with_feature_resolver(
        mut self,
        resolver: impl Fn(&HeaderMap) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.feature_resolver = Arc::new(resolver);
        self
    }
}

impl std::fmt::Debug for BudgetGateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetGateState")
            .field("precheck", &self.precheck)
            .field("over_budget_status", &self.over_budget_status)
            .field("over_budget_message", &self.over_budget_message)
            .finish_non_exhaustive()
    }
}

/// Whether the resolved attribution's window spend has reached the ceiling.
async fn is_over_budget(
    state: &BudgetGateState,
    headers: &HeaderMap,
) -> Result<bool, tollgate_core::TollgateError> {
    let Some(precheck) = state.precheck else {
        return Ok(false);
    };

    let usage = state
        .guard
        .query(&UsageFilter {
            user_id: (state.user_resolver)(headers),
            feature: (state.feature_resolver)(headers),
            window_ms: Some(precheck.window_ms),
            ..Default::default()
        })
        .await?;

    Ok(usage.total_spend_usd >= precheck.max_spend_usd)
}

/// Budget gate middleware for `axum::middleware::from_fn_with_state`.
///
/// Rejects with the configured status and a JSON error body when the
/// window spend has reached the ceiling; otherwise passes the request
/// through with the guard available as an `Extension<Arc<CostGuard>>`.
pub async fn budget_gate_middleware(
    State(state): State<BudgetGateState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    match is_over_budget(&state, request.headers()).await {
        Ok(true) => {
            warn!(status = %state.over_budget_status, "request rejected by budget gate");
            return Err((
                state.over_budget_status,
                Json(json!({ "error": state.over_budget_message })),
            )
                .into_response());
        }
        Ok(false) => {}
        Err(err) => {
            // A ledger failure is not a budget decision; surface it.
            return Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": err.to_string() })),
            )
                .into_response());
        }
    }

    request.extensions_mut().insert(Arc::clone(&state.guard));
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, body::Body, middleware::from_fn_with_state, routing::get};
    use tollgate_core::{BudgetRule, TrackRequest};
    use tollgate_guard::GuardConfig;
    use tower::ServiceExt;

    fn guard() -> Arc<CostGuard> {
        Arc::new(CostGuard::new(GuardConfig::new(vec![BudgetRule::new(
            100.0, 60_000,
        )])))
    }

    fn app(state: BudgetGateState) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .layer(from_fn_with_state(state, budget_gate_middleware))
    }

    #[test]
    fn default_resolvers_read_attribution_headers() {
        let state = BudgetGateState::new(guard());
        let mut headers = HeaderMap::new();
        headers.insert("x-user-id", "u1".parse().unwrap());
        headers.insert("x-feature", "chat".parse().unwrap());

        assert_eq!((state.user_resolver)(&headers).as_deref(), Some("u1"));
        assert_eq!((state.feature_resolver)(&headers).as_deref(), Some("chat"));
        assert!((state.user_resolver)(&HeaderMap::new()).is_none());
    }

    #[tokio::test]
    async fn no_precheck_never_rejects() {
        let state = BudgetGateState::new(guard());
        assert!(!is_over_budget(&state, &HeaderMap::new()).await.unwrap());
    }

    #[tokio::test]
    async fn request_passes_while_under_the_ceiling() {
        let state = BudgetGateState::new(guard()).with_precheck(Precheck {
            max_spend_usd: 1.0,
            window_ms: 60_000,
        });

        let response = app(state)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn request_is_rejected_once_spend_reaches_the_ceiling() {
        let guard = guard();
        guard
            .record(TrackRequest::new("gpt-4o", 1_000_000, 0).with_user("u1"))
            .await
            .unwrap();

        let state = BudgetGateState::new(Arc::clone(&guard)).with_precheck(Precheck {
            max_spend_usd: 1.0,
            window_ms: 60_000,
        });

        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-user-id", "u1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn rejection_only_applies_to_the_resolved_attribution() {
        let guard = guard();
        guard
            .record(TrackRequest::new("gpt-4o", 1_000_000, 0).with_user("u1"))
            .await
            .unwrap();

        let state = BudgetGateState::new(guard).with_precheck(Precheck {
            max_spend_usd: 1.0,
            window_ms: 60_000,
        });

        // A different user has spent nothing in the window.
        let response = app(state)
            .oneshot(
                Request::builder()
                    .uri("/")
                    .header("x-user-id", "u2")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
