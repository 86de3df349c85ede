// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call instrumentation: typed decorators over remote-call-shaped client
//! surfaces.
//!
//! A surface implements [`RemoteCall`]; [`CostGuard::instrument`] wraps it
//! in a [`Metered`] decorator that records token usage after every call.
//! Nested clients are built by composing instrumented surfaces at
//! construction time. Token counts are pulled out of provider responses by
//! an ordered list of named field strategies; new provider shapes are
//! supported by appending a strategy, not by editing existing ones.

use std::any::Any;
use std::fmt;
use std::sync::{Arc, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use tollgate_core::{TollgateError, TrackRequest};

use crate::guard::CostGuard;

/// One remote-call-shaped client surface.
///
/// Requests and responses are provider JSON. Implementations map their
/// transport failures into [`TollgateError::Provider`].
#[async_trait]
pub trait RemoteCall: Send + Sync {
    /// Perform the remote call.
    async fn invoke(&self, request: Value) -> Result<Value, TollgateError>;
}

/// Attribution resolved for a single call.
#[derive(Debug, Clone, Default)]
pub struct CallAttribution {
    pub user_id: Option<String>,
    pub feature: Option<String>,
}

/// Per-call attribution extractor over the request payload.
pub type AttributionFn = Arc<dyn Fn(&Value) -> CallAttribution + Send + Sync>;

/// Static or derived attribution applied to every call through a wrapper.
#[derive(Clone, Default)]
pub struct WrapOptions {
    /// Static user attribution.
    pub user_id: Option<String>,
    /// Static feature attribution.
    pub feature: Option<String>,
    /// Per-call extractor; its non-empty fields override the static ones.
    pub attribution: Option<AttributionFn>,
}

impl WrapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the static user attribution.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the static feature attribution.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Set a per-call attribution extractor.
    #[must_use]
    pub fn with_attribution(
        mut self,
        extractor: impl Fn(&Value) -> CallAttribution + Send + Sync + 'static,
    ) -> Self {
        self.attribution = Some(Arc::new(extractor));
        self
    }
}

impl fmt::Debug for WrapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapOptions")
            .field("user_id", &self.user_id)
            .field("feature", &self.feature)
            .field("attribution", &self.attribution.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// A named (input field, output field) pair tried against the response's
/// usage object.
struct TokenFieldStrategy {
    name: &'static str,
    input: &'static str,
    output: &'static str,
}

/// Extraction strategies in trial order. Append here for new providers.
const TOKEN_STRATEGIES: &[TokenFieldStrategy] = &[
    TokenFieldStrategy {
        name: "openai",
        input: "prompt_tokens",
        output: "completion_tokens",
    },
    TokenFieldStrategy {
        name: "anthropic",
        input: "input_tokens",
        output: "output_tokens",
    },
    TokenFieldStrategy {
        name: "gemini",
        input: "promptTokenCount",
        output: "candidatesTokenCount",
    },
    TokenFieldStrategy {
        name: "bedrock",
        input: "inputTokenCount",
        output: "outputTokenCount",
    },
];

/// Total-only fields, attributed entirely as input when no split exists.
const TOTAL_TOKEN_FIELDS: &[&str] = &["totalTokenCount", "total_tokens"];

/// Token usage pulled out of one provider response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExtractedUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

fn token_count(usage: &serde_json::Map<String, Value>, key: &str) -> Option<u64> {
    usage.get(key).and_then(Value::as_u64)
}

/// Extract `{model, input, output}` from a provider response.
///
/// The model comes from the response's `model` field, else the caller's
/// fallback (derived from the request). The usage object may be `usage`
/// or `usageMetadata`; strategies are tried in order and the first with a
/// nonzero count wins.
pub(crate) fn extract_usage(
    response: &Value,
    fallback_model: Option<&str>,
) -> Option<ExtractedUsage> {
    let obj = response.as_object()?;
    let model = obj.get("model").and_then(Value::as_str).or(fallback_model)?;
    if model.is_empty() {
        return None;
    }
    let usage = obj
        .get("usage")
        .or_else(|| obj.get("usageMetadata"))?
        .as_object()?;

    for strategy in TOKEN_STRATEGIES {
        let input = token_count(usage, strategy.input).unwrap_or(0);
        let output = token_count(usage, strategy.output).unwrap_or(0);
        if input > 0 || output > 0 {
            debug!(strategy = strategy.name, input, output, "token usage extracted");
            return Some(ExtractedUsage {
                model: model.to_string(),
                input_tokens: input,
                output_tokens: output,
            });
        }
    }

    for field in TOTAL_TOKEN_FIELDS {
        if let Some(total) = token_count(usage, field) {
            if total > 0 {
                debug!(field, total, "only a total token count present");
                return Some(ExtractedUsage {
                    model: model.to_string(),
                    input_tokens: total,
                    output_tokens: 0,
                });
            }
        }
    }

    None
}

/// The model named by the request payload, if any.
fn model_from_request(request: &Value) -> Option<String> {
    let obj = request.as_object()?;
    obj.get("model")
        .and_then(Value::as_str)
        .or_else(|| obj.get("modelId").and_then(Value::as_str))
        .map(str::to_string)
}

/// Decorator that meters every call through a [`RemoteCall`] surface.
///
/// The inner response is returned unchanged regardless of metering
/// outcome, unless `record` fails (kill triggered, unknown model under the
/// `Error` policy, storage failure) — then the failure propagates instead
/// of the response.
pub struct Metered<C: RemoteCall> {
    guard: Arc<CostGuard>,
    inner: Arc<C>,
    options: WrapOptions,
}

impl<C: RemoteCall> Metered<C> {
    /// The wrapped client surface.
    pub fn inner(&self) -> &Arc<C> {
        &self.inner
    }
}

#[async_trait]
impl<C: RemoteCall + 'static> RemoteCall for Metered<C> {
    async fn invoke(&self, request: Value) -> Result<Value, TollgateError> {
        let fallback_model = model_from_request(&request);
        let attribution = match &self.options.attribution {
            Some(extractor) => extractor(&request),
            None => CallAttribution::default(),
        };

        let response = self.inner.invoke(request).await?;

        if let Some(usage) = extract_usage(&response, fallback_model.as_deref()) {
            let mut track =
                TrackRequest::new(usage.model, usage.input_tokens, usage.output_tokens);
            track.user_id = attribution.user_id.or_else(|| self.options.user_id.clone());
            track.feature = attribution.feature.or_else(|| self.options.feature.clone());
            self.guard.record(track).await?;
        }

        Ok(response)
    }
}

impl CostGuard {
    /// Wrap a client surface so every call is metered.
    ///
    /// Wrapping is idempotent per client instance: instrumenting the same
    /// `Arc` twice returns the cached wrapper identity. The cache holds
    /// wrappers weakly, keyed by client pointer.
    pub fn instrument<C>(self: &Arc<Self>, client: Arc<C>, options: WrapOptions) -> Arc<Metered<C>>
    where
        C: RemoteCall + 'static,
    {
        let key = Arc::as_ptr(&client) as *const () as usize;
        let mut cache = self
            .wrap_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(cached) = cache.get(&key).and_then(Weak::upgrade) {
            if let Ok(metered) = cached.downcast::<Metered<C>>() {
                return metered;
            }
        }

        let metered = Arc::new(Metered {
            guard: Arc::clone(self),
            inner: client,
            options,
        });
        let erased: Arc<dyn Any + Send + Sync> = metered.clone();
        cache.insert(key, Arc::downgrade(&erased));
        metered
    }
}
