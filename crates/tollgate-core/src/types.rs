// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared across the Tollgate workspace.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A request to record one metered call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackRequest {
    /// Model identifier (e.g., "gpt-4o-mini").
    pub model: String,
    /// Number of input (prompt) tokens.
    pub input_tokens: u64,
    /// Number of output (completion) tokens.
    pub output_tokens: u64,
    /// Optional user attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Optional feature attribution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Explicit logical timestamp. Defaults to the guard's clock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl TrackRequest {
    /// Create a request with the required fields only.
    pub fn new(model: impl Into<String>, input_tokens: u64, output_tokens: u64) -> Self {
        Self {
            model: model.into(),
            input_tokens,
            output_tokens,
            user_id: None,
            feature: None,
            timestamp: None,
        }
    }

    /// Set the user attribution.
    #[must_use]
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Set the feature attribution.
    #[must_use]
    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Set an explicit logical timestamp.
    #[must_use]
    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

/// A single usage event representing one priced LLM API call.
///
/// Events are created once per recorded call, owned by the ledger after
/// append, and never mutated. `cost_usd` is fixed at record time; later
/// pricing catalog changes never retroactively alter stored events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageEvent {
    /// Unique event identifier (UUID v4).
    pub id: String,
    /// Model identifier used.
    pub model: String,
    /// Number of input tokens.
    pub input_tokens: u64,
    /// Number of output tokens.
    pub output_tokens: u64,
    /// User attribution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Feature attribution, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Logical timestamp (caller-supplied or clock-assigned).
    pub timestamp: DateTime<Utc>,
    /// Ledger-ordering time. Non-decreasing within one ledger.
    pub created_at: DateTime<Utc>,
    /// Calculated cost in USD. Zero when pricing was unknown and tolerated.
    pub cost_usd: f64,
}

/// How a budget rule derives its concrete enforcement scope.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScopeMode {
    /// One shared scope for all matching events.
    #[default]
    Global,
    /// One scope per user id.
    User,
    /// One scope per feature.
    Feature,
    /// One scope per (user id, feature) pair.
    UserFeature,
}

fn default_kill_switch() -> bool {
    true
}

/// A configured spend limit over a rolling time window.
///
/// Rules are supplied once at guard construction and are immutable
/// thereafter. When `id` is absent, the rule's position in the configured
/// list becomes part of its identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetRule {
    /// Optional stable identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Spend limit in USD. Must be positive.
    pub limit_usd: f64,
    /// Rolling window duration in milliseconds.
    pub window_ms: i64,
    /// Only match events for this model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Only match events for this user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Only match events for this feature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Scope derivation mode.
    #[serde(default)]
    pub scope_by: ScopeMode,
    /// Whether exceeding the limit aborts the triggering call.
    #[serde(default = "default_kill_switch")]
    pub kill_switch: bool,
}

impl BudgetRule {
    /// Create a global rule with the given limit and window.
    pub fn new(limit_usd: f64, window_ms: i64) -> Self {
        Self {
            id: None,
            limit_usd,
            window_ms,
            model: None,
            user_id: None,
            feature: None,
            scope_by: ScopeMode::Global,
            kill_switch: true,
        }
    }

    /// Set a stable identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Restrict the rule to one model.
    #[must_use]
    pub fn for_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Restrict the rule to one user.
    #[must_use]
    pub fn for_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Restrict the rule to one feature.
    #[must_use]
    pub fn for_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = Some(feature.into());
        self
    }

    /// Set the scope derivation mode.
    #[must_use]
    pub fn scoped_by(mut self, mode: ScopeMode) -> Self {
        self.scope_by = mode;
        self
    }

    /// Disable the kill switch; the rule then only alerts.
    #[must_use]
    pub fn without_kill_switch(mut self) -> Self {
        self.kill_switch = false;
        self
    }

    /// The rolling window as a chrono duration.
    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms)
    }
}

/// Ledger-level event filter: exact-match dimensions plus inclusive
/// `created_at` bounds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    /// Inclusive lower bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// Whether the event satisfies every set dimension of this filter.
    pub fn matches(&self, event: &UsageEvent) -> bool {
        if let Some(model) = &self.model {
            if event.model != *model {
                return false;
            }
        }
        if let Some(user_id) = &self.user_id {
            if event.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(feature) = &self.feature {
            if event.feature.as_deref() != Some(feature.as_str()) {
                return false;
            }
        }
        if let Some(since) = self.since {
            if event.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if event.created_at > until {
                return false;
            }
        }
        true
    }
}

/// Guard-level usage filter: the ledger filter dimensions plus an optional
/// rolling window, resolved against the guard's clock at query time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
    /// Rolling window in milliseconds; resolved to `since = now - window`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ms: Option<i64>,
}

impl UsageFilter {
    /// Resolve the rolling window against `now`, producing a ledger filter.
    ///
    /// An explicit window takes precedence over a caller-supplied `since`.
    pub fn resolve(&self, now: DateTime<Utc>) -> EventFilter {
        let since = match self.window_ms {
            Some(window_ms) => Some(now - Duration::milliseconds(window_ms)),
            None => self.since,
        };
        EventFilter {
            model: self.model.clone(),
            user_id: self.user_id.clone(),
            feature: self.feature.clone(),
            since,
            until: self.until,
        }
    }
}

/// Aggregated usage over a set of events. Computed on demand; not persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageSummary {
    /// Total spend in USD.
    pub total_spend_usd: f64,
    /// Number of events.
    pub total_calls: u64,
    /// Sum of input tokens.
    pub total_input_tokens: u64,
    /// Sum of output tokens.
    pub total_output_tokens: u64,
    /// Spend per model.
    pub by_model: HashMap<String, f64>,
    /// Spend per user id (events without a user are omitted).
    pub by_user: HashMap<String, f64>,
    /// Spend per feature (events without a feature are omitted).
    pub by_feature: HashMap<String, f64>,
}

impl UsageSummary {
    /// Aggregate a slice of events into a summary.
    pub fn from_events(events: &[UsageEvent]) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.total_spend_usd += event.cost_usd;
            summary.total_calls += 1;
            summary.total_input_tokens += event.input_tokens;
            summary.total_output_tokens += event.output_tokens;

            *summary.by_model.entry(event.model.clone()).or_insert(0.0) += event.cost_usd;
            if let Some(user_id) = &event.user_id {
                *summary.by_user.entry(user_id.clone()).or_insert(0.0) += event.cost_usd;
            }
            if let Some(feature) = &event.feature {
                *summary.by_feature.entry(feature.clone()).or_insert(0.0) += event.cost_usd;
            }
        }
        summary
    }
}

/// One threshold crossing of a budget rule's limit.
///
/// Delivered to alert subscribers and discarded; never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetAlert {
    /// The rule that crossed a threshold.
    pub rule: BudgetRule,
    /// The crossed threshold: 80, 90, or 100.
    pub threshold_percent: u8,
    /// Window usage at evaluation time, in USD.
    pub usage_usd: f64,
    /// The rule's limit in USD.
    pub limit_usd: f64,
    /// Concrete scope the usage was computed against.
    pub scope_key: String,
}

/// The decision that a scope's window usage exceeded its rule's limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetKillEvent {
    /// The rule whose limit was exceeded.
    pub rule: BudgetRule,
    /// Window usage at evaluation time, in USD.
    pub usage_usd: f64,
    /// The rule's limit in USD.
    pub limit_usd: f64,
    /// Concrete scope the usage was computed against.
    pub scope_key: String,
}

/// Outcome of one record operation.
#[derive(Debug, Clone)]
pub struct TrackResult {
    /// The event that was appended to the ledger.
    pub event: UsageEvent,
    /// Alerts fired by this call, in rule order then ascending threshold.
    pub alerts: Vec<BudgetAlert>,
    /// Whether a kill was decided, even when kill-throwing is disabled.
    pub kill_triggered: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(created_at_ms: i64, model: &str, user: Option<&str>, cost: f64) -> UsageEvent {
        let at = Utc.timestamp_millis_opt(created_at_ms).unwrap();
        UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            input_tokens: 100,
            output_tokens: 50,
            user_id: user.map(str::to_string),
            feature: Some("chat".to_string()),
            timestamp: at,
            created_at: at,
            cost_usd: cost,
        }
    }

    #[test]
    fn summary_aggregates_totals_and_breakdowns() {
        let events = vec![
            event(100, "gpt-4o-mini", Some("u1"), 0.01),
            event(200, "gpt-4o-mini", Some("u2"), 0.02),
            event(300, "gpt-4o", None, 0.04),
        ];
        let summary = UsageSummary::from_events(&events);

        assert_eq!(summary.total_calls, 3);
        assert!((summary.total_spend_usd - 0.07).abs() < 1e-12);
        assert_eq!(summary.total_input_tokens, 300);
        assert_eq!(summary.total_output_tokens, 150);
        assert!((summary.by_model["gpt-4o-mini"] - 0.03).abs() < 1e-12);
        assert!((summary.by_user["u1"] - 0.01).abs() < 1e-12);
        // The userless event contributes to totals but not to by_user.
        assert_eq!(summary.by_user.len(), 2);
        assert!((summary.by_feature["chat"] - 0.07).abs() < 1e-12);
    }

    #[test]
    fn filter_matches_equality_and_bounds() {
        let e = event(250, "gpt-4o", Some("u1"), 0.01);

        let mut filter = EventFilter::default();
        assert!(filter.matches(&e));

        filter.model = Some("gpt-4o".to_string());
        filter.user_id = Some("u1".to_string());
        assert!(filter.matches(&e));

        filter.user_id = Some("u2".to_string());
        assert!(!filter.matches(&e));

        let filter = EventFilter {
            since: Some(Utc.timestamp_millis_opt(250).unwrap()),
            until: Some(Utc.timestamp_millis_opt(250).unwrap()),
            ..Default::default()
        };
        // Bounds are inclusive on both ends.
        assert!(filter.matches(&e));
    }

    #[test]
    fn filter_on_missing_dimension_never_matches() {
        let e = event(100, "gpt-4o", None, 0.01);
        let filter = EventFilter {
            user_id: Some("u1".to_string()),
            ..Default::default()
        };
        assert!(!filter.matches(&e));
    }

    #[test]
    fn usage_filter_window_overrides_since() {
        let now = Utc.timestamp_millis_opt(10_000).unwrap();
        let filter = UsageFilter {
            since: Some(Utc.timestamp_millis_opt(0).unwrap()),
            window_ms: Some(1_000),
            ..Default::default()
        };
        let resolved = filter.resolve(now);
        assert_eq!(resolved.since, Some(Utc.timestamp_millis_opt(9_000).unwrap()));
    }

    #[test]
    fn scope_mode_display_and_parse() {
        use std::str::FromStr;
        assert_eq!(ScopeMode::UserFeature.to_string(), "user_feature");
        assert_eq!(ScopeMode::from_str("user").unwrap(), ScopeMode::User);
        assert_eq!(ScopeMode::default(), ScopeMode::Global);
    }

    #[test]
    fn budget_rule_serde_defaults() {
        let rule: BudgetRule =
            serde_json::from_str(r#"{"limit_usd": 5.0, "window_ms": 60000}"#).unwrap();
        assert!(rule.kill_switch);
        assert_eq!(rule.scope_by, ScopeMode::Global);
        assert!(rule.id.is_none());
        assert_eq!(rule.window(), chrono::Duration::milliseconds(60_000));
    }
}
