// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Budget policy engine: rule matching, scope derivation, rolling-window
//! aggregation, threshold escalation, and kill decisions.
//!
//! Alert state is an escalation ladder per (rule, scope): a threshold
//! fires once per budget-violation episode, and dropping back below 80%
//! re-arms the scope so a fresh overage alerts again.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use tollgate_core::{
    BudgetAlert, BudgetKillEvent, BudgetRule, EventFilter, ScopeMode, TollgateError, UsageEvent,
    UsageLedger,
};

/// Alert thresholds as percentages of a rule's limit, in firing order.
const ALERT_THRESHOLDS: [u8; 3] = [80, 90, 100];

/// Result of evaluating all rules against one recorded event.
#[derive(Debug, Default)]
pub(crate) struct Evaluation {
    /// Alerts in rule order, ascending threshold within a rule.
    pub alerts: Vec<BudgetAlert>,
    /// The first triggering rule's kill decision, if any.
    pub kill: Option<BudgetKillEvent>,
}

/// The concrete identity a rule's window usage is computed against.
struct ScopeIdentity {
    key: String,
    user_id: Option<String>,
    feature: Option<String>,
}

/// Policy engine owning the configured rules and per-scope alert state.
///
/// State is keyed by (rule index, scope key) and guarded by a mutex; it
/// lives and dies with the owning guard instance.
pub(crate) struct BudgetEngine {
    rules: Vec<BudgetRule>,
    state: Mutex<HashMap<(usize, String), u8>>,
}

impl BudgetEngine {
    pub(crate) fn new(rules: Vec<BudgetRule>) -> Self {
        Self {
            rules,
            state: Mutex::new(HashMap::new()),
        }
    }

    /// Evaluate every configured rule against a just-appended event.
    ///
    /// Each matching rule's window usage is read from the ledger at this
    /// call's own read time; concurrent evaluations of the same scope may
    /// each see the pre-increment sum (see the crate docs on enforcement
    /// consistency).
    pub(crate) async fn evaluate(
        &self,
        ledger: &dyn UsageLedger,
        now: DateTime<Utc>,
        event: &UsageEvent,
    ) -> Result<Evaluation, TollgateError> {
        let mut evaluation = Evaluation::default();

        for (index, rule) in self.rules.iter().enumerate() {
            if !rule_matches(rule, event) {
                continue;
            }

            let rule_id = rule
                .id
                .clone()
                .unwrap_or_else(|| format!("rule-{index}"));
            let Some(scope) = scope_identity(rule, &rule_id, event) else {
                // A required scope dimension is missing on the event;
                // the rule does not apply to this call.
                continue;
            };

            let filter = EventFilter {
                model: rule.model.clone(),
                user_id: scope.user_id.clone(),
                feature: scope.feature.clone(),
                since: Some(now - rule.window()),
                until: Some(now),
            };
            let window_events = ledger.list(&filter).await?;
            let usage_usd: f64 = window_events.iter().map(|e| e.cost_usd).sum();
            let percent = usage_usd / rule.limit_usd * 100.0;

            let reached = ALERT_THRESHOLDS
                .iter()
                .copied()
                .filter(|t| percent >= f64::from(*t))
                .max()
                .unwrap_or(0);

            let state_key = (index, scope.key.clone());
            let previous = {
                let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                state.get(&state_key).copied().unwrap_or(0)
            };

            if reached > previous {
                for threshold in ALERT_THRESHOLDS {
                    if threshold > previous && threshold <= reached {
                        warn!(
                            rule = %rule_id,
                            scope = %scope.key,
                            threshold,
                            usage_usd,
                            limit_usd = rule.limit_usd,
                            "budget threshold crossed"
                        );
                        evaluation.alerts.push(BudgetAlert {
                            rule: rule.clone(),
                            threshold_percent: threshold,
                            usage_usd,
                            limit_usd: rule.limit_usd,
                            scope_key: scope.key.clone(),
                        });
                    }
                }
            } else {
                debug!(
                    rule = %rule_id,
                    scope = %scope.key,
                    percent,
                    "budget evaluated, no new threshold"
                );
            }

            {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                // Below 80% the episode ends and the ladder re-arms.
                state.insert(state_key, if reached < 80 { 0 } else { reached });
            }

            if evaluation.kill.is_none() && usage_usd > rule.limit_usd && rule.kill_switch {
                warn!(
                    rule = %rule_id,
                    scope = %scope.key,
                    usage_usd,
                    limit_usd = rule.limit_usd,
                    "budget limit exceeded, kill decided"
                );
                evaluation.kill = Some(BudgetKillEvent {
                    rule: rule.clone(),
                    usage_usd,
                    limit_usd: rule.limit_usd,
                    scope_key: scope.key.clone(),
                });
            }
        }

        Ok(evaluation)
    }
}

/// Whether the rule's static filters all match the event exactly.
fn rule_matches(rule: &BudgetRule, event: &UsageEvent) -> bool {
    if let Some(model) = &rule.model {
        if event.model != *model {
            return false;
        }
    }
    if let Some(user_id) = &rule.user_id {
        if event.user_id.as_deref() != Some(user_id.as_str()) {
            return false;
        }
    }
    if let Some(feature) = &rule.feature {
        if event.feature.as_deref() != Some(feature.as_str()) {
            return false;
        }
    }
    true
}

/// Derive the concrete scope for a rule and event, or `None` when a
/// required dimension is missing on the event.
///
/// The returned user/feature are what the window query filters on: the
/// event's own values for scoped dimensions, the rule's static filters
/// otherwise.
fn scope_identity(rule: &BudgetRule, rule_id: &str, event: &UsageEvent) -> Option<ScopeIdentity> {
    let mut parts = vec![rule_id.to_string()];

    let by_user = matches!(rule.scope_by, ScopeMode::User | ScopeMode::UserFeature);
    let by_feature = matches!(rule.scope_by, ScopeMode::Feature | ScopeMode::UserFeature);

    if by_user {
        let user_id = event.user_id.as_ref()?;
        parts.push(format!("user:{user_id}"));
    }
    if by_feature {
        let feature = event.feature.as_ref()?;
        parts.push(format!("feature:{feature}"));
    }
    if rule.scope_by == ScopeMode::Global {
        parts.push("global".to_string());
    }

    Some(ScopeIdentity {
        key: parts.join("|"),
        user_id: if by_user {
            event.user_id.clone()
        } else {
            rule.user_id.clone()
        },
        feature: if by_feature {
            event.feature.clone()
        } else {
            rule.feature.clone()
        },
    })
}
