// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The metering façade: one `record` call prices a request, appends it to
//! the ledger, evaluates every budget rule, and delivers alerts and kill
//! events to subscribers.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::info;

use tollgate_core::{
    BudgetAlert, BudgetKillEvent, BudgetRule, TollgateError, TrackRequest, TrackResult, UsageEvent,
    UsageFilter, UsageLedger, UsageSummary,
};
use tollgate_storage::MemoryLedger;

use crate::policy::BudgetEngine;
use crate::pricing::{ModelPricing, PricingCatalog};

/// Pluggable time source. Defaults to wall clock.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// What `record` does when the model has no pricing entry.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum UnknownModelPolicy {
    /// Fail the call without appending an event.
    #[default]
    Error,
    /// Record the event with zero cost.
    Zero,
}

/// Guard construction options.
pub struct GuardConfig {
    /// Ordered budget rules. Position is part of a rule's identity when it
    /// has no explicit id.
    pub budgets: Vec<BudgetRule>,
    /// Per-model pricing overrides applied over the built-in catalog.
    pub pricing: Option<HashMap<String, ModelPricing>>,
    /// Pluggable ledger. Defaults to the in-memory reference store.
    pub storage: Option<Arc<dyn UsageLedger>>,
    /// Pluggable clock for deterministic tests.
    pub now: Option<Clock>,
    /// Whether a kill decision fails the triggering call.
    pub throw_on_kill: bool,
    /// Unknown-model handling.
    pub on_unknown_model: UnknownModelPolicy,
}

impl GuardConfig {
    /// Configuration with the given rules and all defaults.
    pub fn new(budgets: Vec<BudgetRule>) -> Self {
        Self {
            budgets,
            pricing: None,
            storage: None,
            now: None,
            throw_on_kill: true,
            on_unknown_model: UnknownModelPolicy::default(),
        }
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardConfig")
            .field("budgets", &self.budgets)
            .field("pricing", &self.pricing)
            .field("storage", &self.storage.as_ref().map(|_| "<ledger>"))
            .field("now", &self.now.as_ref().map(|_| "<clock>"))
            .field("throw_on_kill", &self.throw_on_kill)
            .field("on_unknown_model", &self.on_unknown_model)
            .finish()
    }
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered set of subscriber callbacks with id-based removal.
struct CallbackRegistry<T> {
    entries: Arc<Mutex<Vec<(u64, Handler<T>)>>>,
    next_id: AtomicU64,
}

impl<T: 'static> CallbackRegistry<T> {
    fn new() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(callback)));

        let entries = Arc::downgrade(&self.entries);
        Subscription {
            remove: Box::new(move || {
                if let Some(entries) = entries.upgrade() {
                    entries
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .retain(|(entry_id, _)| *entry_id != id);
                }
            }),
        }
    }

    /// Invoke every handler in registration order, outside the lock.
    fn notify(&self, value: &T) {
        let handlers: Vec<Handler<T>> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, handler)| Arc::clone(handler))
            .collect();
        for handler in handlers {
            handler(value);
        }
    }
}

/// Handle to one subscriber registration.
///
/// `cancel` removes exactly that registration and is idempotent; dropping
/// the handle leaves the subscription active.
pub struct Subscription {
    remove: Box<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove the registration. Safe to call more than once.
    pub fn cancel(&self) {
        (self.remove)();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription").finish_non_exhaustive()
    }
}

/// The metering façade.
///
/// One `record` call prices the request, appends the event, evaluates all
/// budget rules against current ledger state, and delivers alerts/kills
/// synchronously before returning.
///
/// Enforcement consistency: concurrent `record` calls for the same budget
/// scope each read the window sum at their own ledger-read time, so two
/// near-simultaneous calls can both see the pre-increment usage and
/// neither decide a kill. Callers requiring hard enforcement must
/// serialize calls per scope.
pub struct CostGuard {
    ledger: Arc<dyn UsageLedger>,
    pricing: PricingCatalog,
    engine: BudgetEngine,
    clock: Clock,
    throw_on_kill: bool,
    on_unknown_model: UnknownModelPolicy,
    alert_subscribers: CallbackRegistry<BudgetAlert>,
    kill_subscribers: CallbackRegistry<BudgetKillEvent>,
    pub(crate) wrap_cache: Mutex<HashMap<usize, Weak<dyn Any + Send + Sync>>>,
}

impl CostGuard {
    /// Build a guard from configuration.
    pub fn new(config: GuardConfig) -> Self {
        let ledger = config
            .storage
            .unwrap_or_else(|| Arc::new(MemoryLedger::new()));
        let pricing = match config.pricing {
            Some(overlay) => PricingCatalog::with_overrides(overlay),
            None => PricingCatalog::built_in(),
        };
        let clock: Clock = config.now.unwrap_or_else(|| Arc::new(Utc::now));

        Self {
            ledger,
            pricing,
            engine: BudgetEngine::new(config.budgets),
            clock,
            throw_on_kill: config.throw_on_kill,
            on_unknown_model: config.on_unknown_model,
            alert_subscribers: CallbackRegistry::new(),
            kill_subscribers: CallbackRegistry::new(),
            wrap_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Record one metered call.
    ///
    /// Prices the request, appends the event (before evaluation, so the
    /// call's own cost counts toward its own window), evaluates every
    /// rule, and delivers alerts then kills to subscribers in
    /// registration order. When a kill was decided and `throw_on_kill` is
    /// set, fails with [`TollgateError::BudgetExceeded`]; otherwise the
    /// result's `kill_triggered` flag carries the decision.
    pub async fn record(&self, request: TrackRequest) -> Result<TrackResult, TollgateError> {
        let timestamp = request.timestamp.unwrap_or_else(|| (self.clock)());

        let cost_usd = match self.pricing.cost_usd(
            &request.model,
            request.input_tokens,
            request.output_tokens,
        ) {
            Some(cost) => cost,
            None => match self.on_unknown_model {
                UnknownModelPolicy::Error => {
                    return Err(TollgateError::UnknownModel {
                        model: request.model,
                    });
                }
                UnknownModelPolicy::Zero => 0.0,
            },
        };

        let event = UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            model: request.model,
            input_tokens: request.input_tokens,
            output_tokens: request.output_tokens,
            user_id: request.user_id,
            feature: request.feature,
            timestamp,
            created_at: timestamp,
            cost_usd,
        };
        self.ledger.append(event.clone()).await?;

        info!(
            model = %event.model,
            input_tokens = event.input_tokens,
            output_tokens = event.output_tokens,
            cost_usd = event.cost_usd,
            "usage recorded"
        );

        let evaluation = self
            .engine
            .evaluate(self.ledger.as_ref(), (self.clock)(), &event)
            .await?;

        for alert in &evaluation.alerts {
            self.alert_subscribers.notify(alert);
        }
        if let Some(kill) = &evaluation.kill {
            self.kill_subscribers.notify(kill);
        }

        let kill_triggered = evaluation.kill.is_some();
        if let Some(kill) = evaluation.kill {
            if self.throw_on_kill {
                return Err(TollgateError::BudgetExceeded { event: kill });
            }
        }

        Ok(TrackResult {
            event,
            alerts: evaluation.alerts,
            kill_triggered,
        })
    }

    /// Aggregate usage matching the filter.
    ///
    /// A rolling `window_ms` is resolved against the guard's clock into an
    /// explicit `since` bound before the ledger is queried.
    pub async fn query(&self, filter: &UsageFilter) -> Result<UsageSummary, TollgateError> {
        let resolved = filter.resolve((self.clock)());
        let events = self.ledger.list(&resolved).await?;
        Ok(UsageSummary::from_events(&events))
    }

    /// Subscribe to budget threshold alerts.
    pub fn on_alert(&self, callback: impl Fn(&BudgetAlert) + Send + Sync + 'static) -> Subscription {
        self.alert_subscribers.subscribe(callback)
    }

    /// Subscribe to kill events.
    pub fn on_kill(
        &self,
        callback: impl Fn(&BudgetKillEvent) + Send + Sync + 'static,
    ) -> Subscription {
        self.kill_subscribers.subscribe(callback)
    }

    /// The effective pricing catalog.
    pub fn pricing(&self) -> &PricingCatalog {
        &self.pricing
    }
}
