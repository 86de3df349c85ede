// SPDX-FileCopyrightText: 2026 Tollgate Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory reference implementation of the usage ledger.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use tollgate_core::{EventFilter, TollgateError, UsageEvent, UsageLedger};

/// Mutex-guarded, ordered, in-memory event store.
///
/// Events are kept sorted by `created_at`; append clamps a backwards
/// timestamp up to the last stored value so the ordering invariant holds
/// even when callers supply their own timestamps. Time-bounded queries
/// narrow to the matching contiguous range by binary search before
/// applying equality filters.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    events: Mutex<Vec<UsageEvent>>,
}

impl MemoryLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored events.
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether the ledger holds no events.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UsageLedger for MemoryLedger {
    async fn append(&self, mut event: UsageEvent) -> Result<(), TollgateError> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(last) = events.last() {
            if event.created_at < last.created_at {
                event.created_at = last.created_at;
            }
        }
        events.push(event);
        Ok(())
    }

    async fn list(&self, filter: &EventFilter) -> Result<Vec<UsageEvent>, TollgateError> {
        let events = self.events.lock().unwrap_or_else(PoisonError::into_inner);

        // The Vec is sorted by created_at, so both bounds are found by
        // binary search: first index >= since, first index > until.
        let lo = match filter.since {
            Some(since) => events.partition_point(|e| e.created_at < since),
            None => 0,
        };
        let hi = match filter.until {
            Some(until) => events.partition_point(|e| e.created_at <= until),
            None => events.len(),
        };
        if lo >= hi {
            return Ok(Vec::new());
        }

        let equality = EventFilter {
            since: None,
            until: None,
            ..filter.clone()
        };
        Ok(events[lo..hi]
            .iter()
            .filter(|e| equality.matches(e))
            .cloned()
            .collect())
    }

    async fn reset(&self) -> Result<(), TollgateError> {
        let mut events = self.events.lock().unwrap_or_else(PoisonError::into_inner);
        let dropped = events.len();
        events.clear();
        debug!(dropped, "memory ledger reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn event(created_at_ms: i64, model: &str, user: &str, feature: &str) -> UsageEvent {
        UsageEvent {
            id: uuid::Uuid::new_v4().to_string(),
            model: model.to_string(),
            input_tokens: 100,
            output_tokens: 50,
            user_id: Some(user.to_string()),
            feature: Some(feature.to_string()),
            timestamp: at(created_at_ms),
            created_at: at(created_at_ms),
            cost_usd: 0.001,
        }
    }

    async fn seeded(times: &[i64]) -> MemoryLedger {
        let ledger = MemoryLedger::new();
        for &t in times {
            ledger
                .append(event(t, "gpt-4o-mini", "u1", "chat"))
                .await
                .unwrap();
        }
        ledger
    }

    fn created_times(events: &[UsageEvent]) -> Vec<i64> {
        events.iter().map(|e| e.created_at.timestamp_millis()).collect()
    }

    #[tokio::test]
    async fn range_queries_are_exact_and_inclusive() {
        let ledger = seeded(&[100, 200, 300, 400, 500]).await;

        let result = ledger
            .list(&EventFilter {
                since: Some(at(300)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created_times(&result), vec![300, 400, 500]);

        let result = ledger
            .list(&EventFilter {
                since: Some(at(250)),
                until: Some(at(450)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created_times(&result), vec![300, 400]);

        let result = ledger
            .list(&EventFilter {
                since: Some(at(501)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn equality_filters_compose_with_time_bounds() {
        let ledger = MemoryLedger::new();
        ledger.append(event(100, "gpt-4o-mini", "u1", "chat")).await.unwrap();
        ledger.append(event(200, "gpt-5", "u1", "chat")).await.unwrap();
        ledger.append(event(300, "gpt-5", "u2", "summarize")).await.unwrap();
        ledger.append(event(400, "gpt-5", "u1", "chat")).await.unwrap();

        let result = ledger
            .list(&EventFilter {
                model: Some("gpt-5".to_string()),
                user_id: Some("u1".to_string()),
                feature: Some("chat".to_string()),
                since: Some(at(150)),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(created_times(&result), vec![200, 400]);
    }

    #[tokio::test]
    async fn backwards_timestamps_are_clamped_to_preserve_ordering() {
        let ledger = MemoryLedger::new();
        ledger.append(event(500, "gpt-4o-mini", "u1", "chat")).await.unwrap();
        ledger.append(event(100, "gpt-4o-mini", "u1", "chat")).await.unwrap();

        let all = ledger.list(&EventFilter::default()).await.unwrap();
        assert_eq!(created_times(&all), vec![500, 500]);
        // The logical timestamp is untouched; only the ordering time moves.
        assert_eq!(all[1].timestamp.timestamp_millis(), 100);
    }

    #[tokio::test]
    async fn reset_clears_all_events() {
        let ledger = seeded(&[100, 200]).await;
        assert_eq!(ledger.len(), 2);

        ledger.reset().await.unwrap();
        assert!(ledger.is_empty());
        let all = ledger.list(&EventFilter::default()).await.unwrap();
        assert!(all.is_empty());
    }
}
