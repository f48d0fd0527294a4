//! Usage statistics gathered from the event bus.
//!
//! [`UsageStats`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! records every `job.completed` event in memory. Records older than the
//! longest report window are pruned as new ones arrive.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Months, Utc};
use genqueue_core::job_events::EVENT_JOB_COMPLETED;
use tokio::sync::{broadcast, RwLock};

use crate::bus::QueueEvent;
use crate::report::ReportPeriod;

/// One completed generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRecord {
    pub timestamp: DateTime<Utc>,
    pub requester: String,
    pub model_style: String,
    pub aspect_ratio: String,
}

/// Aggregates for one report window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageSummary {
    pub total_images: usize,
    pub unique_users: usize,
    /// Most frequent model; ties go to the alphabetically first name.
    pub most_used_model: Option<String>,
}

/// In-memory store of completed generations.
#[derive(Default)]
pub struct UsageStats {
    records: RwLock<Vec<GenerationRecord>>,
}

impl UsageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, record: GenerationRecord) {
        let cutoff = record
            .timestamp
            .checked_sub_months(Months::new(13))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut records = self.records.write().await;
        records.retain(|r| r.timestamp >= cutoff);
        records.push(record);
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Summarise records inside `period`'s window ending at `now`.
    pub async fn summary(&self, period: ReportPeriod, now: DateTime<Utc>) -> UsageSummary {
        let start = period.window_start(now);
        let records = self.records.read().await;
        summarize(records.iter().filter(|r| r.timestamp >= start && r.timestamp <= now))
    }

    /// Consume events until the bus closes.
    pub async fn run(&self, mut receiver: broadcast::Receiver<QueueEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Some(record) = record_from_event(&event) {
                        self.record(record).await;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Usage stats lagged, some generations were not counted");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, usage stats shutting down");
                    break;
                }
            }
        }
    }
}

/// Build a record from a `job.completed` event; other events yield `None`.
pub fn record_from_event(event: &QueueEvent) -> Option<GenerationRecord> {
    if event.event_type != EVENT_JOB_COMPLETED {
        return None;
    }
    Some(GenerationRecord {
        timestamp: event.timestamp,
        requester: event.requester.clone().unwrap_or_default(),
        model_style: event.payload_str("model_style").unwrap_or_default().to_string(),
        aspect_ratio: event.payload_str("aspect_ratio").unwrap_or_default().to_string(),
    })
}

fn summarize<'a>(records: impl Iterator<Item = &'a GenerationRecord>) -> UsageSummary {
    let mut total_images = 0;
    let mut users = HashSet::new();
    let mut models: BTreeMap<&str, usize> = BTreeMap::new();

    for record in records {
        total_images += 1;
        users.insert(record.requester.as_str());
        *models.entry(record.model_style.as_str()).or_default() += 1;
    }

    // BTreeMap iterates alphabetically; keep the first maximum.
    let most_used_model = models
        .into_iter()
        .fold(None, |best: Option<(&str, usize)>, (model, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((model, count)),
        })
        .map(|(model, _)| model.to_string());

    UsageSummary {
        total_images,
        unique_users: users.len(),
        most_used_model,
    }
}
