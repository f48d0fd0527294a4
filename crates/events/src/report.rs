//! Periodic usage reports.
//!
//! [`ReportScheduler`] runs as a background task and posts a summary of
//! [`UsageStats`] to a fixed target at the end of every day, week, month
//! and year (UTC). Each report covers the period that just ended.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use genqueue_core::{Notification, Notifier, NotifyError, Target};
use tokio_util::sync::CancellationToken;

use crate::stats::{UsageStats, UsageSummary};

// ---------------------------------------------------------------------------
// ReportPeriod
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl ReportPeriod {
    pub const ALL: [ReportPeriod; 4] = [Self::Daily, Self::Weekly, Self::Monthly, Self::Yearly];

    pub fn label(self) -> &'static str {
        match self {
            Self::Daily => "Daily",
            Self::Weekly => "Weekly",
            Self::Monthly => "Monthly",
            Self::Yearly => "Yearly",
        }
    }

    /// Start of the window a report issued at `now` covers.
    pub fn window_start(self, now: DateTime<Utc>) -> DateTime<Utc> {
        let start = match self {
            Self::Daily => now.checked_sub_signed(Duration::days(1)),
            Self::Weekly => now.checked_sub_signed(Duration::days(7)),
            Self::Monthly => now.checked_sub_months(Months::new(1)),
            Self::Yearly => now.checked_sub_months(Months::new(12)),
        };
        start.unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Firing time of day, as (hour, minute).
    fn fire_time(self) -> (u32, u32) {
        match self {
            Self::Daily => (0, 0),
            Self::Weekly => (0, 5),
            Self::Monthly => (0, 10),
            Self::Yearly => (0, 15),
        }
    }

    /// The first firing instant strictly after `now`.
    ///
    /// Daily at 00:00, Mondays at 00:05, the 1st of each month at 00:10
    /// and January 1st at 00:15.
    pub fn next_run_after(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let today = now.date_naive();
        let (hour, minute) = self.fire_time();
        let at = |date: NaiveDate| {
            let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or_default();
            date.and_time(time).and_utc()
        };

        match self {
            Self::Daily => {
                let candidate = at(today);
                if candidate > now {
                    Some(candidate)
                } else {
                    today.succ_opt().map(at)
                }
            }
            Self::Weekly => {
                let days_to_monday = (7 - today.weekday().num_days_from_monday()) % 7;
                let monday = today.checked_add_signed(Duration::days(i64::from(days_to_monday)))?;
                let candidate = at(monday);
                if candidate > now {
                    Some(candidate)
                } else {
                    monday.checked_add_signed(Duration::days(7)).map(at)
                }
            }
            Self::Monthly => {
                let first = today.with_day(1)?;
                let candidate = at(first);
                if candidate > now {
                    Some(candidate)
                } else {
                    first.checked_add_months(Months::new(1)).map(at)
                }
            }
            Self::Yearly => {
                let first = NaiveDate::from_ymd_opt(today.year(), 1, 1)?;
                let candidate = at(first);
                if candidate > now {
                    Some(candidate)
                } else {
                    NaiveDate::from_ymd_opt(today.year() + 1, 1, 1).map(at)
                }
            }
        }
    }
}

/// Render a usage summary for chat.
pub fn report_message(period: ReportPeriod, summary: &UsageSummary) -> String {
    format!(
        "📊 {} Stats Report 📊\n\
         Total images generated: {}\n\
         Unique users: {}\n\
         Most used model: {}\n\
         Keep those creative juices flowing! 🎨✨",
        period.label(),
        summary.total_images,
        summary.unique_users,
        summary.most_used_model.as_deref().unwrap_or("N/A"),
    )
}

// ---------------------------------------------------------------------------
// ReportScheduler
// ---------------------------------------------------------------------------

/// Background service that posts usage reports on a calendar schedule.
pub struct ReportScheduler {
    stats: Arc<UsageStats>,
    notifier: Arc<dyn Notifier>,
    target: Target,
}

impl ReportScheduler {
    pub fn new(stats: Arc<UsageStats>, notifier: Arc<dyn Notifier>, target: Target) -> Self {
        Self {
            stats,
            notifier,
            target,
        }
    }

    /// Run the scheduler loop until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut last_fired: Option<DateTime<Utc>> = None;

        loop {
            let now = Utc::now();
            let after = last_fired.map_or(now, |fired| fired.max(now));
            let Some((period, due)) = ReportPeriod::ALL
                .iter()
                .filter_map(|p| p.next_run_after(after).map(|at| (*p, at)))
                .min_by_key(|(_, at)| *at)
            else {
                tracing::warn!("No report is schedulable, report scheduler stopping");
                break;
            };

            let wait = (due - now).to_std().unwrap_or_default();
            tracing::debug!(period = period.label(), due = %due, "Next usage report scheduled");

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Report scheduler cancelled");
                    break;
                }
                _ = tokio::time::sleep(wait) => {
                    last_fired = Some(due);
                    if let Err(e) = self.send_report(period, due).await {
                        tracing::error!(period = period.label(), error = %e, "Failed to send usage report");
                    }
                }
            }
        }
    }

    /// Summarise the window ending at `now` and post it to the target.
    pub async fn send_report(&self, period: ReportPeriod, now: DateTime<Utc>) -> Result<(), NotifyError> {
        let summary = self.stats.summary(period, now).await;
        let text = report_message(period, &summary);
        self.notifier.notify(&self.target, &Notification::text(text)).await?;

        tracing::info!(
            period = period.label(),
            total_images = summary.total_images,
            unique_users = summary.unique_users,
            "Usage report sent",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
