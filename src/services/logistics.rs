//! Simulated courier: moves a fresh donation to "In transit" and then to
//! "Received at Charity" on a timer. One cancelable task per donation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::AbortHandle;

use super::donation::apply_transition;
use super::notification::NotificationEmitter;
use crate::config::Config;
use crate::database::Store;
use crate::error::AppError;
use crate::models::DonationStatus;

#[derive(Debug, Clone, Copy)]
pub struct LogisticsPlan {
    pub in_transit_after: Duration,
    /// Measured from the moment the donation went into transit.
    pub received_after: Duration,
    /// Finished records older than this are dropped.
    pub retention: Duration,
}

impl LogisticsPlan {
    pub fn from_config(config: &Config) -> Self {
        Self {
            in_transit_after: config.logistics_in_transit_delay(),
            received_after: config.logistics_received_delay(),
            retention: config.logistics_retention(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogisticsState {
    Scheduled,
    InTransit,
    Delivered,
    Skipped,
    Failed,
    Cancelled,
}

impl LogisticsState {
    fn is_pending(self) -> bool {
        matches!(self, LogisticsState::Scheduled | LogisticsState::InTransit)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LogisticsRecord {
    pub donation_id: i64,
    pub state: LogisticsState,
    pub scheduled_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub detail: Option<String>,
}

struct Entry {
    handle: Option<AbortHandle>,
    record: LogisticsRecord,
}

enum Step {
    Applied,
    Skipped(String),
}

struct Inner {
    store: Arc<dyn Store>,
    emitter: NotificationEmitter,
    plan: LogisticsPlan,
    tasks: Mutex<HashMap<i64, Entry>>,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<i64, Entry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock plus eviction of finished records past the retention window.
    fn pruned_tasks(&self) -> MutexGuard<'_, HashMap<i64, Entry>> {
        let mut tasks = self.tasks();
        let now = Utc::now();
        let retention = self.plan.retention;
        tasks.retain(|_, entry| {
            entry.record.state.is_pending()
                || (now - entry.record.updated_at)
                    .to_std()
                    .map_or(true, |age| age < retention)
        });
        tasks
    }

    fn record(&self, donation_id: i64, state: LogisticsState, detail: Option<String>) {
        let mut tasks = self.tasks();
        if let Some(entry) = tasks.get_mut(&donation_id) {
            // a cancelled task may still be finishing its last step
            if entry.record.state == LogisticsState::Cancelled {
                return;
            }
            entry.record.state = state;
            entry.record.updated_at = Utc::now();
            entry.record.detail = detail;
        }
    }

    async fn step(
        &self,
        donation_id: i64,
        expected: DonationStatus,
        target: DonationStatus,
    ) -> Result<Step, AppError> {
        let mut tx = self.store.begin().await?;
        let Some(donation) = tx.find_donation(donation_id).await? else {
            return Ok(Step::Skipped("donation no longer exists".to_string()));
        };
        if donation.status() != Some(expected) {
            return Ok(Step::Skipped(format!(
                "expected \"{}\" but donation is at status {}",
                expected.name(),
                donation.status_id
            )));
        }
        apply_transition(&mut *tx, &self.emitter, &donation, target).await?;
        tx.commit().await?;
        Ok(Step::Applied)
    }

    async fn run(self: Arc<Self>, donation_id: i64) {
        let legs = [
            (
                self.plan.in_transit_after,
                DonationStatus::Submitted,
                DonationStatus::InTransit,
                LogisticsState::InTransit,
            ),
            (
                self.plan.received_after,
                DonationStatus::InTransit,
                DonationStatus::ReceivedAtCharity,
                LogisticsState::Delivered,
            ),
        ];

        for (delay, expected, target, reached) in legs {
            tokio::time::sleep(delay).await;
            match self.step(donation_id, expected, target).await {
                Ok(Step::Applied) => {
                    tracing::debug!("Donation {} moved to \"{}\"", donation_id, target.name());
                    self.record(donation_id, reached, None);
                }
                Ok(Step::Skipped(reason)) => {
                    tracing::info!("Logistics for donation {} skipped: {}", donation_id, reason);
                    self.record(donation_id, LogisticsState::Skipped, Some(reason));
                    return;
                }
                Err(e) => {
                    tracing::error!("Logistics for donation {} failed: {}", donation_id, e);
                    self.record(donation_id, LogisticsState::Failed, Some(e.to_string()));
                    return;
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct LogisticsScheduler {
    inner: Arc<Inner>,
}

impl LogisticsScheduler {
    pub fn new(store: Arc<dyn Store>, emitter: NotificationEmitter, plan: LogisticsPlan) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                emitter,
                plan,
                tasks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Starts the simulation for a newly created donation. A second call for
    /// the same id replaces the previous task.
    pub fn schedule(&self, donation_id: i64) {
        let now = Utc::now();
        {
            let mut tasks = self.inner.pruned_tasks();
            if let Some(previous) = tasks.remove(&donation_id) {
                if let Some(handle) = previous.handle {
                    handle.abort();
                }
            }
            tasks.insert(
                donation_id,
                Entry {
                    handle: None,
                    record: LogisticsRecord {
                        donation_id,
                        state: LogisticsState::Scheduled,
                        scheduled_at: now,
                        updated_at: now,
                        detail: None,
                    },
                },
            );
        }

        let handle = tokio::spawn(self.inner.clone().run(donation_id)).abort_handle();
        if let Some(entry) = self.inner.tasks().get_mut(&donation_id) {
            entry.handle = Some(handle);
        }
        tracing::debug!("Logistics scheduled for donation {}", donation_id);
    }

    /// Stops a pending task. Returns false when nothing was running.
    pub fn cancel(&self, donation_id: i64) -> bool {
        let mut tasks = self.inner.tasks();
        let Some(entry) = tasks.get_mut(&donation_id) else {
            return false;
        };
        if !entry.record.state.is_pending() {
            return false;
        }
        if let Some(handle) = entry.handle.take() {
            handle.abort();
        }
        entry.record.state = LogisticsState::Cancelled;
        entry.record.updated_at = Utc::now();
        tracing::debug!("Logistics cancelled for donation {}", donation_id);
        true
    }

    pub fn record(&self, donation_id: i64) -> Option<LogisticsRecord> {
        self.inner
            .pruned_tasks()
            .get(&donation_id)
            .map(|entry| entry.record.clone())
    }
}
