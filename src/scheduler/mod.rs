//! Scheduler: polls `scheduled_items` every 60s and fires due reminders and
//! persistent-task advancement ticks (§4.9).
//!
//! Grounded on the supervised-task pattern in `resilience::supervisor` (the
//! scheduler is a single-instance supervised task, restarted per
//! `SupervisionStrategy::OneForOne` on panic) combined with the
//! polling-loop shape already used by the cognitive loop's own cycle
//! timing, and on `persistence/mod.rs`'s JSON-over-Redis-string helpers for
//! the item store itself.

use crate::memory::types::{ItemStatus, Recurrence, ScheduledItem};
use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use redis::{AsyncCommands, Client};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("validation: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

impl From<redis::RedisError> for SchedulerError {
    fn from(e: redis::RedisError) -> Self {
        Self::Transient(e.to_string())
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Validation(e.to_string())
    }
}

pub const POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(60);
const MAX_CONSECUTIVE_FAILURES: u32 = 3;

mod keys {
    pub const PREFIX: &str = "cortexd";
    pub const DUE_INDEX: &str = "cortexd:scheduled_items:due";

    pub fn item(id: &str) -> String {
        format!("{PREFIX}:scheduled_item:{id}")
    }
}

pub struct ScheduledItemStore {
    client: Client,
}

impl ScheduledItemStore {
    /// # Errors
    /// Returns [`SchedulerError::Transient`] if the Redis URL cannot be parsed.
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self { client })
    }

    async fn conn(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    pub async fn upsert(&self, item: &ScheduledItem) -> Result<()> {
        let mut conn = self.conn().await?;
        let json = serde_json::to_string(item)?;
        let _: () = conn.set(keys::item(&item.id.to_string()), json).await?;
        let _: () = conn
            .zadd(keys::DUE_INDEX, item.id.to_string(), item.due_at.timestamp())
            .await?;
        Ok(())
    }

    pub async fn remove_from_due_index(&self, id: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.zrem(keys::DUE_INDEX, id).await?;
        Ok(())
    }

    /// Items with `due_at <= now`, ordered by `due_at` ascending.
    pub async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledItem>> {
        let mut conn = self.conn().await?;
        let ids: Vec<String> = conn.zrangebyscore(keys::DUE_INDEX, 0, now.timestamp()).await?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            let raw: Option<String> = conn.get(keys::item(&id)).await?;
            if let Some(raw) = raw {
                match serde_json::from_str::<ScheduledItem>(&raw) {
                    Ok(item) if item.status == ItemStatus::Pending => items.push(item),
                    Ok(_) => {}
                    Err(e) => warn!(id, error = %e, "skipping unparseable scheduled item"),
                }
            }
        }
        Ok(items)
    }
}

/// Compute the next `due_at` for a recurring item, preserving time-of-day
/// alignment where the recurrence implies one. `interval:N` and `hourly`
/// simply add time; `daily`/`weekdays`/`weekly`/`monthly` add calendar units.
#[must_use]
pub fn next_occurrence(item: &ScheduledItem) -> Option<DateTime<Utc>> {
    match item.recurrence {
        Recurrence::None => None,
        Recurrence::Daily => Some(item.due_at + Duration::days(1)),
        Recurrence::Weekly => Some(item.due_at + Duration::weeks(1)),
        Recurrence::Monthly => Some(add_one_month(item.due_at)),
        Recurrence::Weekdays => Some(next_weekday(item.due_at)),
        Recurrence::Hourly => Some(next_hourly_within_window(item)),
        Recurrence::IntervalMinutes(n) => Some(item.due_at + Duration::minutes(i64::from(n))),
    }
}

fn add_one_month(t: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if t.month() == 12 { (t.year() + 1, 1) } else { (t.year(), t.month() + 1) };
    t.with_year(year)
        .and_then(|d| d.with_month(month))
        .unwrap_or(t + Duration::days(30))
}

fn next_weekday(t: DateTime<Utc>) -> DateTime<Utc> {
    use chrono::Weekday;
    let mut next = t + Duration::days(1);
    while matches!(next.weekday(), Weekday::Sat | Weekday::Sun) {
        next += Duration::days(1);
    }
    next
}

fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s, "%H:%M").ok()
}

/// Advance by one hour, then clamp forward into `[window_start, window_end]`
/// if the next slot would otherwise fall outside it.
fn next_hourly_within_window(item: &ScheduledItem) -> DateTime<Utc> {
    let next = item.due_at + Duration::hours(1);
    let (Some(start), Some(end)) = (
        item.window_start.as_deref().and_then(parse_hhmm),
        item.window_end.as_deref().and_then(parse_hhmm),
    ) else {
        return next;
    };
    let time_of_day = next.time();
    if time_of_day < start {
        next.date_naive().and_time(start).and_utc()
    } else if time_of_day > end {
        (next.date_naive() + Duration::days(1)).and_time(start).and_utc()
    } else {
        next
    }
}

/// One event the scheduler produces per fired item, handed to the caller to
/// route to the event bus or the prompt queue (§4.9).
#[derive(Debug, Clone)]
pub enum FiredItem {
    Notification(ScheduledItem),
    Prompt(ScheduledItem),
}

/// Run one poll tick: fetch due items, produce fire events, and persist the
/// post-fire state (recurrence advanced, or failed/cancelled).
///
/// # Errors
/// Returns [`SchedulerError::Transient`] if the store is unreachable.
pub async fn tick(store: &ScheduledItemStore, now: DateTime<Utc>) -> Result<Vec<FiredItem>> {
    let due = store.due(now).await?;
    let mut fired = Vec::with_capacity(due.len());

    for mut item in due {
        let event = match item.item_type {
            crate::memory::types::ItemType::Notification => FiredItem::Notification(item.clone()),
            crate::memory::types::ItemType::Prompt => FiredItem::Prompt(item.clone()),
        };
        fired.push(event);

        item.last_fired_at = Some(now);
        item.consecutive_failures = 0;

        match next_occurrence(&item) {
            Some(next_due) => {
                item.due_at = next_due;
                item.status = ItemStatus::Pending;
            }
            None => {
                item.status = ItemStatus::Fired;
            }
        }

        store.upsert(&item).await?;
        if item.status != ItemStatus::Pending {
            store.remove_from_due_index(&item.id.to_string()).await?;
        }
        info!(id = %item.id, "scheduled item fired");
    }

    Ok(fired)
}

/// Record a delivery failure, transitioning to `failed` after
/// [`MAX_CONSECUTIVE_FAILURES`] consecutive misses.
pub async fn record_failure(store: &ScheduledItemStore, mut item: ScheduledItem) -> Result<()> {
    item.consecutive_failures += 1;
    if item.consecutive_failures > MAX_CONSECUTIVE_FAILURES {
        item.status = ItemStatus::Failed;
        store.remove_from_due_index(&item.id.to_string()).await?;
    }
    store.upsert(&item).await
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::memory::types::ItemType;

    #[test]
    fn daily_recurrence_advances_by_one_day() {
        let item = ScheduledItem::one_shot(ItemType::Notification, "hi".into(), Utc::now());
        let mut item = item;
        item.recurrence = Recurrence::Daily;
        let next = next_occurrence(&item).expect("recurs");
        assert_eq!(next, item.due_at + Duration::days(1));
    }

    #[test]
    fn interval_recurrence_adds_minutes() {
        let mut item = ScheduledItem::one_shot(ItemType::Notification, "hi".into(), Utc::now());
        item.recurrence = Recurrence::IntervalMinutes(60);
        let next = next_occurrence(&item).expect("recurs");
        assert_eq!(next, item.due_at + Duration::hours(1));
    }

    #[test]
    fn none_recurrence_has_no_next_occurrence() {
        let item = ScheduledItem::one_shot(ItemType::Notification, "hi".into(), Utc::now());
        assert!(next_occurrence(&item).is_none());
    }

    #[test]
    fn weekdays_recurrence_skips_saturday_and_sunday() {
        use chrono::TimeZone;
        let friday = Utc.with_ymd_and_hms(2026, 7, 31, 9, 0, 0).unwrap();
        let mut item = ScheduledItem::one_shot(ItemType::Notification, "hi".into(), friday);
        item.recurrence = Recurrence::Weekdays;
        let next = next_occurrence(&item).expect("recurs");
        assert_eq!(next.weekday(), chrono::Weekday::Mon);
    }
}
