//! Reminder scheduler - polls the store for due reminders and delivers
//! them through the messaging collaborator.
//!
//! Delivery policy is at-least-once: `mark_sent` runs only after a
//! successful send, so a delivery failure re-fires the reminder next tick
//! and a failed `mark_sent` after delivery can duplicate a notification.
//! Duplicates beat silently dropped follow-ups.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use rolodex_core::domain::reminder::Reminder;
use rolodex_core::messaging::Messenger;
use rolodex_db::store::CrmStore;

pub struct ReminderScheduler {
    store: Arc<dyn CrmStore>,
    messenger: Arc<dyn Messenger>,
    poll_interval: Duration,
}

impl ReminderScheduler {
    pub fn new(
        store: Arc<dyn CrmStore>,
        messenger: Arc<dyn Messenger>,
        poll_interval: Duration,
    ) -> Self {
        Self { store, messenger, poll_interval }
    }

    /// Perpetual poll loop. Sleeps between ticks and stops cleanly when
    /// the shutdown channel flips to `true` or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            event_name = "scheduler.started",
            poll_interval_secs = self.poll_interval.as_secs(),
            "reminder scheduler started"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!(event_name = "scheduler.stopped", "reminder scheduler stopped");
                        return;
                    }
                }
            }
        }
    }

    /// One poll: fetch everything with `due_at <= now` still unsent,
    /// deliver each, then flip its `sent` flag. A store outage skips the
    /// tick; the next interval retries. Returns the delivered count.
    pub async fn tick(&self, now: DateTime<Utc>) -> usize {
        let due = match self.store.due_unsent_reminders(now).await {
            Ok(due) => due,
            Err(error) => {
                warn!(
                    event_name = "scheduler.tick_skipped",
                    error = %error,
                    "store unavailable; skipping tick"
                );
                return 0;
            }
        };

        if due.is_empty() {
            debug!(event_name = "scheduler.tick_idle", "no due reminders");
            return 0;
        }

        let mut delivered = 0;
        for reminder in due {
            let notification = render_notification(&reminder);
            if let Err(error) = self.messenger.send_text(reminder.chat_id, &notification).await {
                warn!(
                    event_name = "scheduler.delivery_failed",
                    reminder_id = %reminder.id,
                    chat_id = %reminder.chat_id,
                    error = %error,
                    "delivery failed; reminder re-fires next tick"
                );
                continue;
            }
            delivered += 1;

            if let Err(error) = self.store.mark_sent(reminder.id).await {
                warn!(
                    event_name = "scheduler.mark_sent_failed",
                    reminder_id = %reminder.id,
                    error = %error,
                    "delivered but mark-sent failed; duplicate delivery possible next tick"
                );
            } else {
                info!(
                    event_name = "scheduler.reminder_delivered",
                    reminder_id = %reminder.id,
                    chat_id = %reminder.chat_id,
                    "reminder delivered and marked sent"
                );
            }
        }

        delivered
    }
}

fn render_notification(reminder: &Reminder) -> String {
    format!(
        "🔔 CRM reminder\nCustomer: {}\n{}",
        reminder.customer_name.as_deref().unwrap_or("general"),
        reminder.text
    )
}
