//! Recurring notification schedules
//!
//! Evaluates cron schedules from the notifications file to determine when to
//! push categorized messages (morning greetings, welfare checks, reminders)
//! through the connection.

use crate::connection::ConnectionHandle;
use crate::notify::{format_notification, NotificationCategory};
use chrono::{DateTime, Utc};
use cron::Schedule;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// One parsed schedule entry
#[derive(Debug, Clone)]
pub struct ScheduledNotification {
    pub cron_expr: String,
    pub schedule: Schedule,
    pub category: NotificationCategory,
    pub destination: String,
    pub body: String,
}

static NOTIFY_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^NOTIFY:\s*(.+?)\s*\|\s*(\S+)\s*\|\s*(\S+)\s*\|\s*(.+)$")
        .expect("invalid NOTIFY regex")
});

/// Manages the recurring notification set
pub struct NotificationSchedule {
    entries: Vec<ScheduledNotification>,
    /// Last fire time per entry, indexed like `entries`
    last_fired: Vec<DateTime<Utc>>,
}

impl NotificationSchedule {
    /// Parse schedule entries from file text.
    /// Format: NOTIFY: <cron> | <category> | <destination> | <body>
    /// Example: NOTIFY: 0 9 * * * | good_morning | +16175551234 | Rise and shine!
    pub fn parse_entries(text: &str) -> Vec<ScheduledNotification> {
        let mut entries = Vec::new();

        for cap in NOTIFY_LINE.captures_iter(text) {
            let cron_expr = cap.get(1).map(|m| m.as_str().trim()).unwrap_or("");
            let category = cap.get(2).map(|m| m.as_str().trim()).unwrap_or("");
            let destination = cap.get(3).map(|m| m.as_str().trim()).unwrap_or("");
            let body = cap.get(4).map(|m| m.as_str().trim()).unwrap_or("");

            // Cron crate needs 6 fields (sec min hour dom month dow);
            // prepend seconds when given the common 5-field form
            let full_cron = if cron_expr.split_whitespace().count() == 5 {
                format!("0 {}", cron_expr)
            } else {
                cron_expr.to_string()
            };

            match Schedule::from_str(&full_cron) {
                Ok(schedule) => {
                    entries.push(ScheduledNotification {
                        cron_expr: cron_expr.to_string(),
                        schedule,
                        category: NotificationCategory::parse(category),
                        destination: destination.to_string(),
                        body: body.to_string(),
                    });
                }
                Err(e) => {
                    warn!(cron = %cron_expr, error = %e, "Invalid cron expression, skipping");
                }
            }
        }

        entries
    }

    /// Build the schedule set from `entries`, arming each at `now` so past
    /// occurrences don't fire at startup
    pub fn new(entries: Vec<ScheduledNotification>, now: DateTime<Utc>) -> Self {
        let last_fired = vec![now; entries.len()];
        Self {
            entries,
            last_fired,
        }
    }

    /// Load the schedule set from a file; a missing file means an empty set
    pub fn load(path: &Path, now: DateTime<Utc>) -> Self {
        let entries = match std::fs::read_to_string(path) {
            Ok(text) => Self::parse_entries(&text),
            Err(e) => {
                info!(path = %path.display(), error = %e, "No notifications file, scheduler idle");
                Vec::new()
            }
        };

        if !entries.is_empty() {
            info!(count = entries.len(), "Loaded notification schedules");
        }
        Self::new(entries, now)
    }

    /// Check for due entries and return (destination, formatted text) pairs.
    /// Each entry fires at most once per matching occurrence.
    pub fn check_due(&mut self, now: DateTime<Utc>) -> Vec<(String, String)> {
        let mut due = Vec::new();

        for (idx, entry) in self.entries.iter().enumerate() {
            if let Some(next) = entry.schedule.after(&self.last_fired[idx]).next() {
                if next <= now {
                    due.push((
                        entry.destination.clone(),
                        format_notification(entry.category, &entry.body),
                    ));
                    self.last_fired[idx] = now;
                }
            }
        }

        due
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run the notifier loop: load the file once, then tick on `interval`,
/// sending whatever is due. Send failures (typically `NotConnected` while a
/// pairing is outstanding) are logged and never stop the ticker.
pub async fn run(connection: ConnectionHandle, path: PathBuf, interval: Duration) {
    let mut schedules = NotificationSchedule::load(&path, Utc::now());
    if schedules.is_empty() {
        return;
    }

    loop {
        tokio::time::sleep(interval).await;

        for (destination, text) in schedules.check_due(Utc::now()) {
            debug!(destination = %destination, "Scheduled notification due");
            if let Err(e) = connection.send(&destination, &text).await {
                warn!(destination = %destination, error = %e, "Scheduled send failed");
            }
        }
    }
}
