use anyhow::Result;
use chrono::Utc;
use rusqlite::Row;
use tracing::warn;
use uuid::Uuid;

use companion_types::models::{
    Frequency, NotificationPreference, NotificationType, PushSubscription, SentNotification,
};

use crate::{Database, OptionalExt, now, parse_ts};

fn subscription_from_row(row: &Row) -> rusqlite::Result<PushSubscription> {
    Ok(PushSubscription {
        id: row.get(0)?,
        user_id: row.get(1)?,
        endpoint: row.get(2)?,
        p256dh: row.get(3)?,
        auth: row.get(4)?,
        is_active: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

fn sent_from_row(row: &Row) -> rusqlite::Result<SentNotification> {
    let kind: String = row.get(3)?;
    Ok(SentNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        character_id: row.get(2)?,
        notification_type: NotificationType::parse(&kind).unwrap_or(NotificationType::Random),
        title: row.get(4)?,
        body: row.get(5)?,
        sent_date: row.get(6)?,
        sent_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

/// UTC calendar day used to bucket the daily cap.
pub fn today() -> String {
    Utc::now().format("%Y-%m-%d").to_string()
}

impl Database {
    // -- Subscriptions --

    /// Insert or re-activate the subscription for `endpoint`, moving it to `user_id`.
    pub fn upsert_subscription(
        &self,
        user_id: &str,
        endpoint: &str,
        p256dh: &str,
        auth: &str,
    ) -> Result<PushSubscription> {
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, is_active, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6, ?6)
                 ON CONFLICT(endpoint) DO UPDATE SET
                    user_id = excluded.user_id,
                    p256dh = excluded.p256dh,
                    auth = excluded.auth,
                    is_active = 1,
                    updated_at = excluded.updated_at",
                rusqlite::params![Uuid::new_v4().to_string(), user_id, endpoint, p256dh, auth, ts],
            )?;
            let sub = conn.query_row(
                "SELECT id, user_id, endpoint, p256dh, auth, is_active, created_at
                 FROM push_subscriptions WHERE endpoint = ?1",
                [endpoint],
                subscription_from_row,
            )?;
            Ok(sub)
        })
    }

    pub fn active_subscriptions(&self, user_id: &str) -> Result<Vec<PushSubscription>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, endpoint, p256dh, auth, is_active, created_at
                 FROM push_subscriptions WHERE user_id = ?1 AND is_active = 1",
            )?;
            let rows = stmt
                .query_map([user_id], subscription_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users holding at least one active subscription.
    pub fn active_subscriber_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT DISTINCT user_id FROM push_subscriptions WHERE is_active = 1")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    pub fn deactivate_user_subscriptions(&self, user_id: &str) -> Result<usize> {
        self.with_conn(|conn| {
            Ok(conn.execute(
                "UPDATE push_subscriptions SET is_active = 0, updated_at = ?1 WHERE user_id = ?2 AND is_active = 1",
                (now(), user_id),
            )?)
        })
    }

    pub fn deactivate_subscription(&self, endpoint: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE push_subscriptions SET is_active = 0, updated_at = ?1 WHERE endpoint = ?2",
                (now(), endpoint),
            )?;
            Ok(n > 0)
        })
    }

    // -- Preferences --

    pub fn get_preferences(&self, user_id: &str) -> Result<Option<NotificationPreference>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT enabled, frequency, quiet_hours_start, quiet_hours_end
                 FROM notification_preferences WHERE user_id = ?1",
                [user_id],
                |row| {
                    let frequency: String = row.get(1)?;
                    Ok(NotificationPreference {
                        enabled: row.get(0)?,
                        frequency: Frequency::parse(&frequency).unwrap_or_else(|| {
                            warn!("Unknown frequency '{}', using medium", frequency);
                            Frequency::Medium
                        }),
                        quiet_hours_start: row.get(2)?,
                        quiet_hours_end: row.get(3)?,
                    })
                },
            )
            .optional()
        })
    }

    pub fn set_preferences(&self, user_id: &str, pref: &NotificationPreference) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO notification_preferences
                    (user_id, enabled, frequency, quiet_hours_start, quiet_hours_end, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    enabled = excluded.enabled,
                    frequency = excluded.frequency,
                    quiet_hours_start = excluded.quiet_hours_start,
                    quiet_hours_end = excluded.quiet_hours_end,
                    updated_at = excluded.updated_at",
                rusqlite::params![
                    user_id,
                    pref.enabled,
                    pref.frequency.as_str(),
                    pref.quiet_hours_start,
                    pref.quiet_hours_end,
                    now(),
                ],
            )?;
            Ok(())
        })
    }

    // -- Sent history --

    pub fn record_notification(
        &self,
        user_id: &str,
        character_id: &str,
        kind: NotificationType,
        title: &str,
        body: &str,
    ) -> Result<SentNotification> {
        let id = Uuid::new_v4().to_string();
        let sent_at = now();
        let sent_date = today();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sent_notifications
                    (id, user_id, character_id, notification_type, title, body, sent_date, sent_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![id, user_id, character_id, kind.as_str(), title, body, sent_date, sent_at],
            )?;
            Ok(())
        })?;
        Ok(SentNotification {
            id,
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            notification_type: kind,
            title: title.to_string(),
            body: body.to_string(),
            sent_date,
            sent_at: parse_ts(&sent_at),
        })
    }

    /// Notifications of any type sent to the user on the current UTC day.
    pub fn count_sent_today(&self, user_id: &str) -> Result<u32> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM sent_notifications WHERE user_id = ?1 AND sent_date = ?2",
                (user_id, today()),
                |r| r.get(0),
            )?)
        })
    }

    pub fn sent_today_of_type(&self, user_id: &str, kind: NotificationType) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM sent_notifications
                 WHERE user_id = ?1 AND sent_date = ?2 AND notification_type = ?3",
                (user_id, today(), kind.as_str()),
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn notification_history(&self, user_id: &str, limit: u32) -> Result<Vec<SentNotification>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, character_id, notification_type, title, body, sent_date, sent_at
                 FROM sent_notifications WHERE user_id = ?1
                 ORDER BY sent_at DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map((user_id, limit), sent_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}
