use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use companion_db::Database;
use companion_types::models::{NotificationType, User};

use crate::compose::{self, Decision};
use crate::push::{PushSender, deliver};

/// Share of subscribers considered on each random pass.
const RANDOM_PICK_PROBABILITY: f64 = 1.0 / 3.0;
/// Users idle for longer than this are nudged by the inactivity pass.
pub const INACTIVITY_THRESHOLD_HOURS: i64 = 6;

/// Background task that sends "thinking of you" notifications to a random
/// sample of subscribers.
pub async fn run_random_loop(db: Arc<Database>, sender: Arc<dyn PushSender>, interval_secs: u64) {
    let mut interval = job_interval(interval_secs);
    info!("Random notification job every {}s", interval_secs);

    loop {
        interval.tick().await;

        match random_pass(&db, sender.as_ref()).await {
            Ok(sent) => {
                if sent > 0 {
                    info!("Random job: sent {} notifications", sent);
                }
            }
            Err(e) => {
                warn!("Random job error: {}", e);
            }
        }
    }
}

/// Background task that nudges subscribers who have gone quiet.
pub async fn run_inactivity_loop(db: Arc<Database>, sender: Arc<dyn PushSender>, interval_secs: u64) {
    let mut interval = job_interval(interval_secs);
    info!("Inactivity notification job every {}s", interval_secs);

    loop {
        interval.tick().await;

        match inactivity_pass(&db, sender.as_ref()).await {
            Ok(sent) => {
                if sent > 0 {
                    info!("Inactivity job: sent {} notifications", sent);
                }
            }
            Err(e) => {
                warn!("Inactivity job error: {}", e);
            }
        }
    }
}

/// First tick after one full period; late ticks are dropped rather than bunched.
fn job_interval(secs: u64) -> tokio::time::Interval {
    let period = Duration::from_secs(secs.max(1));
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

pub async fn random_pass(db: &Arc<Database>, sender: &dyn PushSender) -> anyhow::Result<usize> {
    let candidates: Vec<User> = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<User>> {
            let mut rng = rand::rng();
            let mut users = Vec::new();
            for id in db.active_subscriber_ids()? {
                if !rng.random_bool(RANDOM_PICK_PROBABILITY) {
                    continue;
                }
                if let Some(user) = db.get_user_by_id(&id)? {
                    users.push(user);
                }
            }
            Ok(users)
        })
        .await??
    };

    debug!("Random job: {} candidates", candidates.len());
    notify_all(db, sender, candidates, NotificationType::Random).await
}

pub async fn inactivity_pass(db: &Arc<Database>, sender: &dyn PushSender) -> anyhow::Result<usize> {
    let cutoff = Utc::now() - chrono::Duration::hours(INACTIVITY_THRESHOLD_HOURS);
    let candidates: Vec<User> = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || -> anyhow::Result<Vec<User>> {
            let mut users = Vec::new();
            for user in db.inactive_subscribers(cutoff)? {
                if !db.sent_today_of_type(&user.id, NotificationType::Inactivity)? {
                    users.push(user);
                }
            }
            Ok(users)
        })
        .await??
    };

    debug!("Inactivity job: {} candidates", candidates.len());
    notify_all(db, sender, candidates, NotificationType::Inactivity).await
}

async fn notify_all(
    db: &Arc<Database>,
    sender: &dyn PushSender,
    users: Vec<User>,
    kind: NotificationType,
) -> anyhow::Result<usize> {
    let mut sent = 0;
    for user in users {
        match notify_user(db, sender, user, kind).await {
            Ok(true) => sent += 1,
            Ok(false) => {}
            Err(e) => warn!("Notification for user failed: {}", e),
        }
    }
    Ok(sent)
}

/// Filter, deliver and record one notification. Returns whether anything was delivered.
async fn notify_user(
    db: &Arc<Database>,
    sender: &dyn PushSender,
    user: User,
    kind: NotificationType,
) -> anyhow::Result<bool> {
    let (user, decision) = {
        let db = db.clone();
        tokio::task::spawn_blocking(move || {
            let decision = compose::decide(&db, &user, kind, Utc::now());
            (user, decision)
        })
        .await?
    };

    let composed = match decision? {
        Decision::Send(composed) => composed,
        Decision::Skip(reason) => {
            debug!("Skipping {} ({}): {}", user.id, kind.as_str(), reason);
            return Ok(false);
        }
    };

    if deliver(db, sender, &user.id, &composed.payload).await? == 0 {
        return Ok(false);
    }

    let db = db.clone();
    tokio::task::spawn_blocking(move || compose::record(&db, &user.id, &composed, kind)).await??;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use companion_types::api::NotificationPayload;
    use companion_types::models::{NotificationPreference, PushSubscription};

    use crate::push::PushError;

    #[derive(Default)]
    struct RecordingSender {
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushSender for RecordingSender {
        async fn send(&self, sub: &PushSubscription, _payload: &NotificationPayload) -> Result<(), PushError> {
            self.sent.lock().unwrap().push(sub.user_id.clone());
            Ok(())
        }
    }

    fn idle_subscriber(db: &Database, email: &str) -> User {
        let user = db.create_user(email, "Idle", Some("hash"), None, "email").unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "UPDATE users SET last_active = '2020-01-01T00:00:00.000000Z' WHERE id = ?1",
                [&user.id],
            )?;
            Ok(())
        })
        .unwrap();
        db.upsert_subscription(&user.id, &format!("https://push.example/{}", user.id), "k", "a")
            .unwrap();
        // quiet hours that never match, so the test does not depend on the clock
        let pref = NotificationPreference { quiet_hours_start: 0, quiet_hours_end: 0, ..Default::default() };
        db.set_preferences(&user.id, &pref).unwrap();
        user
    }

    #[tokio::test]
    async fn inactivity_nudges_once_per_day() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = idle_subscriber(&db, "idle@example.com");
        let sender = RecordingSender::default();

        assert_eq!(inactivity_pass(&db, &sender).await.unwrap(), 1);
        assert_eq!(inactivity_pass(&db, &sender).await.unwrap(), 0);
        assert_eq!(*sender.sent.lock().unwrap(), vec![user.id.clone()]);
        assert_eq!(db.notification_history(&user.id, 50).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn active_users_are_left_alone() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = idle_subscriber(&db, "busy@example.com");
        db.touch_user(&user.id).unwrap();

        let sender = RecordingSender::default();
        assert_eq!(inactivity_pass(&db, &sender).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn random_pass_never_exceeds_cap() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = idle_subscriber(&db, "cap@example.com");
        let sender = RecordingSender::default();

        for _ in 0..60 {
            random_pass(&db, &sender).await.unwrap();
        }
        // medium frequency
        assert!(db.count_sent_today(&user.id).unwrap() <= 5);
    }
}
