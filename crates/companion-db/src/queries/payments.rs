use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use companion_types::api::SubscriptionBreakdown;
use companion_types::models::{PaymentMethod, PaymentTransaction, UserSubscription};
use companion_types::plans::tier_of;

use crate::{Database, OptionalExt, now, parse_ts, ts};

const TX_COLUMNS: &str = "id, session_id, user_id, user_email, plan_id, amount, currency, payment_method, status, payment_status, created_at, updated_at";

fn method(raw: &str) -> PaymentMethod {
    PaymentMethod::parse(raw).unwrap_or_else(|| {
        warn!("Unknown payment method '{}', assuming stripe", raw);
        PaymentMethod::Stripe
    })
}

fn transaction_from_row(row: &Row) -> rusqlite::Result<PaymentTransaction> {
    Ok(PaymentTransaction {
        id: row.get(0)?,
        session_id: row.get(1)?,
        user_id: row.get(2)?,
        user_email: row.get(3)?,
        plan_id: row.get(4)?,
        amount: row.get(5)?,
        currency: row.get(6)?,
        payment_method: method(&row.get::<_, String>(7)?),
        status: row.get(8)?,
        payment_status: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?),
        updated_at: parse_ts(&row.get::<_, String>(11)?),
    })
}

pub struct NewTransaction<'a> {
    pub session_id: &'a str,
    pub user_id: &'a str,
    pub user_email: &'a str,
    pub plan_id: &'a str,
    pub amount: f64,
    pub currency: &'a str,
    pub payment_method: PaymentMethod,
}

impl Database {
    /// Record a freshly opened checkout session as `initiated` / `pending`.
    pub fn create_transaction(&self, tx: NewTransaction<'_>) -> Result<PaymentTransaction> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO payment_transactions
                    (id, session_id, user_id, user_email, plan_id, amount, currency, payment_method,
                     status, payment_status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'initiated', 'pending', ?9, ?9)",
                rusqlite::params![
                    id,
                    tx.session_id,
                    tx.user_id,
                    tx.user_email,
                    tx.plan_id,
                    tx.amount,
                    tx.currency,
                    tx.payment_method.as_str(),
                    ts,
                ],
            )?;
            query_transaction(conn, tx.session_id)?
                .ok_or_else(|| anyhow::anyhow!("Transaction vanished after insert: {}", tx.session_id))
        })
    }

    pub fn get_transaction(&self, session_id: &str) -> Result<Option<PaymentTransaction>> {
        self.with_conn(|conn| query_transaction(conn, session_id))
    }

    /// Store the provider's view of a session. Returns the updated row and
    /// whether this call is the one that moved it to `paid`.
    pub fn update_transaction_status(
        &self,
        session_id: &str,
        status: &str,
        payment_status: &str,
    ) -> Result<Option<(PaymentTransaction, bool)>> {
        self.with_conn(|conn| {
            let Some(before) = query_transaction(conn, session_id)? else {
                return Ok(None);
            };
            conn.execute(
                "UPDATE payment_transactions SET status = ?1, payment_status = ?2, updated_at = ?3
                 WHERE session_id = ?4",
                (status, payment_status, now(), session_id),
            )?;
            let newly_paid = before.payment_status != "paid" && payment_status == "paid";
            Ok(query_transaction(conn, session_id)?.map(|after| (after, newly_paid)))
        })
    }

    pub fn user_transactions(&self, user_id: &str) -> Result<Vec<PaymentTransaction>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM payment_transactions WHERE user_id = ?1 ORDER BY created_at DESC",
                TX_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([user_id], transaction_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Subscriptions --

    /// Start (or restart) the user's plan for `days` days from now.
    pub fn activate_subscription(
        &self,
        user_id: &str,
        plan_id: &str,
        payment_method: PaymentMethod,
        session_id: &str,
        days: i64,
    ) -> Result<UserSubscription> {
        let started = Utc::now();
        let expires = started + Duration::days(days);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_subscriptions (user_id, plan_id, status, payment_method, session_id, started_at, expires_at)
                 VALUES (?1, ?2, 'active', ?3, ?4, ?5, ?6)
                 ON CONFLICT(user_id) DO UPDATE SET
                    plan_id = excluded.plan_id,
                    status = 'active',
                    payment_method = excluded.payment_method,
                    session_id = excluded.session_id,
                    started_at = excluded.started_at,
                    expires_at = excluded.expires_at",
                rusqlite::params![user_id, plan_id, payment_method.as_str(), session_id, ts(started), ts(expires)],
            )?;
            query_subscription(conn, user_id)?
                .ok_or_else(|| anyhow::anyhow!("Subscription vanished after upsert: {}", user_id))
        })
    }

    /// The user's subscription if it is active and not yet expired.
    pub fn current_subscription(&self, user_id: &str) -> Result<Option<UserSubscription>> {
        let sub = self.with_conn(|conn| query_subscription(conn, user_id))?;
        Ok(sub.filter(|s| s.status == "active" && s.expires_at > Utc::now()))
    }

    /// Live subscriptions per tier; everyone else counts as free.
    pub fn subscription_breakdown(&self) -> Result<SubscriptionBreakdown> {
        let cutoff = now();
        self.with_conn(|conn| {
            let users: i64 = conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?;
            let mut stmt = conn.prepare(
                "SELECT plan_id FROM user_subscriptions WHERE status = 'active' AND expires_at > ?1",
            )?;
            let plans = stmt
                .query_map([&cutoff], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let premium = plans.iter().filter(|p| tier_of(p) == "premium").count() as i64;
            let ultimate = plans.iter().filter(|p| tier_of(p) == "ultimate").count() as i64;
            Ok(SubscriptionBreakdown {
                free: (users - premium - ultimate).max(0),
                premium,
                ultimate,
            })
        })
    }
}

fn query_transaction(conn: &Connection, session_id: &str) -> Result<Option<PaymentTransaction>> {
    let sql = format!("SELECT {} FROM payment_transactions WHERE session_id = ?1", TX_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([session_id], transaction_from_row).optional()?;
    Ok(row)
}

fn query_subscription(conn: &Connection, user_id: &str) -> Result<Option<UserSubscription>> {
    conn.query_row(
        "SELECT user_id, plan_id, status, payment_method, session_id, started_at, expires_at
         FROM user_subscriptions WHERE user_id = ?1",
        [user_id],
        |row| {
            Ok(UserSubscription {
                user_id: row.get(0)?,
                plan_id: row.get(1)?,
                status: row.get(2)?,
                payment_method: method(&row.get::<_, String>(3)?),
                session_id: row.get(4)?,
                started_at: parse_ts(&row.get::<_, String>(5)?),
                expires_at: parse_ts(&row.get::<_, String>(6)?),
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    fn open(db: &Database, session_id: &str, user_id: &str) -> PaymentTransaction {
        db.create_transaction(NewTransaction {
            session_id,
            user_id,
            user_email: "p@example.com",
            plan_id: "premium_monthly",
            amount: 9.99,
            currency: "usd",
            payment_method: PaymentMethod::Stripe,
        })
        .unwrap()
    }

    #[test]
    fn paid_transition_reported_once() {
        let db = fixtures::db();
        let tx = open(&db, "cs_test_1", "u1");
        assert_eq!(tx.status, "initiated");
        assert_eq!(tx.payment_status, "pending");

        let (_, first) = db.update_transaction_status("cs_test_1", "complete", "paid").unwrap().unwrap();
        let (_, second) = db.update_transaction_status("cs_test_1", "complete", "paid").unwrap().unwrap();
        assert!(first);
        assert!(!second);
        assert!(db.update_transaction_status("missing", "complete", "paid").unwrap().is_none());
    }

    #[test]
    fn expired_subscription_is_not_current() {
        let db = fixtures::db();
        db.activate_subscription("u1", "premium_monthly", PaymentMethod::Stripe, "cs", 30).unwrap();
        assert_eq!(db.current_subscription("u1").unwrap().unwrap().plan_id, "premium_monthly");

        db.activate_subscription("u2", "ultimate_yearly", PaymentMethod::Paypal, "pp", -1).unwrap();
        assert!(db.current_subscription("u2").unwrap().is_none());
    }

    #[test]
    fn breakdown_counts_free_users() {
        let db = fixtures::db();
        let a = fixtures::user(&db, "a@example.com");
        fixtures::user(&db, "b@example.com");
        db.activate_subscription(&a.id, "ultimate_monthly", PaymentMethod::Stripe, "cs", 30).unwrap();
        let breakdown = db.subscription_breakdown().unwrap();
        assert_eq!(breakdown.free, 1);
        assert_eq!(breakdown.premium, 0);
        assert_eq!(breakdown.ultimate, 1);
        assert_eq!(db.user_transactions(&a.id).unwrap().len(), 0);
    }
}
