use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row};
use uuid::Uuid;

use companion_types::api::DayCount;
use companion_types::models::User;

use crate::models::{SessionRow, UserRow};
use crate::{Database, OptionalExt, now, parse_opt_ts, parse_ts, ts};

const USER_COLUMNS: &str =
    "id, email, username, picture, auth_provider, created_at, last_active, password_hash";

fn user_from_row(row: &Row) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        user: User {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            picture: row.get(3)?,
            auth_provider: row.get(4)?,
            created_at: parse_ts(&row.get::<_, String>(5)?),
            last_active: parse_opt_ts(row.get(6)?),
        },
        password_hash: row.get(7)?,
    })
}

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        email: &str,
        username: &str,
        password_hash: Option<&str>,
        picture: Option<&str>,
        auth_provider: &str,
    ) -> Result<User> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, email, username, password_hash, picture, auth_provider, created_at, last_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![id, email, username, password_hash, picture, auth_provider, created_at],
            )?;
            query_user(conn, "id", &id)?
                .map(|row| row.user)
                .ok_or_else(|| anyhow::anyhow!("User vanished after insert: {}", id))
        })
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user(conn, "email", email))
    }

    pub fn get_user_by_id(&self, id: &str) -> Result<Option<User>> {
        self.with_conn(|conn| Ok(query_user(conn, "id", id)?.map(|row| row.user)))
    }

    /// Find or create the user behind a social login, refreshing name and picture.
    pub fn upsert_oauth_user(&self, email: &str, name: &str, picture: Option<&str>) -> Result<User> {
        if let Some(existing) = self.get_user_by_email(email)? {
            let id = existing.user.id;
            self.with_conn(|conn| {
                conn.execute(
                    "UPDATE users SET username = ?1, picture = COALESCE(?2, picture), last_active = ?3 WHERE id = ?4",
                    rusqlite::params![name, picture, now(), id],
                )?;
                Ok(())
            })?;
            return self
                .get_user_by_id(&id)?
                .ok_or_else(|| anyhow::anyhow!("User vanished after update: {}", id));
        }
        self.create_user(email, name, None, picture, "google")
    }

    pub fn touch_user(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("UPDATE users SET last_active = ?1 WHERE id = ?2", (now(), id))?;
            Ok(n > 0)
        })
    }

    pub fn list_users(&self, skip: u32, limit: u32) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users ORDER BY created_at DESC LIMIT ?1 OFFSET ?2",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map((limit, skip), user_from_row)?
                .map(|r| r.map(|row| row.user))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_users(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |r| r.get(0))?))
    }

    /// Signups per UTC day for the last `days` days, oldest first, zero-filled.
    pub fn users_by_day(&self, days: i64) -> Result<Vec<DayCount>> {
        self.with_conn(|conn| count_by_day(conn, "users", "created_at", days))
    }

    /// Users with an active push subscription whose last activity is older than `cutoff`.
    pub fn inactive_subscribers(&self, cutoff: DateTime<Utc>) -> Result<Vec<User>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM users u
                 WHERE COALESCE(u.last_active, u.created_at) < ?1
                   AND EXISTS (SELECT 1 FROM push_subscriptions p WHERE p.user_id = u.id AND p.is_active = 1)
                 ORDER BY COALESCE(u.last_active, u.created_at)",
                USER_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([ts(cutoff)], user_from_row)?
                .map(|r| r.map(|row| row.user))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete a user and everything they own.
    pub fn delete_user(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM messages WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM favorites WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM characters WHERE is_custom = 1 AND user_id = ?1", [id])?;
            tx.execute("DELETE FROM images WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM user_sessions WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM push_subscriptions WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM notification_preferences WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM sent_notifications WHERE user_id = ?1", [id])?;
            tx.execute("DELETE FROM user_subscriptions WHERE user_id = ?1", [id])?;
            let n = tx.execute("DELETE FROM users WHERE id = ?1", [id])?;
            tx.commit()?;
            Ok(n > 0)
        })
    }

    // -- Sessions --

    pub fn create_session(&self, token: &str, user_id: &str, ttl: Duration) -> Result<()> {
        let expires_at = ts(Utc::now() + ttl);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO user_sessions (session_token, user_id, expires_at, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (token, user_id, expires_at, now()),
            )?;
            Ok(())
        })
    }

    /// Live session for `token`; expired sessions are removed and reported as absent.
    pub fn get_session(&self, token: &str) -> Result<Option<SessionRow>> {
        let session = self.with_conn(|conn| {
            conn.query_row(
                "SELECT session_token, user_id, expires_at FROM user_sessions WHERE session_token = ?1",
                [token],
                |row| {
                    Ok(SessionRow {
                        session_token: row.get(0)?,
                        user_id: row.get(1)?,
                        expires_at: parse_ts(&row.get::<_, String>(2)?),
                    })
                },
            )
            .optional()
        })?;

        match session {
            Some(s) if s.expires_at <= Utc::now() => {
                self.delete_session(&s.session_token)?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn delete_session(&self, token: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM user_sessions WHERE session_token = ?1", [token])?;
            Ok(())
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>> {
    let sql = format!("SELECT {} FROM users WHERE {} = ?1", USER_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

/// Zero-filled per-day counts of `table.column` for the trailing `days` days.
pub(crate) fn count_by_day(
    conn: &Connection,
    table: &str,
    column: &str,
    days: i64,
) -> Result<Vec<DayCount>> {
    let today = Utc::now().date_naive();
    let first = today - Duration::days(days - 1);

    let sql = format!(
        "SELECT substr({col}, 1, 10) AS day, COUNT(*) FROM {table}
         WHERE substr({col}, 1, 10) >= ?1
         GROUP BY day",
        col = column,
        table = table
    );
    let mut stmt = conn.prepare(&sql)?;
    let counts: std::collections::HashMap<String, i64> = stmt
        .query_map([first.format("%Y-%m-%d").to_string()], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<_, _>>()?;

    Ok((0..days)
        .map(|offset| {
            let date = (first + Duration::days(offset)).format("%Y-%m-%d").to_string();
            let count = counts.get(&date).copied().unwrap_or(0);
            DayCount { date, count }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn create_and_lookup() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "a@example.com");
        let row = db.get_user_by_email("a@example.com").unwrap().unwrap();
        assert_eq!(row.user.id, user.id);
        assert_eq!(row.password_hash.as_deref(), Some("hash"));
        assert!(db.create_user("a@example.com", "Dup", None, None, "email").is_err());
    }

    #[test]
    fn oauth_upsert_reuses_account() {
        let db = fixtures::db();
        let first = db.upsert_oauth_user("g@example.com", "G", Some("pic.png")).unwrap();
        let again = db.upsert_oauth_user("g@example.com", "G2", None).unwrap();
        assert_eq!(first.id, again.id);
        assert_eq!(again.username, "G2");
        assert_eq!(again.picture.as_deref(), Some("pic.png"));
        assert_eq!(again.auth_provider, "google");
    }

    #[test]
    fn sessions_expire() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "s@example.com");
        db.create_session("live", &user.id, chrono::Duration::days(7)).unwrap();
        db.create_session("dead", &user.id, chrono::Duration::seconds(-1)).unwrap();
        assert!(db.get_session("live").unwrap().is_some());
        assert!(db.get_session("dead").unwrap().is_none());
    }

    #[test]
    fn users_by_day_is_zero_filled() {
        let db = fixtures::db();
        fixtures::user(&db, "d@example.com");
        let days = db.users_by_day(7).unwrap();
        assert_eq!(days.len(), 7);
        assert_eq!(days.last().unwrap().count, 1);
        assert_eq!(days.iter().map(|d| d.count).sum::<i64>(), 1);
    }

    #[test]
    fn delete_cascades() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "del@example.com");
        let character_id = fixtures::first_character_id(&db);
        db.add_favorite(&user.id, &character_id).unwrap();
        assert!(db.delete_user(&user.id).unwrap());
        assert!(!db.is_favorite(&user.id, &character_id).unwrap());
        assert!(db.get_user_by_id(&user.id).unwrap().is_none());
    }
}
