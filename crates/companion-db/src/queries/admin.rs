use anyhow::Result;
use chrono::{Duration, Utc};
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use companion_types::api::NameCount;
use companion_types::models::{ActivityLog, Admin, AdminRole, Announcement, UserNotification};

use crate::models::AdminRow;
use crate::{Database, OptionalExt, now, parse_opt_ts, parse_ts, ts};

const ADMIN_COLUMNS: &str = "id, email, username, role, created_at, last_login, password_hash";

fn admin_from_row(row: &Row) -> rusqlite::Result<AdminRow> {
    let role: String = row.get(3)?;
    Ok(AdminRow {
        admin: Admin {
            id: row.get(0)?,
            email: row.get(1)?,
            username: row.get(2)?,
            role: AdminRole::parse(&role).unwrap_or_else(|| {
                warn!("Unknown admin role '{}', downgrading to moderator", role);
                AdminRole::Moderator
            }),
            created_at: parse_ts(&row.get::<_, String>(4)?),
            last_login: parse_opt_ts(row.get(5)?),
        },
        password_hash: row.get(6)?,
    })
}

fn announcement_from_row(row: &Row) -> rusqlite::Result<Announcement> {
    Ok(Announcement {
        id: row.get(0)?,
        title: row.get(1)?,
        message: row.get(2)?,
        kind: row.get(3)?,
        is_active: row.get(4)?,
        created_by: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
        updated_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

fn notification_from_row(row: &Row) -> rusqlite::Result<UserNotification> {
    Ok(UserNotification {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        is_read: row.get(5)?,
        created_by: row.get(6)?,
        created_at: parse_ts(&row.get::<_, String>(7)?),
    })
}

/// One entry for the audit trail.
pub struct NewActivity<'a> {
    pub admin_id: &'a str,
    pub admin_email: &'a str,
    pub action: &'a str,
    pub target_type: Option<&'a str>,
    pub target_id: Option<&'a str>,
    pub details: Option<String>,
}

pub struct ActivitySummary {
    pub total_logs: i64,
    pub recent_activity_count: i64,
    pub actions_by_type: Vec<NameCount>,
}

impl Database {
    // -- Admins --

    pub fn create_admin(
        &self,
        email: &str,
        username: &str,
        password_hash: &str,
        role: AdminRole,
    ) -> Result<Admin> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO admins (id, email, username, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![id, email, username, password_hash, role.as_str(), now()],
            )?;
            query_admin(conn, "id", &id)?
                .map(|row| row.admin)
                .ok_or_else(|| anyhow::anyhow!("Admin vanished after insert: {}", id))
        })
    }

    pub fn get_admin_by_email(&self, email: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| query_admin(conn, "email", email))
    }

    pub fn get_admin_by_id(&self, id: &str) -> Result<Option<AdminRow>> {
        self.with_conn(|conn| query_admin(conn, "id", id))
    }

    pub fn list_admins(&self) -> Result<Vec<Admin>> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {} FROM admins ORDER BY created_at", ADMIN_COLUMNS);
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([], admin_from_row)?
                .map(|r| r.map(|row| row.admin))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_admins(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM admins", [], |r| r.get(0))?))
    }

    pub fn delete_admin(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM admins WHERE id = ?1", [id])? > 0))
    }

    pub fn record_admin_login(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE admins SET last_login = ?1 WHERE id = ?2", (now(), id))?;
            Ok(())
        })
    }

    /// Replace the email and/or password hash; absent values are left alone.
    pub fn update_admin_credentials(
        &self,
        id: &str,
        email: Option<&str>,
        password_hash: Option<&str>,
    ) -> Result<Option<Admin>> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE admins SET email = COALESCE(?1, email), password_hash = COALESCE(?2, password_hash)
                 WHERE id = ?3",
                (email, password_hash, id),
            )?;
            Ok(query_admin(conn, "id", id)?.map(|row| row.admin))
        })
    }

    // -- Activity logs --

    pub fn log_activity(&self, entry: NewActivity<'_>) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO activity_logs (id, admin_id, admin_email, action, target_type, target_id, details, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    Uuid::new_v4().to_string(),
                    entry.admin_id,
                    entry.admin_email,
                    entry.action,
                    entry.target_type,
                    entry.target_id,
                    entry.details,
                    now(),
                ],
            )?;
            Ok(())
        })
    }

    pub fn activity_logs(&self, limit: u32, action: Option<&str>) -> Result<Vec<ActivityLog>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, admin_id, admin_email, action, target_type, target_id, details, timestamp
                 FROM activity_logs
                 WHERE ?1 IS NULL OR action = ?1
                 ORDER BY timestamp DESC LIMIT ?2",
            )?;
            let rows = stmt
                .query_map((action, limit), |row| {
                    Ok(ActivityLog {
                        id: row.get(0)?,
                        admin_id: row.get(1)?,
                        admin_email: row.get(2)?,
                        action: row.get(3)?,
                        target_type: row.get(4)?,
                        target_id: row.get(5)?,
                        details: row.get(6)?,
                        timestamp: parse_ts(&row.get::<_, String>(7)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn activity_summary(&self) -> Result<ActivitySummary> {
        let since = ts(Utc::now() - Duration::hours(24));
        self.with_conn(|conn| {
            let total_logs = conn.query_row("SELECT COUNT(*) FROM activity_logs", [], |r| r.get(0))?;
            let recent_activity_count = conn.query_row(
                "SELECT COUNT(*) FROM activity_logs WHERE timestamp >= ?1",
                [&since],
                |r| r.get(0),
            )?;
            let mut stmt = conn.prepare(
                "SELECT action, COUNT(*) AS n FROM activity_logs GROUP BY action ORDER BY n DESC",
            )?;
            let actions_by_type = stmt
                .query_map([], |row| Ok(NameCount { name: row.get(0)?, count: row.get(1)? }))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ActivitySummary {
                total_logs,
                recent_activity_count,
                actions_by_type,
            })
        })
    }

    // -- Announcements --

    pub fn create_announcement(
        &self,
        title: &str,
        message: &str,
        kind: &str,
        is_active: bool,
        created_by: &str,
    ) -> Result<Announcement> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            let ts = now();
            conn.execute(
                "INSERT INTO announcements (id, title, message, kind, is_active, created_by, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
                rusqlite::params![id, title, message, kind, is_active, created_by, ts],
            )?;
            query_announcement(conn, &id)?
                .ok_or_else(|| anyhow::anyhow!("Announcement vanished after insert: {}", id))
        })
    }

    pub fn list_announcements(&self, active_only: bool) -> Result<Vec<Announcement>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, message, kind, is_active, created_by, created_at, updated_at
                 FROM announcements WHERE ?1 = 0 OR is_active = 1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([active_only], announcement_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn update_announcement(
        &self,
        id: &str,
        title: &str,
        message: &str,
        kind: &str,
        is_active: bool,
    ) -> Result<Option<Announcement>> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "UPDATE announcements SET title = ?1, message = ?2, kind = ?3, is_active = ?4, updated_at = ?5
                 WHERE id = ?6",
                rusqlite::params![title, message, kind, is_active, now(), id],
            )?;
            if n == 0 {
                return Ok(None);
            }
            query_announcement(conn, id)
        })
    }

    pub fn delete_announcement(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM announcements WHERE id = ?1", [id])? > 0))
    }

    // -- In-app notifications --

    pub fn create_user_notification(
        &self,
        user_id: Option<&str>,
        title: &str,
        message: &str,
        kind: &str,
        created_by: &str,
    ) -> Result<UserNotification> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO user_notifications (id, user_id, title, message, kind, is_read, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7)",
                rusqlite::params![id, user_id, title, message, kind, created_by, created_at],
            )?;
            Ok(())
        })?;
        Ok(UserNotification {
            id,
            user_id: user_id.map(str::to_string),
            title: title.to_string(),
            message: message.to_string(),
            kind: kind.to_string(),
            is_read: false,
            created_by: created_by.to_string(),
            created_at: parse_ts(&created_at),
        })
    }

    pub fn list_user_notifications(&self, limit: u32) -> Result<Vec<UserNotification>> {
        self.with_conn(|conn| select_notifications(conn, "1 = 1", [limit]))
    }

    /// Notifications addressed to `user_id` plus broadcasts.
    pub fn notifications_for_user(&self, user_id: &str, limit: u32) -> Result<Vec<UserNotification>> {
        self.with_conn(|conn| {
            select_notifications(conn, "user_id IS NULL OR user_id = ?2", (limit, user_id))
        })
    }
}

fn query_admin(conn: &Connection, column: &str, value: &str) -> Result<Option<AdminRow>> {
    let sql = format!("SELECT {} FROM admins WHERE {} = ?1", ADMIN_COLUMNS, column);
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], admin_from_row).optional()?;
    Ok(row)
}

fn query_announcement(conn: &Connection, id: &str) -> Result<Option<Announcement>> {
    let row = conn
        .query_row(
            "SELECT id, title, message, kind, is_active, created_by, created_at, updated_at
             FROM announcements WHERE id = ?1",
            [id],
            announcement_from_row,
        )
        .optional()?;
    Ok(row)
}

fn select_notifications<P: rusqlite::Params>(
    conn: &Connection,
    filter: &str,
    params: P,
) -> Result<Vec<UserNotification>> {
    let sql = format!(
        "SELECT id, user_id, title, message, kind, is_read, created_by, created_at
         FROM user_notifications WHERE {}
         ORDER BY created_at DESC LIMIT ?1",
        filter
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params, notification_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}
