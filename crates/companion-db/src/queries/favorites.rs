use anyhow::Result;
use uuid::Uuid;

use companion_types::models::Character;

use super::characters::select_characters;
use crate::{Database, now};

impl Database {
    /// Returns false when the pair was already present.
    pub fn add_favorite(&self, user_id: &str, character_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "INSERT OR IGNORE INTO favorites (id, user_id, character_id, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                (Uuid::new_v4().to_string(), user_id, character_id, now()),
            )?;
            Ok(n > 0)
        })
    }

    pub fn remove_favorite(&self, user_id: &str, character_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute(
                "DELETE FROM favorites WHERE user_id = ?1 AND character_id = ?2",
                (user_id, character_id),
            )?;
            Ok(n > 0)
        })
    }

    pub fn is_favorite(&self, user_id: &str, character_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM favorites WHERE user_id = ?1 AND character_id = ?2",
                (user_id, character_id),
                |r| r.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn favorite_ids(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT character_id FROM favorites WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    /// Favorited characters that still exist, newest favorite first.
    pub fn list_favorites(&self, user_id: &str) -> Result<Vec<Character>> {
        let ids = self.favorite_ids(user_id)?;
        self.with_conn(|conn| {
            let mut out = Vec::with_capacity(ids.len());
            for id in &ids {
                out.extend(select_characters(conn, "id = ?1", &[id.as_str()])?);
            }
            Ok(out)
        })
    }

    pub fn count_favorites(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM favorites", [], |r| r.get(0))?))
    }
}
