use anyhow::Result;
use rusqlite::Row;
use uuid::Uuid;

use companion_types::models::GeneratedImage;

use crate::{Database, now, parse_ts};

fn image_from_row(row: &Row) -> rusqlite::Result<GeneratedImage> {
    Ok(GeneratedImage {
        id: row.get(0)?,
        user_id: row.get(1)?,
        prompt: row.get(2)?,
        style: row.get(3)?,
        image_data: row.get(4)?,
        mime_type: row.get(5)?,
        created_at: parse_ts(&row.get::<_, String>(6)?),
    })
}

impl Database {
    pub fn insert_image(
        &self,
        user_id: &str,
        prompt: &str,
        style: &str,
        image_data: &str,
        mime_type: &str,
    ) -> Result<GeneratedImage> {
        let id = Uuid::new_v4().to_string();
        let created_at = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO images (id, user_id, prompt, style, image_data, mime_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, user_id, prompt, style, image_data, mime_type, created_at],
            )?;
            Ok(())
        })?;
        Ok(GeneratedImage {
            id,
            user_id: user_id.to_string(),
            prompt: prompt.to_string(),
            style: style.to_string(),
            image_data: image_data.to_string(),
            mime_type: mime_type.to_string(),
            created_at: parse_ts(&created_at),
        })
    }

    pub fn list_user_images(&self, user_id: &str) -> Result<Vec<GeneratedImage>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, prompt, style, image_data, mime_type, created_at
                 FROM images WHERE user_id = ?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([user_id], image_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Only the owner's image is removed.
    pub fn delete_image(&self, id: &str, user_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM images WHERE id = ?1 AND user_id = ?2", (id, user_id))?;
            Ok(n > 0)
        })
    }

    pub fn count_images(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM images", [], |r| r.get(0))?))
    }
}

#[cfg(test)]
mod tests {
    use crate::queries::fixtures;

    #[test]
    fn images_are_owner_scoped() {
        let db = fixtures::db();
        let img = db.insert_image("u1", "a cat", "anime", "aGVsbG8=", "image/png").unwrap();
        assert_eq!(db.list_user_images("u1").unwrap().len(), 1);
        assert!(db.list_user_images("u2").unwrap().is_empty());
        assert!(!db.delete_image(&img.id, "u2").unwrap());
        assert!(db.delete_image(&img.id, "u1").unwrap());
        assert_eq!(db.count_images().unwrap(), 0);
    }
}
