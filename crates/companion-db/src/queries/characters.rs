use anyhow::Result;
use rusqlite::{Connection, Row};
use tracing::warn;
use uuid::Uuid;

use companion_types::api::CharacterUpdateRequest;
use companion_types::models::{Character, CharacterCategory};

use crate::{Database, decode_list, encode_list, now, parse_ts};

const CHARACTER_COLUMNS: &str = "id, name, age, personality, traits, category, avatar_url, description, occupation, is_custom, user_id, created_at";

fn character_from_row(row: &Row) -> rusqlite::Result<Character> {
    let category: String = row.get(5)?;
    let id: String = row.get(0)?;
    Ok(Character {
        category: CharacterCategory::parse(&category).unwrap_or_else(|| {
            warn!("Unknown category '{}' on character '{}'", category, id);
            CharacterCategory::Custom
        }),
        id,
        name: row.get(1)?,
        age: row.get(2)?,
        personality: row.get(3)?,
        traits: decode_list(&row.get::<_, String>(4)?),
        avatar_url: row.get(6)?,
        description: row.get(7)?,
        occupation: row.get(8)?,
        is_custom: row.get(9)?,
        user_id: row.get(10)?,
        created_at: parse_ts(&row.get::<_, String>(11)?),
    })
}

pub struct NewCharacter<'a> {
    pub user_id: &'a str,
    pub name: &'a str,
    pub age: u32,
    pub personality: &'a str,
    pub description: &'a str,
    pub occupation: Option<&'a str>,
    pub traits: &'a [String],
    pub avatar_url: &'a str,
}

impl Database {
    /// Built-in catalog, optionally filtered by category. `Custom` lists every
    /// user-authored character instead.
    pub fn list_characters(&self, category: Option<CharacterCategory>) -> Result<Vec<Character>> {
        self.with_conn(|conn| match category {
            Some(CharacterCategory::Custom) => {
                select_characters(conn, "is_custom = 1 ORDER BY created_at DESC", &[])
            }
            Some(cat) => select_characters(
                conn,
                "is_custom = 0 AND category = ?1 ORDER BY rowid",
                &[cat.as_str()],
            ),
            None => select_characters(conn, "is_custom = 0 ORDER BY rowid", &[]),
        })
    }

    /// Any character, built-in or custom.
    pub fn get_character(&self, id: &str) -> Result<Option<Character>> {
        self.with_conn(|conn| Ok(select_characters(conn, "id = ?1", &[id])?.into_iter().next()))
    }

    pub fn get_custom_character(&self, id: &str) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            Ok(select_characters(conn, "id = ?1 AND is_custom = 1", &[id])?.into_iter().next())
        })
    }

    pub fn list_user_characters(&self, user_id: &str) -> Result<Vec<Character>> {
        self.with_conn(|conn| {
            select_characters(conn, "is_custom = 1 AND user_id = ?1 ORDER BY created_at DESC", &[user_id])
        })
    }

    pub fn create_custom_character(&self, new: NewCharacter<'_>) -> Result<Character> {
        let id = Uuid::new_v4().to_string();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO characters
                    (id, name, age, personality, traits, category, avatar_url, description, occupation, is_custom, user_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'Custom', ?6, ?7, ?8, 1, ?9, ?10)",
                rusqlite::params![
                    id,
                    new.name,
                    new.age,
                    new.personality,
                    encode_list(new.traits),
                    new.avatar_url,
                    new.description,
                    new.occupation,
                    new.user_id,
                    now(),
                ],
            )?;
            select_characters(conn, "id = ?1", &[id.as_str()])?
                .into_iter()
                .next()
                .ok_or_else(|| anyhow::anyhow!("Character vanished after insert: {}", id))
        })
    }

    /// Delete a custom character. With `owner` set, only that user's character matches.
    pub fn delete_custom_character(&self, id: &str, owner: Option<&str>) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = match owner {
                Some(user_id) => tx.execute(
                    "DELETE FROM characters WHERE id = ?1 AND is_custom = 1 AND user_id = ?2",
                    (id, user_id),
                )?,
                None => tx.execute("DELETE FROM characters WHERE id = ?1 AND is_custom = 1", [id])?,
            };
            if n > 0 {
                tx.execute("DELETE FROM favorites WHERE character_id = ?1", [id])?;
            }
            tx.commit()?;
            Ok(n > 0)
        })
    }

    pub fn delete_default_character(&self, id: &str) -> Result<bool> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let n = tx.execute("DELETE FROM characters WHERE id = ?1 AND is_custom = 0", [id])?;
            if n > 0 {
                tx.execute("DELETE FROM favorites WHERE character_id = ?1", [id])?;
            }
            tx.commit()?;
            Ok(n > 0)
        })
    }

    /// Apply the provided fields; `is_custom` selects which half of the catalog is searched.
    pub fn update_character(
        &self,
        id: &str,
        is_custom: bool,
        update: &CharacterUpdateRequest,
    ) -> Result<Option<Character>> {
        self.with_conn(|conn| {
            let Some(current) = select_characters(conn, "id = ?1 AND is_custom = ?2", &[id, if is_custom { "1" } else { "0" }])?
                .into_iter()
                .next()
            else {
                return Ok(None);
            };

            let traits = update.traits.clone().unwrap_or(current.traits);
            conn.execute(
                "UPDATE characters SET name = ?1, age = ?2, personality = ?3, traits = ?4,
                    avatar_url = ?5, description = ?6, occupation = ?7
                 WHERE id = ?8",
                rusqlite::params![
                    update.name.as_deref().unwrap_or(&current.name),
                    update.age.unwrap_or(current.age),
                    update.personality.as_deref().unwrap_or(&current.personality),
                    encode_list(&traits),
                    update.avatar_url.as_deref().unwrap_or(&current.avatar_url),
                    update.description.as_deref().unwrap_or(&current.description),
                    update.occupation.as_deref().or(current.occupation.as_deref()),
                    id,
                ],
            )?;
            Ok(select_characters(conn, "id = ?1", &[id])?.into_iter().next())
        })
    }

    pub fn count_characters(&self, is_custom: bool) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM characters WHERE is_custom = ?1",
                [is_custom],
                |r| r.get(0),
            )?)
        })
    }

    /// Ids of the built-in catalog. Custom characters stay private to their owner.
    pub fn catalog_character_ids(&self) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM characters WHERE is_custom = 0")?;
            let ids = stmt
                .query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }
}

pub(super) fn select_characters(conn: &Connection, filter: &str, params: &[&str]) -> Result<Vec<Character>> {
    let sql = format!("SELECT {} FROM characters WHERE {}", CHARACTER_COLUMNS, filter);
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(rusqlite::params_from_iter(params.iter()), character_from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    fn new_character<'a>(user_id: &'a str, traits: &'a [String]) -> NewCharacter<'a> {
        NewCharacter {
            user_id,
            name: "Test Char",
            age: 25,
            personality: "Friendly",
            description: "A test character",
            occupation: Some("Tester"),
            traits,
            avatar_url: "/avatars/custom.jpg",
        }
    }

    #[test]
    fn category_filter() {
        let db = fixtures::db();
        assert_eq!(db.list_characters(None).unwrap().len(), 25);
        assert_eq!(db.list_characters(Some(CharacterCategory::Girls)).unwrap().len(), 10);
        assert_eq!(db.list_characters(Some(CharacterCategory::Anime)).unwrap().len(), 8);
        assert_eq!(db.list_characters(Some(CharacterCategory::Guys)).unwrap().len(), 7);
        assert!(db.list_characters(Some(CharacterCategory::Custom)).unwrap().is_empty());
    }

    #[test]
    fn custom_character_lifecycle() {
        let db = fixtures::db();
        let traits = vec!["Friendly".to_string(), "Creative".to_string()];
        let created = db.create_custom_character(new_character("owner", &traits)).unwrap();
        assert!(created.is_custom);
        assert_eq!(created.category, CharacterCategory::Custom);
        assert_eq!(created.traits, traits);

        assert_eq!(db.list_user_characters("owner").unwrap().len(), 1);
        assert!(db.get_custom_character(&created.id).unwrap().is_some());

        assert!(!db.delete_custom_character(&created.id, Some("intruder")).unwrap());
        assert!(db.delete_custom_character(&created.id, Some("owner")).unwrap());
        assert!(db.get_custom_character(&created.id).unwrap().is_none());
    }

    #[test]
    fn catalog_ids_exclude_custom_characters() {
        let db = fixtures::db();
        let custom = db.create_custom_character(new_character("stranger", &[])).unwrap();
        let ids = db.catalog_character_ids().unwrap();
        assert_eq!(ids.len(), 25);
        assert!(!ids.contains(&custom.id));
    }

    #[test]
    fn update_keeps_unset_fields() {
        let db = fixtures::db();
        let id = fixtures::first_character_id(&db);
        let before = db.get_character(&id).unwrap().unwrap();
        let update = CharacterUpdateRequest {
            description: Some("Updated description".into()),
            ..Default::default()
        };
        let after = db.update_character(&id, false, &update).unwrap().unwrap();
        assert_eq!(after.description, "Updated description");
        assert_eq!(after.name, before.name);
        assert!(db.update_character(&id, true, &update).unwrap().is_none());
    }
}
