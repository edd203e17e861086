use anyhow::Result;
use rusqlite::Row;
use tracing::warn;
use uuid::Uuid;

use companion_types::api::{ChatOverview, ChatSummary, CharacterChatCount, DayCount, UserMessageCount};
use companion_types::models::{Message, Sender, chat_id};

use super::characters::select_characters;
use super::users::count_by_day;
use crate::{Database, now, parse_ts};

/// Number of prior messages replayed to the LLM on every turn.
pub const MESSAGE_CONTEXT_WINDOW: u32 = 10;

const MESSAGE_COLUMNS: &str = "id, chat_id, user_id, character_id, sender, content, timestamp";

fn message_from_row(row: &Row) -> rusqlite::Result<Message> {
    let sender: String = row.get(4)?;
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        user_id: row.get(2)?,
        character_id: row.get(3)?,
        sender: match sender.as_str() {
            "user" => Sender::User,
            "ai" => Sender::Ai,
            other => {
                warn!("Unknown sender '{}', treating as ai", other);
                Sender::Ai
            }
        },
        content: row.get(5)?,
        timestamp: parse_ts(&row.get::<_, String>(6)?),
    })
}

impl Database {
    pub fn insert_message(
        &self,
        user_id: &str,
        character_id: &str,
        sender: Sender,
        content: &str,
    ) -> Result<Message> {
        let id = Uuid::new_v4().to_string();
        let chat = chat_id(user_id, character_id);
        let timestamp = now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages (id, chat_id, user_id, character_id, sender, content, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![id, chat, user_id, character_id, sender.as_str(), content, timestamp],
            )?;
            Ok(())
        })?;
        Ok(Message {
            id,
            chat_id: chat,
            user_id: user_id.to_string(),
            character_id: character_id.to_string(),
            sender,
            content: content.to_string(),
            timestamp: parse_ts(&timestamp),
        })
    }

    /// The last `limit` messages of a conversation, oldest first.
    pub fn recent_messages(&self, chat_id: &str, limit: u32) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY timestamp DESC, rowid DESC LIMIT ?2",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt
                .query_map((chat_id, limit), message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.reverse();
            Ok(rows)
        })
    }

    /// Full conversation, oldest first.
    pub fn chat_history(&self, chat_id: &str) -> Result<Vec<Message>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {} FROM messages WHERE chat_id = ?1 ORDER BY timestamp ASC, rowid ASC",
                MESSAGE_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map([chat_id], message_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// One summary per character the user has talked to, most recent first.
    /// Conversations whose character no longer exists are left out.
    pub fn user_chats(&self, user_id: &str) -> Result<Vec<ChatSummary>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.character_id, m.content, m.timestamp,
                        (SELECT COUNT(*) FROM messages c WHERE c.chat_id = m.chat_id)
                 FROM messages m
                 WHERE m.user_id = ?1
                   AND m.rowid = (SELECT l.rowid FROM messages l WHERE l.chat_id = m.chat_id
                                  ORDER BY l.timestamp DESC, l.rowid DESC LIMIT 1)
                 ORDER BY m.timestamp DESC",
            )?;
            let rows = stmt
                .query_map([user_id], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut chats = Vec::with_capacity(rows.len());
            for (character_id, last_message, last_ts, message_count) in rows {
                let Some(character) = select_characters(conn, "id = ?1", &[character_id.as_str()])?.into_iter().next()
                else {
                    continue;
                };
                chats.push(ChatSummary {
                    character,
                    last_message,
                    last_timestamp: parse_ts(&last_ts),
                    message_count,
                });
            }
            Ok(chats)
        })
    }

    /// Distinct characters the user has exchanged messages with.
    pub fn conversation_partners(&self, user_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT DISTINCT character_id FROM messages WHERE user_id = ?1")?;
            let ids = stmt
                .query_map([user_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(ids)
        })
    }

    // -- Moderation --

    pub fn chat_overviews(&self, skip: u32, limit: u32) -> Result<Vec<ChatOverview>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.chat_id, m.user_id, COALESCE(u.username, 'Unknown'),
                        m.character_id, COALESCE(c.name, 'Unknown'),
                        COUNT(*), MAX(m.timestamp) AS last_at
                 FROM messages m
                 LEFT JOIN users u ON u.id = m.user_id
                 LEFT JOIN characters c ON c.id = m.character_id
                 GROUP BY m.chat_id
                 ORDER BY last_at DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt
                .query_map((limit, skip), |row| {
                    Ok(ChatOverview {
                        chat_id: row.get(0)?,
                        user_id: row.get(1)?,
                        user_name: row.get(2)?,
                        character_id: row.get(3)?,
                        character_name: row.get(4)?,
                        message_count: row.get(5)?,
                        last_message_at: parse_ts(&row.get::<_, String>(6)?),
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn count_chats(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(DISTINCT chat_id) FROM messages", [], |r| r.get(0))?)
        })
    }

    /// Returns the number of messages removed.
    pub fn delete_chat(&self, chat_id: &str) -> Result<usize> {
        self.with_conn(|conn| Ok(conn.execute("DELETE FROM messages WHERE chat_id = ?1", [chat_id])?))
    }

    // -- Analytics --

    pub fn count_messages(&self) -> Result<i64> {
        self.with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))?))
    }

    pub fn count_chatting_users(&self) -> Result<i64> {
        self.with_conn(|conn| {
            Ok(conn.query_row("SELECT COUNT(DISTINCT user_id) FROM messages", [], |r| r.get(0))?)
        })
    }

    /// Characters ranked by number of distinct conversations.
    pub fn popular_characters(&self, limit: u32) -> Result<Vec<CharacterChatCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.character_id, COALESCE(c.name, 'Unknown'), COUNT(DISTINCT m.chat_id) AS n
                 FROM messages m LEFT JOIN characters c ON c.id = m.character_id
                 GROUP BY m.character_id
                 ORDER BY n DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(CharacterChatCount {
                        character_id: row.get(0)?,
                        name: row.get(1)?,
                        chat_count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Users ranked by messages they sent themselves.
    pub fn most_active_users(&self, limit: u32) -> Result<Vec<UserMessageCount>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT m.user_id, COALESCE(u.username, 'Unknown'), COUNT(*) AS n
                 FROM messages m LEFT JOIN users u ON u.id = m.user_id
                 WHERE m.sender = 'user'
                 GROUP BY m.user_id
                 ORDER BY n DESC
                 LIMIT ?1",
            )?;
            let rows = stmt
                .query_map([limit], |row| {
                    Ok(UserMessageCount {
                        user_id: row.get(0)?,
                        username: row.get(1)?,
                        message_count: row.get(2)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn messages_by_day(&self, days: i64) -> Result<Vec<DayCount>> {
        self.with_conn(|conn| count_by_day(conn, "messages", "timestamp", days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures;

    #[test]
    fn context_window_keeps_latest_in_order() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "m@example.com");
        let character = fixtures::first_character_id(&db);
        for i in 0..12 {
            db.insert_message(&user.id, &character, Sender::User, &format!("msg {}", i)).unwrap();
        }
        let key = chat_id(&user.id, &character);
        let recent = db.recent_messages(&key, MESSAGE_CONTEXT_WINDOW).unwrap();
        assert_eq!(recent.len(), 10);
        assert_eq!(recent[0].content, "msg 2");
        assert_eq!(recent[9].content, "msg 11");

        let history = db.chat_history(&key).unwrap();
        assert_eq!(history.len(), 12);
        assert_eq!(history[0].content, "msg 0");
    }

    #[test]
    fn user_chats_summarise_latest_message() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "c@example.com");
        let character = fixtures::first_character_id(&db);
        db.insert_message(&user.id, &character, Sender::User, "hi").unwrap();
        db.insert_message(&user.id, &character, Sender::Ai, "hello there").unwrap();

        let chats = db.user_chats(&user.id).unwrap();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].character.id, character);
        assert_eq!(chats[0].last_message, "hello there");
        assert_eq!(chats[0].message_count, 2);
        assert_eq!(db.conversation_partners(&user.id).unwrap(), vec![character]);
    }

    #[test]
    fn moderation_views() {
        let db = fixtures::db();
        let user = fixtures::user(&db, "mod@example.com");
        let character = fixtures::first_character_id(&db);
        db.insert_message(&user.id, &character, Sender::User, "one").unwrap();
        db.insert_message(&user.id, &character, Sender::Ai, "two").unwrap();

        let overviews = db.chat_overviews(0, 50).unwrap();
        assert_eq!(overviews.len(), 1);
        assert_eq!(overviews[0].user_name, "Tester");
        assert_eq!(overviews[0].message_count, 2);
        assert_eq!(db.most_active_users(10).unwrap()[0].message_count, 1);
        assert_eq!(db.popular_characters(10).unwrap()[0].chat_count, 1);

        assert_eq!(db.delete_chat(&overviews[0].chat_id).unwrap(), 2);
        assert_eq!(db.count_chats().unwrap(), 0);
    }
}
