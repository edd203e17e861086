mod admin;
mod blog;
mod characters;
mod favorites;
mod images;
mod messages;
mod payments;
mod push;
mod users;

pub use admin::{ActivitySummary, NewActivity};
pub use blog::PostDraft;
pub use characters::NewCharacter;
pub use messages::MESSAGE_CONTEXT_WINDOW;
pub use payments::NewTransaction;
pub use push::today;

#[cfg(test)]
pub(crate) mod fixtures {
    use crate::Database;
    use companion_types::models::{CharacterCategory, User};

    pub fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    pub fn user(db: &Database, email: &str) -> User {
        db.create_user(email, "Tester", Some("hash"), None, "email").unwrap()
    }

    pub fn first_character_id(db: &Database) -> String {
        db.list_characters(Some(CharacterCategory::Girls)).unwrap()[0].id.clone()
    }
}
