use anyhow::Result;
use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use rand::seq::SliceRandom;

use companion_db::Database;
use companion_types::api::{NotificationData, NotificationPayload};
use companion_types::models::{Character, NotificationType, User};

use crate::eligibility::{self, Rejection};
use crate::templates;

pub const BADGE: &str = "/logo192.png";

/// Outcome of running one user through the filter.
#[derive(Debug)]
pub enum Decision {
    Send(Composed),
    Skip(Rejection),
}

#[derive(Debug, Clone)]
pub struct Composed {
    pub character: Character,
    pub payload: NotificationPayload,
}

/// First character that still resolves, trying each tier in order and the ids
/// within a tier in random order.
pub fn pick_character<R, F>(rng: &mut R, tiers: Vec<Vec<String>>, mut resolve: F) -> Result<Option<Character>>
where
    R: Rng,
    F: FnMut(&str) -> Result<Option<Character>>,
{
    for mut ids in tiers {
        ids.shuffle(rng);
        for id in &ids {
            if let Some(character) = resolve(id)? {
                return Ok(Some(character));
            }
        }
    }
    Ok(None)
}

pub fn build_payload(character: &Character, body: String, kind: NotificationType) -> NotificationPayload {
    NotificationPayload {
        title: character.name.clone(),
        body,
        icon: character.avatar_url.clone(),
        badge: BADGE.to_string(),
        tag: format!("companion-{}", character.id),
        character_id: character.id.clone(),
        data: NotificationData {
            url: format!("/chat/{}", character.id),
            character_id: character.id.clone(),
            notification_type: kind.as_str().to_string(),
        },
    }
}

/// Run the eligibility filter for `user` and, when it passes, pick a character
/// and a message. Nothing is recorded here.
pub fn decide(db: &Database, user: &User, kind: NotificationType, now: DateTime<Utc>) -> Result<Decision> {
    let pref = db.get_preferences(&user.id)?.unwrap_or_default();
    let sent_today = db.count_sent_today(&user.id)?;
    let hour = now.hour() as u8;

    if let Err(rejection) = eligibility::check(&pref, hour, sent_today) {
        return Ok(Decision::Skip(rejection));
    }

    let tiers = vec![
        db.conversation_partners(&user.id)?,
        db.favorite_ids(&user.id)?,
        db.catalog_character_ids()?,
    ];
    let mut rng = rand::rng();
    let Some(character) = pick_character(&mut rng, tiers, |id| db.get_character(id))? else {
        return Ok(Decision::Skip(Rejection::NoCharacter));
    };

    let body = templates::pick_message(&mut rng, kind, &user.username);
    let payload = build_payload(&character, body, kind);
    Ok(Decision::Send(Composed { character, payload }))
}

/// Count a composed notification against today's cap.
pub fn record(db: &Database, user_id: &str, composed: &Composed, kind: NotificationType) -> Result<()> {
    db.record_notification(
        user_id,
        &composed.character.id,
        kind,
        &composed.payload.title,
        &composed.payload.body,
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_db::queries::NewCharacter;
    use companion_types::models::{Frequency, NotificationPreference, Sender};

    fn setup() -> (Database, User) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("n@example.com", "Nia", Some("hash"), None, "email").unwrap();
        (db, user)
    }

    fn daytime() -> DateTime<Utc> {
        "2026-05-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn prefers_conversation_partner() {
        let (db, user) = setup();
        let chars = db.list_characters(None).unwrap();
        db.insert_message(&user.id, &chars[3].id, Sender::User, "hi").unwrap();
        db.add_favorite(&user.id, &chars[5].id).unwrap();

        for _ in 0..10 {
            let Decision::Send(composed) = decide(&db, &user, NotificationType::Random, daytime()).unwrap() else {
                panic!("expected a notification");
            };
            assert_eq!(composed.character.id, chars[3].id);
            assert_eq!(composed.payload.tag, format!("companion-{}", chars[3].id));
            assert_eq!(composed.payload.data.url, format!("/chat/{}", chars[3].id));
            assert_eq!(composed.payload.data.notification_type, "random");
        }
    }

    #[test]
    fn falls_back_to_favorite_then_catalog() {
        let (db, user) = setup();
        let chars = db.list_characters(None).unwrap();
        db.insert_message(&user.id, "deleted-character", Sender::User, "hi").unwrap();
        db.add_favorite(&user.id, &chars[7].id).unwrap();

        let Decision::Send(composed) = decide(&db, &user, NotificationType::Inactivity, daytime()).unwrap() else {
            panic!("expected a notification");
        };
        assert_eq!(composed.character.id, chars[7].id);

        db.remove_favorite(&user.id, &chars[7].id).unwrap();
        assert!(matches!(
            decide(&db, &user, NotificationType::Random, daytime()).unwrap(),
            Decision::Send(_)
        ));
    }

    #[test]
    fn never_picks_another_users_custom_character() {
        let (db, user) = setup();
        let custom = db
            .create_custom_character(NewCharacter {
                user_id: "stranger",
                name: "Private",
                age: 30,
                personality: "Secretive",
                description: "Only for its owner",
                occupation: None,
                traits: &[],
                avatar_url: "/avatars/private.jpg",
            })
            .unwrap();

        for _ in 0..50 {
            let Decision::Send(composed) = decide(&db, &user, NotificationType::Random, daytime()).unwrap() else {
                panic!("expected a notification");
            };
            assert_ne!(composed.character.id, custom.id);
            assert!(!composed.character.is_custom);
        }
    }

    #[test]
    fn respects_daily_cap() {
        let (db, user) = setup();
        db.set_preferences(
            &user.id,
            &NotificationPreference {
                enabled: true,
                frequency: Frequency::Low,
                quiet_hours_start: 22,
                quiet_hours_end: 8,
            },
        )
        .unwrap();

        let mut sent = 0;
        for _ in 0..5 {
            if let Decision::Send(composed) = decide(&db, &user, NotificationType::Random, Utc::now().with_hour(12).unwrap()).unwrap() {
                record(&db, &user.id, &composed, NotificationType::Random).unwrap();
                sent += 1;
            }
        }
        assert_eq!(sent, 2);
        assert_eq!(db.count_sent_today(&user.id).unwrap(), 2);
    }

    #[test]
    fn disabled_user_is_skipped() {
        let (db, user) = setup();
        let pref = NotificationPreference { enabled: false, ..Default::default() };
        db.set_preferences(&user.id, &pref).unwrap();
        assert!(matches!(
            decide(&db, &user, NotificationType::Random, daytime()).unwrap(),
            Decision::Skip(Rejection::Disabled)
        ));
    }

    #[test]
    fn empty_tiers_yield_nothing() {
        let mut rng = rand::rng();
        let picked = pick_character(&mut rng, vec![vec!["gone".into()], vec![]], |_| Ok(None)).unwrap();
        assert!(picked.is_none());
    }
}
