use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            username        TEXT NOT NULL,
            password_hash   TEXT,
            picture         TEXT,
            auth_provider   TEXT NOT NULL DEFAULT 'email',
            created_at      TEXT NOT NULL,
            last_active     TEXT
        );

        CREATE TABLE IF NOT EXISTS user_sessions (
            session_token   TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            expires_at      TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS characters (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            age             INTEGER NOT NULL,
            personality     TEXT NOT NULL,
            traits          TEXT NOT NULL DEFAULT '[]',
            category        TEXT NOT NULL,
            avatar_url      TEXT NOT NULL,
            description     TEXT NOT NULL,
            occupation      TEXT,
            is_custom       INTEGER NOT NULL DEFAULT 0,
            user_id         TEXT,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_characters_owner
            ON characters(user_id);

        CREATE TABLE IF NOT EXISTS messages (
            id              TEXT PRIMARY KEY,
            chat_id         TEXT NOT NULL,
            user_id         TEXT NOT NULL,
            character_id    TEXT NOT NULL,
            sender          TEXT NOT NULL,
            content         TEXT NOT NULL,
            timestamp       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_chat
            ON messages(chat_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_messages_user
            ON messages(user_id);

        CREATE TABLE IF NOT EXISTS favorites (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            character_id    TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            UNIQUE(user_id, character_id)
        );

        CREATE TABLE IF NOT EXISTS images (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            prompt          TEXT NOT NULL,
            style           TEXT NOT NULL,
            image_data      TEXT NOT NULL,
            mime_type       TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_images_user
            ON images(user_id, created_at);

        CREATE TABLE IF NOT EXISTS push_subscriptions (
            id              TEXT PRIMARY KEY,
            user_id         TEXT NOT NULL,
            endpoint        TEXT NOT NULL UNIQUE,
            p256dh          TEXT NOT NULL,
            auth            TEXT NOT NULL,
            is_active       INTEGER NOT NULL DEFAULT 1,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS notification_preferences (
            user_id             TEXT PRIMARY KEY,
            enabled             INTEGER NOT NULL,
            frequency           TEXT NOT NULL,
            quiet_hours_start   INTEGER NOT NULL,
            quiet_hours_end     INTEGER NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sent_notifications (
            id                  TEXT PRIMARY KEY,
            user_id             TEXT NOT NULL,
            character_id        TEXT NOT NULL,
            notification_type   TEXT NOT NULL,
            title               TEXT NOT NULL,
            body                TEXT NOT NULL,
            sent_date           TEXT NOT NULL,
            sent_at             TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_sent_notifications_day
            ON sent_notifications(user_id, sent_date);

        CREATE TABLE IF NOT EXISTS admins (
            id              TEXT PRIMARY KEY,
            email           TEXT NOT NULL UNIQUE,
            username        TEXT NOT NULL,
            password_hash   TEXT NOT NULL,
            role            TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            last_login      TEXT
        );

        CREATE TABLE IF NOT EXISTS activity_logs (
            id              TEXT PRIMARY KEY,
            admin_id        TEXT NOT NULL,
            admin_email     TEXT NOT NULL,
            action          TEXT NOT NULL,
            target_type     TEXT,
            target_id       TEXT,
            details         TEXT,
            timestamp       TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS announcements (
            id              TEXT PRIMARY KEY,
            title           TEXT NOT NULL,
            message         TEXT NOT NULL,
            kind            TEXT NOT NULL,
            is_active       INTEGER NOT NULL,
            created_by      TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_notifications (
            id              TEXT PRIMARY KEY,
            user_id         TEXT,
            title           TEXT NOT NULL,
            message         TEXT NOT NULL,
            kind            TEXT NOT NULL,
            is_read         INTEGER NOT NULL DEFAULT 0,
            created_by      TEXT NOT NULL,
            created_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blog_posts (
            id                  TEXT PRIMARY KEY,
            title               TEXT NOT NULL,
            slug                TEXT NOT NULL UNIQUE,
            content             TEXT NOT NULL,
            excerpt             TEXT NOT NULL,
            meta_description    TEXT NOT NULL,
            meta_keywords       TEXT NOT NULL DEFAULT '[]',
            category            TEXT NOT NULL,
            tags                TEXT NOT NULL DEFAULT '[]',
            featured_image      TEXT,
            author              TEXT NOT NULL,
            status              TEXT NOT NULL,
            published_at        TEXT,
            views               INTEGER NOT NULL DEFAULT 0,
            created_at          TEXT NOT NULL,
            updated_at          TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS payment_transactions (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL UNIQUE,
            user_id         TEXT NOT NULL,
            user_email      TEXT NOT NULL,
            plan_id         TEXT NOT NULL,
            amount          REAL NOT NULL,
            currency        TEXT NOT NULL,
            payment_method  TEXT NOT NULL,
            status          TEXT NOT NULL,
            payment_status  TEXT NOT NULL,
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS user_subscriptions (
            user_id         TEXT PRIMARY KEY,
            plan_id         TEXT NOT NULL,
            status          TEXT NOT NULL,
            payment_method  TEXT NOT NULL,
            session_id      TEXT NOT NULL,
            started_at      TEXT NOT NULL,
            expires_at      TEXT NOT NULL
        );
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
