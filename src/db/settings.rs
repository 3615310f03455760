//! Per-user provider/model selection, consumed by the generation pipeline's
//! "resolve from settings, defaulting to a baseline" step (§4.6).

use super::models::UserSettings;
use super::Conn;
use crate::error::AppResult;
use rusqlite::{params, OptionalExtension};

pub const DEFAULT_PROVIDER: &str = "anthropic";
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-5";

pub fn get(conn: &Conn, user_id: i64) -> AppResult<UserSettings> {
    let found = conn
        .query_row(
            "SELECT user_id, provider, model FROM user_settings WHERE user_id = ?1",
            params![user_id],
            |row| {
                Ok(UserSettings {
                    user_id: row.get(0)?,
                    provider: row.get(1)?,
                    model: row.get(2)?,
                })
            },
        )
        .optional()?;

    Ok(found.unwrap_or(UserSettings {
        user_id,
        provider: DEFAULT_PROVIDER.to_string(),
        model: DEFAULT_MODEL.to_string(),
    }))
}

pub fn upsert(conn: &Conn, user_id: i64, provider: &str, model: &str) -> AppResult<UserSettings> {
    conn.execute(
        "INSERT INTO user_settings (user_id, provider, model) VALUES (?1, ?2, ?3)
         ON CONFLICT(user_id) DO UPDATE SET
            provider = excluded.provider,
            model = excluded.model,
            updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![user_id, provider, model],
    )?;
    get(conn, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, users};

    #[test]
    fn get_defaults_when_unset() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let user = users::create(&conn, "a@example.com", "Ada", "hash").unwrap();
        let settings = get(&conn, user.id).unwrap();
        assert_eq!(settings.provider, DEFAULT_PROVIDER);
        assert_eq!(settings.model, DEFAULT_MODEL);
    }

    #[test]
    fn upsert_then_get_round_trips() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let user = users::create(&conn, "a@example.com", "Ada", "hash").unwrap();
        upsert(&conn, user.id, "openai", "gpt-5").unwrap();
        let settings = get(&conn, user.id).unwrap();
        assert_eq!(settings.provider, "openai");
        assert_eq!(settings.model, "gpt-5");
    }
}
