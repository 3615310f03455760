//! Chat queries.

use super::models::Chat;
use super::Conn;
use crate::error::{AppError, AppResult};
use rusqlite::{params, OptionalExtension};

pub fn create(conn: &Conn, app_id: i64, title: Option<&str>) -> AppResult<Chat> {
    conn.execute(
        "INSERT INTO chats (app_id, title) VALUES (?1, ?2)",
        params![app_id, title],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| AppError::Internal(anyhow::anyhow!("chat vanished")))
}

pub fn find_by_id(conn: &Conn, id: i64) -> AppResult<Option<Chat>> {
    conn.query_row(
        "SELECT id, app_id, title, created_at FROM chats WHERE id = ?1",
        params![id],
        row_to_chat,
    )
    .optional()
    .map_err(AppError::from)
}

/// Load a chat and verify it belongs to `app_id` (which the caller has already
/// verified belongs to the requesting user) — keeps ownership flowing through
/// the workspace as §3 specifies.
pub fn find_owned(conn: &Conn, id: i64, app_id: i64) -> AppResult<Chat> {
    let chat = find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("chat not found".to_string()))?;
    if chat.app_id != app_id {
        return Err(AppError::NotFound("chat not found".to_string()));
    }
    Ok(chat)
}

pub fn list_for_app(conn: &Conn, app_id: i64) -> AppResult<Vec<Chat>> {
    let mut stmt = conn.prepare(
        "SELECT id, app_id, title, created_at FROM chats WHERE app_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![app_id], row_to_chat)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn search_for_app(conn: &Conn, app_id: i64, query: &str) -> AppResult<Vec<Chat>> {
    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
    let mut stmt = conn.prepare(
        "SELECT id, app_id, title, created_at FROM chats
         WHERE app_id = ?1 AND title LIKE ?2 ESCAPE '\\' ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![app_id, pattern], row_to_chat)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn rename(conn: &Conn, id: i64, title: Option<&str>) -> AppResult<Chat> {
    conn.execute(
        "UPDATE chats SET title = ?1 WHERE id = ?2",
        params![title, id],
    )?;
    find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("chat not found".to_string()))
}

pub fn delete(conn: &Conn, id: i64) -> AppResult<()> {
    conn.execute("DELETE FROM chats WHERE id = ?1", params![id])?;
    Ok(())
}

fn row_to_chat(row: &rusqlite::Row) -> rusqlite::Result<Chat> {
    Ok(Chat {
        id: row.get(0)?,
        app_id: row.get(1)?,
        title: row.get(2)?,
        created_at: row.get(3)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{apps, open_in_memory, users};

    #[test]
    fn deleting_chat_removes_only_its_messages() {
        use crate::db::messages;

        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let owner = users::create(&conn, "a@example.com", "Ada", "hash").unwrap().id;
        let app = apps::create(&conn, owner, "demo", None).unwrap();
        let chat_a = create(&conn, app.id, None).unwrap();
        let chat_b = create(&conn, app.id, None).unwrap();

        messages::append(&conn, chat_a.id, crate::db::models::Role::User, "hi", None).unwrap();
        messages::append(&conn, chat_b.id, crate::db::models::Role::User, "hey", None).unwrap();

        delete(&conn, chat_a.id).unwrap();

        assert!(find_by_id(&conn, chat_a.id).unwrap().is_none());
        assert_eq!(messages::list_for_chat(&conn, chat_a.id).unwrap().len(), 0);
        assert_eq!(messages::list_for_chat(&conn, chat_b.id).unwrap().len(), 1);
    }
}
