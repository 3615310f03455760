//! Message queries. Messages are append-only within a chat.

use super::models::{Message, Role};
use super::Conn;
use crate::error::{AppError, AppResult};
use rusqlite::{params, OptionalExtension};

pub fn append(
    conn: &Conn,
    chat_id: i64,
    role: Role,
    content: &str,
    request_id: Option<&str>,
) -> AppResult<Message> {
    conn.execute(
        "INSERT INTO messages (chat_id, role, content, request_id) VALUES (?1, ?2, ?3, ?4)",
        params![chat_id, role.as_str(), content, request_id],
    )?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| AppError::Internal(anyhow::anyhow!("message vanished")))
}

pub fn find_by_id(conn: &Conn, id: i64) -> AppResult<Option<Message>> {
    conn.query_row(
        "SELECT id, chat_id, role, content, request_id, created_at FROM messages WHERE id = ?1",
        params![id],
        row_to_message,
    )
    .optional()
    .map_err(AppError::from)
}

/// Ordered by `created_at` then `id`, per §3's ordering invariant.
pub fn list_for_chat(conn: &Conn, chat_id: i64) -> AppResult<Vec<Message>> {
    let mut stmt = conn.prepare(
        "SELECT id, chat_id, role, content, request_id, created_at FROM messages
         WHERE chat_id = ?1 ORDER BY created_at ASC, id ASC",
    )?;
    let rows = stmt
        .query_map(params![chat_id], row_to_message)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// The most recent assistant message in a chat, used by the `redo` path.
pub fn last_assistant_message(conn: &Conn, chat_id: i64) -> AppResult<Option<Message>> {
    conn.query_row(
        "SELECT id, chat_id, role, content, request_id, created_at FROM messages
         WHERE chat_id = ?1 AND role = 'assistant' ORDER BY created_at DESC, id DESC LIMIT 1",
        params![chat_id],
        row_to_message,
    )
    .optional()
    .map_err(AppError::from)
}

pub fn delete(conn: &Conn, id: i64) -> AppResult<()> {
    conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
    Ok(())
}

fn row_to_message(row: &rusqlite::Row) -> rusqlite::Result<Message> {
    let role_str: String = row.get(2)?;
    let role = Role::parse(&role_str).unwrap_or(Role::User);
    Ok(Message {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        role,
        content: row.get(3)?,
        request_id: row.get(4)?,
        created_at: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{apps, chats, open_in_memory, users};

    #[test]
    fn ordering_is_by_created_at_then_id() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let owner = users::create(&conn, "a@example.com", "Ada", "hash").unwrap().id;
        let app = apps::create(&conn, owner, "demo", None).unwrap();
        let chat = chats::create(&conn, app.id, None).unwrap();

        append(&conn, chat.id, Role::User, "first", None).unwrap();
        append(&conn, chat.id, Role::Assistant, "second", None).unwrap();

        let messages = list_for_chat(&conn, chat.id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].content, "first");
        assert_eq!(messages[1].content, "second");
    }
}
