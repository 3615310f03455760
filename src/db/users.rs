//! User account queries.

use super::models::User;
use super::Conn;
use crate::error::{AppError, AppResult};
use rusqlite::{params, OptionalExtension};

pub fn create(conn: &Conn, email: &str, name: &str, password_hash: &str) -> AppResult<User> {
    conn.execute(
        "INSERT INTO users (email, name, password_hash) VALUES (?1, ?2, ?3)",
        params![email, name, password_hash],
    )
    .map_err(|err| match err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            AppError::Validation("an account with that email already exists".to_string())
        }
        other => AppError::from(other),
    })?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| AppError::Internal(anyhow::anyhow!("user vanished")))
}

pub fn find_by_id(conn: &Conn, id: i64) -> AppResult<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE id = ?1",
        params![id],
        row_to_user,
    )
    .optional()
    .map_err(AppError::from)
}

pub fn find_by_email(conn: &Conn, email: &str) -> AppResult<Option<User>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, created_at FROM users WHERE email = ?1",
        params![email],
        row_to_user,
    )
    .optional()
    .map_err(AppError::from)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: row.get(4)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory;

    #[test]
    fn create_and_find_round_trips() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let user = create(&conn, "a@example.com", "Ada", "hash").unwrap();
        let found = find_by_email(&conn, "a@example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.name, "Ada");
    }

    #[test]
    fn duplicate_email_is_validation_error() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        create(&conn, "a@example.com", "Ada", "hash").unwrap();
        let err = create(&conn, "a@example.com", "Ada2", "hash2").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
