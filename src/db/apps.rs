//! Workspace (App) queries.

use super::models::App;
use super::Conn;
use crate::error::{AppError, AppResult};
use rusqlite::{params, OptionalExtension};

pub fn create(conn: &Conn, owner_user_id: i64, display_name: &str, template: Option<&str>) -> AppResult<App> {
    conn.execute(
        "INSERT INTO apps (owner_user_id, display_name, template) VALUES (?1, ?2, ?3)",
        params![owner_user_id, display_name, template],
    )
    .map_err(AppError::from)?;
    let id = conn.last_insert_rowid();
    find_by_id(conn, id)?.ok_or_else(|| AppError::Internal(anyhow::anyhow!("app vanished")))
}

pub fn find_by_id(conn: &Conn, id: i64) -> AppResult<Option<App>> {
    conn.query_row(
        "SELECT id, owner_user_id, display_name, template, favorite, created_at, updated_at
         FROM apps WHERE id = ?1",
        params![id],
        row_to_app,
    )
    .optional()
    .map_err(AppError::from)
}

/// Load an app and verify it belongs to `owner_user_id`, collapsing both
/// "doesn't exist" and "belongs to someone else" into 404 per §8 S5 (cross-user
/// reads must not leak existence through a 403 instead of a 404).
pub fn find_owned(conn: &Conn, id: i64, owner_user_id: i64) -> AppResult<App> {
    let app = find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("app not found".to_string()))?;
    if app.owner_user_id != owner_user_id {
        return Err(AppError::NotFound("app not found".to_string()));
    }
    Ok(app)
}

pub fn list_for_user(conn: &Conn, owner_user_id: i64) -> AppResult<Vec<App>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_user_id, display_name, template, favorite, created_at, updated_at
         FROM apps WHERE owner_user_id = ?1 ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![owner_user_id], row_to_app)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn search_for_user(conn: &Conn, owner_user_id: i64, query: &str) -> AppResult<Vec<App>> {
    let pattern = format!("%{}%", query.replace('%', "\\%").replace('_', "\\_"));
    let mut stmt = conn.prepare(
        "SELECT id, owner_user_id, display_name, template, favorite, created_at, updated_at
         FROM apps WHERE owner_user_id = ?1 AND display_name LIKE ?2 ESCAPE '\\'
         ORDER BY created_at DESC",
    )?;
    let rows = stmt
        .query_map(params![owner_user_id, pattern], row_to_app)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn rename(conn: &Conn, id: i64, display_name: &str) -> AppResult<App> {
    conn.execute(
        "UPDATE apps SET display_name = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        params![display_name, id],
    )?;
    find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("app not found".to_string()))
}

pub fn set_favorite(conn: &Conn, id: i64, favorite: bool) -> AppResult<App> {
    conn.execute(
        "UPDATE apps SET favorite = ?1, updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?2",
        params![favorite, id],
    )?;
    find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("app not found".to_string()))
}

pub fn toggle_favorite(conn: &Conn, id: i64) -> AppResult<App> {
    let app = find_by_id(conn, id)?.ok_or_else(|| AppError::NotFound("app not found".to_string()))?;
    set_favorite(conn, id, !app.favorite)
}

pub fn delete(conn: &Conn, id: i64) -> AppResult<()> {
    conn.execute("DELETE FROM apps WHERE id = ?1", params![id])?;
    Ok(())
}

fn row_to_app(row: &rusqlite::Row) -> rusqlite::Result<App> {
    Ok(App {
        id: row.get(0)?,
        owner_user_id: row.get(1)?,
        display_name: row.get(2)?,
        template: row.get(3)?,
        favorite: row.get(4)?,
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{open_in_memory, users};

    fn seed_user(conn: &Conn) -> i64 {
        users::create(conn, "a@example.com", "Ada", "hash").unwrap().id
    }

    #[test]
    fn find_owned_hides_other_users_apps_as_not_found() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let owner = seed_user(&conn);
        let app = create(&conn, owner, "demo", None).unwrap();

        let err = find_owned(&conn, app.id, owner + 1).unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn toggle_favorite_flips_state() {
        let pool = open_in_memory();
        let conn = pool.get().unwrap();
        let owner = seed_user(&conn);
        let app = create(&conn, owner, "demo", None).unwrap();
        assert!(!app.favorite);
        let app = toggle_favorite(&conn, app.id).unwrap();
        assert!(app.favorite);
        let app = toggle_favorite(&conn, app.id).unwrap();
        assert!(!app.favorite);
    }
}
