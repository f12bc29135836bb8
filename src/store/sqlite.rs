use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use super::Store;
use super::schema::SCHEMA;
use super::tag::canonicalize_tag;
use crate::error::{Error, Result};
use crate::ratelimit::FailureCounter;
use crate::types::*;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let conn = Connection::open(db_path)?;

        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            // Handle SQLite's default datetime format: "YYYY-MM-DD HH:MM:SS"
            chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            tracing::error!("Invalid datetime in database: '{}' - {}", s, e);
            Utc::now()
        })
}

fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

const USER_COLUMNS: &str = "id, name, email, password_hash, created_at";
const POST_COLUMNS: &str = "p.id, p.title, p.content, p.database_id, p.created_at, p.updated_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}

fn post_from_row(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        database_id: row.get(3)?,
        created_at: parse_datetime(&row.get::<_, String>(4)?),
        updated_at: parse_datetime(&row.get::<_, String>(5)?),
    })
}

fn query_relation(
    conn: &Connection,
    user_id: i64,
    database_id: i64,
) -> Result<Option<PermissionType>> {
    conn.query_row(
        "SELECT permission_type FROM user_database_rels WHERE user_id = ?1 AND database_id = ?2",
        params![user_id, database_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Error::from)
}

fn require_owner(conn: &Connection, user_id: i64, database_id: i64) -> Result<()> {
    match query_relation(conn, user_id, database_id)? {
        Some(PermissionType::Owner) => Ok(()),
        _ => Err(Error::UserNotOwner),
    }
}

fn query_viewers(conn: &Connection, database_id: i64) -> Result<Vec<Viewer>> {
    let mut stmt = conn.prepare(
        "SELECT u.id, u.name, u.email
         FROM users u
         JOIN user_database_rels r ON u.id = r.user_id
         WHERE r.database_id = ?1 AND r.permission_type = 'viewer'
         ORDER BY u.id",
    )?;

    let rows = stmt.query_map(params![database_id], |row| {
        Ok(Viewer {
            user_id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

fn query_post_tags(conn: &Connection, post_id: i64) -> Result<Vec<Tag>> {
    let mut stmt = conn.prepare(
        "SELECT t.id, t.title
         FROM tags t
         JOIN post_tag_rels pt ON t.id = pt.tag_id
         WHERE pt.post_id = ?1
         ORDER BY t.title",
    )?;

    let rows = stmt.query_map(params![post_id], |row| {
        Ok(Tag {
            id: row.get(0)?,
            title: row.get(1)?,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Inserts the canonical title unless present, then reads the surviving row.
/// The UNIQUE constraint on `tags.title` decides concurrent creators.
fn upsert_tag(conn: &Connection, canonical: &str) -> Result<i64> {
    conn.execute(
        "INSERT INTO tags (title) VALUES (?1) ON CONFLICT(title) DO NOTHING",
        params![canonical],
    )?;

    conn.query_row(
        "SELECT id FROM tags WHERE title = ?1",
        params![canonical],
        |row| row.get(0),
    )
    .map_err(Error::from)
}

fn link_tags(conn: &Connection, post_id: i64, database_id: i64, titles: &[String]) -> Result<()> {
    for title in titles {
        let canonical = canonicalize_tag(title);
        if canonical.is_empty() {
            continue;
        }

        let tag_id = upsert_tag(conn, &canonical)?;

        conn.execute(
            "INSERT OR IGNORE INTO post_tag_rels (post_id, tag_id) VALUES (?1, ?2)",
            params![post_id, tag_id],
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO tag_database_rels (database_id, tag_id) VALUES (?1, ?2)",
            params![database_id, tag_id],
        )?;
    }
    Ok(())
}

impl Store for SqliteStore {
    fn initialize(&self) -> Result<()> {
        self.conn().execute_batch(SCHEMA)?;
        Ok(())
    }

    // User operations

    fn create_user(&self, name: &str, email: &str, password_hash: &str) -> Result<i64> {
        let conn = self.conn();
        let result = conn.execute(
            "INSERT INTO users (name, email, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![name, email, password_hash, format_datetime(&Utc::now())],
        );

        match result {
            Ok(_) => Ok(conn.last_insert_rowid()),
            Err(e) if is_constraint_violation(&e) => {
                let taken = |column: &str, value: &str| -> Result<bool> {
                    let count: i64 = conn.query_row(
                        &format!("SELECT COUNT(*) FROM users WHERE {column} = ?1"),
                        params![value],
                        |row| row.get(0),
                    )?;
                    Ok(count > 0)
                };

                Err(Error::UserConflict {
                    name: taken("name", name)?,
                    email: taken("email", email)?,
                })
            }
            Err(e) => Err(Error::from(e)),
        }
    }

    fn get_user(&self, id: i64) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
            params![id],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<User>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1 OR name = ?1 LIMIT 1"),
            params![identifier],
            user_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    // Session operations

    fn create_session(&self, session: &Session) -> Result<()> {
        self.conn().execute(
            "INSERT INTO sessions (id, user_id, token_hash, token_lookup, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                session.id,
                session.user_id,
                session.token_hash,
                session.token_lookup,
                format_datetime(&session.created_at),
                format_datetime(&session.expires_at),
            ],
        )?;
        Ok(())
    }

    fn get_session_by_lookup(&self, lookup: &str) -> Result<Option<Session>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, user_id, token_hash, token_lookup, created_at, expires_at
             FROM sessions WHERE token_lookup = ?1",
            params![lookup],
            |row| {
                Ok(Session {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    token_hash: row.get(2)?,
                    token_lookup: row.get(3)?,
                    created_at: parse_datetime(&row.get::<_, String>(4)?),
                    expires_at: parse_datetime(&row.get::<_, String>(5)?),
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn delete_session(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Database operations

    fn create_database(&self, owner_id: i64, name: &str) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now = format_datetime(&Utc::now());

        tx.execute(
            "INSERT INTO databases (name, created_at, updated_at) VALUES (?1, ?2, ?2)",
            params![name, now],
        )?;
        let database_id = tx.last_insert_rowid();

        tx.execute(
            "INSERT INTO user_database_rels (user_id, database_id, permission_type)
             VALUES (?1, ?2, ?3)",
            params![owner_id, database_id, PermissionType::Owner],
        )?;

        tx.commit()?;
        Ok(database_id)
    }

    fn list_databases_for_user(&self, user_id: i64) -> Result<Vec<DatabaseWithPosts>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT d.id, d.name, d.created_at, d.updated_at, r.permission_type
             FROM databases d
             JOIN user_database_rels r ON d.id = r.database_id
             WHERE r.user_id = ?1
             ORDER BY d.id",
        )?;

        let mut databases = stmt
            .query_map(params![user_id], |row| {
                Ok(DatabaseWithPosts {
                    database: Database {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        created_at: parse_datetime(&row.get::<_, String>(2)?),
                        updated_at: parse_datetime(&row.get::<_, String>(3)?),
                    },
                    permission_type: row.get(4)?,
                    posts: Vec::new(),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let index: HashMap<i64, usize> = databases
            .iter()
            .enumerate()
            .map(|(i, d)| (d.database.id, i))
            .collect();

        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN user_database_rels r ON p.database_id = r.database_id
             WHERE r.user_id = ?1
             ORDER BY p.id"
        ))?;

        for post in stmt.query_map(params![user_id], post_from_row)? {
            let post = post?;
            if let Some(&i) = index.get(&post.database_id) {
                databases[i].posts.push(post);
            }
        }

        Ok(databases)
    }

    fn list_owned_databases(&self, user_id: i64) -> Result<Vec<OwnedDatabase>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT d.id, d.name, d.created_at, d.updated_at
             FROM databases d
             JOIN user_database_rels r ON d.id = r.database_id
             WHERE r.user_id = ?1 AND r.permission_type = 'owner'
             ORDER BY d.id",
        )?;

        let databases = stmt
            .query_map(params![user_id], |row| {
                Ok(Database {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    created_at: parse_datetime(&row.get::<_, String>(2)?),
                    updated_at: parse_datetime(&row.get::<_, String>(3)?),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        databases
            .into_iter()
            .map(|database| {
                let viewers = query_viewers(&conn, database.id)?;
                Ok(OwnedDatabase { database, viewers })
            })
            .collect()
    }

    fn delete_database(&self, database_id: i64, acting_user_id: i64) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        require_owner(&tx, acting_user_id, database_id)?;

        // Children before parents.
        tx.execute(
            "DELETE FROM post_tag_rels
             WHERE post_id IN (SELECT id FROM posts WHERE database_id = ?1)",
            params![database_id],
        )?;
        tx.execute(
            "DELETE FROM posts WHERE database_id = ?1",
            params![database_id],
        )?;
        tx.execute(
            "DELETE FROM tag_database_rels WHERE database_id = ?1",
            params![database_id],
        )?;
        tx.execute(
            "DELETE FROM user_database_rels WHERE database_id = ?1",
            params![database_id],
        )?;
        tx.execute("DELETE FROM databases WHERE id = ?1", params![database_id])?;

        tx.commit()?;
        Ok(())
    }

    // Roster operations

    fn get_relation(&self, user_id: i64, database_id: i64) -> Result<Option<PermissionType>> {
        query_relation(&self.conn(), user_id, database_id)
    }

    fn list_database_viewers(&self, database_id: i64) -> Result<Vec<Viewer>> {
        query_viewers(&self.conn(), database_id)
    }

    fn add_viewer_by_email(
        &self,
        database_id: i64,
        email: &str,
        acting_user_id: i64,
    ) -> Result<User> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        require_owner(&tx, acting_user_id, database_id)?;

        let user = tx
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
                params![email],
                user_from_row,
            )
            .optional()?
            .ok_or(Error::UserNotExist)?;

        if query_relation(&tx, user.id, database_id)?.is_some() {
            return Err(Error::UserAlreadyInDatabase);
        }

        tx.execute(
            "INSERT INTO user_database_rels (user_id, database_id, permission_type)
             VALUES (?1, ?2, ?3)",
            params![user.id, database_id, PermissionType::Viewer],
        )?;

        tx.commit()?;
        Ok(user)
    }

    fn remove_viewer(
        &self,
        database_id: i64,
        target_user_id: i64,
        acting_user_id: i64,
    ) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        require_owner(&tx, acting_user_id, database_id)?;

        let rows = tx.execute(
            "DELETE FROM user_database_rels
             WHERE user_id = ?1 AND database_id = ?2 AND permission_type = 'viewer'",
            params![target_user_id, database_id],
        )?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Post operations

    fn create_post(&self, title: &str, content: &str, database_id: i64) -> Result<i64> {
        self.create_tagged_post(title, content, database_id, &[])
    }

    fn create_tagged_post(
        &self,
        title: &str,
        content: &str,
        database_id: i64,
        titles: &[String],
    ) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO posts (title, content, database_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![title, content, database_id, format_datetime(&Utc::now())],
        )?;
        let post_id = tx.last_insert_rowid();

        link_tags(&tx, post_id, database_id, titles)?;

        tx.commit()?;
        Ok(post_id)
    }

    fn get_post(&self, id: i64) -> Result<Option<Post>> {
        let conn = self.conn();
        conn.query_row(
            &format!("SELECT {POST_COLUMNS} FROM posts p WHERE p.id = ?1"),
            params![id],
            post_from_row,
        )
        .optional()
        .map_err(Error::from)
    }

    fn edit_post(&self, id: i64, title: &str, content: &str) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE posts SET title = ?1, content = ?2, updated_at = ?3 WHERE id = ?4",
            params![title, content, format_datetime(&Utc::now()), id],
        )?;

        if rows == 0 {
            return Err(Error::NotFound);
        }
        Ok(())
    }

    fn delete_post(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM post_tag_rels WHERE post_id = ?1", params![id])?;
        let rows = tx.execute("DELETE FROM posts WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }

    // Tag operations

    fn get_or_create_tag(&self, raw_title: &str) -> Result<i64> {
        let canonical = canonicalize_tag(raw_title);
        if canonical.is_empty() {
            return Err(Error::BadRequest("Tag title cannot be empty".to_string()));
        }
        upsert_tag(&self.conn(), &canonical)
    }

    fn get_tag(&self, id: i64) -> Result<Option<Tag>> {
        let conn = self.conn();
        conn.query_row(
            "SELECT id, title FROM tags WHERE id = ?1",
            params![id],
            |row| {
                Ok(Tag {
                    id: row.get(0)?,
                    title: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(Error::from)
    }

    fn attach_tags(&self, post_id: i64, database_id: i64, titles: &[String]) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let post_database: i64 = tx
            .query_row(
                "SELECT database_id FROM posts WHERE id = ?1",
                params![post_id],
                |row| row.get(0),
            )
            .optional()?
            .ok_or(Error::NotFound)?;

        if post_database != database_id {
            return Err(Error::BadRequest(
                "Post does not belong to the given database".to_string(),
            ));
        }

        link_tags(&tx, post_id, database_id, titles)?;

        tx.commit()?;
        Ok(())
    }

    fn list_tags_for_post(&self, post_id: i64) -> Result<Vec<Tag>> {
        query_post_tags(&self.conn(), post_id)
    }

    fn list_tags_for_user(&self, user_id: i64) -> Result<Vec<DatabaseTag>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT t.id, t.title, d.id, d.name
             FROM tags t
             JOIN tag_database_rels td ON t.id = td.tag_id
             JOIN databases d ON td.database_id = d.id
             JOIN user_database_rels r ON d.id = r.database_id
             WHERE r.user_id = ?1
             ORDER BY d.id, t.title",
        )?;

        let rows = stmt.query_map(params![user_id], |row| {
            Ok(DatabaseTag {
                tag: Tag {
                    id: row.get(0)?,
                    title: row.get(1)?,
                },
                database_id: row.get(2)?,
                database_name: row.get(3)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn list_posts_for_tag(&self, tag_id: i64, user_id: i64) -> Result<Vec<PostWithTags>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {POST_COLUMNS}
             FROM posts p
             JOIN post_tag_rels pt ON p.id = pt.post_id
             JOIN user_database_rels r ON p.database_id = r.database_id
             WHERE pt.tag_id = ?1 AND r.user_id = ?2
             ORDER BY p.id"
        ))?;

        let posts = stmt
            .query_map(params![tag_id, user_id], post_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        posts
            .into_iter()
            .map(|post| {
                let tags = query_post_tags(&conn, post.id)?;
                Ok(PostWithTags { post, tags })
            })
            .collect()
    }

    fn remove_tag_from_post(&self, tag_id: i64, post_id: i64) -> Result<()> {
        self.conn().execute(
            "DELETE FROM post_tag_rels WHERE tag_id = ?1 AND post_id = ?2",
            params![tag_id, post_id],
        )?;
        Ok(())
    }

    fn list_tag_relations(&self, tag_id: i64, user_id: i64) -> Result<Vec<PermissionType>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT r.permission_type
             FROM tag_database_rels td
             JOIN user_database_rels r ON td.database_id = r.database_id
             WHERE td.tag_id = ?1 AND r.user_id = ?2",
        )?;

        let rows = stmt.query_map(params![tag_id, user_id], |row| row.get(0))?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    fn delete_tag(&self, id: i64) -> Result<bool> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute("DELETE FROM post_tag_rels WHERE tag_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM tag_database_rels WHERE tag_id = ?1",
            params![id],
        )?;
        let rows = tx.execute("DELETE FROM tags WHERE id = ?1", params![id])?;

        tx.commit()?;
        Ok(rows > 0)
    }
}

impl FailureCounter for SqliteStore {
    fn increment_failure(
        &self,
        key: &str,
        limit: u32,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<u32> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let now_ms = now.timestamp_millis();

        tx.execute(
            "DELETE FROM failed_attempts WHERE key = ?1 AND expires_at IS NOT NULL AND expires_at <= ?2",
            params![key, now_ms],
        )?;

        tx.execute(
            "INSERT INTO failed_attempts (key, count) VALUES (?1, 1)
             ON CONFLICT(key) DO UPDATE SET count = count + 1",
            params![key],
        )?;

        // The window only restarts while the client is still under the limit.
        tx.execute(
            "UPDATE failed_attempts SET expires_at = ?2
             WHERE key = ?1 AND (count <= ?3 OR expires_at IS NULL)",
            params![key, (now + window).timestamp_millis(), limit],
        )?;

        let count: u32 = tx.query_row(
            "SELECT count FROM failed_attempts WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(count)
    }

    fn failure_count(&self, key: &str, now: DateTime<Utc>) -> Result<u32> {
        let conn = self.conn();
        let count: Option<u32> = conn
            .query_row(
                "SELECT count FROM failed_attempts
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now.timestamp_millis()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn setup() -> (TempDir, SqliteStore) {
        let temp = TempDir::new().unwrap();
        let store = SqliteStore::new(temp.path().join("test.db")).unwrap();
        store.initialize().unwrap();
        (temp, store)
    }

    fn count_rows(store: &SqliteStore, sql: &str, id: i64) -> i64 {
        store
            .conn()
            .query_row(sql, params![id], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_initialize_creates_tables() {
        let (_temp, store) = setup();

        let conn = store.conn();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for table in [
            "users",
            "databases",
            "posts",
            "tags",
            "user_database_rels",
            "post_tag_rels",
            "tag_database_rels",
            "sessions",
            "failed_attempts",
        ] {
            assert!(tables.contains(&table.to_string()), "missing {table}");
        }
    }

    #[test]
    fn test_create_user_reports_conflicts() {
        let (_temp, store) = setup();

        store.create_user("alice", "a@x.com", "hash").unwrap();

        let result = store.create_user("alice", "other@x.com", "hash");
        assert!(matches!(
            result,
            Err(Error::UserConflict {
                name: true,
                email: false
            })
        ));

        let result = store.create_user("alice", "a@x.com", "hash");
        assert!(matches!(
            result,
            Err(Error::UserConflict {
                name: true,
                email: true
            })
        ));
    }

    #[test]
    fn test_get_user_by_identifier() {
        let (_temp, store) = setup();
        let id = store.create_user("alice", "a@x.com", "hash").unwrap();

        assert_eq!(store.get_user_by_identifier("alice").unwrap().unwrap().id, id);
        assert_eq!(store.get_user_by_identifier("a@x.com").unwrap().unwrap().id, id);
        assert!(store.get_user_by_identifier("bob").unwrap().is_none());
    }

    #[test]
    fn test_create_database_makes_creator_owner() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();

        let db = store.create_database(alice, "Notes").unwrap();

        assert_eq!(
            store.get_relation(alice, db).unwrap(),
            Some(PermissionType::Owner)
        );

        let listed = store.list_databases_for_user(alice).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].database.name, "Notes");
        assert_eq!(listed[0].permission_type, PermissionType::Owner);
        assert!(listed[0].posts.is_empty());
    }

    #[test]
    fn test_list_databases_attaches_posts() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let first = store.create_database(alice, "First").unwrap();
        let second = store.create_database(alice, "Second").unwrap();

        store.create_post("a", "1", first).unwrap();
        store.create_post("b", "2", second).unwrap();
        store.create_post("c", "3", first).unwrap();

        let listed = store.list_databases_for_user(alice).unwrap();
        assert_eq!(listed.len(), 2);
        let titles: Vec<_> = listed[0].posts.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, ["a", "c"]);
        assert_eq!(listed[1].posts.len(), 1);
    }

    #[test]
    fn test_post_crud() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();

        let post = store.create_post("Hello", "World", db).unwrap();
        let fetched = store.get_post(post).unwrap().unwrap();
        assert_eq!(fetched.title, "Hello");
        assert_eq!(fetched.database_id, db);

        store.edit_post(post, "Hi", "There").unwrap();
        let fetched = store.get_post(post).unwrap().unwrap();
        assert_eq!(fetched.content, "There");

        assert!(matches!(
            store.edit_post(9999, "x", "y"),
            Err(Error::NotFound)
        ));

        store.attach_tags(post, db, &["foo".to_string()]).unwrap();
        assert!(store.delete_post(post).unwrap());
        assert!(store.get_post(post).unwrap().is_none());
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM post_tag_rels WHERE post_id = ?1", post),
            0
        );
        assert!(!store.delete_post(post).unwrap());
    }

    #[test]
    fn test_tag_canonicalization_is_idempotent() {
        let (_temp, store) = setup();

        let a = store.get_or_create_tag("python").unwrap();
        let b = store.get_or_create_tag("Python").unwrap();
        let c = store.get_or_create_tag("PYTHON").unwrap();

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(store.get_tag(a).unwrap().unwrap().title, "Python");
        assert!(store.get_or_create_tag("   ").is_err());
    }

    #[test]
    fn test_attach_tags_twice_is_noop() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();

        store.attach_tags(post, db, &["foo".to_string()]).unwrap();
        store.attach_tags(post, db, &["FOO".to_string()]).unwrap();

        let tag = store.get_or_create_tag("foo").unwrap();
        let pairs: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM post_tag_rels WHERE post_id = ?1 AND tag_id = ?2",
                params![post, tag],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(pairs, 1);
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM tag_database_rels WHERE database_id = ?1", db),
            1
        );
    }

    #[test]
    fn test_attach_tags_rejects_foreign_database() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let other = store.create_database(alice, "Other").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();

        let result = store.attach_tags(post, other, &["foo".to_string()]);
        assert!(matches!(result, Err(Error::BadRequest(_))));

        // Nothing from the failed batch is visible.
        let tags: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 0);
    }

    #[test]
    fn test_tag_listings_go_through_junctions() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let bob = store.create_user("bob", "b@x.com", "hash").unwrap();
        let notes = store.create_database(alice, "Notes").unwrap();
        let private = store.create_database(bob, "Private").unwrap();

        let mine = store.create_post("Mine", "x", notes).unwrap();
        let theirs = store.create_post("Theirs", "y", private).unwrap();
        store
            .attach_tags(mine, notes, &["rust".to_string(), "sql".to_string()])
            .unwrap();
        store.attach_tags(theirs, private, &["rust".to_string()]).unwrap();

        let rust = store.get_or_create_tag("rust").unwrap();

        let posts = store.list_posts_for_tag(rust, alice).unwrap();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].post.id, mine);
        let titles: Vec<_> = posts[0].tags.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, ["Rust", "Sql"]);

        let visible = store.list_tags_for_user(alice).unwrap();
        assert_eq!(visible.len(), 2);
        assert!(visible.iter().all(|t| t.database_id == notes));

        assert_eq!(
            store.list_tag_relations(rust, bob).unwrap(),
            vec![PermissionType::Owner]
        );

        store.remove_tag_from_post(rust, mine).unwrap();
        store.remove_tag_from_post(rust, mine).unwrap();
        let remaining: Vec<_> = store
            .list_tags_for_post(mine)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(remaining, ["Sql"]);
    }

    #[test]
    fn test_delete_tag_removes_associations() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();
        store.attach_tags(post, db, &["foo".to_string()]).unwrap();
        let tag = store.get_or_create_tag("foo").unwrap();

        assert!(store.delete_tag(tag).unwrap());

        assert!(store.get_tag(tag).unwrap().is_none());
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM post_tag_rels WHERE tag_id = ?1", tag),
            0
        );
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM tag_database_rels WHERE tag_id = ?1", tag),
            0
        );
    }

    fn graph_counts(store: &SqliteStore, db: i64) -> [i64; 4] {
        [
            count_rows(store, "SELECT COUNT(*) FROM posts WHERE database_id = ?1", db),
            count_rows(
                store,
                "SELECT COUNT(*) FROM post_tag_rels
                 WHERE post_id IN (SELECT id FROM posts WHERE database_id = ?1)",
                db,
            ),
            count_rows(store, "SELECT COUNT(*) FROM tag_database_rels WHERE database_id = ?1", db),
            count_rows(store, "SELECT COUNT(*) FROM user_database_rels WHERE database_id = ?1", db),
        ]
    }

    #[test]
    fn test_delete_database_cascades() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();
        store
            .attach_tags(post, db, &["foo".to_string(), "bar".to_string()])
            .unwrap();
        let tagged_post_rels = count_rows(
            &store,
            "SELECT COUNT(*) FROM post_tag_rels WHERE post_id = ?1",
            post,
        );
        assert_eq!(tagged_post_rels, 2);

        store.delete_database(db, alice).unwrap();

        assert_eq!(graph_counts(&store, db), [0, 0, 0, 0]);
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM post_tag_rels WHERE post_id = ?1", post),
            0
        );
        assert_eq!(count_rows(&store, "SELECT COUNT(*) FROM databases WHERE id = ?1", db), 0);
        // Tags survive as orphans.
        assert!(store.get_tag(store.get_or_create_tag("foo").unwrap()).unwrap().is_some());
    }

    #[test]
    fn test_delete_database_by_non_owner_changes_nothing() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let bob = store.create_user("bob", "b@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();
        store.attach_tags(post, db, &["foo".to_string()]).unwrap();
        store.add_viewer_by_email(db, "b@x.com", alice).unwrap();

        let before = graph_counts(&store, db);

        assert!(matches!(
            store.delete_database(db, bob),
            Err(Error::UserNotOwner)
        ));
        assert_eq!(graph_counts(&store, db), before);
        assert_eq!(count_rows(&store, "SELECT COUNT(*) FROM databases WHERE id = ?1", db), 1);
    }

    #[test]
    fn test_viewer_lifecycle() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let bob = store.create_user("bob", "b@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();

        let added = store.add_viewer_by_email(db, "b@x.com", alice).unwrap();
        assert_eq!(added.id, bob);
        assert_eq!(
            store.get_relation(bob, db).unwrap(),
            Some(PermissionType::Viewer)
        );
        assert_eq!(store.list_databases_for_user(bob).unwrap().len(), 1);

        assert!(matches!(
            store.add_viewer_by_email(db, "b@x.com", alice),
            Err(Error::UserAlreadyInDatabase)
        ));
        assert!(matches!(
            store.add_viewer_by_email(db, "nobody@x.com", alice),
            Err(Error::UserNotExist)
        ));
        assert!(matches!(
            store.add_viewer_by_email(db, "a@x.com", bob),
            Err(Error::UserNotOwner)
        ));

        let owned = store.list_owned_databases(alice).unwrap();
        assert_eq!(owned.len(), 1);
        assert_eq!(owned[0].viewers.len(), 1);
        assert_eq!(owned[0].viewers[0].email, "b@x.com");

        assert!(store.remove_viewer(db, bob, alice).unwrap());
        assert!(store.list_databases_for_user(bob).unwrap().is_empty());
    }

    #[test]
    fn test_remove_viewer_never_removes_owner() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let bob = store.create_user("bob", "b@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        store.add_viewer_by_email(db, "b@x.com", alice).unwrap();

        assert!(!store.remove_viewer(db, alice, alice).unwrap());
        assert_eq!(
            store.get_relation(alice, db).unwrap(),
            Some(PermissionType::Owner)
        );

        assert!(matches!(
            store.remove_viewer(db, bob, bob),
            Err(Error::UserNotOwner)
        ));
        assert_eq!(
            store.get_relation(bob, db).unwrap(),
            Some(PermissionType::Viewer)
        );
    }

    #[test]
    fn test_failure_counter_window() {
        let (_temp, store) = setup();
        let window = Duration::seconds(10);
        let start = Utc::now();

        for expected in 1..=7 {
            let count = store
                .increment_failure("failed_attempts:1.2.3.4", 6, window, start)
                .unwrap();
            assert_eq!(count, expected);
        }
        assert_eq!(
            store.failure_count("failed_attempts:1.2.3.4", start).unwrap(),
            7
        );

        let later = start + Duration::seconds(11);
        assert_eq!(
            store.failure_count("failed_attempts:1.2.3.4", later).unwrap(),
            0
        );
        assert_eq!(
            store
                .increment_failure("failed_attempts:1.2.3.4", 6, window, later)
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_failure_counter_window_not_extended_past_limit() {
        let (_temp, store) = setup();
        let window = Duration::seconds(10);
        let start = Utc::now();
        let key = "failed_attempts:5.6.7.8";

        store.increment_failure(key, 2, window, start).unwrap();
        store.increment_failure(key, 2, window, start).unwrap();
        // Over the limit: these must not push the expiry out.
        let late = start + Duration::seconds(9);
        store.increment_failure(key, 2, window, late).unwrap();
        store.increment_failure(key, 2, window, late).unwrap();

        assert_eq!(store.failure_count(key, late).unwrap(), 4);
        assert_eq!(
            store
                .failure_count(key, start + Duration::seconds(10))
                .unwrap(),
            0
        );
    }

    #[test]
    fn test_failure_counter_expiry_compares_numerically() {
        let (_temp, store) = setup();
        let key = "failed_attempts:9.9.9.9";
        // Four-digit now, five-digit expiry.
        let now = Utc.timestamp_millis_opt(9_000).unwrap();

        store
            .increment_failure(key, 6, Duration::seconds(2), now)
            .unwrap();

        let kind: String = store
            .conn()
            .query_row(
                "SELECT typeof(expires_at) FROM failed_attempts WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(kind, "integer");
        assert_eq!(
            store
                .failure_count(key, now + Duration::milliseconds(500))
                .unwrap(),
            1
        );
    }

    #[test]
    fn test_concurrent_tag_creation_leaves_one_row() {
        let (temp, store) = setup();
        let path = temp.path().join("test.db");
        let stores: Vec<SqliteStore> = (0..4)
            .map(|_| SqliteStore::new(&path).unwrap())
            .collect();
        let barrier = std::sync::Barrier::new(stores.len());

        let ids: Vec<i64> = std::thread::scope(|scope| {
            let handles: Vec<_> = stores
                .iter()
                .map(|racer| {
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        racer.get_or_create_tag("python").unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(ids.iter().all(|id| *id == ids[0]));
        let rows: i64 = store
            .conn()
            .query_row(
                "SELECT COUNT(*) FROM tags WHERE title = 'Python'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(rows, 1);
    }

    fn fail_database_link_for(store: &SqliteStore, title: &str) {
        store
            .conn()
            .execute_batch(&format!(
                "CREATE TRIGGER fail_link BEFORE INSERT ON tag_database_rels
                 WHEN NEW.tag_id IN (SELECT id FROM tags WHERE title = '{title}')
                 BEGIN SELECT RAISE(ABORT, 'link refused'); END;"
            ))
            .unwrap();
    }

    #[test]
    fn test_attach_tags_rolls_back_on_mid_batch_failure() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();
        fail_database_link_for(&store, "Boom");

        let result = store.attach_tags(post, db, &["foo".to_string(), "boom".to_string()]);
        assert!(result.is_err());

        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM post_tag_rels WHERE post_id = ?1", post),
            0
        );
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM tag_database_rels WHERE database_id = ?1", db),
            0
        );
        let tags: i64 = store
            .conn()
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))
            .unwrap();
        assert_eq!(tags, 0);
    }

    #[test]
    fn test_create_tagged_post_is_atomic() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();

        let post = store
            .create_tagged_post("Hello", "World", db, &["foo".to_string(), "bar".to_string()])
            .unwrap();
        let titles: Vec<_> = store
            .list_tags_for_post(post)
            .unwrap()
            .into_iter()
            .map(|t| t.title)
            .collect();
        assert_eq!(titles, ["Bar", "Foo"]);

        fail_database_link_for(&store, "Boom");
        let result =
            store.create_tagged_post("Second", "Body", db, &["baz".to_string(), "boom".to_string()]);
        assert!(result.is_err());

        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM posts WHERE database_id = ?1", db),
            1
        );
        assert_eq!(
            count_rows(&store, "SELECT COUNT(*) FROM tag_database_rels WHERE database_id = ?1", db),
            2
        );
    }

    #[test]
    fn test_delete_database_rolls_back_on_failure() {
        let (_temp, store) = setup();
        let alice = store.create_user("alice", "a@x.com", "hash").unwrap();
        let db = store.create_database(alice, "Notes").unwrap();
        let post = store.create_post("Hello", "World", db).unwrap();
        store
            .attach_tags(post, db, &["foo".to_string(), "bar".to_string()])
            .unwrap();
        let before = graph_counts(&store, db);

        // The final step fails after every child row is gone.
        store
            .conn()
            .execute_batch(
                "CREATE TRIGGER keep_databases BEFORE DELETE ON databases
                 BEGIN SELECT RAISE(ABORT, 'delete refused'); END;",
            )
            .unwrap();

        assert!(store.delete_database(db, alice).is_err());
        assert_eq!(before, [1, 2, 2, 1]);
        assert_eq!(graph_counts(&store, db), before);
    }
}
